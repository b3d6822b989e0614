//! Search query lifecycle: draft, commit, pagination and stale-response
//! suppression.
//!
//! [`SearchQueryController`] is the only writer of [`SearchState`]. Views read
//! snapshots through [`SearchQueryController::subscribe`] or
//! [`SearchQueryController::snapshot`].
//!
//! Every retrieval gets a [`RequestKey`] made of a monotonically increasing
//! generation and the `(query, page)` it asks for. Issuing a new retrieval
//! cancels the previous one and replaces the current key; a response is only
//! applied if its key is still current when it arrives. The result is that a
//! slow response for an older commit can never overwrite a newer one.
//!
//! Retrieval failures are shown immediately and are not retried; the user
//! resubmits explicitly.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendClient, Service};
use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::models::{PageRequest, Query, ResultPage, SearchResponse, ViewMode};
use crate::project;
use crate::readiness::{wait_ready, ReadinessOrchestrator};

/// Port to whatever answers paged search requests.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, request: &PageRequest) -> ClientResult<ResultPage>;
}

/// `GET /search?query=<text>&page=<n>` on the search service.
pub struct HttpSearchBackend {
    client: BackendClient,
}

impl HttpSearchBackend {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &Config) -> ClientResult<Self> {
        Ok(Self::new(BackendClient::for_service(config, Service::Search)?))
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn search(&self, request: &PageRequest) -> ClientResult<ResultPage> {
        let response: SearchResponse = self
            .client
            .get_json(
                "/search",
                &[
                    ("query", request.query.text.clone()),
                    ("page", request.page.to_string()),
                ],
            )
            .await?;
        Ok(response.into())
    }
}

/// Everything a results view needs to render.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchState {
    /// Text in the input box; never used for retrieval.
    pub draft: String,
    pub committed: Option<Query>,
    /// 1-based.
    pub page: u64,
    pub view_mode: ViewMode,
    /// `None` before the first response of a commit and after a failure.
    pub results: Option<ResultPage>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            draft: String::new(),
            committed: None,
            page: 1,
            view_mode: ViewMode::List,
            results: None,
            loading: false,
            error: None,
        }
    }
}

impl SearchState {
    pub fn total_pages(&self) -> u64 {
        self.results
            .as_ref()
            .map(ResultPage::total_pages)
            .unwrap_or(1)
    }

    pub fn total_hits(&self) -> u64 {
        self.results.as_ref().map(|r| r.total_hits).unwrap_or(0)
    }

    pub fn has_previous(&self) -> bool {
        self.results.is_some() && self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.results.is_some() && self.page < self.total_pages()
    }

    /// A settled, successful retrieval that matched nothing.
    pub fn is_empty(&self) -> bool {
        !self.loading
            && self.error.is_none()
            && self
                .results
                .as_ref()
                .map(|r| r.records.is_empty())
                .unwrap_or(false)
    }
}

/// Identifies one retrieval attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
    pub generation: u64,
    pub request: PageRequest,
}

struct InFlight {
    key: RequestKey,
    cancel: CancellationToken,
}

struct Inner {
    backend: Arc<dyn SearchBackend>,
    state: watch::Sender<SearchState>,
    in_flight: Mutex<Option<InFlight>>,
    generation: AtomicU64,
    cancel: CancellationToken,
}

/// Owner of the search state.
///
/// Methods that trigger retrieval spawn onto the current tokio runtime.
/// Dropping the controller (or calling [`shutdown`](Self::shutdown)) cancels
/// in-flight retrievals; nothing mutates the state afterwards.
pub struct SearchQueryController {
    inner: Arc<Inner>,
}

impl SearchQueryController {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        let (state, _) = watch::channel(SearchState::default());
        Self {
            inner: Arc::new(Inner {
                backend,
                state,
                in_flight: Mutex::new(None),
                generation: AtomicU64::new(0),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn snapshot(&self) -> SearchState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.inner.state.subscribe()
    }

    pub fn update_draft(&self, text: impl Into<String>) {
        let text = text.into();
        self.inner.modify(|s| {
            if s.draft == text {
                return false;
            }
            s.draft = text;
            true
        });
    }

    /// Promote the draft to the active query and fetch its first page.
    pub fn commit(&self) -> ClientResult<PageRequest> {
        let text = self.inner.state.borrow().draft.trim().to_string();
        if text.is_empty() {
            return Err(ClientError::Validation(
                "query must not be empty".to_string(),
            ));
        }
        if self.inner.cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let query = Query::new(text);
        self.inner
            .begin(move |s| {
                s.committed = Some(query.clone());
                s.page = 1;
                s.results = None;
                s.error = None;
                Some(PageRequest { query, page: 1 })
            })
            .ok_or(ClientError::Cancelled)
    }

    /// Convenience: set the draft and commit it.
    pub fn submit(&self, text: impl Into<String>) -> ClientResult<PageRequest> {
        self.update_draft(text);
        self.commit()
    }

    /// Fetch page `page` of the committed query.
    ///
    /// Returns `false` without issuing a request when there is no current
    /// result, `page` is outside `1..=total_pages`, or it is already the
    /// current page.
    pub fn set_page(&self, page: u64) -> bool {
        self.inner
            .begin(|s| {
                let query = s.committed.clone()?;
                let total_pages = s.results.as_ref()?.total_pages();
                if page < 1 || page > total_pages || page == s.page {
                    return None;
                }
                s.page = page;
                s.error = None;
                Some(PageRequest { query, page })
            })
            .is_some()
    }

    pub fn next_page(&self) -> bool {
        let page = self.inner.state.borrow().page;
        self.set_page(page + 1)
    }

    pub fn previous_page(&self) -> bool {
        let page = self.inner.state.borrow().page;
        page > 1 && self.set_page(page - 1)
    }

    pub fn set_view_mode(&self, mode: ViewMode) {
        self.inner.modify(|s| {
            if s.view_mode == mode {
                return false;
            }
            s.view_mode = mode;
            true
        });
    }

    /// Wait until no retrieval is in flight and return that snapshot.
    pub async fn settled(&self) -> ClientResult<SearchState> {
        let mut rx = self.subscribe();
        let cancel = self.inner.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            state = rx.wait_for(|s| !s.loading) => state
                .map(|s| s.clone())
                .map_err(|_| ClientError::Cancelled),
        }
    }

    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

impl Drop for SearchQueryController {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl Inner {
    /// Apply a state change unless the controller has been torn down.
    fn modify(&self, change: impl FnOnce(&mut SearchState) -> bool) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.state.send_if_modified(change);
    }

    /// Plan a retrieval against the current state and issue it.
    ///
    /// `plan` runs under the in-flight lock; returning `None` leaves the
    /// state untouched and issues nothing.
    fn begin(
        self: &Arc<Self>,
        plan: impl FnOnce(&mut SearchState) -> Option<PageRequest>,
    ) -> Option<PageRequest> {
        let Ok(mut in_flight) = self.in_flight.lock() else {
            tracing::error!("search in-flight lock poisoned");
            return None;
        };
        if self.cancel.is_cancelled() {
            return None;
        }

        let mut planned = None;
        self.state.send_if_modified(|s| {
            planned = plan(s);
            if planned.is_some() {
                s.loading = true;
            }
            planned.is_some()
        });
        let request = planned?;

        let key = RequestKey {
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            request: request.clone(),
        };
        let token = self.cancel.child_token();
        if let Some(previous) = in_flight.replace(InFlight {
            key: key.clone(),
            cancel: token.clone(),
        }) {
            tracing::debug!(
                query = %previous.key.request.query,
                page = previous.key.request.page,
                "superseding in-flight search"
            );
            previous.cancel.cancel();
        }
        drop(in_flight);

        tracing::debug!(query = %request.query, page = request.page, "search issued");
        let inner = self.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(ClientError::Stale),
                result = inner.backend.search(&key.request) => result,
            };
            inner.apply(&key, result);
        });

        Some(request)
    }

    /// Apply a response if `key` is still the current request.
    fn apply(&self, key: &RequestKey, result: ClientResult<ResultPage>) -> bool {
        let Ok(mut in_flight) = self.in_flight.lock() else {
            return false;
        };
        let current = in_flight.as_ref().map(|f| &f.key) == Some(key);
        if !current || self.cancel.is_cancelled() || matches!(result, Err(ClientError::Stale)) {
            tracing::debug!(
                query = %key.request.query,
                page = key.request.page,
                "discarding stale search response"
            );
            return false;
        }
        *in_flight = None;

        self.state.send_modify(|s| {
            s.loading = false;
            match result {
                Ok(page) => {
                    tracing::debug!(
                        query = %key.request.query,
                        page = key.request.page,
                        records = page.records.len(),
                        total_hits = page.total_hits,
                        "search results applied"
                    );
                    s.results = Some(page);
                    s.error = None;
                }
                Err(e) => {
                    tracing::warn!(query = %key.request.query, "search failed: {}", e);
                    s.results = None;
                    s.error = Some(format!("An error occurred: {}", e));
                }
            }
        });
        true
    }
}

/// Print the current state in its view mode.
pub fn print_state(state: &SearchState) {
    if state.loading {
        println!("Loading...");
        return;
    }
    if let Some(error) = &state.error {
        println!("{}", error);
        return;
    }
    let Some(results) = &state.results else {
        return;
    };
    if state.is_empty() {
        println!("No results found.");
        return;
    }

    match state.view_mode {
        ViewMode::List => {
            for (i, entry) in project::list_entries(&results.records).iter().enumerate() {
                println!("{}. {}  [{}]", i + 1, entry.name, entry.classification);
                println!("    hash:       {}", entry.hash);
                println!("    timeframes: {}", entry.timeframes);
                println!("    locations:  {}", entry.locations);
                println!("    MGRS:       {}", entry.mgrs);
                println!("    {}", entry.snippet);
                println!();
            }
        }
        ViewMode::Map => {
            let markers = project::map_markers(&results.records);
            if markers.is_empty() {
                println!("No results on this page have coordinates.");
            }
            for marker in markers {
                println!("{:>10.5} {:>11.5}  {}", marker.lat, marker.lng, marker.label);
            }
        }
    }

    let pager = project::pager(state);
    println!(
        "Page {} of {} ({} hits)",
        pager.page, pager.total_pages, pager.total_hits
    );
}

/// CLI entry point for `corectl search`.
///
/// Waits for the backends, commits `query`, moves to `page` if asked, and
/// prints the settled state.
pub async fn run_search(config: &Config, query: &str, page: u64, view: ViewMode) -> Result<()> {
    let orchestrator = ReadinessOrchestrator::from_config(config)?;
    wait_ready(&orchestrator).await?;

    let controller = SearchQueryController::new(Arc::new(HttpSearchBackend::from_config(config)?));
    controller.set_view_mode(view);
    controller.submit(query)?;
    let mut state = controller.settled().await?;

    if page != state.page && state.error.is_none() {
        if !controller.set_page(page) {
            bail!(
                "page {} is out of range (1..={})",
                page,
                state.total_pages()
            );
        }
        state = controller.settled().await?;
    }

    print_state(&state);
    match state.error {
        Some(_) => bail!("search failed"),
        None => Ok(()),
    }
}
