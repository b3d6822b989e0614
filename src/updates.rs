//! Update-check job: start it, then poll its progress until it finishes.
//!
//! The updates service runs the job itself; this side only kicks it off with
//! `POST /check-for-updates` and polls `GET /progress` on a fixed interval.
//! Polling stops on the first terminal progress message, on the first failed
//! poll, or when the monitor is shut down or dropped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendClient, Service};
use crate::config::Config;
use crate::error::ClientResult;

pub const COMPLETED: &str = "Completed";
pub const START_FAILED: &str = "Failed to start update process";
pub const POLL_FAILED: &str = "Failed to fetch progress data";

/// Wire shape of `GET /progress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProgress {
    #[serde(default)]
    pub current: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub message: String,
}

impl Default for UpdateProgress {
    fn default() -> Self {
        Self {
            current: 0,
            total: 0,
            message: "Not started".to_string(),
        }
    }
}

impl UpdateProgress {
    pub fn is_failure(&self) -> bool {
        self.message.starts_with("Failed")
    }

    pub fn is_terminal(&self) -> bool {
        self.message == COMPLETED || self.is_failure()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateState {
    pub processing: bool,
    pub progress: UpdateProgress,
    pub error: Option<String>,
}

#[async_trait]
pub trait UpdateBackend: Send + Sync {
    async fn start_job(&self) -> ClientResult<()>;
    async fn progress(&self) -> ClientResult<UpdateProgress>;
}

pub struct HttpUpdateBackend {
    client: BackendClient,
}

impl HttpUpdateBackend {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &Config) -> ClientResult<Self> {
        Ok(Self::new(BackendClient::for_service(config, Service::Updates)?))
    }
}

#[async_trait]
impl UpdateBackend for HttpUpdateBackend {
    async fn start_job(&self) -> ClientResult<()> {
        let ack: serde_json::Value = self.client.post_json("/check-for-updates").await?;
        tracing::info!(%ack, "update process started");
        Ok(())
    }

    async fn progress(&self) -> ClientResult<UpdateProgress> {
        self.client.get_json("/progress", &[]).await
    }
}

struct Inner {
    backend: Arc<dyn UpdateBackend>,
    poll_interval: Duration,
    state: watch::Sender<UpdateState>,
    cancel: CancellationToken,
}

pub struct UpdateMonitor {
    inner: Arc<Inner>,
}

impl UpdateMonitor {
    pub fn new(backend: Arc<dyn UpdateBackend>, poll_interval: Duration) -> Self {
        let (state, _) = watch::channel(UpdateState::default());
        Self {
            inner: Arc::new(Inner {
                backend,
                poll_interval,
                state,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn from_config(config: &Config) -> ClientResult<Self> {
        let backend = HttpUpdateBackend::from_config(config)?;
        Ok(Self::new(Arc::new(backend), config.updates.poll_interval()))
    }

    pub fn snapshot(&self) -> UpdateState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UpdateState> {
        self.inner.state.subscribe()
    }

    /// Start the job and begin polling.
    ///
    /// Returns `false` if a job is already being tracked or the monitor is
    /// shut down. A rejected start is reported through the state, not here.
    pub async fn start(&self) -> bool {
        if self.inner.cancel.is_cancelled() {
            return false;
        }
        let claimed = self.inner.state.send_if_modified(|s| {
            if s.processing {
                return false;
            }
            s.processing = true;
            s.progress = UpdateProgress::default();
            s.error = None;
            true
        });
        if !claimed {
            tracing::debug!("update already in progress");
            return false;
        }
        let mut claim = StartClaim {
            inner: self.inner.as_ref(),
            held: true,
        };

        let started = tokio::select! {
            biased;
            _ = self.inner.cancel.cancelled() => return false,
            started = self.inner.backend.start_job() => started,
        };
        claim.held = false;
        if let Err(e) = started {
            tracing::warn!("failed to start update process: {}", e);
            self.inner.publish(|s| {
                s.processing = false;
                s.error = Some(START_FAILED.to_string());
            });
            return false;
        }

        let inner = self.inner.clone();
        tokio::spawn(async move { inner.poll().await });
        true
    }

    /// Wait until no job is being tracked and return that snapshot.
    pub async fn finished(&self) -> Option<UpdateState> {
        let mut rx = self.subscribe();
        tokio::select! {
            biased;
            _ = self.inner.cancel.cancelled() => None,
            state = rx.wait_for(|s| !s.processing) => state.ok().map(|s| s.clone()),
        }
    }

    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

impl Drop for UpdateMonitor {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

/// Releases `processing` if a `start` call is dropped while the job request
/// is still in flight.
struct StartClaim<'a> {
    inner: &'a Inner,
    held: bool,
}

impl Drop for StartClaim<'_> {
    fn drop(&mut self) {
        if self.held {
            tracing::debug!("update start abandoned");
            self.inner.publish(|s| s.processing = false);
        }
    }
}

impl Inner {
    fn publish(&self, change: impl FnOnce(&mut UpdateState)) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.state.send_modify(change);
    }

    async fn poll(&self) {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let polled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                polled = self.backend.progress() => polled,
            };

            match polled {
                Ok(progress) => {
                    tracing::debug!(
                        current = progress.current,
                        total = progress.total,
                        message = %progress.message,
                        "update progress"
                    );
                    let terminal = progress.is_terminal();
                    self.publish(|s| {
                        if progress.is_failure() {
                            s.error = Some(progress.message.clone());
                        }
                        if terminal {
                            s.processing = false;
                        }
                        s.progress = progress;
                    });
                    if terminal {
                        tracing::info!("update process finished");
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to fetch progress data: {}", e);
                    self.publish(|s| {
                        s.processing = false;
                        s.error = Some(POLL_FAILED.to_string());
                    });
                    return;
                }
            }
        }
    }
}

/// CLI entry point for `corectl updates`: start the job and stream progress
/// lines until it finishes.
pub async fn run_updates(config: &Config) -> anyhow::Result<()> {
    let monitor = UpdateMonitor::from_config(config)?;
    let mut rx = monitor.subscribe();

    if !monitor.start().await {
        let state = monitor.snapshot();
        anyhow::bail!(
            "{}",
            state.error.as_deref().unwrap_or("update already in progress")
        );
    }
    println!("Update process started.");

    let mut last = UpdateProgress::default();
    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();
        if state.progress != last {
            println!(
                "{} / {}  {}",
                state.progress.current, state.progress.total, state.progress.message
            );
            last = state.progress.clone();
        }
        if !state.processing {
            return match state.error {
                Some(error) => Err(anyhow::anyhow!(error)),
                None => Ok(()),
            };
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedUpdates {
        start_fails: bool,
        start_delay: Duration,
        script: Mutex<VecDeque<ClientResult<UpdateProgress>>>,
        polls: Arc<AtomicUsize>,
    }

    impl ScriptedUpdates {
        fn new(script: Vec<ClientResult<UpdateProgress>>) -> Self {
            Self {
                start_fails: false,
                start_delay: Duration::ZERO,
                script: Mutex::new(script.into()),
                polls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl UpdateBackend for ScriptedUpdates {
        async fn start_job(&self) -> ClientResult<()> {
            tokio::time::sleep(self.start_delay).await;
            if self.start_fails {
                Err(ClientError::Network("HTTP error! status: 500".into()))
            } else {
                Ok(())
            }
        }

        async fn progress(&self) -> ClientResult<UpdateProgress> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(step(0, 0, "Processing")))
        }
    }

    fn step(current: u64, total: u64, message: &str) -> UpdateProgress {
        UpdateProgress {
            current,
            total,
            message: message.to_string(),
        }
    }

    fn monitor(backend: ScriptedUpdates) -> (UpdateMonitor, Arc<AtomicUsize>) {
        let polls = backend.polls.clone();
        (
            UpdateMonitor::new(Arc::new(backend), Duration::from_millis(2200)),
            polls,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn failure_message_stops_polling() {
        let (monitor, polls) = monitor(ScriptedUpdates::new(vec![
            Ok(step(1, 5, "Processing")),
            Ok(step(3, 5, "Processing")),
            Ok(step(3, 5, "Failed: disk full")),
        ]));
        let start = Instant::now();

        assert!(monitor.start().await);
        let done = monitor.finished().await.unwrap();

        assert!(!done.processing);
        assert_eq!(done.error.as_deref(), Some("Failed: disk full"));
        assert_eq!(done.progress, step(3, 5, "Failed: disk full"));
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        assert_eq!(Instant::now() - start, Duration::from_millis(6600));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn completed_clears_processing() {
        let (monitor, polls) = monitor(ScriptedUpdates::new(vec![
            Ok(step(1, 2, "Processing")),
            Ok(step(2, 2, COMPLETED)),
        ]));

        assert!(monitor.start().await);
        let done = monitor.finished().await.unwrap();

        assert!(!done.processing);
        assert_eq!(done.error, None);
        assert_eq!(done.progress.message, COMPLETED);
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn start_failure_sets_error() {
        let mut backend = ScriptedUpdates::new(vec![]);
        backend.start_fails = true;
        let (monitor, polls) = monitor(backend);

        assert!(!monitor.start().await);
        let state = monitor.snapshot();
        assert!(!state.processing);
        assert_eq!(state.error.as_deref(), Some(START_FAILED));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_failure_stops_polling() {
        let (monitor, polls) = monitor(ScriptedUpdates::new(vec![
            Ok(step(1, 4, "Processing")),
            Err(ClientError::Network("connection reset".into())),
        ]));

        assert!(monitor.start().await);
        let done = monitor.finished().await.unwrap();

        assert_eq!(done.error.as_deref(), Some(POLL_FAILED));
        assert_eq!(done.progress, step(1, 4, "Processing"));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_processing_is_noop() {
        let (monitor, _) = monitor(ScriptedUpdates::new(vec![]));

        assert!(monitor.start().await);
        assert!(!monitor.start().await);
        assert!(monitor.snapshot().processing);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_start_releases_the_claim() {
        let mut backend = ScriptedUpdates::new(vec![Ok(step(1, 1, COMPLETED))]);
        backend.start_delay = Duration::from_secs(5);
        let (monitor, polls) = monitor(backend);

        let abandoned = tokio::time::timeout(Duration::from_secs(1), monitor.start()).await;
        assert!(abandoned.is_err());
        assert!(!monitor.snapshot().processing);
        assert_eq!(monitor.snapshot().error, None);

        assert!(monitor.start().await);
        let done = monitor.finished().await.unwrap();
        assert_eq!(done.progress.message, COMPLETED);
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_polling_and_freezes_state() {
        let (monitor, polls) = monitor(ScriptedUpdates::new(vec![]));

        assert!(monitor.start().await);
        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 2);

        monitor.shutdown();
        let frozen = monitor.snapshot();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(polls.load(Ordering::SeqCst), 2);
        assert_eq!(monitor.snapshot(), frozen);
        assert!(!monitor.start().await);
    }

    #[test]
    fn terminal_messages() {
        assert!(step(0, 0, "Completed").is_terminal());
        assert!(step(0, 0, "Failed to process file").is_terminal());
        assert!(!step(0, 0, "Processing").is_terminal());
        assert!(!step(0, 0, "completed").is_terminal());
    }

    #[test]
    fn progress_parses_partial_body() {
        let p: UpdateProgress = serde_json::from_str(r#"{"message": "Completed"}"#).unwrap();
        assert_eq!(p.current, 0);
        assert!(p.is_terminal());
    }
}
