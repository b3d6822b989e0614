//! Single-request readiness probes.
//!
//! A [`Probe`] performs exactly one check and always yields a
//! [`ProbeOutcome`]; it never returns an error past its boundary. The
//! [`HttpProbe`] implementation calls a backend status endpoint and looks for
//! an explicit status word in the JSON body:
//!
//! | Endpoint | Expected body |
//! |----------|---------------|
//! | `POST /initialize` | `{"status": "success"}` |
//! | `GET /status` | `{"status": "ready"}` |
//!
//! Anything else that still parses as a JSON object is `NotReady`; transport
//! failures, HTTP error statuses and malformed bodies are `Error`.

use async_trait::async_trait;
use reqwest::Method;

use crate::backend::BackendClient;
use crate::error::{ClientError, ClientResult};

/// Result of one probe attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Ready,
    /// The call succeeded but the backend reported another status.
    NotReady(String),
    Error(ClientError),
}

impl ProbeOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeOutcome::Ready)
    }

    /// `NotReady` maps to [`ClientError::BackendNotReady`].
    pub fn into_result(self) -> ClientResult<()> {
        match self {
            ProbeOutcome::Ready => Ok(()),
            ProbeOutcome::NotReady(status) => Err(ClientError::BackendNotReady(status)),
            ProbeOutcome::Error(e) => Err(e),
        }
    }
}

#[async_trait]
pub trait Probe: Send + Sync {
    /// Short label used in logs.
    fn describe(&self) -> String;

    async fn probe(&self) -> ProbeOutcome;
}

/// Probe that calls one backend endpoint and compares its `status` field.
pub struct HttpProbe {
    client: BackendClient,
    method: Method,
    path: String,
    expected: String,
}

impl HttpProbe {
    pub fn new(
        client: BackendClient,
        method: Method,
        path: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self {
            client,
            method,
            path: path.into(),
            expected: expected.into(),
        }
    }

    /// `POST /initialize`, ready on `{"status": "success"}`.
    pub fn initialize(client: BackendClient) -> Self {
        Self::new(client, Method::POST, "/initialize", "success")
    }

    /// `GET /status`, ready on `{"status": "ready"}`.
    pub fn status(client: BackendClient) -> Self {
        Self::new(client, Method::GET, "/status", "ready")
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn describe(&self) -> String {
        format!("{} {}", self.method, self.client.url(&self.path))
    }

    async fn probe(&self) -> ProbeOutcome {
        let body: serde_json::Value = match self
            .client
            .request_json(self.method.clone(), &self.path, &[])
            .await
        {
            Ok(body) => body,
            Err(e) => return ProbeOutcome::Error(e),
        };
        classify(&body, &self.expected)
    }
}

/// Classify a parsed status body against the expected status word.
pub fn classify(body: &serde_json::Value, expected: &str) -> ProbeOutcome {
    let Some(obj) = body.as_object() else {
        return ProbeOutcome::Error(ClientError::Backend(format!(
            "expected a JSON object, got {}",
            body
        )));
    };

    match obj.get("status").and_then(|s| s.as_str()) {
        Some(status) if status == expected => ProbeOutcome::Ready,
        Some(status) => {
            let detail = obj
                .get("message")
                .and_then(|m| m.as_str())
                .map(|m| format!("{}: {}", status, m))
                .unwrap_or_else(|| status.to_string());
            ProbeOutcome::NotReady(detail)
        }
        None => ProbeOutcome::NotReady("no status reported".to_string()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted probes for exercising the retry and readiness layers.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replays a fixed list of outcomes, then repeats `fallback` forever.
    pub struct ScriptedProbe {
        name: String,
        script: Mutex<VecDeque<ProbeOutcome>>,
        fallback: ProbeOutcome,
        calls: Arc<AtomicUsize>,
        log: Option<Arc<Mutex<Vec<String>>>>,
    }

    impl ScriptedProbe {
        pub fn new(name: &str, script: Vec<ProbeOutcome>, fallback: ProbeOutcome) -> Self {
            Self {
                name: name.to_string(),
                script: Mutex::new(script.into()),
                fallback,
                calls: Arc::new(AtomicUsize::new(0)),
                log: None,
            }
        }

        pub fn always(name: &str, outcome: ProbeOutcome) -> Self {
            Self::new(name, Vec::new(), outcome)
        }

        /// Record each call's name into a shared log (ordering assertions).
        pub fn with_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
            self.log = Some(log);
            self
        }

        pub fn calls(&self) -> Arc<AtomicUsize> {
            self.calls.clone()
        }
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        fn describe(&self) -> String {
            self.name.clone()
        }

        async fn probe(&self) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(log) = &self.log {
                log.lock().unwrap().push(self.name.clone());
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    pub fn not_ready() -> ProbeOutcome {
        ProbeOutcome::NotReady("initializing".to_string())
    }
}
