//! Readiness orchestration across the backend services.
//!
//! Two entry points share the same [`RetryLoop`] + [`Probe`] primitive:
//!
//! - [`ReadinessOrchestrator`] probes an ordered list of stages up front,
//!   one at a time, against a single global deadline. The rest of the client
//!   is gated behind [`Phase::Ready`].
//! - [`ServiceGate`] checks one service lazily the first time a consumer
//!   needs it and remembers a confirmed service so it is never probed again.
//!
//! # State machine
//!
//! ```text
//! NotStarted ──▶ Probing(0) ──▶ Probing(1) ──▶ … ──▶ Ready
//!                    │              │
//!                    └──────────────┴──────────▶ TimedOut
//! ```
//!
//! `Probing(i) → Probing(i+1)` happens only when stage `i` is satisfied. The
//! deadline is fixed when the run starts. Cancellation freezes the state where
//! it is: no transition is published after [`ReadinessOrchestrator::shutdown`].
//! `Failed` is reserved for the orchestration task itself dying (a panicking
//! probe) when started through [`ReadinessOrchestrator::start`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendClient, Service};
use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::probe::{HttpProbe, Probe, ProbeOutcome};
use crate::retry::{RetryLoop, RetryOutcome, Satisfied};

/// Terminal message shown when the deadline passes.
pub const TIMEOUT_MESSAGE: &str =
    "Initialization is taking longer than expected. Please try again later.";

/// Terminal message shown when the orchestration task dies.
pub const FAILED_MESSAGE: &str = "An unexpected error occurred during initialization.";

/// One named unit of readiness work.
pub struct ReadinessStage {
    name: String,
    message: String,
    probe: Arc<dyn Probe>,
    satisfied: Arc<Satisfied>,
}

impl ReadinessStage {
    /// Stage satisfied by [`ProbeOutcome::Ready`].
    pub fn new(
        name: impl Into<String>,
        message: impl Into<String>,
        probe: impl Probe + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            probe: Arc::new(probe),
            satisfied: Arc::new(ProbeOutcome::is_ready),
        }
    }

    pub fn with_predicate(
        mut self,
        satisfied: impl Fn(&ProbeOutcome) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.satisfied = Arc::new(satisfied);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Probing { stage_index: usize },
    Ready,
    TimedOut,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Ready,
    TimedOut,
    Failed,
}

/// Read-only snapshot of the orchestration.
#[derive(Debug, Clone)]
pub struct OrchestrationState {
    pub phase: Phase,
    /// Human-readable status of the current stage, or the terminal message.
    pub message: String,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl OrchestrationState {
    fn not_started() -> Self {
        Self {
            phase: Phase::NotStarted,
            message: String::new(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self.phase {
            Phase::NotStarted | Phase::Probing { .. } => Outcome::Pending,
            Phase::Ready => Outcome::Ready,
            Phase::TimedOut => Outcome::TimedOut,
            Phase::Failed => Outcome::Failed,
        }
    }

    pub fn stage_index(&self) -> Option<usize> {
        match self.phase {
            Phase::Probing { stage_index } => Some(stage_index),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome() != Outcome::Pending
    }

    /// Time since the run started; frozen once a terminal state is reached.
    pub fn elapsed(&self) -> Duration {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end - start,
            (Some(start), None) => Instant::now() - start,
            _ => Duration::ZERO,
        }
    }

    /// The single user-visible failure message, if the run failed.
    pub fn error(&self) -> Option<&str> {
        match self.phase {
            Phase::TimedOut | Phase::Failed => Some(&self.message),
            _ => None,
        }
    }
}

/// Handle to an ordered readiness run.
///
/// Background work started with [`start`](Self::start) shares the inner
/// state, not the handle, so dropping the handle cancels it.
pub struct ReadinessOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    stages: Vec<ReadinessStage>,
    timeout: Duration,
    retry_delay: Duration,
    state: watch::Sender<OrchestrationState>,
    cancel: CancellationToken,
    run_lock: tokio::sync::Mutex<()>,
}

impl ReadinessOrchestrator {
    pub fn new(stages: Vec<ReadinessStage>, timeout: Duration, retry_delay: Duration) -> Self {
        let (state, _) = watch::channel(OrchestrationState::not_started());
        Self {
            inner: Arc::new(Inner {
                stages,
                timeout,
                retry_delay,
                state,
                cancel: CancellationToken::new(),
                run_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// The standard three-stage bring-up: initialize the central backend,
    /// then wait for the search API, then for the update API.
    pub fn from_config(config: &Config) -> ClientResult<Self> {
        let stages = vec![
            ReadinessStage::new(
                Service::Central.name(),
                "Initializing central backend API...",
                HttpProbe::initialize(BackendClient::for_service(config, Service::Central)?),
            ),
            ReadinessStage::new(
                Service::Search.name(),
                "Initializing search API...",
                HttpProbe::status(BackendClient::for_service(config, Service::Search)?),
            ),
            ReadinessStage::new(
                Service::Updates.name(),
                "Initializing update API...",
                HttpProbe::status(BackendClient::for_service(config, Service::Updates)?),
            ),
        ];
        Ok(Self::new(
            stages,
            config.readiness.timeout(),
            config.readiness.retry_delay(),
        ))
    }

    pub fn snapshot(&self) -> OrchestrationState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OrchestrationState> {
        self.inner.state.subscribe()
    }

    /// Stop in-flight probing. No state transition is published afterwards.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    /// Run the stages to a terminal phase and return it.
    ///
    /// Runs are serialized: a second caller waits for the first and returns
    /// immediately if it reached [`Phase::Ready`]. A run after `TimedOut` or
    /// `Failed` restarts from the first stage with a fresh deadline. After
    /// shutdown the current (frozen) phase is returned.
    pub async fn run(&self) -> Phase {
        self.inner.run().await
    }

    /// Run on a background task.
    ///
    /// The returned handle resolves to the terminal phase, or to the frozen
    /// phase if the orchestrator is shut down or dropped first. If the run
    /// panics the state moves to [`Phase::Failed`] with [`FAILED_MESSAGE`].
    pub fn start(&self) -> JoinHandle<Phase> {
        let runner = self.inner.clone();
        let task = tokio::spawn(async move { runner.run().await });

        let supervisor = self.inner.clone();
        tokio::spawn(async move {
            match task.await {
                Ok(phase) => phase,
                Err(e) => {
                    tracing::error!("readiness task aborted: {}", e);
                    supervisor.finish(Phase::Failed, FAILED_MESSAGE)
                }
            }
        })
    }
}

impl Inner {
    async fn run(&self) -> Phase {
        let _guard = self.run_lock.lock().await;

        if self.cancel.is_cancelled() {
            return self.state.borrow().phase;
        }
        if self.state.borrow().phase == Phase::Ready {
            return Phase::Ready;
        }

        let started_at = Instant::now();
        let deadline = started_at + self.timeout;
        self.publish(|s| {
            *s = OrchestrationState {
                started_at: Some(started_at),
                ..OrchestrationState::not_started()
            };
        });

        for (index, stage) in self.stages.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return self.state.borrow().phase;
            }
            if Instant::now() >= deadline {
                return self.finish(Phase::TimedOut, TIMEOUT_MESSAGE);
            }

            tracing::info!(stage = stage.name(), "{}", stage.message());
            self.publish(|s| {
                s.phase = Phase::Probing { stage_index: index };
                s.message = stage.message.clone();
            });

            let retry = RetryLoop::new(self.retry_delay, deadline);
            match retry
                .run_until(stage.probe.as_ref(), stage.satisfied.as_ref(), &self.cancel)
                .await
            {
                RetryOutcome::Ready { attempts } => {
                    tracing::info!(stage = stage.name(), attempts, "stage ready");
                }
                RetryOutcome::TimedOut { attempts } => {
                    tracing::warn!(stage = stage.name(), attempts, "readiness deadline exceeded");
                    return self.finish(Phase::TimedOut, TIMEOUT_MESSAGE);
                }
                RetryOutcome::Cancelled => {
                    tracing::debug!(stage = stage.name(), "readiness cancelled");
                    return self.state.borrow().phase;
                }
            }
        }

        tracing::info!(
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "all services ready"
        );
        self.finish(Phase::Ready, "Ready")
    }

    fn finish(&self, phase: Phase, message: &str) -> Phase {
        self.publish(|s| {
            s.phase = phase;
            s.message = message.to_string();
            s.finished_at = Some(Instant::now());
        });
        self.state.borrow().phase
    }

    fn publish(&self, update: impl FnOnce(&mut OrchestrationState)) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.state.send_modify(update);
    }
}

impl Drop for ReadinessOrchestrator {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

/// Lazy, memoized readiness check per service.
pub struct ServiceGate {
    probes: HashMap<String, Arc<dyn Probe>>,
    confirmed: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
    budget: Duration,
    retry_delay: Duration,
    cancel: CancellationToken,
}

impl ServiceGate {
    pub fn new(budget: Duration, retry_delay: Duration) -> Self {
        Self {
            probes: HashMap::new(),
            confirmed: Mutex::new(HashMap::new()),
            budget,
            retry_delay,
            cancel: CancellationToken::new(),
        }
    }

    /// Gate over the `GET /status` endpoint of every configured service.
    pub fn from_config(config: &Config) -> ClientResult<Self> {
        let mut gate = Self::new(config.readiness.timeout(), config.readiness.retry_delay());
        for service in Service::ALL {
            gate.register(
                service.name(),
                HttpProbe::status(BackendClient::for_service(config, service)?),
            );
        }
        Ok(gate)
    }

    pub fn register(&mut self, name: impl Into<String>, probe: impl Probe + 'static) {
        self.probes.insert(name.into(), Arc::new(probe));
    }

    pub fn is_confirmed(&self, name: &str) -> bool {
        self.confirmed
            .lock()
            .ok()
            .and_then(|map| map.get(name).map(|cell| cell.initialized()))
            .unwrap_or(false)
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Probe `name` until ready, unless it was already confirmed.
    ///
    /// Concurrent first callers share one probe sequence. A timed-out or
    /// cancelled check is not remembered, so the next caller probes again.
    pub async fn ensure_ready(&self, name: &str) -> ClientResult<()> {
        let probe = self
            .probes
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::Validation(format!("unknown service: {}", name)))?;

        let cell = {
            let mut map = self
                .confirmed
                .lock()
                .map_err(|_| ClientError::Backend("service gate lock poisoned".to_string()))?;
            map.entry(name.to_string()).or_default().clone()
        };

        cell.get_or_try_init(|| async {
            let retry = RetryLoop::with_budget(self.retry_delay, self.budget);
            match retry.run(probe.as_ref(), &self.cancel).await {
                RetryOutcome::Ready { attempts } => {
                    tracing::info!(service = name, attempts, "service confirmed ready");
                    Ok(())
                }
                RetryOutcome::TimedOut { .. } => Err(ClientError::Timeout(self.budget)),
                RetryOutcome::Cancelled => Err(ClientError::Cancelled),
            }
        })
        .await
        .map(|_| ())
    }
}

/// Drive `orchestrator` to a terminal phase, printing each stage message to
/// stderr as it is entered.
///
/// Fails with the terminal message on `TimedOut`/`Failed`, and also when the
/// run ends without reaching a terminal phase (the orchestrator was shut
/// down).
pub async fn wait_ready(orchestrator: &ReadinessOrchestrator) -> anyhow::Result<()> {
    let mut rx = orchestrator.subscribe();
    let mut run = orchestrator.start();

    let mut shown: Option<usize> = None;
    let state = loop {
        let state = rx.borrow_and_update().clone();
        if let Some(index) = state.stage_index() {
            if shown != Some(index) {
                eprintln!("{}", state.message);
                shown = Some(index);
            }
        }
        if state.is_terminal() {
            break state;
        }
        tokio::select! {
            biased;
            changed = rx.changed() => {
                if changed.is_err() {
                    break orchestrator.snapshot();
                }
            }
            _ = &mut run => break orchestrator.snapshot(),
        }
    };

    match state.phase {
        Phase::Ready => Ok(()),
        Phase::TimedOut | Phase::Failed => anyhow::bail!("{}", state.message),
        _ => anyhow::bail!("readiness check was cancelled"),
    }
}

/// CLI entry point for `corectl wait`.
pub async fn run_wait(config: &Config) -> anyhow::Result<()> {
    let orchestrator = ReadinessOrchestrator::from_config(config)?;
    wait_ready(&orchestrator).await?;
    println!(
        "All services ready ({} ms).",
        orchestrator.snapshot().elapsed().as_millis()
    );
    Ok(())
}

/// CLI entry point for `corectl status <service>`.
pub async fn run_status(config: &Config, service: &str) -> anyhow::Result<()> {
    let gate = ServiceGate::from_config(config)?;
    match gate.ensure_ready(service).await {
        Ok(()) => {
            println!("{}: ready", service);
            Ok(())
        }
        Err(ClientError::Timeout(budget)) => {
            anyhow::bail!("{}: not ready after {}s", service, budget.as_secs())
        }
        Err(e) => Err(e.into()),
    }
}
