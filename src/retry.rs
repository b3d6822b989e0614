//! Bounded retry-with-delay around a [`Probe`].
//!
//! The loop keeps probing until the outcome satisfies the caller's predicate,
//! the absolute deadline passes, or the cancellation token fires. Errors and
//! not-ready outcomes are treated the same way for control flow: log, wait,
//! try again.
//!
//! The deadline is an absolute [`Instant`] rather than a per-loop budget, so a
//! caller sequencing several loops (the readiness orchestrator) hands every
//! stage the same deadline and a late stage simply gets less time.
//!
//! Waiting never blocks the runtime: both the probe call and the inter-attempt
//! delay are raced against the deadline and the cancellation token with
//! `tokio::select!`.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::probe::{Probe, ProbeOutcome};

/// Decides whether a probe outcome completes the loop.
pub type Satisfied = dyn Fn(&ProbeOutcome) -> bool + Send + Sync;

/// Terminal result of a [`RetryLoop`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Ready { attempts: u32 },
    TimedOut { attempts: u32 },
    /// The caller must stop without reporting an error.
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryLoop {
    pub delay: Duration,
    pub deadline: Instant,
}

impl RetryLoop {
    pub fn new(delay: Duration, deadline: Instant) -> Self {
        Self { delay, deadline }
    }

    /// Convenience: a loop whose deadline is `budget` from now.
    pub fn with_budget(delay: Duration, budget: Duration) -> Self {
        Self::new(delay, Instant::now() + budget)
    }

    /// Run until [`ProbeOutcome::Ready`].
    pub async fn run(&self, probe: &dyn Probe, cancel: &CancellationToken) -> RetryOutcome {
        self.run_until(probe, &ProbeOutcome::is_ready, cancel).await
    }

    pub async fn run_until(
        &self,
        probe: &dyn Probe,
        satisfied: &Satisfied,
        cancel: &CancellationToken,
    ) -> RetryOutcome {
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return RetryOutcome::Cancelled;
            }
            if Instant::now() >= self.deadline {
                tracing::debug!(probe = %probe.describe(), attempts, "deadline reached");
                return RetryOutcome::TimedOut { attempts };
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return RetryOutcome::Cancelled,
                _ = tokio::time::sleep_until(self.deadline) => {
                    tracing::debug!(probe = %probe.describe(), attempts, "deadline reached mid-request");
                    return RetryOutcome::TimedOut { attempts: attempts + 1 };
                }
                outcome = probe.probe() => outcome,
            };
            attempts += 1;

            if satisfied(&outcome) {
                tracing::debug!(probe = %probe.describe(), attempts, "probe satisfied");
                return RetryOutcome::Ready { attempts };
            }

            match outcome.into_result() {
                Ok(()) => {
                    tracing::debug!(probe = %probe.describe(), attempt = attempts, "ready but not satisfied")
                }
                Err(e @ ClientError::BackendNotReady(_)) => {
                    tracing::debug!(probe = %probe.describe(), attempt = attempts, "{}", e)
                }
                Err(e) => {
                    tracing::warn!(probe = %probe.describe(), attempt = attempts, "probe failed: {}", e)
                }
            }

            let wake = (Instant::now() + self.delay).min(self.deadline);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return RetryOutcome::Cancelled,
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }
}
