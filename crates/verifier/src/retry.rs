//! Bounded retry with a fixed interval.
//!
//! [`RetryPolicy::run`] is the single polling loop of the engine: workload
//! readiness, identifier discovery, log correlation and convergence all go
//! through it.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use meshprobe_core::config::VerifierConfig;

use crate::error::VerifierError;

/// Outcome of one attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    /// Stop polling with this value.
    Done(T),
    /// Not there yet; the reason is kept for the final error.
    Retry(String),
}

/// Retry budget and interval.
///
/// A budget of `B` allows `B + 1` attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    budget: u32,
    interval: Duration,
}

impl RetryPolicy {
    pub fn new(budget: u32, interval: Duration) -> Self {
        Self { budget, interval }
    }

    pub fn from_config(config: &VerifierConfig) -> Self {
        Self::new(
            config.retry_budget,
            Duration::from_millis(config.retry_interval_ms),
        )
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.budget.saturating_add(1)
    }

    /// Runs `work` until it returns [`Attempt::Done`], an error, or the budget
    /// runs out.
    ///
    /// `work` receives the zero-based attempt number. Errors returned by
    /// `work` end the loop immediately. Cancellation is observed before each
    /// attempt, while an attempt is in flight and during the sleep between
    /// attempts.
    ///
    /// # Errors
    ///
    /// - `VerifierError::BudgetExceeded` when every attempt returned `Retry`
    /// - `VerifierError::Cancelled` when `cancel` fires
    /// - any error produced by `work`
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut work: F,
    ) -> Result<T, VerifierError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Attempt<T>, VerifierError>>,
    {
        let mut last_reason = String::from("no attempt completed");

        for attempt in 0..self.max_attempts() {
            if attempt > 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(VerifierError::Cancelled),
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
            if cancel.is_cancelled() {
                return Err(VerifierError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(VerifierError::Cancelled),
                outcome = work(attempt) => outcome?,
            };

            match outcome {
                Attempt::Done(value) => return Ok(value),
                Attempt::Retry(reason) => {
                    debug!(operation, attempt, reason = %reason, "attempt did not succeed");
                    last_reason = reason;
                }
            }
        }

        Err(VerifierError::BudgetExceeded {
            operation: operation.to_owned(),
            attempts: self.max_attempts(),
            last_reason,
        })
    }
}
