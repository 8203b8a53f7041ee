//! Bounded retry for transient storage failures.
//!
//! A [`RetryPolicy`] replays a whole operation when it fails with one of the
//! declared [`TransientClass`]es, waiting a fixed delay between attempts.
//! Any other error is returned immediately. After the last attempt the final
//! transient error is wrapped in [`LedgerError::RetriesExhausted`].
//!
//! The policy never starts an attempt, and never finishes a delay, once the
//! caller's [`CancelSignal`] has fired.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::context::CancelSignal;
use crate::error::{LedgerError, Operation, TransientClass};

const DEFAULT_MAX_ATTEMPTS: u32 = 2;
const DEFAULT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    retry_on: Vec<TransientClass>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_DELAY)
    }
}

impl RetryPolicy {
    /// Retry deadline and deadlock failures, `max_attempts` attempts in total (at least one).
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            retry_on: vec![
                TransientClass::DeadlineExceeded,
                TransientClass::DeadlockDetected,
            ],
        }
    }

    /// Single attempt, no retries.
    pub fn never() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Restrict which transient classes are replayed.
    pub fn retry_on(mut self, classes: &[TransientClass]) -> Self {
        self.retry_on = classes.to_vec();
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn should_retry(&self, err: &LedgerError) -> bool {
        err.transient_class()
            .is_some_and(|class| self.retry_on.contains(&class))
    }

    /// Run `attempt` until it succeeds, fails terminally, or the budget is spent.
    ///
    /// `attempt` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(
        &self,
        operation: Operation,
        cancel: &CancelSignal,
        mut attempt: F,
    ) -> Result<T, LedgerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut number = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(LedgerError::Cancelled { operation });
            }

            let err = match attempt(number).await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err) => err,
                Err(err) => return Err(err),
            };

            if number >= self.max_attempts {
                return Err(LedgerError::RetriesExhausted {
                    operation,
                    attempts: number,
                    last: Box::new(err),
                });
            }

            warn!(
                %operation,
                attempt = number,
                error = %err,
                retry_in_ms = self.delay.as_millis() as u64,
                "Transient failure, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => return Err(LedgerError::Cancelled { operation }),
            }

            number += 1;
        }
    }
}
