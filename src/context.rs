//! Deadline and cancellation context for store calls.
//!
//! Every Ledger Store call receives an [`OpContext`]. The context carries an
//! optional deadline and a [`CancelSignal`]; [`OpContext::run`] bounds a
//! future by both and reports which one fired as a [`StoreError`].
//!
//! Cancellation is backed by a `tokio::sync::watch` channel: the caller keeps
//! the [`Canceller`], the context carries the receiving side.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::StoreError;

/// Caller-held handle that cancels every context derived from its signal.
#[derive(Debug)]
pub struct Canceller(watch::Sender<bool>);

impl Canceller {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Receiving side of a cancellation channel.
///
/// A signal created with [`CancelSignal::never`] can never fire. Dropping the
/// [`Canceller`] without cancelling leaves the signal un-fired forever.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Option<watch::Receiver<bool>>);

impl CancelSignal {
    pub fn pair() -> (Canceller, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Canceller(tx), CancelSignal(Some(rx)))
    }

    pub fn never() -> Self {
        CancelSignal(None)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the signal fires.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.0 else {
            return std::future::pending().await;
        };

        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Canceller dropped without firing
                return std::future::pending().await;
            }
        }
    }
}

/// Deadline-bounded, cancellable context passed to every store call.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    deadline: Option<Instant>,
    cancel: CancelSignal,
}

impl OpContext {
    /// Context with no deadline that cannot be cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Tighten the deadline. A later deadline than the current one is ignored.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Derive a context for one attempt: same cancellation, deadline bounded by `timeout`.
    pub fn child(&self, timeout: Duration) -> Self {
        self.clone().with_timeout(timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `fut` bounded by this context.
    ///
    /// # Errors
    ///
    /// - `StoreError::Cancelled` if the signal fires first (or already fired)
    /// - `StoreError::DeadlineExceeded` if the deadline passes first
    /// - whatever `fut` returns otherwise
    ///
    /// A future that loses the race is dropped, which rolls back any open
    /// database transaction it held.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        if self.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StoreError::Cancelled),
            _ = expired => Err(StoreError::DeadlineExceeded),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_returns_future_result() {
        let ctx = OpContext::background().with_timeout(Duration::from_secs(5));
        let value = ctx.run(async { Ok::<_, StoreError>(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn run_reports_deadline() {
        let ctx = OpContext::background().with_timeout(Duration::from_millis(10));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, StoreError>(())
            })
            .await;
        assert!(matches!(result, Err(StoreError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn run_refuses_to_start_after_cancel() {
        let (canceller, signal) = CancelSignal::pair();
        canceller.cancel();

        let ctx = OpContext::background().with_cancel(signal);
        let result = ctx.run(async { Ok::<_, StoreError>(()) }).await;
        assert!(matches!(result, Err(StoreError::Cancelled)));
    }

    #[tokio::test]
    async fn run_observes_cancel_mid_flight() {
        let (canceller, signal) = CancelSignal::pair();
        let ctx = OpContext::background().with_cancel(signal);

        let handle = tokio::spawn(async move {
            ctx.run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, StoreError>(())
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(StoreError::Cancelled)));
    }

    #[test]
    fn child_never_extends_parent_deadline() {
        let parent_deadline = Instant::now() + Duration::from_millis(100);
        let parent = OpContext::background().with_deadline(parent_deadline);

        let child = parent.child(Duration::from_secs(30));
        assert_eq!(child.deadline(), Some(parent_deadline));
    }

    #[test]
    fn dropped_canceller_never_fires() {
        let (canceller, signal) = CancelSignal::pair();
        drop(canceller);
        assert!(!signal.is_cancelled());
        assert!(!CancelSignal::never().is_cancelled());
    }
}
