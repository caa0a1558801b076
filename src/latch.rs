//! Countdown latch for batches of in-flight registry calls.
//!
//! One shared [`PendingBatch`] gates each batch of asynchronous fetches:
//! author-level queries and record-level detail lookups both use it.
//! Every issued call arrives exactly once, whatever its outcome; work
//! discovered mid-batch (extra lookups, retries promoted to fresh calls)
//! registers with [`PendingBatch::add`] before the counter can reach
//! zero. Reaching exactly zero is the sole trigger condition.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared pending-work counter for one batch of asynchronous calls.
///
/// Cloning yields another handle to the same batch.
#[derive(Clone)]
pub struct PendingBatch {
    inner: Arc<Inner>,
}

struct Inner {
    pending: AtomicI64,
    notify: Notify,
}

impl PendingBatch {
    /// Create a batch with `n` outstanding calls.
    pub fn new(n: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: AtomicI64::new(n as i64),
                notify: Notify::new(),
            }),
        }
    }

    /// Register `n` additional pending calls.
    ///
    /// Must happen before the calls are issued, so the counter cannot
    /// touch zero while the new work is still unaccounted for.
    pub fn add(&self, n: usize) {
        self.inner.pending.fetch_add(n as i64, Ordering::SeqCst);
    }

    /// Record the completion of exactly one call.
    ///
    /// Success, degraded failure and terminal not-found all arrive once.
    /// A retried attempt must NOT arrive; only the retry's own eventual
    /// outcome does. Calling this more times than calls were registered
    /// is a caller bug: the counter would skip past zero and the batch
    /// would never settle.
    pub fn arrive(&self) {
        let prev = self.inner.pending.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "PendingBatch::arrive without matching registration");
        if prev == 1 {
            self.inner.notify.notify_waiters();
        }
    }

    /// Current number of outstanding calls.
    pub fn pending(&self) -> i64 {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Whether the batch has fully settled.
    pub fn is_settled(&self) -> bool {
        self.pending() == 0
    }

    /// Wait until every registered call has arrived.
    pub async fn settled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_settled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_settles_after_n_arrivals() {
        let batch = PendingBatch::new(5);
        for _ in 0..5 {
            let b = batch.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                b.arrive();
            });
        }
        batch.settled().await;
        assert_eq!(batch.pending(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_is_settled() {
        let batch = PendingBatch::new(0);
        batch.settled().await;
        assert!(batch.is_settled());
    }

    #[tokio::test]
    async fn test_does_not_settle_early() {
        let batch = PendingBatch::new(2);
        batch.arrive();
        let waited =
            tokio::time::timeout(Duration::from_millis(20), batch.settled()).await;
        assert!(waited.is_err(), "settled with one call still pending");
        batch.arrive();
        batch.settled().await;
    }

    #[tokio::test]
    async fn test_mid_batch_additions_extend_the_wait() {
        // A retry issued mid-batch registers a fresh pending unit; the
        // batch must wait for it too.
        let batch = PendingBatch::new(1);
        batch.add(1);
        batch.arrive();
        assert!(!batch.is_settled());
        batch.arrive();
        batch.settled().await;
        assert!(batch.is_settled());
    }
}
