//! Cooperative cancellation signal

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cancellation token shared between a scheduler and a running unit of work.
///
/// Cancelling sets a flag and wakes every `cancelled().await` waiter. It does
/// not forcibly stop non-cooperative work: the owning scheduler settles the
/// task's handle and frees its concurrency slot regardless of whether the
/// underlying work observed the signal.
///
/// Clones share the same signal.
///
/// # Example
///
/// ```ignore
/// tokio::select! {
///     result = do_work() => { /* ... */ }
///     _ = token.cancelled() => {
///         return Err(anyhow::anyhow!("cancelled"));
///     }
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Create a fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation and wake all waiters.
    ///
    /// Idempotent: repeat calls have no further effect.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation is requested.
    ///
    /// Usable in `select!` to race real work against cancellation.
    pub async fn cancelled(&self) {
        // Register the waiter before re-checking the flag so a concurrent
        // cancel() between the check and the await cannot be missed.
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
