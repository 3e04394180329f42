//! Process-wide shutdown signaling.
//!
//! A `ShutdownSignal` is a one-way latch: the first `trigger` wins, stores
//! the triggering reason, and wakes every task parked in `wait`. Cloning is
//! cheap; all clones observe the same latch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;

struct Inner {
    fired: AtomicBool,
    reason: Mutex<Option<String>>,
    notify: broadcast::Sender<()>,
}

/// One-way process shutdown signal carrying the triggering reason.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(Inner {
                fired: AtomicBool::new(false),
                reason: Mutex::new(None),
                notify,
            }),
        }
    }

    /// Fire the signal. Only the first call records its reason; later calls
    /// are no-ops.
    pub fn trigger(&self, reason: impl Into<String>) {
        if self.inner.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let reason = reason.into();
        info!("Shutdown requested: {}", reason);
        *self.inner.reason.lock() = Some(reason);
        // No receivers is fine - wait() checks the flag first
        let _ = self.inner.notify.send(());
    }

    /// Whether the signal has fired.
    pub fn is_triggered(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// The reason recorded by the first `trigger`, if any.
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.lock().clone()
    }

    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn wait(&self) {
        if self.inner.fired.load(Ordering::SeqCst) {
            return;
        }
        let mut rx = self.inner.notify.subscribe();
        // Re-check after subscribing: trigger stores the flag before sending,
        // so a racing trigger is visible here even if its send preceded the
        // subscription.
        if self.inner.fired.load(Ordering::SeqCst) {
            return;
        }
        let _ = rx.recv().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_waiter() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.trigger("test");

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(signal.is_triggered());
        assert_eq!(signal.reason().as_deref(), Some("test"));
    }

    #[tokio::test]
    async fn test_wait_after_trigger_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.trigger("first");
        signal.wait().await;
    }

    #[tokio::test]
    async fn test_first_reason_wins() {
        let signal = ShutdownSignal::new();
        signal.trigger("first");
        signal.trigger("second");
        assert_eq!(signal.reason().as_deref(), Some("first"));
    }
}
