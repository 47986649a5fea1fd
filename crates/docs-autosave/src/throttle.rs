//! Post-save follow-up work, throttled per document.
//!
//! Saves can be frequent while downstream work (queueing a search re-index,
//! notifying watchers) only needs to run once in a while. A [`Throttle`]
//! lets the first request in a window through and skips the rest.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::store::SaveReceipt;

/// Leading-edge throttle keyed by string.
#[derive(Debug)]
pub struct Throttle {
    window: Duration,
    held_until: Mutex<HashMap<String, Instant>>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            held_until: Mutex::new(HashMap::new()),
        }
    }

    /// Take the throttle for `key`.
    ///
    /// Returns `true` if no acquisition for `key` happened within the last
    /// window, and starts a new window.
    pub fn try_acquire(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut held = self
            .held_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.retain(|_, until| *until > now);

        if held.contains_key(key) {
            return false;
        }
        held.insert(key.to_string(), now + self.window);
        true
    }
}

/// Work to run after a save has been acknowledged by the store.
///
/// Hooks run on the coordinator's event loop, or on the save task when the
/// loop has already stopped, and must not block.
pub trait SaveHook: Send + Sync {
    fn after_save(&self, receipt: &SaveReceipt);
}

/// Forwards to `H` at most once per window per document.
#[derive(Debug)]
pub struct ThrottledHook<H> {
    inner: H,
    throttle: Throttle,
}

impl<H: SaveHook> ThrottledHook<H> {
    pub fn new(inner: H, window: Duration) -> Self {
        Self {
            inner,
            throttle: Throttle::new(window),
        }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H: SaveHook> SaveHook for ThrottledHook<H> {
    fn after_save(&self, receipt: &SaveReceipt) {
        if self.throttle.try_acquire(receipt.handle.as_str()) {
            tracing::debug!(handle = %receipt.handle, "running post-save hook");
            self.inner.after_save(receipt);
        } else {
            tracing::debug!(handle = %receipt.handle, "post-save hook throttled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::DocumentHandle;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl SaveHook for Counter {
        fn after_save(&self, _receipt: &SaveReceipt) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn receipt(id: &str) -> SaveReceipt {
        SaveReceipt::new(DocumentHandle::new(id).unwrap(), 1, b"body")
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_window() {
        let throttle = Throttle::new(Duration::from_secs(1));
        assert!(throttle.try_acquire("a"));
        assert!(!throttle.try_acquire("a"));
        assert!(throttle.try_acquire("b"));

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert!(throttle.try_acquire("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_hook_runs_once_per_window() {
        let hook = ThrottledHook::new(Counter::default(), Duration::from_secs(5));

        hook.after_save(&receipt("doc-1"));
        hook.after_save(&receipt("doc-1"));
        hook.after_save(&receipt("doc-2"));
        assert_eq!(hook.inner().0.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(6)).await;
        hook.after_save(&receipt("doc-1"));
        assert_eq!(hook.inner().0.load(Ordering::SeqCst), 3);
    }
}
