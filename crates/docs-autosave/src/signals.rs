//! Host environment exit signals.
//!
//! Navigation-start and unload are modeled as an injected subscription
//! source instead of global hooks, so the coordinator can be driven from
//! tests or a non-browser host.

use tokio::sync::broadcast;

const SIGNAL_CHANNEL_CAPACITY: usize = 32;

/// A signal that the current view is about to go away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSignal {
    /// An in-app route change is about to start.
    NavigationStart { to: String },
    /// The page or process is about to be discarded.
    Unload,
}

/// Source of host signals.
pub trait SignalSource {
    /// Subscribe to host signals. Dropping the receiver unsubscribes.
    fn subscribe_signals(&self) -> broadcast::Receiver<HostSignal>;
}

/// Broadcast hub the host fires signals into.
#[derive(Debug, Clone)]
pub struct HostSignals {
    sender: broadcast::Sender<HostSignal>,
}

impl Default for HostSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSignals {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Fire a navigation-start signal. Returns how many listeners received it.
    pub fn navigate(&self, to: impl Into<String>) -> usize {
        self.fire(HostSignal::NavigationStart { to: to.into() })
    }

    /// Fire an unload signal. Returns how many listeners received it.
    pub fn unload(&self) -> usize {
        self.fire(HostSignal::Unload)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn fire(&self, signal: HostSignal) -> usize {
        tracing::trace!(?signal, "host signal");
        self.sender.send(signal).unwrap_or(0)
    }
}

impl SignalSource for HostSignals {
    fn subscribe_signals(&self) -> broadcast::Receiver<HostSignal> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_without_listeners_is_not_an_error() {
        let signals = HostSignals::new();
        assert_eq!(signals.unload(), 0);
    }

    #[test]
    fn test_listeners_receive_signals_in_order() {
        let signals = HostSignals::new();
        let mut rx = signals.subscribe_signals();

        assert_eq!(signals.navigate("/docs/42"), 1);
        assert_eq!(signals.unload(), 1);

        assert_eq!(
            rx.try_recv().unwrap(),
            HostSignal::NavigationStart {
                to: "/docs/42".into()
            }
        );
        assert_eq!(rx.try_recv().unwrap(), HostSignal::Unload);
    }
}
