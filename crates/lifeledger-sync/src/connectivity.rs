//! Connectivity monitoring
//!
//! A watch channel carrying the current online/offline state. Platform
//! integrations (or tests) drive `set_online`; the sync engine awaits
//! transitions and flushes pending work on reconnect. Redundant updates
//! with the same state are suppressed so subscribers only wake on real
//! transitions.

use tokio::sync::watch;

pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Start the monitor in the given state
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        Self { tx }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Report a connectivity change
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|state| {
            if *state != online {
                *state = online;
                true
            } else {
                false
            }
        });
        if changed {
            log::info!(
                "Connectivity changed: {}",
                if online { "online" } else { "offline" }
            );
        }
    }

    /// Subscribe to connectivity transitions
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    /// Offline until told otherwise; a cold start must not push
    fn default() -> Self {
        Self::new(false)
    }
}
