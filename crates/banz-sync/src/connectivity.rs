//! # Connectivity
//!
//! Decides whether workflows take the online path or the local queue.
//!
//! ```text
//! mode = offline ──► always false
//! mode = online  ──► always true (remote errors surface to the caller)
//! mode = auto    ──► remote.is_available()
//! ```
//!
//! Every probe publishes its result on a watch channel so the
//! reconciliation agent can react to offline → online transitions.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::config::ConnectivityMode;
use crate::remote::RemoteStore;

#[derive(Clone)]
pub struct Connectivity {
    mode: ConnectivityMode,
    remote: Arc<dyn RemoteStore>,
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(mode: ConnectivityMode, remote: Arc<dyn RemoteStore>) -> Self {
        let initial = !matches!(mode, ConnectivityMode::Offline);
        let (tx, _rx) = watch::channel(initial);
        Connectivity {
            mode,
            remote,
            tx: Arc::new(tx),
        }
    }

    pub fn mode(&self) -> ConnectivityMode {
        self.mode
    }

    /// Probes the remote store according to the mode.
    pub async fn is_online(&self) -> bool {
        let online = match self.mode {
            ConnectivityMode::Offline => false,
            ConnectivityMode::Online => true,
            ConnectivityMode::Auto => self.remote.is_available().await,
        };

        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity changed");
        }

        online
    }

    /// Receives the result of every probe that changed the state.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;

    #[tokio::test]
    async fn test_modes() {
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.set_available(false);

        let offline = Connectivity::new(ConnectivityMode::Offline, remote.clone());
        let online = Connectivity::new(ConnectivityMode::Online, remote.clone());
        let auto = Connectivity::new(ConnectivityMode::Auto, remote.clone());

        assert!(!offline.is_online().await);
        assert!(online.is_online().await);
        assert!(!auto.is_online().await);

        remote.set_available(true);
        assert!(auto.is_online().await);
    }

    #[tokio::test]
    async fn test_transitions_are_published() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let connectivity = Connectivity::new(ConnectivityMode::Auto, remote.clone());
        let mut rx = connectivity.subscribe();

        remote.set_available(false);
        connectivity.is_online().await;
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());

        // Same state again: nothing new
        connectivity.is_online().await;
        assert!(!rx.has_changed().unwrap());

        remote.set_available(true);
        connectivity.is_online().await;
        assert!(*rx.borrow_and_update());
    }
}
