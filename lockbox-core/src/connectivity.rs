//! Connectivity mode tracking and the background ping watcher.

use crate::rpc::VaultClient;
use crate::VaultError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// How the session currently talks to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityMode {
    Online,
    Offline,
    /// Not logged in
    Disabled,
}

impl fmt::Display for ConnectivityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectivityMode::Online => "online",
            ConnectivityMode::Offline => "offline",
            ConnectivityMode::Disabled => "disabled",
        })
    }
}

/// Shared, observable connectivity mode
#[derive(Clone)]
pub struct ModeTracker {
    tx: Arc<watch::Sender<ConnectivityMode>>,
}

impl Default for ModeTracker {
    fn default() -> Self {
        Self::new(ConnectivityMode::Disabled)
    }
}

impl ModeTracker {
    pub fn new(initial: ConnectivityMode) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> ConnectivityMode {
        *self.tx.borrow()
    }

    /// Switch mode. Returns false (and does nothing) if already in `mode`.
    pub fn set(&self, mode: ConnectivityMode) -> bool {
        let mut previous = mode;
        let changed = self.tx.send_if_modified(|current| {
            if *current == mode {
                return false;
            }
            previous = *current;
            *current = mode;
            true
        });
        if changed {
            info!("Connectivity mode: {} -> {}", previous, mode);
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityMode> {
        self.tx.subscribe()
    }
}

/// Handle to a running watcher
pub struct WatcherHandle {
    stop: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl WatcherHandle {
    /// Signal the watcher and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = (&mut self.join).await;
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        if self.stop.is_some() {
            self.join.abort();
        }
    }
}

/// Ping the server every `interval`, flipping Online/Offline.
///
/// Never touches vault data. Ticks are skipped while the mode is Disabled.
pub fn spawn_connectivity_watcher(
    client: VaultClient,
    tracker: ModeTracker,
    interval: Duration,
) -> WatcherHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    if tracker.get() == ConnectivityMode::Disabled {
                        continue;
                    }
                    let mode = match client.ping().await {
                        Ok(()) => ConnectivityMode::Online,
                        Err(VaultError::Unavailable(reason)) => {
                            debug!("Ping failed: {}", reason);
                            ConnectivityMode::Offline
                        }
                        // Any other answer means the server is reachable.
                        Err(_) => ConnectivityMode::Online,
                    };
                    tracker.set(mode);
                }
            }
        }
        debug!("Connectivity watcher stopped");
    });

    WatcherHandle {
        stop: Some(stop_tx),
        join,
    }
}
