//! Connectivity tracking.
//!
//! `NetworkObserver` is fed by whatever platform signal is available (OS
//! reachability callbacks, a health probe, or a test calling `set_online`)
//! and fans state changes out to subscribers over a `watch` channel.

use crate::transport::Transport;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Snapshot of connectivity state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkStatus {
    pub is_online: bool,
    pub last_checked_at: DateTime<Utc>,
}

/// Tracks online/offline transitions.
#[derive(Clone)]
pub struct NetworkObserver {
    tx: Arc<watch::Sender<NetworkStatus>>,
}

impl NetworkObserver {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(NetworkStatus {
            is_online: initially_online,
            last_checked_at: Utc::now(),
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        self.tx.borrow().is_online
    }

    pub fn status(&self) -> NetworkStatus {
        *self.tx.borrow()
    }

    /// Records a connectivity observation. Subscribers are only woken on an
    /// actual transition. Returns true if the state changed.
    pub fn set_online(&self, online: bool) -> bool {
        let now = Utc::now();
        let changed = self.tx.send_if_modified(|status| {
            status.last_checked_at = now;
            if status.is_online == online {
                return false;
            }
            status.is_online = online;
            true
        });
        if changed {
            info!("network is now {}", if online { "online" } else { "offline" });
        }
        changed
    }

    /// Subscribes to transitions. Dropping the subscription unsubscribes.
    pub fn subscribe(&self) -> NetworkSubscription {
        NetworkSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Periodically probes `path` through `transport` and feeds the result
    /// into this observer.
    pub fn spawn_probe(
        &self,
        transport: Arc<dyn Transport>,
        path: String,
        every: Duration,
    ) -> JoinHandle<()> {
        let observer = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let online = transport.probe(&path).await;
                debug!("probe {path}: online={online}");
                observer.set_online(online);
            }
        })
    }
}

impl Default for NetworkObserver {
    fn default() -> Self {
        Self::new(true)
    }
}

/// A live subscription to connectivity changes.
pub struct NetworkSubscription {
    rx: watch::Receiver<NetworkStatus>,
}

impl NetworkSubscription {
    pub fn current(&self) -> NetworkStatus {
        *self.rx.borrow()
    }

    /// Waits for the next transition. Returns `None` once the observer is gone.
    pub async fn changed(&mut self) -> Option<NetworkStatus> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}
