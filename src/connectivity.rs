use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::remote::RemoteClient;

/// The single "reachable" signal. Clones share the same channel.
#[derive(Clone, Debug)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(reachable: bool) -> Self {
        let (tx, _rx) = watch::channel(reachable);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_reachable(&self) -> bool {
        *self.tx.borrow()
    }

    /// Records a connectivity event. Repeating the current value is not a transition.
    pub fn set_reachable(&self, reachable: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == reachable {
                return false;
            }
            *current = reachable;
            true
        });

        if changed {
            if reachable {
                info!("connectivity: remote became reachable");
            } else {
                warn!("connectivity: remote became unreachable");
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Polls the remote service and feeds the result into `connectivity`.
pub fn spawn_probe(
    connectivity: Connectivity,
    remote: Arc<dyn RemoteClient>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let reachable = match crate::remote::bounded(interval, remote.ping()).await {
                Ok(()) => true,
                Err(e) => {
                    debug!("connectivity probe failed: {}", e);
                    false
                }
            };
            connectivity.set_reachable(reachable);
        }
    })
}
