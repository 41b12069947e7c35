//! App lifecycle and reachability signals delivered to the sync manager.

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use clientfolio_core::sync::SYNC_LIFECYCLE_CHANNEL_CAPACITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event", content = "reachable")]
pub enum LifecycleEvent {
    /// The app came to the foreground.
    Foreground,
    /// The app moved to the background; periodic refresh stops.
    Background,
    /// The platform reported a network reachability change.
    ReachabilityChanged(bool),
    /// The remote account became available. Published by the manager itself.
    AccountAvailable,
}

/// Broadcast channel carrying [`LifecycleEvent`]s from the host to subscribers.
#[derive(Debug, Clone)]
pub struct LifecycleBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SYNC_LIFECYCLE_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publishes `event`; returns how many subscribers will see it.
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("[Sync] Dropped {:?}: no lifecycle subscribers", event);
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LifecycleBus {
    fn default() -> Self {
        Self::new()
    }
}
