//! Mutable runtime state shared by the manager and its background tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use clientfolio_core::sync::{CycleOutcome, CycleState, SyncErrorKind};

/// Status fields observed by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncIndicators {
    pub is_account_available: bool,
    pub is_network_reachable: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub cycle_state: CycleState,
    pub last_cycle_outcome: Option<CycleOutcome>,
    pub last_error: Option<SyncErrorKind>,
}

impl Default for SyncIndicators {
    fn default() -> Self {
        Self {
            // Unknown until the first probe; writes are attempted live meanwhile.
            is_account_available: false,
            is_network_reachable: true,
            last_sync_at: None,
            cycle_state: CycleState::Idle,
            last_cycle_outcome: None,
            last_error: None,
        }
    }
}

/// Indicators a successful remote call flipped back to true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Restored {
    pub network: bool,
    pub account: bool,
}

#[derive(Debug)]
pub struct SyncRuntimeState {
    /// Held for the duration of a refresh cycle; `try_lock` failure means a
    /// cycle is already in flight.
    pub cycle_mutex: Mutex<()>,
    /// Periodic refresh timer.
    pub background_task: Mutex<Option<JoinHandle<()>>>,
    /// Lifecycle event listener.
    pub listener_task: Mutex<Option<JoinHandle<()>>>,
    indicators: RwLock<SyncIndicators>,
    backgrounded: AtomicBool,
}

impl SyncRuntimeState {
    pub fn new() -> Self {
        Self {
            cycle_mutex: Mutex::new(()),
            background_task: Mutex::new(None),
            listener_task: Mutex::new(None),
            indicators: RwLock::new(SyncIndicators::default()),
            backgrounded: AtomicBool::new(false),
        }
    }

    pub fn indicators(&self) -> RwLockReadGuard<'_, SyncIndicators> {
        self.indicators
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn indicators_mut(&self) -> RwLockWriteGuard<'_, SyncIndicators> {
        self.indicators
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> SyncIndicators {
        self.indicators().clone()
    }

    /// Records a successful remote call.
    pub fn note_remote_success(&self) -> Restored {
        let mut indicators = self.indicators_mut();
        let restored = Restored {
            network: !indicators.is_network_reachable,
            account: !indicators.is_account_available,
        };
        indicators.is_network_reachable = true;
        indicators.is_account_available = true;
        restored
    }

    /// Folds a classified remote failure into the indicators.
    pub fn note_remote_failure(&self, kind: SyncErrorKind) {
        let mut indicators = self.indicators_mut();
        indicators.last_error = Some(kind);
        match kind {
            SyncErrorKind::NetworkUnavailable => indicators.is_network_reachable = false,
            SyncErrorKind::AccountUnavailable => indicators.is_account_available = false,
            _ => {}
        }
    }

    /// Sets reachability and returns the previous value.
    pub fn set_network_reachable(&self, reachable: bool) -> bool {
        let mut indicators = self.indicators_mut();
        std::mem::replace(&mut indicators.is_network_reachable, reachable)
    }

    /// Sets account availability and returns the previous value.
    pub fn set_account_available(&self, available: bool) -> bool {
        let mut indicators = self.indicators_mut();
        std::mem::replace(&mut indicators.is_account_available, available)
    }

    /// Periodic refreshes run while the account is available. Reachability
    /// does not gate them: a completed refresh is what restores it.
    pub fn can_refresh(&self) -> bool {
        self.indicators().is_account_available
    }

    pub fn set_backgrounded(&self, backgrounded: bool) {
        self.backgrounded.store(backgrounded, Ordering::SeqCst);
    }

    pub fn is_backgrounded(&self) -> bool {
        self.backgrounded.load(Ordering::SeqCst)
    }

    pub async fn timer_running(&self) -> bool {
        self.background_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Default for SyncRuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_update_matching_indicator() {
        let runtime = SyncRuntimeState::new();
        assert_eq!(
            runtime.note_remote_success(),
            Restored {
                network: false,
                account: true
            }
        );
        assert!(runtime.can_refresh());

        runtime.note_remote_failure(SyncErrorKind::NetworkUnavailable);
        assert!(!runtime.snapshot().is_network_reachable);
        assert!(runtime.snapshot().is_account_available);
        assert!(runtime.can_refresh());

        assert_eq!(
            runtime.note_remote_success(),
            Restored {
                network: true,
                account: false
            }
        );
        runtime.note_remote_failure(SyncErrorKind::AccountUnavailable);
        let snapshot = runtime.snapshot();
        assert!(snapshot.is_network_reachable);
        assert!(!snapshot.is_account_available);
        assert_eq!(snapshot.last_error, Some(SyncErrorKind::AccountUnavailable));

        runtime.note_remote_failure(SyncErrorKind::Malformed);
        assert!(runtime.snapshot().is_network_reachable);
    }
}
