//! Periodic refresh timer and lifecycle event listener.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::MissedTickBehavior;

use clientfolio_core::sync::{CycleOutcome, FetchAllReport, SyncCycleTrigger};

use crate::manager::SyncManager;
use crate::signals::LifecycleEvent;

impl SyncManager {
    /// Subscribes to the lifecycle bus and, if the remote account is
    /// available, starts the periodic timer and runs the startup refresh.
    ///
    /// Calling `start` again while the listener is alive is a no-op.
    pub async fn start(self: &Arc<Self>) -> Option<FetchAllReport> {
        {
            let mut listener = self.runtime.listener_task.lock().await;
            if listener
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
            {
                return None;
            }
            let receiver = self.bus.subscribe();
            let manager = Arc::clone(self);
            *listener = Some(tokio::spawn(async move {
                manager.listen(receiver).await;
            }));
        }
        info!("[Sync] Sync manager started");

        if !self.refresh_availability().await.is_available() {
            return None;
        }
        self.ensure_timer_started().await;
        Some(self.run_scheduled_cycle(SyncCycleTrigger::Startup).await)
    }

    /// Stops the timer and unsubscribes from the lifecycle bus.
    ///
    /// In-flight cycles run to completion.
    pub async fn shutdown(&self) {
        self.stop_timer().await;
        if let Some(handle) = self.runtime.listener_task.lock().await.take() {
            handle.abort();
        }
        info!("[Sync] Sync manager stopped");
    }

    async fn listen(self: Arc<Self>, mut receiver: broadcast::Receiver<LifecycleEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.handle_lifecycle_event(event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("[Sync] Missed {} lifecycle events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("[Sync] Lifecycle listener exited");
    }

    /// Reacts to one lifecycle event.
    pub async fn handle_lifecycle_event(self: &Arc<Self>, event: LifecycleEvent) {
        debug!("[Sync] Lifecycle event {:?}", event);
        match event {
            LifecycleEvent::Foreground => {
                self.runtime.set_backgrounded(false);
                if !self.refresh_availability().await.is_available() {
                    return;
                }
                self.set_network_reachable(true);
                self.ensure_timer_started().await;
                let manager = Arc::clone(self);
                tokio::spawn(async move {
                    manager
                        .run_scheduled_cycle(SyncCycleTrigger::Foreground)
                        .await;
                });
            }
            LifecycleEvent::Background => {
                self.runtime.set_backgrounded(true);
                self.stop_timer().await;
            }
            LifecycleEvent::ReachabilityChanged(reachable) => {
                self.set_network_reachable(reachable);
            }
            LifecycleEvent::AccountAvailable => {
                if self.runtime.is_backgrounded() {
                    debug!("[Sync] Account available while backgrounded; timer stays off");
                    return;
                }
                self.ensure_timer_started().await;
            }
        }
    }

    /// Starts the periodic timer unless it is already running.
    pub async fn ensure_timer_started(self: &Arc<Self>) {
        let mut guard = self.runtime.background_task.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
            guard.take();
        }

        let period = self.config.sync_interval;
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !manager.runtime.can_refresh() {
                    debug!("[Sync] Periodic refresh skipped: remote not available");
                    continue;
                }
                // Spawned so stopping the timer never cancels a running cycle.
                let cycle = Arc::clone(&manager);
                tokio::spawn(async move {
                    cycle.run_scheduled_cycle(SyncCycleTrigger::Periodic).await;
                });
            }
        });
        *guard = Some(handle);
        info!("[Sync] Periodic refresh every {:?}", period);
    }

    pub async fn stop_timer(&self) {
        if let Some(handle) = self.runtime.background_task.lock().await.take() {
            handle.abort();
            info!("[Sync] Periodic refresh stopped");
        }
    }

    /// Drains queued writes if any can go out, then refreshes.
    ///
    /// When the network was marked unreachable, the refresh doubles as the
    /// probe: once it completes, the queue is drained.
    async fn run_scheduled_cycle(&self, trigger: SyncCycleTrigger) -> FetchAllReport {
        let reachable = self.runtime.indicators().is_network_reachable;
        if reachable && !self.queue.is_empty() {
            self.drain_for(trigger).await;
        }
        let report = self.run_cycle(trigger).await;
        if !reachable
            && report.outcome == Some(CycleOutcome::Completed)
            && !self.queue.is_empty()
        {
            self.drain_for(trigger).await;
        }
        report
    }

    async fn drain_for(&self, trigger: SyncCycleTrigger) {
        let drain = self.retry_pending().await;
        debug!(
            "[Sync] {:?} drain {:?}: replayed={} remaining={}",
            trigger, drain.status, drain.replayed, drain.remaining
        );
    }
}
