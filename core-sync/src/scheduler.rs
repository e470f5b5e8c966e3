//! Periodic background syncs.

use crate::coordinator::SyncCoordinator;
use core_async::sync::CancellationToken;
use core_async::task::JoinHandle;
use core_async::time::{interval, MissedTickBehavior};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

struct Ticker {
    token: CancellationToken,
    handle: JoinHandle<()>,
    period: Duration,
}

/// Calls [`SyncCoordinator::start_sync`] on a fixed period. A tick that
/// lands while a sync is still running does nothing.
pub struct AutoSyncScheduler {
    coordinator: SyncCoordinator,
    ticker: Mutex<Option<Ticker>>,
}

impl AutoSyncScheduler {
    pub fn new(coordinator: SyncCoordinator) -> Self {
        Self {
            coordinator,
            ticker: Mutex::new(None),
        }
    }

    /// Replace the schedule. `None` disables automatic syncs. The first sync
    /// fires one full period after scheduling.
    pub fn reschedule(&self, period: Option<Duration>) {
        let mut slot = self.ticker.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.take() {
            previous.token.cancel();
            previous.handle.abort();
        }

        let Some(period) = period.filter(|p| !p.is_zero()) else {
            info!("Automatic sync disabled");
            return;
        };

        let token = CancellationToken::new();
        let coordinator = self.coordinator.clone();
        let cancelled = token.clone();
        let handle = core_async::task::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            ticker.tick().await;

            while cancelled.run_until_cancelled(ticker.tick()).await.is_some() {
                if coordinator.start_sync() {
                    debug!("Automatic sync started");
                } else {
                    debug!("Automatic sync skipped, a sync is already running");
                }
            }
        });

        info!(period_secs = period.as_secs_f64(), "Automatic sync scheduled");
        *slot = Some(Ticker {
            token,
            handle,
            period,
        });
    }

    /// Current period, if automatic syncs are enabled
    pub fn period(&self) -> Option<Duration> {
        self.ticker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|ticker| ticker.period)
    }
}

impl Drop for AutoSyncScheduler {
    fn drop(&mut self) {
        let slot = self.ticker.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(ticker) = slot.take() {
            ticker.token.cancel();
            ticker.handle.abort();
        }
    }
}
