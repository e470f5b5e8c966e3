//! # Sync Context
//!
//! Shared state of one sync run: lifecycle status, cancellation, retry and
//! error flags, accumulated statistics and the newest sync-time watermark.
//!
//! ## State Machine
//!
//! ```text
//! Idle → Running → Completed
//!           ├────→ Canceled
//!           └────→ Failed
//! ```
//!
//! `cancel()` may be called from any thread. It flips the token so the worker
//! sees it at its next poll point, and fires the registered [`CancelTrigger`]
//! so a blocked remote read is released right away.

use crate::{Result, SyncError};
use bridge_traits::CancelTrigger;
use core_async::sync::CancellationToken;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Running,
    Completed,
    Canceled,
    Failed,
}

impl SyncStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::Completed | SyncStatus::Canceled | SyncStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Canceled => "canceled",
            SyncStatus::Failed => "failed",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(SyncStatus::Idle),
            "running" => Ok(SyncStatus::Running),
            "completed" => Ok(SyncStatus::Completed),
            "canceled" => Ok(SyncStatus::Canceled),
            "failed" => Ok(SyncStatus::Failed),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rows written by a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

impl SyncStats {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl AddAssign for SyncStats {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
        self.deleted += rhs.deleted;
    }
}

/// Shared state for one sync run
pub struct SyncContext {
    status: Mutex<SyncStatus>,
    token: CancellationToken,
    trigger: Mutex<Option<Arc<dyn CancelTrigger>>>,
    network_error: AtomicBool,
    failed: AtomicBool,
    tries: AtomicU32,
    inserted: AtomicU64,
    updated: AtomicU64,
    deleted: AtomicU64,
    newest_sync_time: AtomicI64,
    progress_index: AtomicU64,
    progress_count: AtomicU64,
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncContext {
    pub fn new() -> Self {
        Self {
            status: Mutex::new(SyncStatus::Idle),
            token: CancellationToken::new(),
            trigger: Mutex::new(None),
            network_error: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            tries: AtomicU32::new(0),
            inserted: AtomicU64::new(0),
            updated: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
            newest_sync_time: AtomicI64::new(0),
            progress_index: AtomicU64::new(0),
            progress_count: AtomicU64::new(0),
        }
    }

    fn lock_status(&self) -> MutexGuard<'_, SyncStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> SyncStatus {
        *self.lock_status()
    }

    /// Move from `Idle` to `Running`.
    pub fn start(&self) -> Result<()> {
        let mut status = self.lock_status();
        validate_transition(*status, SyncStatus::Running)?;
        *status = SyncStatus::Running;
        Ok(())
    }

    /// Settle the run into its terminal state, derived from the flags.
    pub fn finish(&self) -> Result<SyncStatus> {
        let to = if self.is_canceled() {
            SyncStatus::Canceled
        } else if self.has_error() {
            SyncStatus::Failed
        } else {
            SyncStatus::Completed
        };

        let mut status = self.lock_status();
        validate_transition(*status, to)?;
        *status = to;
        Ok(to)
    }

    /// Request cooperative cancellation and release any blocked remote read.
    pub fn cancel(&self) {
        self.token.cancel();
        let trigger = self
            .trigger
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(trigger) = trigger {
            trigger.on_cancel();
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Register the trigger for the remote reads about to run. If the run was
    /// already canceled the trigger fires immediately.
    pub fn set_trigger(&self, trigger: Option<Arc<dyn CancelTrigger>>) {
        let fire = {
            let mut slot = self.trigger.lock().unwrap_or_else(|e| e.into_inner());
            slot.clone_from(&trigger);
            trigger.filter(|_| self.is_canceled())
        };
        if let Some(trigger) = fire {
            trigger.on_cancel();
        }
    }

    pub fn clear_trigger(&self) {
        self.set_trigger(None);
    }

    pub fn set_network_error(&self) {
        self.network_error.store(true, Ordering::SeqCst);
    }

    pub fn has_network_error(&self) -> bool {
        self.network_error.load(Ordering::SeqCst)
    }

    /// A source failed for a reason other than the network.
    pub fn set_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    pub fn has_error(&self) -> bool {
        self.has_network_error() || self.failed.load(Ordering::SeqCst)
    }

    /// Not canceled and no error.
    pub fn has_success(&self) -> bool {
        !self.is_canceled() && !self.has_error()
    }

    /// Count an attempt of the current source; returns the attempt number.
    pub fn add_try(&self) -> u32 {
        self.tries.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset_tries(&self) {
        self.tries.store(0, Ordering::SeqCst);
    }

    pub fn tries(&self) -> u32 {
        self.tries.load(Ordering::SeqCst)
    }

    pub fn add_stats(&self, stats: SyncStats) {
        self.inserted.fetch_add(stats.inserted, Ordering::SeqCst);
        self.updated.fetch_add(stats.updated, Ordering::SeqCst);
        self.deleted.fetch_add(stats.deleted, Ordering::SeqCst);
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            inserted: self.inserted.load(Ordering::SeqCst),
            updated: self.updated.load(Ordering::SeqCst),
            deleted: self.deleted.load(Ordering::SeqCst),
        }
    }

    /// Raise the watermark; it never moves backwards.
    pub fn observe_sync_time(&self, sync_time: i64) {
        self.newest_sync_time.fetch_max(sync_time, Ordering::SeqCst);
    }

    pub fn newest_sync_time(&self) -> i64 {
        self.newest_sync_time.load(Ordering::SeqCst)
    }

    /// Start progress reporting for a new source.
    pub fn reset_progress(&self) {
        self.progress_index.store(0, Ordering::SeqCst);
        self.progress_count.store(0, Ordering::SeqCst);
    }

    /// Clamp a progress report so that it never goes backwards within a
    /// source, even when a retry starts the source over.
    pub fn advance_progress(&self, item_index: u64, item_count: u64) -> (u64, u64) {
        let index = self
            .progress_index
            .fetch_max(item_index, Ordering::SeqCst)
            .max(item_index);
        let count = self
            .progress_count
            .fetch_max(item_count.max(index), Ordering::SeqCst)
            .max(item_count)
            .max(index);
        (index, count)
    }
}

fn validate_transition(from: SyncStatus, to: SyncStatus) -> Result<()> {
    let valid = matches!(
        (from, to),
        (SyncStatus::Idle, SyncStatus::Running)
            | (SyncStatus::Running, SyncStatus::Completed)
            | (SyncStatus::Running, SyncStatus::Canceled)
            | (SyncStatus::Running, SyncStatus::Failed)
    );

    if !valid {
        return Err(SyncError::InvalidStateTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
            reason: format!("Cannot transition from {} to {}", from, to),
        });
    }

    Ok(())
}
