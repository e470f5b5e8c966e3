//! # Observer Boundary
//!
//! Outbound notifications for the presentation layer. The coordinator
//! guarantees strict nesting:
//!
//! ```text
//! begin_sync
//!   begin_source(a) update_progress(a, ..)* end_source(a)
//!   begin_source(b) ... end_source(b)
//! end_sync
//! ```
//!
//! Every `begin_*` is matched by an `end_*`, whatever the outcome, and the
//! item index reported for a source never decreases.

use crate::context::SyncStats;
use core_library::models::SourceId;
use core_runtime::events::{CoreEvent, EventBus, SourceOutcome, SyncEvent, SyncOutcome};

#[cfg_attr(test, mockall::automock)]
pub trait SyncObserver: Send + Sync {
    fn begin_sync(&self, source_count: u32);

    fn end_sync(&self, outcome: SyncOutcome, stats: SyncStats, newest_sync_time: i64);

    fn begin_source(&self, source_id: SourceId);

    fn end_source(&self, source_id: SourceId, outcome: SourceOutcome, stats: SyncStats);

    fn update_progress(&self, source_id: SourceId, item_index: u64, item_count: u64);
}

/// Observer that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {
    fn begin_sync(&self, _source_count: u32) {}

    fn end_sync(&self, _outcome: SyncOutcome, _stats: SyncStats, _newest_sync_time: i64) {}

    fn begin_source(&self, _source_id: SourceId) {}

    fn end_source(&self, _source_id: SourceId, _outcome: SourceOutcome, _stats: SyncStats) {}

    fn update_progress(&self, _source_id: SourceId, _item_index: u64, _item_count: u64) {}
}

/// Publishes sync notifications on the core event bus.
///
/// Progress is throttled to every `progress_interval` items, plus the last
/// item received so far.
pub struct EventBusObserver {
    event_bus: EventBus,
    progress_interval: u64,
}

impl EventBusObserver {
    pub fn new(event_bus: EventBus, progress_interval: u64) -> Self {
        Self {
            event_bus,
            progress_interval: progress_interval.max(1),
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is not an error
        self.event_bus.emit(CoreEvent::Sync(event)).ok();
    }
}

impl SyncObserver for EventBusObserver {
    fn begin_sync(&self, source_count: u32) {
        self.emit(SyncEvent::SyncStarted { source_count });
    }

    fn end_sync(&self, outcome: SyncOutcome, stats: SyncStats, newest_sync_time: i64) {
        self.emit(SyncEvent::SyncFinished {
            outcome,
            inserted: stats.inserted,
            updated: stats.updated,
            deleted: stats.deleted,
            newest_sync_time,
        });
    }

    fn begin_source(&self, source_id: SourceId) {
        self.emit(SyncEvent::SourceStarted {
            source_id: source_id.get(),
        });
    }

    fn end_source(&self, source_id: SourceId, outcome: SourceOutcome, stats: SyncStats) {
        self.emit(SyncEvent::SourceFinished {
            source_id: source_id.get(),
            outcome,
            inserted: stats.inserted,
            updated: stats.updated,
            deleted: stats.deleted,
        });
    }

    fn update_progress(&self, source_id: SourceId, item_index: u64, item_count: u64) {
        if item_index % self.progress_interval != 0 && item_index != item_count {
            return;
        }
        self.emit(SyncEvent::Progress {
            source_id: source_id.get(),
            item_index,
            item_count,
        });
    }
}
