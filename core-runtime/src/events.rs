//! # Event Bus System
//!
//! Broadcast channel carrying typed events from the sync engine and the
//! library to whoever is listening (UI, notifications, tests).
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wraps one enum per domain
//! - **EventBus**: cloneable broadcast sender
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐     subscribe    ┌────────────┐
//! │ Sync Engine ├──────────────>│ EventBus  ├─────────────────>│ Subscriber │
//! └─────────────┘               │ (broadcast│                  └────────────┘
//! ┌─────────────┐     emit      │  channel) │     subscribe    ┌────────────┐
//! │ Library     ├──────────────>│           ├─────────────────>│ Subscriber │
//! └─────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! let bus = EventBus::new(100);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::SourceStarted { source_id: 1 })).ok();
//! assert!(rx.try_recv().is_ok());
//! ```
//!
//! ## Sync event ordering
//!
//! A sync publishes `SyncStarted`, then for every source `SourceStarted`,
//! zero or more `Progress`, `SourceFinished`, and finally `SyncFinished`.
//! Begin/end pairs are always matched, whatever the outcome.
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell `n` events behind. Non-fatal.
//! - **`RecvError::Closed`**: every sender is gone; treat as shutdown.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sync lifecycle and progress
    Sync(SyncEvent),
    /// Maintenance of the local library after a source commits
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::SourceFinished { outcome, .. }) => match outcome {
                SourceOutcome::Failed | SourceOutcome::NetworkError => EventSeverity::Warning,
                _ => EventSeverity::Info,
            },
            CoreEvent::Sync(SyncEvent::SyncFinished { outcome, .. }) => match outcome {
                SyncOutcome::Failed => EventSeverity::Error,
                _ => EventSeverity::Info,
            },
            CoreEvent::Library(LibraryEvent::FilesReclaimed { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// How a whole sync run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed,
    Canceled,
    Failed,
}

/// How one source's part of a sync ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOutcome {
    /// All mergers ran and the transaction committed.
    Committed,
    /// Rolled back because the sync was cancelled.
    Canceled,
    /// Abandoned after exhausting network retries.
    NetworkError,
    /// Rolled back because of a constraint violation or protocol error.
    Failed,
}

/// Events emitted by the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    SyncStarted {
        /// Number of sources that will be visited.
        source_count: u32,
    },
    SourceStarted {
        source_id: i64,
    },
    /// Progress within a source; `item_index` never decreases for a source.
    Progress {
        source_id: i64,
        item_index: u64,
        /// Records received so far. Grows while pages are still arriving.
        item_count: u64,
    },
    SourceFinished {
        source_id: i64,
        outcome: SourceOutcome,
        inserted: u64,
        updated: u64,
        deleted: u64,
    },
    SyncFinished {
        outcome: SyncOutcome,
        inserted: u64,
        updated: u64,
        deleted: u64,
        /// Newest remote sync-time observed, 0 if nothing was seen.
        newest_sync_time: i64,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::SyncStarted { .. } => "Sync started",
            SyncEvent::SourceStarted { .. } => "Source sync started",
            SyncEvent::Progress { .. } => "Sync in progress",
            SyncEvent::SourceFinished { .. } => "Source sync finished",
            SyncEvent::SyncFinished { outcome, .. } => match outcome {
                SyncOutcome::Completed => "Sync completed successfully",
                SyncOutcome::Canceled => "Sync cancelled",
                SyncOutcome::Failed => "Sync failed",
            },
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Events related to library maintenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// Denormalized counts were recomputed.
    CountsAdjusted { rows_changed: u64 },
    /// Files owned by deleted rows were removed.
    FilesReclaimed { removed: u64, failed: u64 },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::CountsAdjusted { .. } => "Library counts recomputed",
            LibraryEvent::FilesReclaimed { .. } => "Orphaned files removed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning is cheap; every clone publishes to the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus holding at most `capacity` undelivered events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Fails only when nobody is subscribed, which callers usually ignore.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver wrapper that skips events not matching an optional predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |f| f(event))
    }

    /// Waits for the next matching event.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns the next buffered matching event, or `None` if none is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
