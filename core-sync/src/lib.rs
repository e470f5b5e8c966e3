//! # Sync Module
//!
//! Replicates remote library catalogs into the local canonical store.
//!
//! ## Overview
//!
//! The remote side is the source of truth. Each sync enumerates every entity
//! kind of every source in ascending sync-id order and merges it into the
//! local rows of that source:
//! - new sync-ids are inserted, unless a tombstone suppresses them
//! - newer sync-times rewrite the local row
//! - sync-ids missing from a complete enumeration are deleted and tombstoned
//!
//! All changes of one source commit in a single transaction.
//!
//! ## Components
//!
//! - **Sync Context** (`context`): run state, cancellation, retry and error flags
//! - **Entity Descriptors** (`entity`): per-table columns, keys and delete hooks
//! - **Table Merger** (`merger`): the generic sorted merge-join
//! - **Sync Coordinator** (`coordinator`): transactions, retry and cancellation
//! - **Observer** (`observer`): begin/end and progress notifications
//! - **History** (`history`): persisted outcome of every source sync
//! - **Scheduler** (`scheduler`): periodic automatic syncs

pub mod context;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod history;
pub mod merger;
pub mod observer;
pub mod scheduler;

pub use context::{SyncContext, SyncStats, SyncStatus};
pub use coordinator::{SourceReport, SyncConfig, SyncCoordinator, SyncReport};
pub use entity::{EntityDescriptor, LocalRow, MergeEnv};
pub use error::{Result, SyncError};
pub use history::{NewSyncRun, SqliteSyncRunRepository, SyncRun, SyncRunRepository};
pub use merger::TableMerger;
pub use observer::{EventBusObserver, NoopObserver, SyncObserver};
pub use scheduler::AutoSyncScheduler;
