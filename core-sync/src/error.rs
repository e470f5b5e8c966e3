use bridge_traits::{BridgeError, EntityKind};
use core_library::LibraryError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// A remote read failed in a way worth retrying.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Constraint violation on {entity} {sync_id}: {message}")]
    ConstraintViolation {
        entity: EntityKind,
        sync_id: String,
        message: String,
    },

    #[error("Remote {entity} page out of order at {sync_id}")]
    OutOfOrderBatch { entity: EntityKind, sync_id: String },

    #[error("{entity} {sync_id} references unknown {parent} {parent_sync_id}")]
    UnresolvedReference {
        entity: EntityKind,
        sync_id: String,
        parent: EntityKind,
        parent_sync_id: i64,
    },

    /// The parent was deleted remotely and its tombstone blocks the record.
    #[error("{entity} {sync_id} references deleted {parent} {parent_sync_id}")]
    TombstonedParent {
        entity: EntityKind,
        sync_id: String,
        parent: EntityKind,
        parent_sync_id: i64,
    },

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Sync already in progress")]
    SyncInProgress,

    #[error("Source {0} not found")]
    SourceNotFound(i64),

    #[error("Invalid sync status: {0}")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Remote request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Library(#[from] LibraryError),
}

impl SyncError {
    /// Whether the failed attempt may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::TransientNetwork(_) | SyncError::Timeout(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }

    /// The record was blocked by its parent's tombstone and can be skipped.
    pub fn is_tombstoned_parent(&self) -> bool {
        matches!(self, SyncError::TombstonedParent { .. })
    }

    /// Errors that mean the remote data could not be applied as a whole.
    pub fn is_constraint(&self) -> bool {
        matches!(
            self,
            SyncError::ConstraintViolation { .. }
                | SyncError::OutOfOrderBatch { .. }
                | SyncError::UnresolvedReference { .. }
        )
    }

    /// Classify a failed write of one record. Integrity violations become
    /// `ConstraintViolation`; anything else is a plain database error.
    pub fn from_write(err: sqlx::Error, entity: EntityKind, sync_id: impl ToString) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            use sqlx::error::ErrorKind;
            if matches!(
                db_err.kind(),
                ErrorKind::UniqueViolation
                    | ErrorKind::ForeignKeyViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation
            ) {
                return SyncError::ConstraintViolation {
                    entity,
                    sync_id: sync_id.to_string(),
                    message: db_err.message().to_string(),
                };
            }
        }
        SyncError::Database(err.to_string())
    }
}

impl From<BridgeError> for SyncError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Cancelled => SyncError::Cancelled,
            err if err.is_transient() => SyncError::TransientNetwork(err.to_string()),
            err => SyncError::Remote(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
