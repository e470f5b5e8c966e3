//! # Library Database
//!
//! Opens the SQLite store and applies the embedded migrations.
//!
//! File databases run in WAL mode so readers keep seeing the last committed
//! state of a source while a sync writes the next one. Foreign keys are
//! always on: the delete cascades from artists to albums, songs and playlist
//! memberships depend on them.
//!
//! An in-memory database lives and dies with its connection, so the
//! in-memory configuration pins the pool to exactly one connection that is
//! never recycled. Code sharing such a pool must not acquire a second
//! connection while holding a transaction.
//!
//! ```rust,ignore
//! use core_library::db::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("library.db").max_connections(4)).await?;
//! ```

use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `sqlite:` URL of the database file, or `sqlite::memory:`
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// How long a writer waits on a locked database before failing
    pub busy_timeout: Duration,
    pub max_lifetime: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub journal_mode: SqliteJournalMode,
}

impl DatabaseConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_url: format!("sqlite:{}", database_path.into().display()),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            max_lifetime: Some(Duration::from_secs(30 * 60)),
            idle_timeout: Some(Duration::from_secs(10 * 60)),
            journal_mode: SqliteJournalMode::Wal,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            max_lifetime: None,
            idle_timeout: None,
            journal_mode: SqliteJournalMode::Memory,
            ..Self::new("")
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }

    /// Ignored for in-memory databases, which always use one connection.
    pub fn max_connections(mut self, max: u32) -> Self {
        if !self.is_in_memory() {
            self.max_connections = max.max(1);
        }
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn journal_mode(mut self, mode: SqliteJournalMode) -> Self {
        self.journal_mode = mode;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Open a pool, apply migrations and check that the database answers.
///
/// # Errors
///
/// `LibraryError::Database` if the database cannot be opened or queried,
/// `LibraryError::Migration` if a migration fails.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Opening library database"
    );

    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .journal_mode(config.journal_mode)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .connect_with(options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to open library database");
            LibraryError::Database(e)
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Library migration failed");
            LibraryError::Migration(e.to_string())
        })?;

    sqlx::query("SELECT 1").execute(&pool).await?;
    debug!(connections = pool.size(), "Library database ready");

    Ok(pool)
}

/// Migrated single-connection in-memory database
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}
