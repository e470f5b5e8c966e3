//! Library sync façade.
//!
//! Wires the workspace crates into one handle for host applications: the
//! database pool opened from [`CoreConfig`], the event bus, a
//! [`SyncCoordinator`] publishing on that bus and the automatic sync schedule.
//! Desktop hosts keep the default `desktop-shims` feature so the file-system
//! bridge is provided by `bridge-desktop`.
//!
//! ```rust,ignore
//! use library_sync::LibrarySync;
//!
//! let core = LibrarySync::open(config, catalog).await?;
//! core.sources().insert("music.local", 8080).await?;
//! core.coordinator().start_sync();
//! ```

pub mod error;

pub use error::{LibrarySyncError, Result};

pub use bridge_traits;
pub use core_library;
pub use core_runtime;
pub use core_sync;

use bridge_traits::RemoteCatalog;
use core_library::repositories::SqliteSourceRepository;
use core_library::{create_pool, DatabaseConfig};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use core_sync::{AutoSyncScheduler, SyncCoordinator};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Running library sync engine
pub struct LibrarySync {
    config: CoreConfig,
    pool: SqlitePool,
    event_bus: EventBus,
    coordinator: SyncCoordinator,
    scheduler: AutoSyncScheduler,
}

impl LibrarySync {
    /// Open the library database and wire the sync engine.
    ///
    /// Automatic syncs start on `config.sync.auto_sync_interval` when set.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the database cannot be
    /// opened and migrated.
    pub async fn open(config: CoreConfig, catalog: Arc<dyn RemoteCatalog>) -> Result<Self> {
        config.validate()?;

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let event_bus = EventBus::new(config.event_buffer_size);
        let coordinator =
            SyncCoordinator::from_core(&config, pool.clone(), catalog, event_bus.clone());

        let scheduler = AutoSyncScheduler::new(coordinator.clone());
        scheduler.reschedule(config.sync.auto_sync_interval);

        info!(
            database = %config.database_path.display(),
            "Library sync engine ready"
        );

        Ok(Self {
            config,
            pool,
            event_bus,
            coordinator,
            scheduler,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn sources(&self) -> SqliteSourceRepository {
        SqliteSourceRepository::new(self.pool.clone())
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Change the automatic sync period. `None` disables automatic syncs.
    pub fn set_auto_sync(&self, period: Option<Duration>) {
        self.scheduler.reschedule(period);
    }

    pub fn auto_sync_period(&self) -> Option<Duration> {
        self.scheduler.period()
    }

    /// Stop any running sync and the schedule, then close the database.
    pub async fn shutdown(self) {
        self.scheduler.reschedule(None);
        self.coordinator.stop_sync();
        self.pool.close().await;
        info!("Library sync engine stopped");
    }
}
