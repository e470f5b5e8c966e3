//! # Core Configuration Module
//!
//! Builder-based configuration for the library sync engine.
//!
//! ## Overview
//!
//! [`CoreConfig`] carries the paths the engine works in, the file-system
//! bridge used to remove cached media, and the [`SyncSettings`] knobs that the
//! sync orchestrator reads. `build()` validates everything up front so a bad
//! configuration fails at startup rather than mid-sync.
//!
//! ## Required Settings
//!
//! - `database_path` - SQLite file holding the canonical library
//! - `cache_dir` - Cached song media
//! - `artwork_dir` - Artist photos and album artwork
//! - `FileSystemAccess` - injected, or defaulted to `TokioFileSystem` when the
//!   `desktop-shims` feature is enabled
//!
//! With `desktop-shims`, unset paths default to the platform locations of
//! `bridge_desktop::LibraryDirs`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, SyncSettings};
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/library/library.db")
//!     .cache_dir("/var/cache/library/media")
//!     .artwork_dir("/var/lib/library/artwork")
//!     .file_system(Arc::new(TokioFileSystem::new()))
//!     .sync(SyncSettings::new().with_max_retries(5).with_auto_sync_interval(Duration::from_secs(3600)))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::FileSystemAccess;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Main configuration structure for the engine.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Directory holding cached song media.
    pub cache_dir: PathBuf,

    /// Directory holding artist photos (`artists/`) and album artwork (`albums/`).
    pub artwork_dir: PathBuf,

    /// Capacity of the event bus channel.
    pub event_buffer_size: usize,

    /// File-system bridge used for file lifecycle cleanup.
    pub file_system: Arc<dyn FileSystemAccess>,

    /// Sync orchestration knobs.
    pub sync: SyncSettings,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("cache_dir", &self.cache_dir)
            .field("artwork_dir", &self.artwork_dir)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("file_system", &"FileSystemAccess { ... }")
            .field("sync", &self.sync)
            .finish()
    }
}

/// Settings consumed by the sync orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Attempts per source after the first, for transient network errors.
    pub max_retries: u32,

    /// Base delay of the exponential retry backoff.
    pub retry_backoff: Duration,

    /// Deadline for a single remote page request.
    pub request_timeout: Duration,

    /// Records requested per remote page.
    pub page_size: u32,

    /// Leading articles split off artist and album names, matched exactly.
    pub name_prefixes: Vec<String>,

    /// Emit a progress event every this many items.
    pub progress_interval: u64,

    /// Period of automatic syncs; `None` disables them.
    pub auto_sync_interval: Option<Duration>,
}

impl SyncSettings {
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            request_timeout: Duration::from_secs(60),
            page_size: 500,
            name_prefixes: vec!["The ".to_string()],
            progress_interval: 25,
            auto_sync_interval: None,
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_name_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.name_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_auto_sync_interval(mut self, interval: Duration) -> Self {
        self.auto_sync_interval = Some(interval);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config("Page size must be greater than 0".to_string()));
        }

        if self.max_retries > 20 {
            return Err(Error::Config(
                "Retry limit exceeds maximum of 20 attempts".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.progress_interval == 0 {
            return Err(Error::Config(
                "Progress interval must be at least 1 item".to_string(),
            ));
        }

        if let Some(prefix) = self.name_prefixes.iter().find(|p| p.trim().is_empty()) {
            return Err(Error::Config(format!(
                "Name prefix {:?} is blank",
                prefix
            )));
        }

        if matches!(self.auto_sync_interval, Some(i) if i < Duration::from_secs(60)) {
            return Err(Error::Config(
                "Auto-sync interval must be at least one minute".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates paths and nested settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        if self.artwork_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Artwork directory cannot be empty".to_string(),
            ));
        }

        if self.cache_dir == self.artwork_dir {
            return Err(Error::Config(
                "Cache and artwork directories must differ; cache sweeps would remove artwork"
                    .to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        self.sync.validate()
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn file_system_missing_error() -> Error {
    Error::CapabilityMissing {
        bridge: "FileSystemAccess".to_string(),
        message: "FileSystemAccess is required to remove cached media and artwork. \
                  Desktop: enable the 'desktop-shims' feature to use TokioFileSystem. \
                  Other hosts: inject a platform implementation."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Ok(Arc::new(bridge_desktop::TokioFileSystem::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(file_system_missing_error())
}

enum DefaultPath {
    Database,
    Cache,
    Artwork,
}

#[cfg(feature = "desktop-shims")]
fn platform_default(path: DefaultPath) -> Option<PathBuf> {
    let dirs = bridge_desktop::LibraryDirs::platform();
    Some(match path {
        DefaultPath::Database => dirs.database_path,
        DefaultPath::Cache => dirs.cache_dir,
        DefaultPath::Artwork => dirs.artwork_dir,
    })
}

#[cfg(not(feature = "desktop-shims"))]
fn platform_default(_path: DefaultPath) -> Option<PathBuf> {
    None
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    artwork_dir: Option<PathBuf>,
    event_buffer_size: Option<usize>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    sync: Option<SyncSettings>,
}

impl CoreConfigBuilder {
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    pub fn artwork_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.artwork_dir = Some(path.into());
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn sync(mut self, settings: SyncSettings) -> Self {
        self.sync = Some(settings);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if a required path is missing or a value is invalid
    /// - `Error::CapabilityMissing` if no file-system bridge is available
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self
            .database_path
            .or_else(|| platform_default(DefaultPath::Database))
            .ok_or_else(|| {
                Error::Config(
                    "Database path is required. Use .database_path() to set it.".to_string(),
                )
            })?;

        let cache_dir = self
            .cache_dir
            .or_else(|| platform_default(DefaultPath::Cache))
            .ok_or_else(|| {
                Error::Config("Cache directory is required. Use .cache_dir() to set it.".to_string())
            })?;

        let artwork_dir = self
            .artwork_dir
            .or_else(|| platform_default(DefaultPath::Artwork))
            .ok_or_else(|| {
                Error::Config(
                    "Artwork directory is required. Use .artwork_dir() to set it.".to_string(),
                )
            })?;

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let config = CoreConfig {
            database_path,
            cache_dir,
            artwork_dir,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            file_system,
            sync: self.sync.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}
