//! File System Abstraction
//!
//! Cached song media and artwork live on the host file system. The library
//! only needs to inspect, list and remove those files, so that is all this
//! trait exposes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn drop_cached(fs: &dyn FileSystemAccess, cache_path: &Path) -> Result<()> {
///     if fs.exists(cache_path).await? {
///         fs.delete_file(cache_path).await?;
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Delete a file. A missing file is reported as an `Io` not-found error.
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;
}
