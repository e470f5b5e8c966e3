//! # Desktop Bridge Implementations
//!
//! Desktop (macOS, Windows, Linux) implementations of the bridge traits.
//!
//! - [`TokioFileSystem`]: `FileSystemAccess` over `tokio::fs`
//! - [`LibraryDirs`]: platform default locations (`dirs`) used by
//!   `CoreConfig` when the host leaves a path unset
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{LibraryDirs, TokioFileSystem};
//! use std::sync::Arc;
//!
//! let dirs = LibraryDirs::platform();
//! let config = CoreConfig::builder()
//!     .database_path(dirs.database_path)
//!     .cache_dir(dirs.cache_dir)
//!     .artwork_dir(dirs.artwork_dir)
//!     .file_system(Arc::new(TokioFileSystem::new()))
//!     .build()?;
//! ```

mod filesystem;
mod locations;

pub use filesystem::TokioFileSystem;
pub use locations::LibraryDirs;
