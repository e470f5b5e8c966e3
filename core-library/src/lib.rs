//! # Library Management Module
//!
//! Owns the canonical music library database replicated from remote sources.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite database schema and migrations
//! - Repositories for sources, artists, albums, songs, playlists and tombstones
//! - Denormalized count maintenance
//! - Removal of media files whose owning rows were deleted
//! - Hierarchical path addressing for presentation code

pub mod address;
pub mod counts;
pub mod db;
pub mod error;
pub mod file_gc;
pub mod models;
pub mod repositories;

pub use counts::{CountMaintainer, CountReport};
pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{LibraryError, Result};
pub use file_gc::{FileReaper, MediaPaths, PendingFiles, ReapReport};
