//! # Repository Pattern Implementation
//!
//! Read access to the canonical library plus the few local mutations the
//! owning process may perform outside a sync (deletes, cache paths).
//! Sync writes do not go through these traits; the merge engine writes on the
//! source transaction's connection directly.
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>` for error handling
//! - Pagination is supported via the `Page<T>` wrapper
//!
//! ## Default orderings
//!
//! - artists, albums and playlists by name (leading article ignored)
//! - songs of an artist by title, songs of an album by track then title
//! - playlist songs by position

pub mod album;
pub mod artist;
pub mod pagination;
pub mod playlist;
pub mod song;
pub mod source;
pub mod tombstone;

pub use album::{AlbumRepository, SqliteAlbumRepository};
pub use artist::{ArtistRepository, SqliteArtistRepository};
pub use pagination::{Page, PageRequest};
pub use playlist::{PlaylistRepository, SqlitePlaylistRepository};
pub use song::{SongRepository, SqliteSongRepository};
pub use source::{SourceRepository, SqliteSourceRepository};
pub use tombstone::{SqliteTombstoneRepository, TombstoneRepository};
