//! Domain models for the music library
//!
//! Rows mirror the canonical schema one-to-one. Every syncable entity carries
//! the remote `sync_id` / `sync_time` pair next to its local id; local ids are
//! assigned by the store and never reused.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

// =============================================================================
// ID Types
// =============================================================================

macro_rules! local_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
        )]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

local_id!(
    /// Local identifier of a remote origin
    SourceId
);
local_id!(
    /// Local identifier of an artist row
    ArtistId
);
local_id!(
    /// Local identifier of an album row
    AlbumId
);
local_id!(
    /// Local identifier of a song row
    SongId
);
local_id!(
    /// Local identifier of a playlist row
    PlaylistId
);
local_id!(
    /// Local identifier of a playlist membership row
    PlaylistSongId
);

// =============================================================================
// Name prefixes
// =============================================================================

/// Split a leading article off a display name.
///
/// The first prefix in `prefixes` that the name starts with (and that leaves
/// a non-empty remainder) is moved into the second tuple slot, so that sorting
/// by the first slot ignores it.
///
/// ```
/// use core_library::models::split_name;
///
/// let prefixes = vec!["The ".to_string()];
/// assert_eq!(
///     split_name("The Beatles", &prefixes),
///     ("Beatles".to_string(), Some("The ".to_string()))
/// );
/// assert_eq!(split_name("Theatre", &prefixes), ("Theatre".to_string(), None));
/// ```
pub fn split_name(name: &str, prefixes: &[String]) -> (String, Option<String>) {
    for prefix in prefixes {
        if prefix.is_empty() {
            continue;
        }
        if let Some(rest) = name.strip_prefix(prefix.as_str()) {
            if !rest.is_empty() {
                return (rest.to_string(), Some(prefix.clone()));
            }
        }
    }
    (name.to_string(), None)
}

/// Recombine a split name for display.
pub fn join_name(name: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}{name}"),
        None => name.to_string(),
    }
}

// =============================================================================
// Domain Models
// =============================================================================

/// Remote origin the library is replicated from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Source {
    pub id: SourceId,
    pub host: String,
    pub port: i64,
    /// Newest remote sync-time committed for this source (0 if never synced)
    pub last_sync_time: i64,
    /// Incremented by every committed sync
    pub revision: i64,
}

impl Source {
    /// Validate connection details before insertion
    pub fn validate(host: &str, port: i64) -> Result<(), String> {
        if host.trim().is_empty() {
            return Err("Source host cannot be empty".to_string());
        }
        if !(1..=65535).contains(&port) {
            return Err(format!("Source port {port} is out of range"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Artist {
    pub id: ArtistId,
    pub source_id: SourceId,
    pub sync_id: i64,
    pub sync_time: i64,
    /// Name without its leading article
    pub name: String,
    pub name_prefix: Option<String>,
    pub photo: Option<String>,
    /// Distinct albums among this artist's songs
    pub num_albums: i64,
    pub num_songs: i64,
}

impl Artist {
    pub fn full_name(&self) -> String {
        join_name(&self.name, self.name_prefix.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Album {
    pub id: AlbumId,
    pub source_id: SourceId,
    pub sync_id: i64,
    pub sync_time: i64,
    pub artist_id: ArtistId,
    pub name: String,
    pub name_prefix: Option<String>,
    pub artwork: Option<String>,
    pub artwork_big: Option<String>,
    /// Unix seconds
    pub release_date: Option<i64>,
    pub num_songs: i64,
}

impl Album {
    pub fn full_name(&self) -> String {
        join_name(&self.name, self.name_prefix.as_deref())
    }

    /// Albums with enough songs to be shown as a full record
    pub fn is_complete(&self) -> bool {
        self.num_songs > COMPLETE_ALBUM_MIN_SONGS
    }
}

/// An album is "complete" once it holds more than this many songs.
pub const COMPLETE_ALBUM_MIN_SONGS: i64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Song {
    pub id: SongId,
    pub source_id: SourceId,
    pub sync_id: i64,
    pub sync_time: i64,
    pub artist_id: ArtistId,
    pub album_id: Option<AlbumId>,
    pub title: String,
    pub track: Option<i64>,
    /// Seconds
    pub length: i64,
    /// Locally cached media file, if downloaded
    pub cache_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Playlist {
    pub id: PlaylistId,
    pub source_id: SourceId,
    pub sync_id: i64,
    pub sync_time: i64,
    pub name: String,
    pub num_songs: i64,
}

/// Membership of a song in a playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PlaylistSong {
    pub id: PlaylistSongId,
    pub playlist_id: PlaylistId,
    pub song_id: SongId,
    pub position: i64,
}

/// A song as it appears at one position of a playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PlaylistEntry {
    pub position: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub song: Song,
}

/// Record of a remote-observed deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Tombstone {
    pub id: i64,
    pub source_id: SourceId,
    pub sync_id: i64,
    pub sync_time: i64,
}
