//! Remote Catalog Abstraction
//!
//! A remote origin exposes its library as five independently paged
//! enumerations, one per entity kind. Each page is strictly ascending by the
//! remote's stable sync-id and reports whether more pages remain. The sync
//! engine only infers deletions after it has seen the final page of a kind.
//!
//! Parents are referenced by sync-id (an album names its artist's sync-id,
//! never a local row id); the engine resolves them against the local store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// The five syncable entity kinds, in foreign-key dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Artist,
    Album,
    Song,
    Playlist,
    PlaylistSong,
}

impl EntityKind {
    /// Merge order: parents strictly before children.
    pub const MERGE_ORDER: [EntityKind; 5] = [
        EntityKind::Artist,
        EntityKind::Album,
        EntityKind::Song,
        EntityKind::Playlist,
        EntityKind::PlaylistSong,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artist",
            EntityKind::Album => "album",
            EntityKind::Song => "song",
            EntityKind::Playlist => "playlist",
            EntityKind::PlaylistSong => "playlist_song",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and what to fetch for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEndpoint {
    /// Local id of the source row.
    pub source_id: i64,
    pub host: String,
    pub port: u16,
    /// Watermark committed by the previous successful sync (0 if never).
    pub last_sync_time: i64,
}

/// One page of an ascending enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePage<T> {
    pub records: Vec<T>,
    /// `false` once this page completes the enumeration.
    pub more_remaining: bool,
}

impl<T> RemotePage<T> {
    pub fn last(records: Vec<T>) -> Self {
        Self {
            records,
            more_remaining: false,
        }
    }

    pub fn partial(records: Vec<T>) -> Self {
        Self {
            records,
            more_remaining: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteArtist {
    pub sync_id: i64,
    pub sync_time: i64,
    /// Display name, including any leading article.
    pub name: String,
    pub photo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAlbum {
    pub sync_id: i64,
    pub sync_time: i64,
    pub artist_sync_id: i64,
    pub name: String,
    pub artwork: Option<String>,
    pub artwork_big: Option<String>,
    /// Unix seconds.
    pub release_date: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSong {
    pub sync_id: i64,
    pub sync_time: i64,
    pub artist_sync_id: i64,
    pub album_sync_id: Option<i64>,
    pub title: String,
    pub track: Option<i64>,
    /// Seconds.
    pub length: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePlaylist {
    pub sync_id: i64,
    pub sync_time: i64,
    pub name: String,
}

/// Membership of a song in a playlist. Has no sync-id of its own; it is
/// enumerated in `(playlist_sync_id, position)` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePlaylistSong {
    pub playlist_sync_id: i64,
    pub position: i64,
    pub song_sync_id: i64,
}

impl RemotePlaylistSong {
    pub fn key(&self) -> (i64, i64) {
        (self.playlist_sync_id, self.position)
    }
}

/// Invoked from the cancelling thread to release a blocked remote read.
///
/// Implementations must be cheap and must not block; typically they shut a
/// socket down or flip the transport's own abort flag.
pub trait CancelTrigger: Send + Sync {
    fn on_cancel(&self);
}

impl<F> CancelTrigger for F
where
    F: Fn() + Send + Sync,
{
    fn on_cancel(&self) {
        self()
    }
}

/// Network collaborator yielding remote records.
///
/// Every fetch takes an exclusive `after` cursor (the last key of the previous
/// page, `None` for the first page) and a page size. Implementations must:
///
/// - return records strictly ascending by key, all greater than `after`
/// - report failures worth retrying with [`BridgeError::transient`](crate::BridgeError::transient)
/// - tolerate the returned future being dropped mid-read (that is how a
///   cancelled sync abandons a request)
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    async fn fetch_artists(
        &self,
        source: &SourceEndpoint,
        after: Option<i64>,
        limit: u32,
    ) -> Result<RemotePage<RemoteArtist>>;

    async fn fetch_albums(
        &self,
        source: &SourceEndpoint,
        after: Option<i64>,
        limit: u32,
    ) -> Result<RemotePage<RemoteAlbum>>;

    async fn fetch_songs(
        &self,
        source: &SourceEndpoint,
        after: Option<i64>,
        limit: u32,
    ) -> Result<RemotePage<RemoteSong>>;

    async fn fetch_playlists(
        &self,
        source: &SourceEndpoint,
        after: Option<i64>,
        limit: u32,
    ) -> Result<RemotePage<RemotePlaylist>>;

    async fn fetch_playlist_songs(
        &self,
        source: &SourceEndpoint,
        after: Option<(i64, i64)>,
        limit: u32,
    ) -> Result<RemotePage<RemotePlaylistSong>>;

    /// Trigger to register for the duration of a source's fetches, for
    /// transports whose reads cannot be abandoned by dropping a future.
    fn cancel_trigger(&self) -> Option<Arc<dyn CancelTrigger>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn merge_order_puts_parents_first() {
        let order = EntityKind::MERGE_ORDER;
        let pos = |k| order.iter().position(|o| *o == k).unwrap();
        assert!(pos(EntityKind::Artist) < pos(EntityKind::Album));
        assert!(pos(EntityKind::Album) < pos(EntityKind::Song));
        assert!(pos(EntityKind::Song) < pos(EntityKind::PlaylistSong));
        assert!(pos(EntityKind::Playlist) < pos(EntityKind::PlaylistSong));
    }

    #[test]
    fn closure_acts_as_cancel_trigger() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let trigger: Arc<dyn CancelTrigger> = Arc::new(move || flag.store(true, Ordering::SeqCst));
        trigger.on_cancel();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn records_deserialize_from_wire_json() {
        let json = r#"{"sync_id":4,"sync_time":100,"artist_sync_id":1,"album_sync_id":null,
            "title":"Help!","track":1,"length":139}"#;
        let song: RemoteSong = serde_json::from_str(json).unwrap();
        assert_eq!(song.sync_id, 4);
        assert_eq!(song.album_sync_id, None);

        let kind: EntityKind = serde_json::from_str(r#""playlist_song""#).unwrap();
        assert_eq!(kind, EntityKind::PlaylistSong);
    }
}
