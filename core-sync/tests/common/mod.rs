//! Shared fixtures for sync integration tests: an in-process remote catalog
//! driven by a script, and an observer that records what it was told.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::{
    error::Result as BridgeResult, BridgeError, CancelTrigger, RemoteAlbum, RemoteArtist,
    RemoteCatalog, RemotePage, RemotePlaylist, RemotePlaylistSong, RemoteSong, SourceEndpoint,
};
use core_async::sync::Notify;
use core_library::models::SourceId;
use core_runtime::events::{SourceOutcome, SyncOutcome};
use core_sync::{SyncCoordinator, SyncObserver, SyncStats};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Remote fixtures
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct RemoteLibrary {
    pub artists: Vec<RemoteArtist>,
    pub albums: Vec<RemoteAlbum>,
    pub songs: Vec<RemoteSong>,
    pub playlists: Vec<RemotePlaylist>,
    pub playlist_songs: Vec<RemotePlaylistSong>,
}

pub fn artist(sync_id: i64, sync_time: i64, name: &str) -> RemoteArtist {
    RemoteArtist {
        sync_id,
        sync_time,
        name: name.to_string(),
        photo: None,
    }
}

pub fn album(sync_id: i64, sync_time: i64, artist_sync_id: i64, name: &str) -> RemoteAlbum {
    RemoteAlbum {
        sync_id,
        sync_time,
        artist_sync_id,
        name: name.to_string(),
        artwork: None,
        artwork_big: None,
        release_date: None,
    }
}

pub fn song(
    sync_id: i64,
    sync_time: i64,
    artist_sync_id: i64,
    album_sync_id: Option<i64>,
    title: &str,
) -> RemoteSong {
    RemoteSong {
        sync_id,
        sync_time,
        artist_sync_id,
        album_sync_id,
        title: title.to_string(),
        track: None,
        length: 180,
    }
}

pub fn playlist(sync_id: i64, sync_time: i64, name: &str) -> RemotePlaylist {
    RemotePlaylist {
        sync_id,
        sync_time,
        name: name.to_string(),
    }
}

pub fn member(playlist_sync_id: i64, position: i64, song_sync_id: i64) -> RemotePlaylistSong {
    RemotePlaylistSong {
        playlist_sync_id,
        position,
        song_sync_id,
    }
}

/// Two artists, two albums, four songs (one without an album) and one
/// playlist of two songs.
pub fn sample_library() -> RemoteLibrary {
    RemoteLibrary {
        artists: vec![artist(1, 100, "The Beatles"), artist(2, 100, "Low")],
        albums: vec![
            album(10, 100, 1, "Help!"),
            album(11, 100, 2, "Things We Lost in the Fire"),
        ],
        songs: vec![
            song(100, 100, 1, Some(10), "Help!"),
            song(101, 100, 1, Some(10), "Yesterday"),
            song(102, 120, 2, Some(11), "Sunflower"),
            song(103, 100, 2, None, "Venus"),
        ],
        playlists: vec![playlist(50, 100, "Mix")],
        playlist_songs: vec![member(50, 0, 102), member(50, 1, 100)],
    }
}

// ============================================================================
// Scripted catalog
// ============================================================================

fn page_of<T: Clone, K: PartialOrd + Copy>(
    records: &[T],
    key: impl Fn(&T) -> K,
    after: Option<K>,
    limit: u32,
) -> RemotePage<T> {
    let rest: Vec<T> = records
        .iter()
        .filter(|r| after.map_or(true, |a| key(r) > a))
        .cloned()
        .collect();
    let limit = limit as usize;
    if rest.len() > limit {
        RemotePage::partial(rest[..limit].to_vec())
    } else {
        RemotePage::last(rest)
    }
}

/// Serves one [`RemoteLibrary`] per source port, paged by the requested
/// limit. Failures and hangs can be scripted.
#[derive(Default)]
pub struct ScriptedCatalog {
    libraries: Mutex<HashMap<u16, RemoteLibrary>>,
    transient_failures: AtomicU32,
    always_fail_port: Mutex<Option<u16>>,
    hang: AtomicBool,
    pub fetches: AtomicU32,
    pub fetch_started: Notify,
    pub trigger_fired: Arc<AtomicBool>,
}

impl ScriptedCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_library(&self, port: u16, library: RemoteLibrary) {
        self.libraries.lock().unwrap().insert(port, library);
    }

    pub fn update_library(&self, port: u16, edit: impl FnOnce(&mut RemoteLibrary)) {
        let mut libraries = self.libraries.lock().unwrap();
        edit(libraries.entry(port).or_default());
    }

    /// The next `count` fetches fail with a transient network error.
    pub fn fail_next(&self, count: u32) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    /// Every fetch for this port fails with a transient network error.
    pub fn always_fail(&self, port: u16) {
        *self.always_fail_port.lock().unwrap() = Some(port);
    }

    /// Fetches block until the future is dropped.
    pub fn hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    async fn before_fetch(&self, source: &SourceEndpoint) -> BridgeResult<RemoteLibrary> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.hang.load(Ordering::SeqCst) {
            self.fetch_started.notify_one();
            std::future::pending::<()>().await;
        }
        if *self.always_fail_port.lock().unwrap() == Some(source.port) {
            return Err(BridgeError::transient("connection reset"));
        }
        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BridgeError::transient("connection reset"));
        }

        Ok(self
            .libraries
            .lock()
            .unwrap()
            .get(&source.port)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl RemoteCatalog for ScriptedCatalog {
    async fn fetch_artists(
        &self,
        source: &SourceEndpoint,
        after: Option<i64>,
        limit: u32,
    ) -> BridgeResult<RemotePage<RemoteArtist>> {
        let library = self.before_fetch(source).await?;
        Ok(page_of(&library.artists, |r| r.sync_id, after, limit))
    }

    async fn fetch_albums(
        &self,
        source: &SourceEndpoint,
        after: Option<i64>,
        limit: u32,
    ) -> BridgeResult<RemotePage<RemoteAlbum>> {
        let library = self.before_fetch(source).await?;
        Ok(page_of(&library.albums, |r| r.sync_id, after, limit))
    }

    async fn fetch_songs(
        &self,
        source: &SourceEndpoint,
        after: Option<i64>,
        limit: u32,
    ) -> BridgeResult<RemotePage<RemoteSong>> {
        let library = self.before_fetch(source).await?;
        Ok(page_of(&library.songs, |r| r.sync_id, after, limit))
    }

    async fn fetch_playlists(
        &self,
        source: &SourceEndpoint,
        after: Option<i64>,
        limit: u32,
    ) -> BridgeResult<RemotePage<RemotePlaylist>> {
        let library = self.before_fetch(source).await?;
        Ok(page_of(&library.playlists, |r| r.sync_id, after, limit))
    }

    async fn fetch_playlist_songs(
        &self,
        source: &SourceEndpoint,
        after: Option<(i64, i64)>,
        limit: u32,
    ) -> BridgeResult<RemotePage<RemotePlaylistSong>> {
        let library = self.before_fetch(source).await?;
        Ok(page_of(&library.playlist_songs, |r| r.key(), after, limit))
    }

    fn cancel_trigger(&self) -> Option<Arc<dyn CancelTrigger>> {
        let fired = Arc::clone(&self.trigger_fired);
        Some(Arc::new(move || fired.store(true, Ordering::SeqCst)))
    }
}

// ============================================================================
// Recording observer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    BeginSync(u32),
    EndSync(SyncOutcome),
    BeginSource(SourceId),
    EndSource(SourceId, SourceOutcome),
    Progress(SourceId, u64, u64),
}

/// Records notifications. Can cancel the sync right after a given source
/// has ended, or once progress reaches a given item.
#[derive(Default)]
pub struct RecordingObserver {
    notifications: Mutex<Vec<Notification>>,
    cancel_after: Mutex<Option<(SourceId, SyncCoordinator)>>,
    cancel_at_item: Mutex<Option<(u64, SyncCoordinator)>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn cancel_after_source(&self, source_id: SourceId, coordinator: SyncCoordinator) {
        *self.cancel_after.lock().unwrap() = Some((source_id, coordinator));
    }

    pub fn cancel_at_item(&self, item_index: u64, coordinator: SyncCoordinator) {
        *self.cancel_at_item.lock().unwrap() = Some((item_index, coordinator));
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    /// Notifications without progress
    pub fn lifecycle(&self) -> Vec<Notification> {
        self.notifications()
            .into_iter()
            .filter(|n| !matches!(n, Notification::Progress(..)))
            .collect()
    }

    fn push(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

impl SyncObserver for RecordingObserver {
    fn begin_sync(&self, source_count: u32) {
        self.push(Notification::BeginSync(source_count));
    }

    fn end_sync(&self, outcome: SyncOutcome, _stats: SyncStats, _newest_sync_time: i64) {
        self.push(Notification::EndSync(outcome));
    }

    fn begin_source(&self, source_id: SourceId) {
        self.push(Notification::BeginSource(source_id));
    }

    fn end_source(&self, source_id: SourceId, outcome: SourceOutcome, _stats: SyncStats) {
        self.push(Notification::EndSource(source_id, outcome));

        let cancel = self.cancel_after.lock().unwrap().clone();
        if let Some((after, coordinator)) = cancel {
            if after == source_id {
                coordinator.stop_sync();
            }
        }
    }

    fn update_progress(&self, source_id: SourceId, item_index: u64, item_count: u64) {
        self.push(Notification::Progress(source_id, item_index, item_count));

        let cancel = self.cancel_at_item.lock().unwrap().clone();
        if let Some((at, coordinator)) = cancel {
            if at == item_index {
                coordinator.stop_sync();
            }
        }
    }
}
