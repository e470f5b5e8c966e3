//! # Entity Descriptors
//!
//! The merge algorithm is the same for every syncable table; what differs is
//! captured here. A descriptor names the comparison key of a record, how to
//! read the local key index of one source, how to fetch a remote page, and
//! how to insert, update and delete rows (including the files and tombstones
//! a delete leaves behind).
//!
//! Remote records reference their parents by sync-id. Descriptors resolve
//! those against rows of the same source already merged in this transaction.
//! A reference to a tombstoned parent is reported as
//! [`SyncError::TombstonedParent`] and the merger skips the record; any other
//! reference that does not resolve is [`SyncError::UnresolvedReference`].

use crate::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::{
    EntityKind, RemoteAlbum, RemoteArtist, RemoteCatalog, RemotePage, RemotePlaylist,
    RemotePlaylistSong, RemoteSong, SourceEndpoint,
};
use core_library::models::{split_name, AlbumId, ArtistId, SongId, SourceId};
use core_library::repositories::tombstone;
use core_library::{FileReaper, PendingFiles};
use sqlx::{query, query_as, SqliteConnection};
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Per-source settings shared by every descriptor during a merge
#[derive(Clone)]
pub struct MergeEnv {
    pub source_id: SourceId,
    /// Leading articles split off artist and album names
    pub name_prefixes: Vec<String>,
    /// Collects files of deleted rows; `None` leaves files alone
    pub reaper: Option<Arc<FileReaper>>,
}

/// A local row as seen by the merge: its id, merge key and version.
///
/// The version is the sync-time for entities that have one, and the
/// referenced song's sync-id for playlist memberships.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalRow<K> {
    pub id: i64,
    pub key: K,
    pub version: i64,
}

#[async_trait]
pub trait EntityDescriptor: Send + Sync {
    type Remote: Send + Sync + Debug;
    type Key: Copy + Ord + Hash + Debug + Send + Sync;

    const KIND: EntityKind;

    fn key(&self, remote: &Self::Remote) -> Self::Key;

    /// Remote last-modified time, if the entity carries one
    fn sync_time(&self, remote: &Self::Remote) -> Option<i64>;

    /// Whether a matched local row must be rewritten
    fn needs_update(&self, local: &LocalRow<Self::Key>, remote: &Self::Remote) -> bool;

    /// Local rows of one source ordered by key
    async fn load_local(
        &self,
        conn: &mut SqliteConnection,
        source_id: SourceId,
    ) -> Result<Vec<LocalRow<Self::Key>>>;

    /// Keys whose re-insertion is suppressed
    async fn load_tombstones(
        &self,
        conn: &mut SqliteConnection,
        source_id: SourceId,
    ) -> Result<HashSet<Self::Key>>;

    async fn fetch(
        &self,
        catalog: &dyn RemoteCatalog,
        endpoint: &SourceEndpoint,
        after: Option<Self::Key>,
        limit: u32,
    ) -> Result<RemotePage<Self::Remote>>;

    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        remote: &Self::Remote,
    ) -> Result<()>;

    async fn update(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        local: &LocalRow<Self::Key>,
        remote: &Self::Remote,
    ) -> Result<()>;

    /// Delete a row no longer present remotely. Files owned by the row (and
    /// by anything its delete cascades into) are added to `pending`.
    async fn delete(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        local: &LocalRow<Self::Key>,
        pending: &mut PendingFiles,
    ) -> Result<()>;
}

fn table_of(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Artist => "artists",
        EntityKind::Album => "albums",
        EntityKind::Song => "songs",
        EntityKind::Playlist => "playlists",
        EntityKind::PlaylistSong => "playlist_songs",
    }
}

/// Resolve a parent's sync-id to its local id within the source.
async fn resolve(
    conn: &mut SqliteConnection,
    env: &MergeEnv,
    entity: EntityKind,
    sync_id: impl ToString,
    parent: EntityKind,
    parent_sync_id: i64,
) -> Result<i64> {
    let sql = format!(
        "SELECT id FROM {} WHERE source_id = ? AND sync_id = ?",
        table_of(parent)
    );
    let row: Option<(i64,)> = query_as(&sql)
        .bind(env.source_id)
        .bind(parent_sync_id)
        .fetch_optional(&mut *conn)
        .await?;

    if let Some((id,)) = row {
        return Ok(id);
    }

    let sync_id = sync_id.to_string();
    if is_tombstoned(conn, env.source_id, parent, parent_sync_id).await? {
        return Err(SyncError::TombstonedParent {
            entity,
            sync_id,
            parent,
            parent_sync_id,
        });
    }

    Err(SyncError::UnresolvedReference {
        entity,
        sync_id,
        parent,
        parent_sync_id,
    })
}

async fn is_tombstoned(
    conn: &mut SqliteConnection,
    source_id: SourceId,
    kind: EntityKind,
    sync_id: i64,
) -> Result<bool> {
    let Some(table) = tombstone::tombstone_table(kind) else {
        return Ok(false);
    };

    let sql = format!("SELECT 1 FROM {table} WHERE source_id = ? AND sync_id = ?");
    let row: Option<(i64,)> = query_as(&sql)
        .bind(source_id)
        .bind(sync_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

async fn load_versioned(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    source_id: SourceId,
) -> Result<Vec<LocalRow<i64>>> {
    let sql = format!(
        "SELECT id, sync_id, sync_time FROM {} WHERE source_id = ? ORDER BY sync_id ASC",
        table_of(kind)
    );
    let rows: Vec<(i64, i64, i64)> = query_as(&sql)
        .bind(source_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(id, key, version)| LocalRow { id, key, version })
        .collect())
}

async fn delete_row(conn: &mut SqliteConnection, kind: EntityKind, id: i64) -> Result<()> {
    let sql = format!("DELETE FROM {} WHERE id = ?", table_of(kind));
    query(&sql)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| SyncError::from_write(e, kind, id))?;
    Ok(())
}

async fn entomb(
    conn: &mut SqliteConnection,
    env: &MergeEnv,
    kind: EntityKind,
    local: &LocalRow<i64>,
) -> Result<()> {
    tombstone::record(conn, kind, env.source_id, local.key, local.version).await?;
    Ok(())
}

// =============================================================================
// Artist
// =============================================================================

pub struct ArtistEntity;

#[async_trait]
impl EntityDescriptor for ArtistEntity {
    type Remote = RemoteArtist;
    type Key = i64;

    const KIND: EntityKind = EntityKind::Artist;

    fn key(&self, remote: &RemoteArtist) -> i64 {
        remote.sync_id
    }

    fn sync_time(&self, remote: &RemoteArtist) -> Option<i64> {
        Some(remote.sync_time)
    }

    fn needs_update(&self, local: &LocalRow<i64>, remote: &RemoteArtist) -> bool {
        remote.sync_time > local.version
    }

    async fn load_local(
        &self,
        conn: &mut SqliteConnection,
        source_id: SourceId,
    ) -> Result<Vec<LocalRow<i64>>> {
        load_versioned(conn, Self::KIND, source_id).await
    }

    async fn load_tombstones(
        &self,
        conn: &mut SqliteConnection,
        source_id: SourceId,
    ) -> Result<HashSet<i64>> {
        Ok(tombstone::load_sync_ids(conn, Self::KIND, source_id).await?)
    }

    async fn fetch(
        &self,
        catalog: &dyn RemoteCatalog,
        endpoint: &SourceEndpoint,
        after: Option<i64>,
        limit: u32,
    ) -> Result<RemotePage<RemoteArtist>> {
        Ok(catalog.fetch_artists(endpoint, after, limit).await?)
    }

    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        remote: &RemoteArtist,
    ) -> Result<()> {
        let (name, name_prefix) = split_name(&remote.name, &env.name_prefixes);
        query(
            r#"
            INSERT INTO artists (source_id, sync_id, sync_time, name, name_prefix, photo)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(env.source_id)
        .bind(remote.sync_id)
        .bind(remote.sync_time)
        .bind(name)
        .bind(name_prefix)
        .bind(&remote.photo)
        .execute(&mut *conn)
        .await
        .map_err(|e| SyncError::from_write(e, Self::KIND, remote.sync_id))?;

        Ok(())
    }

    async fn update(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        local: &LocalRow<i64>,
        remote: &RemoteArtist,
    ) -> Result<()> {
        let (name, name_prefix) = split_name(&remote.name, &env.name_prefixes);
        query("UPDATE artists SET sync_time = ?, name = ?, name_prefix = ?, photo = ? WHERE id = ?")
            .bind(remote.sync_time)
            .bind(name)
            .bind(name_prefix)
            .bind(&remote.photo)
            .bind(local.id)
            .execute(&mut *conn)
            .await
            .map_err(|e| SyncError::from_write(e, Self::KIND, remote.sync_id))?;

        Ok(())
    }

    async fn delete(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        local: &LocalRow<i64>,
        pending: &mut PendingFiles,
    ) -> Result<()> {
        if let Some(reaper) = &env.reaper {
            reaper
                .collect_artist(conn, ArtistId(local.id), pending)
                .await?;
        }
        delete_row(conn, Self::KIND, local.id).await?;
        entomb(conn, env, Self::KIND, local).await
    }
}

// =============================================================================
// Album
// =============================================================================

pub struct AlbumEntity;

#[async_trait]
impl EntityDescriptor for AlbumEntity {
    type Remote = RemoteAlbum;
    type Key = i64;

    const KIND: EntityKind = EntityKind::Album;

    fn key(&self, remote: &RemoteAlbum) -> i64 {
        remote.sync_id
    }

    fn sync_time(&self, remote: &RemoteAlbum) -> Option<i64> {
        Some(remote.sync_time)
    }

    fn needs_update(&self, local: &LocalRow<i64>, remote: &RemoteAlbum) -> bool {
        remote.sync_time > local.version
    }

    async fn load_local(
        &self,
        conn: &mut SqliteConnection,
        source_id: SourceId,
    ) -> Result<Vec<LocalRow<i64>>> {
        load_versioned(conn, Self::KIND, source_id).await
    }

    async fn load_tombstones(
        &self,
        conn: &mut SqliteConnection,
        source_id: SourceId,
    ) -> Result<HashSet<i64>> {
        Ok(tombstone::load_sync_ids(conn, Self::KIND, source_id).await?)
    }

    async fn fetch(
        &self,
        catalog: &dyn RemoteCatalog,
        endpoint: &SourceEndpoint,
        after: Option<i64>,
        limit: u32,
    ) -> Result<RemotePage<RemoteAlbum>> {
        Ok(catalog.fetch_albums(endpoint, after, limit).await?)
    }

    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        remote: &RemoteAlbum,
    ) -> Result<()> {
        let artist_id = resolve(
            conn,
            env,
            Self::KIND,
            remote.sync_id,
            EntityKind::Artist,
            remote.artist_sync_id,
        )
        .await?;
        let (name, name_prefix) = split_name(&remote.name, &env.name_prefixes);

        query(
            r#"
            INSERT INTO albums (source_id, sync_id, sync_time, artist_id, name, name_prefix,
                                artwork, artwork_big, release_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(env.source_id)
        .bind(remote.sync_id)
        .bind(remote.sync_time)
        .bind(artist_id)
        .bind(name)
        .bind(name_prefix)
        .bind(&remote.artwork)
        .bind(&remote.artwork_big)
        .bind(remote.release_date)
        .execute(&mut *conn)
        .await
        .map_err(|e| SyncError::from_write(e, Self::KIND, remote.sync_id))?;

        Ok(())
    }

    async fn update(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        local: &LocalRow<i64>,
        remote: &RemoteAlbum,
    ) -> Result<()> {
        let artist_id = resolve(
            conn,
            env,
            Self::KIND,
            remote.sync_id,
            EntityKind::Artist,
            remote.artist_sync_id,
        )
        .await?;
        let (name, name_prefix) = split_name(&remote.name, &env.name_prefixes);

        query(
            r#"
            UPDATE albums
            SET sync_time = ?, artist_id = ?, name = ?, name_prefix = ?,
                artwork = ?, artwork_big = ?, release_date = ?
            WHERE id = ?
            "#,
        )
        .bind(remote.sync_time)
        .bind(artist_id)
        .bind(name)
        .bind(name_prefix)
        .bind(&remote.artwork)
        .bind(&remote.artwork_big)
        .bind(remote.release_date)
        .bind(local.id)
        .execute(&mut *conn)
        .await
        .map_err(|e| SyncError::from_write(e, Self::KIND, remote.sync_id))?;

        Ok(())
    }

    async fn delete(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        local: &LocalRow<i64>,
        pending: &mut PendingFiles,
    ) -> Result<()> {
        if let Some(reaper) = &env.reaper {
            reaper.collect_album(AlbumId(local.id), pending);
        }
        delete_row(conn, Self::KIND, local.id).await?;
        entomb(conn, env, Self::KIND, local).await
    }
}

// =============================================================================
// Song
// =============================================================================

pub struct SongEntity;

impl SongEntity {
    async fn resolve_parents(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        remote: &RemoteSong,
    ) -> Result<(i64, Option<i64>)> {
        let artist_id = resolve(
            conn,
            env,
            Self::KIND,
            remote.sync_id,
            EntityKind::Artist,
            remote.artist_sync_id,
        )
        .await?;

        let album_id = match remote.album_sync_id {
            Some(album_sync_id) => Some(
                resolve(
                    conn,
                    env,
                    Self::KIND,
                    remote.sync_id,
                    EntityKind::Album,
                    album_sync_id,
                )
                .await?,
            ),
            None => None,
        };

        Ok((artist_id, album_id))
    }
}

#[async_trait]
impl EntityDescriptor for SongEntity {
    type Remote = RemoteSong;
    type Key = i64;

    const KIND: EntityKind = EntityKind::Song;

    fn key(&self, remote: &RemoteSong) -> i64 {
        remote.sync_id
    }

    fn sync_time(&self, remote: &RemoteSong) -> Option<i64> {
        Some(remote.sync_time)
    }

    fn needs_update(&self, local: &LocalRow<i64>, remote: &RemoteSong) -> bool {
        remote.sync_time > local.version
    }

    async fn load_local(
        &self,
        conn: &mut SqliteConnection,
        source_id: SourceId,
    ) -> Result<Vec<LocalRow<i64>>> {
        load_versioned(conn, Self::KIND, source_id).await
    }

    async fn load_tombstones(
        &self,
        conn: &mut SqliteConnection,
        source_id: SourceId,
    ) -> Result<HashSet<i64>> {
        Ok(tombstone::load_sync_ids(conn, Self::KIND, source_id).await?)
    }

    async fn fetch(
        &self,
        catalog: &dyn RemoteCatalog,
        endpoint: &SourceEndpoint,
        after: Option<i64>,
        limit: u32,
    ) -> Result<RemotePage<RemoteSong>> {
        Ok(catalog.fetch_songs(endpoint, after, limit).await?)
    }

    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        remote: &RemoteSong,
    ) -> Result<()> {
        let (artist_id, album_id) = self.resolve_parents(conn, env, remote).await?;

        query(
            r#"
            INSERT INTO songs (source_id, sync_id, sync_time, artist_id, album_id,
                               title, track, length)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(env.source_id)
        .bind(remote.sync_id)
        .bind(remote.sync_time)
        .bind(artist_id)
        .bind(album_id)
        .bind(&remote.title)
        .bind(remote.track)
        .bind(remote.length)
        .execute(&mut *conn)
        .await
        .map_err(|e| SyncError::from_write(e, Self::KIND, remote.sync_id))?;

        Ok(())
    }

    async fn update(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        local: &LocalRow<i64>,
        remote: &RemoteSong,
    ) -> Result<()> {
        let (artist_id, album_id) = self.resolve_parents(conn, env, remote).await?;

        // The cached media file belongs to the local side and survives updates.
        query(
            r#"
            UPDATE songs
            SET sync_time = ?, artist_id = ?, album_id = ?, title = ?, track = ?, length = ?
            WHERE id = ?
            "#,
        )
        .bind(remote.sync_time)
        .bind(artist_id)
        .bind(album_id)
        .bind(&remote.title)
        .bind(remote.track)
        .bind(remote.length)
        .bind(local.id)
        .execute(&mut *conn)
        .await
        .map_err(|e| SyncError::from_write(e, Self::KIND, remote.sync_id))?;

        Ok(())
    }

    async fn delete(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        local: &LocalRow<i64>,
        pending: &mut PendingFiles,
    ) -> Result<()> {
        if let Some(reaper) = &env.reaper {
            reaper.collect_song(conn, SongId(local.id), pending).await?;
        }
        delete_row(conn, Self::KIND, local.id).await?;
        entomb(conn, env, Self::KIND, local).await
    }
}

// =============================================================================
// Playlist
// =============================================================================

pub struct PlaylistEntity;

#[async_trait]
impl EntityDescriptor for PlaylistEntity {
    type Remote = RemotePlaylist;
    type Key = i64;

    const KIND: EntityKind = EntityKind::Playlist;

    fn key(&self, remote: &RemotePlaylist) -> i64 {
        remote.sync_id
    }

    fn sync_time(&self, remote: &RemotePlaylist) -> Option<i64> {
        Some(remote.sync_time)
    }

    fn needs_update(&self, local: &LocalRow<i64>, remote: &RemotePlaylist) -> bool {
        remote.sync_time > local.version
    }

    async fn load_local(
        &self,
        conn: &mut SqliteConnection,
        source_id: SourceId,
    ) -> Result<Vec<LocalRow<i64>>> {
        load_versioned(conn, Self::KIND, source_id).await
    }

    async fn load_tombstones(
        &self,
        conn: &mut SqliteConnection,
        source_id: SourceId,
    ) -> Result<HashSet<i64>> {
        Ok(tombstone::load_sync_ids(conn, Self::KIND, source_id).await?)
    }

    async fn fetch(
        &self,
        catalog: &dyn RemoteCatalog,
        endpoint: &SourceEndpoint,
        after: Option<i64>,
        limit: u32,
    ) -> Result<RemotePage<RemotePlaylist>> {
        Ok(catalog.fetch_playlists(endpoint, after, limit).await?)
    }

    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        remote: &RemotePlaylist,
    ) -> Result<()> {
        query("INSERT INTO playlists (source_id, sync_id, sync_time, name) VALUES (?, ?, ?, ?)")
            .bind(env.source_id)
            .bind(remote.sync_id)
            .bind(remote.sync_time)
            .bind(&remote.name)
            .execute(&mut *conn)
            .await
            .map_err(|e| SyncError::from_write(e, Self::KIND, remote.sync_id))?;

        Ok(())
    }

    async fn update(
        &self,
        conn: &mut SqliteConnection,
        _env: &MergeEnv,
        local: &LocalRow<i64>,
        remote: &RemotePlaylist,
    ) -> Result<()> {
        query("UPDATE playlists SET sync_time = ?, name = ? WHERE id = ?")
            .bind(remote.sync_time)
            .bind(&remote.name)
            .bind(local.id)
            .execute(&mut *conn)
            .await
            .map_err(|e| SyncError::from_write(e, Self::KIND, remote.sync_id))?;

        Ok(())
    }

    async fn delete(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        local: &LocalRow<i64>,
        _pending: &mut PendingFiles,
    ) -> Result<()> {
        delete_row(conn, Self::KIND, local.id).await?;
        entomb(conn, env, Self::KIND, local).await
    }
}

// =============================================================================
// Playlist membership
// =============================================================================

/// Memberships are keyed by `(playlist sync-id, position)` and versioned by
/// the sync-id of the song they point at. They have no tombstones.
pub struct PlaylistSongEntity;

#[async_trait]
impl EntityDescriptor for PlaylistSongEntity {
    type Remote = RemotePlaylistSong;
    type Key = (i64, i64);

    const KIND: EntityKind = EntityKind::PlaylistSong;

    fn key(&self, remote: &RemotePlaylistSong) -> (i64, i64) {
        remote.key()
    }

    fn sync_time(&self, _remote: &RemotePlaylistSong) -> Option<i64> {
        None
    }

    fn needs_update(&self, local: &LocalRow<(i64, i64)>, remote: &RemotePlaylistSong) -> bool {
        remote.song_sync_id != local.version
    }

    async fn load_local(
        &self,
        conn: &mut SqliteConnection,
        source_id: SourceId,
    ) -> Result<Vec<LocalRow<(i64, i64)>>> {
        let rows: Vec<(i64, i64, i64, i64)> = query_as(
            r#"
            SELECT ps.id, p.sync_id, ps.position, s.sync_id
            FROM playlist_songs ps
            INNER JOIN playlists p ON p.id = ps.playlist_id
            INNER JOIN songs s ON s.id = ps.song_id
            WHERE p.source_id = ?
            ORDER BY p.sync_id ASC, ps.position ASC
            "#,
        )
        .bind(source_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, playlist, position, song)| LocalRow {
                id,
                key: (playlist, position),
                version: song,
            })
            .collect())
    }

    async fn load_tombstones(
        &self,
        _conn: &mut SqliteConnection,
        _source_id: SourceId,
    ) -> Result<HashSet<(i64, i64)>> {
        Ok(HashSet::new())
    }

    async fn fetch(
        &self,
        catalog: &dyn RemoteCatalog,
        endpoint: &SourceEndpoint,
        after: Option<(i64, i64)>,
        limit: u32,
    ) -> Result<RemotePage<RemotePlaylistSong>> {
        Ok(catalog.fetch_playlist_songs(endpoint, after, limit).await?)
    }

    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        remote: &RemotePlaylistSong,
    ) -> Result<()> {
        let key = format!("{:?}", remote.key());
        let playlist_id = resolve(
            conn,
            env,
            Self::KIND,
            &key,
            EntityKind::Playlist,
            remote.playlist_sync_id,
        )
        .await?;
        let song_id = resolve(
            conn,
            env,
            Self::KIND,
            &key,
            EntityKind::Song,
            remote.song_sync_id,
        )
        .await?;

        query("INSERT INTO playlist_songs (playlist_id, song_id, position) VALUES (?, ?, ?)")
            .bind(playlist_id)
            .bind(song_id)
            .bind(remote.position)
            .execute(&mut *conn)
            .await
            .map_err(|e| SyncError::from_write(e, Self::KIND, &key))?;

        Ok(())
    }

    async fn update(
        &self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        local: &LocalRow<(i64, i64)>,
        remote: &RemotePlaylistSong,
    ) -> Result<()> {
        let key = format!("{:?}", remote.key());
        let song_id = resolve(
            conn,
            env,
            Self::KIND,
            &key,
            EntityKind::Song,
            remote.song_sync_id,
        )
        .await?;

        query("UPDATE playlist_songs SET song_id = ? WHERE id = ?")
            .bind(song_id)
            .bind(local.id)
            .execute(&mut *conn)
            .await
            .map_err(|e| SyncError::from_write(e, Self::KIND, &key))?;

        Ok(())
    }

    async fn delete(
        &self,
        conn: &mut SqliteConnection,
        _env: &MergeEnv,
        local: &LocalRow<(i64, i64)>,
        _pending: &mut PendingFiles,
    ) -> Result<()> {
        delete_row(conn, Self::KIND, local.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::create_test_pool;
    use sqlx::SqlitePool;

    async fn setup_test_pool() -> SqlitePool {
        let pool = create_test_pool().await.unwrap();
        query("INSERT INTO sources (id, host, port) VALUES (1, 'music.local', 5545)")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    fn env() -> MergeEnv {
        MergeEnv {
            source_id: SourceId(1),
            name_prefixes: vec!["The ".to_string()],
            reaper: None,
        }
    }

    fn artist(sync_id: i64, sync_time: i64, name: &str) -> RemoteArtist {
        RemoteArtist {
            sync_id,
            sync_time,
            name: name.to_string(),
            photo: None,
        }
    }

    #[core_async::test]
    async fn test_artist_insert_splits_leading_article() {
        let pool = setup_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        ArtistEntity
            .insert(&mut conn, &env(), &artist(1, 10, "The Beatles"))
            .await
            .unwrap();

        let (name, prefix): (String, Option<String>) =
            query_as("SELECT name, name_prefix FROM artists WHERE sync_id = 1")
                .fetch_one(&mut *conn)
                .await
                .unwrap();
        assert_eq!(name, "Beatles");
        assert_eq!(prefix.as_deref(), Some("The "));
    }

    #[core_async::test]
    async fn test_album_with_unknown_artist_is_unresolved() {
        let pool = setup_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let album = RemoteAlbum {
            sync_id: 3,
            sync_time: 10,
            artist_sync_id: 42,
            name: "Help!".to_string(),
            artwork: None,
            artwork_big: None,
            release_date: None,
        };
        let result = AlbumEntity.insert(&mut conn, &env(), &album).await;
        assert!(matches!(
            result,
            Err(SyncError::UnresolvedReference {
                parent: EntityKind::Artist,
                parent_sync_id: 42,
                ..
            })
        ));
    }

    #[core_async::test]
    async fn test_empty_name_is_constraint_violation() {
        let pool = setup_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let result = ArtistEntity.insert(&mut conn, &env(), &artist(7, 1, "")).await;
        match result {
            Err(SyncError::ConstraintViolation {
                entity, sync_id, ..
            }) => {
                assert_eq!(entity, EntityKind::Artist);
                assert_eq!(sync_id, "7");
            }
            other => panic!("expected constraint violation, got {other:?}"),
        }
    }

    #[core_async::test]
    async fn test_delete_writes_tombstone_with_local_sync_time() {
        let pool = setup_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        ArtistEntity
            .insert(&mut conn, &env(), &artist(5, 70, "Low"))
            .await
            .unwrap();
        let local = ArtistEntity
            .load_local(&mut conn, SourceId(1))
            .await
            .unwrap();
        assert_eq!(local.len(), 1);

        let mut pending = PendingFiles::new();
        ArtistEntity
            .delete(&mut conn, &env(), &local[0], &mut pending)
            .await
            .unwrap();

        let tombstones = ArtistEntity
            .load_tombstones(&mut conn, SourceId(1))
            .await
            .unwrap();
        assert_eq!(tombstones, HashSet::from([5]));
        let (sync_time,): (i64,) =
            query_as("SELECT sync_time FROM deleted_artists WHERE sync_id = 5")
                .fetch_one(&mut *conn)
                .await
                .unwrap();
        assert_eq!(sync_time, 70);
    }

    #[core_async::test]
    async fn test_playlist_song_versions_by_song_sync_id() {
        let pool = setup_test_pool().await;
        let statements = [
            "INSERT INTO artists (id, source_id, sync_id, sync_time, name) VALUES (1, 1, 1, 1, 'Low')",
            "INSERT INTO songs (id, source_id, sync_id, sync_time, artist_id, title) VALUES
             (1, 1, 11, 1, 1, 'Monkey'), (2, 1, 12, 1, 1, 'Canada')",
            "INSERT INTO playlists (id, source_id, sync_id, sync_time, name) VALUES (1, 1, 30, 1, 'Mix')",
            "INSERT INTO playlist_songs (playlist_id, song_id, position) VALUES (1, 1, 0)",
        ];
        for sql in statements {
            query(sql).execute(&pool).await.unwrap();
        }
        let mut conn = pool.acquire().await.unwrap();

        let local = PlaylistSongEntity
            .load_local(&mut conn, SourceId(1))
            .await
            .unwrap();
        assert_eq!(local[0].key, (30, 0));
        assert_eq!(local[0].version, 11);

        let moved = RemotePlaylistSong {
            playlist_sync_id: 30,
            position: 0,
            song_sync_id: 12,
        };
        assert!(PlaylistSongEntity.needs_update(&local[0], &moved));
        PlaylistSongEntity
            .update(&mut conn, &env(), &local[0], &moved)
            .await
            .unwrap();

        let (song_id,): (i64,) = query_as("SELECT song_id FROM playlist_songs")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(song_id, 2);
    }
}
