//! Playlist repository trait and implementation

use crate::error::Result;
use crate::models::{Playlist, PlaylistEntry, PlaylistId, PlaylistSong, PlaylistSongId};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Playlist repository interface for data access operations
#[async_trait]
pub trait PlaylistRepository: Send + Sync {
    async fn find_by_id(&self, id: PlaylistId) -> Result<Option<Playlist>>;

    /// All playlists ordered by name
    async fn list(&self) -> Result<Vec<Playlist>>;

    /// Songs of a playlist in position order
    async fn list_songs(&self, id: PlaylistId) -> Result<Vec<PlaylistEntry>>;

    /// The song at one position of a playlist
    async fn song_at(&self, id: PlaylistId, position: i64) -> Result<Option<PlaylistEntry>>;

    /// Raw membership rows across all playlists
    async fn list_memberships(&self) -> Result<Vec<PlaylistSong>>;

    async fn find_membership(&self, id: PlaylistSongId) -> Result<Option<PlaylistSong>>;

    async fn count(&self) -> Result<i64>;

    /// Delete a playlist and its memberships. Songs are untouched.
    async fn delete(&self, id: PlaylistId) -> Result<bool>;
}

/// SQLite implementation of PlaylistRepository
pub struct SqlitePlaylistRepository {
    pool: SqlitePool,
}

impl SqlitePlaylistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const ENTRY_COLUMNS: &str = "ps.position, s.id, s.source_id, s.sync_id, s.sync_time, \
     s.artist_id, s.album_id, s.title, s.track, s.length, s.cache_path";

#[async_trait]
impl PlaylistRepository for SqlitePlaylistRepository {
    async fn find_by_id(&self, id: PlaylistId) -> Result<Option<Playlist>> {
        let playlist = query_as::<_, Playlist>("SELECT * FROM playlists WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(playlist)
    }

    async fn list(&self) -> Result<Vec<Playlist>> {
        let playlists =
            query_as::<_, Playlist>("SELECT * FROM playlists ORDER BY name ASC, id ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(playlists)
    }

    async fn list_songs(&self, id: PlaylistId) -> Result<Vec<PlaylistEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM playlist_songs ps \
             INNER JOIN songs s ON s.id = ps.song_id \
             WHERE ps.playlist_id = ? ORDER BY ps.position ASC"
        );
        let entries = query_as::<_, PlaylistEntry>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    async fn song_at(&self, id: PlaylistId, position: i64) -> Result<Option<PlaylistEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM playlist_songs ps \
             INNER JOIN songs s ON s.id = ps.song_id \
             WHERE ps.playlist_id = ? AND ps.position = ?"
        );
        let entry = query_as::<_, PlaylistEntry>(&sql)
            .bind(id)
            .bind(position)
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    async fn list_memberships(&self) -> Result<Vec<PlaylistSong>> {
        let rows = query_as::<_, PlaylistSong>(
            "SELECT * FROM playlist_songs ORDER BY playlist_id ASC, position ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_membership(&self, id: PlaylistSongId) -> Result<Option<PlaylistSong>> {
        let row = query_as::<_, PlaylistSong>("SELECT * FROM playlist_songs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) as count FROM playlists")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }

    async fn delete(&self, id: PlaylistId) -> Result<bool> {
        let result = query("DELETE FROM playlists WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
