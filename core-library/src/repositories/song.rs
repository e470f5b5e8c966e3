//! Song repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::file_gc::{FileReaper, PendingFiles};
use crate::models::{AlbumId, ArtistId, Song, SongId};
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};
use std::sync::Arc;
use tracing::debug;

/// Song repository interface for data access operations
#[async_trait]
pub trait SongRepository: Send + Sync {
    async fn find_by_id(&self, id: SongId) -> Result<Option<Song>>;

    /// All songs ordered by title
    async fn list(&self) -> Result<Vec<Song>>;

    /// Songs of an artist ordered by title
    async fn list_by_artist(&self, artist_id: ArtistId) -> Result<Vec<Song>>;

    /// Songs of an album in track order
    async fn list_by_album(&self, album_id: AlbumId) -> Result<Vec<Song>>;

    /// An artist's songs on one album in track order
    async fn list_by_artist_on_album(
        &self,
        artist_id: ArtistId,
        album_id: AlbumId,
    ) -> Result<Vec<Song>>;

    /// Query songs with pagination, ordered by title
    async fn query(&self, page_request: PageRequest) -> Result<Page<Song>>;

    async fn count(&self) -> Result<i64>;

    /// Record (or clear) the locally cached media file for a song
    ///
    /// # Errors
    /// Returns `NotFound` if the song does not exist
    async fn set_cache_path(&self, id: SongId, cache_path: Option<&str>) -> Result<()>;

    /// Delete a song and, once committed, its cached media file
    async fn delete(&self, id: SongId) -> Result<bool>;
}

/// SQLite implementation of SongRepository
pub struct SqliteSongRepository {
    pool: SqlitePool,
    reaper: Option<Arc<FileReaper>>,
}

impl SqliteSongRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, reaper: None }
    }

    pub fn with_file_reaper(mut self, reaper: Arc<FileReaper>) -> Self {
        self.reaper = Some(reaper);
        self
    }
}

#[async_trait]
impl SongRepository for SqliteSongRepository {
    async fn find_by_id(&self, id: SongId) -> Result<Option<Song>> {
        let song = query_as::<_, Song>("SELECT * FROM songs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(song)
    }

    async fn list(&self) -> Result<Vec<Song>> {
        let songs = query_as::<_, Song>("SELECT * FROM songs ORDER BY title ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(songs)
    }

    async fn list_by_artist(&self, artist_id: ArtistId) -> Result<Vec<Song>> {
        let songs = query_as::<_, Song>(
            "SELECT * FROM songs WHERE artist_id = ? ORDER BY title ASC, id ASC",
        )
        .bind(artist_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(songs)
    }

    async fn list_by_album(&self, album_id: AlbumId) -> Result<Vec<Song>> {
        let songs = query_as::<_, Song>(
            "SELECT * FROM songs WHERE album_id = ? ORDER BY track ASC, title ASC, id ASC",
        )
        .bind(album_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(songs)
    }

    async fn list_by_artist_on_album(
        &self,
        artist_id: ArtistId,
        album_id: AlbumId,
    ) -> Result<Vec<Song>> {
        let songs = query_as::<_, Song>(
            r#"
            SELECT * FROM songs
            WHERE artist_id = ? AND album_id = ?
            ORDER BY track ASC, title ASC, id ASC
            "#,
        )
        .bind(artist_id)
        .bind(album_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(songs)
    }

    async fn query(&self, page_request: PageRequest) -> Result<Page<Song>> {
        let total = self.count().await?;

        let songs = query_as::<_, Song>(
            "SELECT * FROM songs ORDER BY title ASC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(page_request.limit())
        .bind(page_request.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(songs, total as u64, page_request))
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) as count FROM songs")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }

    async fn set_cache_path(&self, id: SongId, cache_path: Option<&str>) -> Result<()> {
        let result = query("UPDATE songs SET cache_path = ? WHERE id = ?")
            .bind(cache_path)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("Song", id));
        }

        Ok(())
    }

    async fn delete(&self, id: SongId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let mut pending = PendingFiles::new();

        if let Some(reaper) = &self.reaper {
            reaper.collect_song(&mut tx, id, &mut pending).await?;
        }

        let result = query("DELETE FROM songs WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        if let Some(reaper) = &self.reaper {
            let report = reaper.reap(pending).await;
            debug!(song_id = %id, removed = report.removed, "Deleted song");
        }

        Ok(true)
    }
}
