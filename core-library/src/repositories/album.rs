//! Album repository trait and implementation

use crate::error::Result;
use crate::file_gc::{FileReaper, PendingFiles};
use crate::models::{Album, AlbumId, ArtistId, COMPLETE_ALBUM_MIN_SONGS};
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};
use std::sync::Arc;
use tracing::debug;

/// Album repository interface for data access operations
#[async_trait]
pub trait AlbumRepository: Send + Sync {
    async fn find_by_id(&self, id: AlbumId) -> Result<Option<Album>>;

    /// All albums ordered by name
    async fn list(&self) -> Result<Vec<Album>>;

    /// Albums holding more than three songs, ordered by name
    async fn list_complete(&self) -> Result<Vec<Album>>;

    /// Albums credited to an artist
    async fn list_by_artist(&self, artist_id: ArtistId) -> Result<Vec<Album>>;

    /// Albums containing at least one of the artist's songs, including
    /// compilations credited to someone else.
    ///
    /// `num_songs` on each returned album counts only that artist's songs.
    async fn list_with_artist_songs(&self, artist_id: ArtistId) -> Result<Vec<Album>>;

    /// Query albums with pagination, ordered by name
    async fn query(&self, page_request: PageRequest) -> Result<Page<Album>>;

    async fn count(&self) -> Result<i64>;

    /// Delete an album. Its songs are kept and lose their album reference;
    /// both artwork files are removed once the delete has committed.
    async fn delete(&self, id: AlbumId) -> Result<bool>;
}

/// SQLite implementation of AlbumRepository
pub struct SqliteAlbumRepository {
    pool: SqlitePool,
    reaper: Option<Arc<FileReaper>>,
}

impl SqliteAlbumRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, reaper: None }
    }

    pub fn with_file_reaper(mut self, reaper: Arc<FileReaper>) -> Self {
        self.reaper = Some(reaper);
        self
    }
}

#[async_trait]
impl AlbumRepository for SqliteAlbumRepository {
    async fn find_by_id(&self, id: AlbumId) -> Result<Option<Album>> {
        let album = query_as::<_, Album>("SELECT * FROM albums WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(album)
    }

    async fn list(&self) -> Result<Vec<Album>> {
        let albums = query_as::<_, Album>("SELECT * FROM albums ORDER BY name ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(albums)
    }

    async fn list_complete(&self) -> Result<Vec<Album>> {
        let albums = query_as::<_, Album>(
            "SELECT * FROM albums WHERE num_songs > ? ORDER BY name ASC, id ASC",
        )
        .bind(COMPLETE_ALBUM_MIN_SONGS)
        .fetch_all(&self.pool)
        .await?;

        Ok(albums)
    }

    async fn list_by_artist(&self, artist_id: ArtistId) -> Result<Vec<Album>> {
        let albums = query_as::<_, Album>(
            "SELECT * FROM albums WHERE artist_id = ? ORDER BY name ASC, id ASC",
        )
        .bind(artist_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(albums)
    }

    async fn list_with_artist_songs(&self, artist_id: ArtistId) -> Result<Vec<Album>> {
        let albums = query_as::<_, Album>(
            r#"
            SELECT a.id, a.source_id, a.sync_id, a.sync_time, a.artist_id, a.name,
                   a.name_prefix, a.artwork, a.artwork_big, a.release_date,
                   COUNT(s.id) AS num_songs
            FROM songs s
            INNER JOIN albums a ON a.id = s.album_id
            WHERE s.artist_id = ?
            GROUP BY a.id
            ORDER BY a.name ASC, a.id ASC
            "#,
        )
        .bind(artist_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(albums)
    }

    async fn query(&self, page_request: PageRequest) -> Result<Page<Album>> {
        let total = self.count().await?;

        let albums = query_as::<_, Album>(
            "SELECT * FROM albums ORDER BY name ASC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(page_request.limit())
        .bind(page_request.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(albums, total as u64, page_request))
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) as count FROM albums")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }

    async fn delete(&self, id: AlbumId) -> Result<bool> {
        let result = query("DELETE FROM albums WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        if let Some(reaper) = &self.reaper {
            let mut pending = PendingFiles::new();
            reaper.collect_album(id, &mut pending);
            let report = reaper.reap(pending).await;
            debug!(album_id = %id, removed = report.removed, "Deleted album");
        }

        Ok(true)
    }
}
