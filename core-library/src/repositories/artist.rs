//! Artist repository trait and implementation

use crate::error::Result;
use crate::file_gc::{FileReaper, PendingFiles};
use crate::models::{Artist, ArtistId, SourceId};
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};
use std::sync::Arc;
use tracing::debug;

/// Artist repository interface for data access operations
#[async_trait]
pub trait ArtistRepository: Send + Sync {
    /// Find an artist by its local ID
    ///
    /// # Returns
    /// - `Ok(Some(artist))` if found
    /// - `Ok(None)` if not found
    /// - `Err` if database error occurs
    async fn find_by_id(&self, id: ArtistId) -> Result<Option<Artist>>;

    /// Find an artist by the remote identity it was synced under
    async fn find_by_sync_id(&self, source_id: SourceId, sync_id: i64) -> Result<Option<Artist>>;

    /// All artists ordered by name (leading article ignored)
    async fn list(&self) -> Result<Vec<Artist>>;

    /// Query artists with pagination, ordered by name
    async fn query(&self, page_request: PageRequest) -> Result<Page<Artist>>;

    /// Count total artists
    async fn count(&self) -> Result<i64>;

    /// Delete an artist together with its albums and songs.
    ///
    /// The artist's photo, its albums' artwork and its songs' cached media are
    /// removed once the delete has committed.
    ///
    /// # Returns
    /// - `Ok(true)` if the artist was deleted
    /// - `Ok(false)` if it was not found
    async fn delete(&self, id: ArtistId) -> Result<bool>;
}

/// SQLite implementation of ArtistRepository
pub struct SqliteArtistRepository {
    pool: SqlitePool,
    reaper: Option<Arc<FileReaper>>,
}

impl SqliteArtistRepository {
    /// Create a new SqliteArtistRepository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, reaper: None }
    }

    /// Remove owned files when rows are deleted through this repository
    pub fn with_file_reaper(mut self, reaper: Arc<FileReaper>) -> Self {
        self.reaper = Some(reaper);
        self
    }
}

#[async_trait]
impl ArtistRepository for SqliteArtistRepository {
    async fn find_by_id(&self, id: ArtistId) -> Result<Option<Artist>> {
        let artist = query_as::<_, Artist>("SELECT * FROM artists WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(artist)
    }

    async fn find_by_sync_id(&self, source_id: SourceId, sync_id: i64) -> Result<Option<Artist>> {
        let artist =
            query_as::<_, Artist>("SELECT * FROM artists WHERE source_id = ? AND sync_id = ?")
                .bind(source_id)
                .bind(sync_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(artist)
    }

    async fn list(&self) -> Result<Vec<Artist>> {
        let artists = query_as::<_, Artist>("SELECT * FROM artists ORDER BY name ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(artists)
    }

    async fn query(&self, page_request: PageRequest) -> Result<Page<Artist>> {
        let total = self.count().await?;

        let artists = query_as::<_, Artist>(
            "SELECT * FROM artists ORDER BY name ASC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(page_request.limit())
        .bind(page_request.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(artists, total as u64, page_request))
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) as count FROM artists")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }

    async fn delete(&self, id: ArtistId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let mut pending = PendingFiles::new();

        if let Some(reaper) = &self.reaper {
            reaper.collect_artist(&mut tx, id, &mut pending).await?;
        }

        let result = query("DELETE FROM artists WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        if let Some(reaper) = &self.reaper {
            let report = reaper.reap(pending).await;
            debug!(artist_id = %id, removed = report.removed, "Deleted artist");
        }

        Ok(true)
    }
}
