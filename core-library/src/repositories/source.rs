//! Source repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{Source, SourceId};
use async_trait::async_trait;
use sqlx::{query, query_as, SqliteConnection, SqlitePool};

/// Remote origins the library replicates from
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Register a new source. It starts unsynchronized (watermark 0).
    ///
    /// # Errors
    /// Returns error if:
    /// - host is empty or port is out of range
    /// - a source with the same host and port already exists
    async fn insert(&self, host: &str, port: u16) -> Result<SourceId>;

    async fn find_by_id(&self, id: SourceId) -> Result<Option<Source>>;

    /// All sources, ordered by id (the order in which they are synced)
    async fn list(&self) -> Result<Vec<Source>>;

    /// Delete a source together with everything replicated from it.
    ///
    /// # Returns
    /// - `Ok(true)` if the source was deleted
    /// - `Ok(false)` if it did not exist
    async fn delete(&self, id: SourceId) -> Result<bool>;
}

/// SQLite implementation of SourceRepository
pub struct SqliteSourceRepository {
    pool: SqlitePool,
}

impl SqliteSourceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceRepository for SqliteSourceRepository {
    async fn insert(&self, host: &str, port: u16) -> Result<SourceId> {
        Source::validate(host, i64::from(port)).map_err(|e| LibraryError::InvalidInput {
            field: "Source".to_string(),
            message: e,
        })?;

        let result = query("INSERT INTO sources (host, port) VALUES (?, ?)")
            .bind(host)
            .bind(i64::from(port))
            .execute(&self.pool)
            .await?;

        Ok(SourceId(result.last_insert_rowid()))
    }

    async fn find_by_id(&self, id: SourceId) -> Result<Option<Source>> {
        let source = query_as::<_, Source>("SELECT * FROM sources WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(source)
    }

    async fn list(&self) -> Result<Vec<Source>> {
        let sources = query_as::<_, Source>("SELECT * FROM sources ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(sources)
    }

    async fn delete(&self, id: SourceId) -> Result<bool> {
        // Foreign keys cascade into every entity and tombstone table.
        let result = query("DELETE FROM sources WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Advance a source's watermark after a successful merge.
///
/// Runs on the sync transaction's connection so that the watermark commits
/// together with the merged rows. The watermark never moves backwards and
/// every call bumps the revision.
pub async fn record_sync(
    conn: &mut SqliteConnection,
    source_id: SourceId,
    newest_sync_time: i64,
) -> Result<()> {
    let result = query(
        r#"
        UPDATE sources
        SET last_sync_time = MAX(last_sync_time, ?),
            revision = revision + 1
        WHERE id = ?
        "#,
    )
    .bind(newest_sync_time)
    .bind(source_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(LibraryError::not_found("Source", source_id));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[core_async::test]
    async fn test_insert_and_find_source() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSourceRepository::new(pool);

        let id = repo.insert("music.local", 5545).await.unwrap();
        let source = repo.find_by_id(id).await.unwrap().unwrap();

        assert_eq!(source.host, "music.local");
        assert_eq!(source.port, 5545);
        assert_eq!(source.last_sync_time, 0);
        assert_eq!(source.revision, 0);
    }

    #[core_async::test]
    async fn test_insert_rejects_invalid_source() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSourceRepository::new(pool);

        assert!(matches!(
            repo.insert("", 5545).await,
            Err(LibraryError::InvalidInput { .. })
        ));
        assert!(repo.insert("music.local", 0).await.is_err());

        repo.insert("music.local", 5545).await.unwrap();
        assert!(matches!(
            repo.insert("music.local", 5545).await,
            Err(LibraryError::Database(_))
        ));
    }

    #[core_async::test]
    async fn test_list_orders_by_id() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSourceRepository::new(pool);

        let b = repo.insert("b.local", 1).await.unwrap();
        let a = repo.insert("a.local", 1).await.unwrap();

        let ids: Vec<_> = repo.list().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[core_async::test]
    async fn test_record_sync_never_moves_backwards() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSourceRepository::new(pool.clone());
        let id = repo.insert("music.local", 5545).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        record_sync(&mut conn, id, 500).await.unwrap();
        record_sync(&mut conn, id, 200).await.unwrap();
        drop(conn);

        let source = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(source.last_sync_time, 500);
        assert_eq!(source.revision, 2);
    }

    #[core_async::test]
    async fn test_record_sync_unknown_source() {
        let pool = create_test_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let result = record_sync(&mut conn, SourceId(99), 1).await;
        assert!(matches!(result, Err(LibraryError::NotFound { .. })));
    }

    #[core_async::test]
    async fn test_delete_cascades_to_entities() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSourceRepository::new(pool.clone());
        let id = repo.insert("music.local", 5545).await.unwrap();

        query("INSERT INTO artists (source_id, sync_id, sync_time, name) VALUES (?, 1, 1, 'Low')")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();
        query("INSERT INTO deleted_artists (source_id, sync_id, sync_time) VALUES (?, 2, 1)")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(repo.delete(id).await.unwrap());
        assert!(!repo.delete(id).await.unwrap());

        let (artists,): (i64,) = query_as("SELECT COUNT(*) FROM artists")
            .fetch_one(&pool)
            .await
            .unwrap();
        let (tombstones,): (i64,) = query_as("SELECT COUNT(*) FROM deleted_artists")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(artists, 0);
        assert_eq!(tombstones, 0);
    }
}
