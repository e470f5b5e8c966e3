//! Tombstone repository
//!
//! Artists, albums, songs and playlists each keep a parallel `deleted_*`
//! table of remote-observed deletions. Playlist memberships have none.

use crate::error::{LibraryError, Result};
use crate::models::{SourceId, Tombstone};
use async_trait::async_trait;
use bridge_traits::EntityKind;
use sqlx::{query, query_as, SqliteConnection, SqlitePool};
use std::collections::HashSet;

/// Tombstone table backing an entity kind, if it has one
pub fn tombstone_table(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Artist => Some("deleted_artists"),
        EntityKind::Album => Some("deleted_albums"),
        EntityKind::Song => Some("deleted_songs"),
        EntityKind::Playlist => Some("deleted_playlists"),
        EntityKind::PlaylistSong => None,
    }
}

fn require_table(kind: EntityKind) -> Result<&'static str> {
    tombstone_table(kind).ok_or_else(|| LibraryError::InvalidInput {
        field: "kind".to_string(),
        message: format!("{kind} has no tombstones"),
    })
}

#[async_trait]
pub trait TombstoneRepository: Send + Sync {
    /// All tombstones of a kind, ordered by source then sync-id
    async fn list(&self, kind: EntityKind) -> Result<Vec<Tombstone>>;

    async fn list_for_source(&self, kind: EntityKind, source_id: SourceId)
        -> Result<Vec<Tombstone>>;

    /// Drop tombstones older than `sync_time`, allowing those sync-ids to be
    /// inserted again. Returns the number purged.
    async fn purge_older_than(&self, kind: EntityKind, sync_time: i64) -> Result<u64>;
}

pub struct SqliteTombstoneRepository {
    pool: SqlitePool,
}

impl SqliteTombstoneRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TombstoneRepository for SqliteTombstoneRepository {
    async fn list(&self, kind: EntityKind) -> Result<Vec<Tombstone>> {
        let table = require_table(kind)?;
        let sql = format!("SELECT * FROM {table} ORDER BY source_id ASC, sync_id ASC");
        let rows = query_as::<_, Tombstone>(&sql).fetch_all(&self.pool).await?;

        Ok(rows)
    }

    async fn list_for_source(
        &self,
        kind: EntityKind,
        source_id: SourceId,
    ) -> Result<Vec<Tombstone>> {
        let table = require_table(kind)?;
        let sql = format!("SELECT * FROM {table} WHERE source_id = ? ORDER BY sync_id ASC");
        let rows = query_as::<_, Tombstone>(&sql)
            .bind(source_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn purge_older_than(&self, kind: EntityKind, sync_time: i64) -> Result<u64> {
        let table = require_table(kind)?;
        let sql = format!("DELETE FROM {table} WHERE sync_time < ?");
        let result = query(&sql).bind(sync_time).execute(&self.pool).await?;

        Ok(result.rows_affected())
    }
}

/// Record a remote-observed deletion. Recording the same sync-id twice keeps
/// a single tombstone carrying the newer sync-time.
pub async fn record(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    source_id: SourceId,
    sync_id: i64,
    sync_time: i64,
) -> Result<()> {
    let table = require_table(kind)?;
    let sql = format!(
        "INSERT INTO {table} (source_id, sync_id, sync_time) VALUES (?, ?, ?) \
         ON CONFLICT (source_id, sync_id) DO UPDATE SET sync_time = MAX(sync_time, excluded.sync_time)"
    );
    query(&sql)
        .bind(source_id)
        .bind(sync_id)
        .bind(sync_time)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Tombstoned sync-ids of one source. Kinds without tombstones yield an
/// empty set.
pub async fn load_sync_ids(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    source_id: SourceId,
) -> Result<HashSet<i64>> {
    let Some(table) = tombstone_table(kind) else {
        return Ok(HashSet::new());
    };

    let sql = format!("SELECT sync_id FROM {table} WHERE source_id = ?");
    let rows: Vec<(i64,)> = query_as(&sql)
        .bind(source_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn setup_test_pool() -> SqlitePool {
        let pool = create_test_pool().await.unwrap();
        query("INSERT INTO sources (id, host, port) VALUES (1, 'a', 1), (2, 'b', 1)")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[core_async::test]
    async fn test_record_is_single_per_sync_id() {
        let pool = setup_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        record(&mut conn, EntityKind::Song, SourceId(1), 7, 100).await.unwrap();
        record(&mut conn, EntityKind::Song, SourceId(1), 7, 300).await.unwrap();
        record(&mut conn, EntityKind::Song, SourceId(1), 7, 200).await.unwrap();
        record(&mut conn, EntityKind::Song, SourceId(2), 7, 100).await.unwrap();
        drop(conn);

        let repo = SqliteTombstoneRepository::new(pool);
        let rows = repo.list_for_source(EntityKind::Song, SourceId(1)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].sync_id, rows[0].sync_time), (7, 300));
        assert_eq!(repo.list(EntityKind::Song).await.unwrap().len(), 2);
    }

    #[core_async::test]
    async fn test_load_sync_ids_scoped_to_source() {
        let pool = setup_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        record(&mut conn, EntityKind::Artist, SourceId(1), 1, 1).await.unwrap();
        record(&mut conn, EntityKind::Artist, SourceId(1), 4, 1).await.unwrap();
        record(&mut conn, EntityKind::Artist, SourceId(2), 9, 1).await.unwrap();

        let ids = load_sync_ids(&mut conn, EntityKind::Artist, SourceId(1)).await.unwrap();
        assert_eq!(ids, HashSet::from([1, 4]));

        let none = load_sync_ids(&mut conn, EntityKind::PlaylistSong, SourceId(1))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[core_async::test]
    async fn test_playlist_songs_have_no_tombstones() {
        let pool = setup_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let result = record(&mut conn, EntityKind::PlaylistSong, SourceId(1), 1, 1).await;
        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
    }

    #[core_async::test]
    async fn test_purge_older_than() {
        let pool = setup_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        record(&mut conn, EntityKind::Album, SourceId(1), 1, 100).await.unwrap();
        record(&mut conn, EntityKind::Album, SourceId(1), 2, 500).await.unwrap();
        drop(conn);

        let repo = SqliteTombstoneRepository::new(pool);
        assert_eq!(repo.purge_older_than(EntityKind::Album, 300).await.unwrap(), 1);

        let remaining = repo.list(EntityKind::Album).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].sync_id, 2);
    }
}
