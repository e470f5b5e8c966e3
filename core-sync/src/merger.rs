//! # Table Merger
//!
//! Sorted merge-join of one source's local rows against the remote
//! enumeration of the same entity kind, one page at a time.
//!
//! - remote key with no local match: insert (unless it or a parent is tombstoned)
//! - remote key with a local match: update when the descriptor says so
//! - local key the remote skipped over: deletion candidate
//!
//! Candidates are only deleted once the final page has been merged; until
//! then the enumeration is incomplete and nothing can be inferred from an
//! absent key.

use crate::context::SyncStats;
use crate::entity::{EntityDescriptor, LocalRow, MergeEnv};
use crate::{Result, SyncError};
use bridge_traits::RemotePage;
use core_library::models::SourceId;
use core_library::PendingFiles;
use sqlx::SqliteConnection;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, trace};

/// Merge state of one entity kind for one source
pub struct TableMerger<D: EntityDescriptor> {
    descriptor: D,
    local: VecDeque<LocalRow<D::Key>>,
    tombstones: HashSet<D::Key>,
    candidates: Vec<LocalRow<D::Key>>,
    last_key: Option<D::Key>,
    newest_sync_time: Option<i64>,
    finished: bool,
    stats: SyncStats,
}

impl<D: EntityDescriptor> TableMerger<D> {
    /// Snapshot the local key index and tombstones of the source.
    pub async fn begin(
        descriptor: D,
        conn: &mut SqliteConnection,
        source_id: SourceId,
    ) -> Result<Self> {
        let local = descriptor.load_local(conn, source_id).await?;
        let tombstones = descriptor.load_tombstones(conn, source_id).await?;

        debug!(
            entity = %D::KIND,
            source_id = %source_id,
            local = local.len(),
            tombstones = tombstones.len(),
            "Beginning table merge"
        );

        Ok(Self {
            descriptor,
            local: local.into(),
            tombstones,
            candidates: Vec::new(),
            last_key: None,
            newest_sync_time: None,
            finished: false,
            stats: SyncStats::default(),
        })
    }

    pub fn descriptor(&self) -> &D {
        &self.descriptor
    }

    /// Exclusive cursor for the next remote page
    pub fn cursor(&self) -> Option<D::Key> {
        self.last_key
    }

    /// Whether the final page has been merged
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Newest remote sync-time seen so far
    pub fn newest_sync_time(&self) -> Option<i64> {
        self.newest_sync_time
    }

    /// Merge one remote page. `on_item` is called after each record with its
    /// index within the page and the page length.
    ///
    /// Returns the rows written by this page. Files owned by deleted rows are
    /// collected into `pending`.
    pub async fn merge_page(
        &mut self,
        conn: &mut SqliteConnection,
        env: &MergeEnv,
        page: RemotePage<D::Remote>,
        pending: &mut PendingFiles,
        on_item: &mut (dyn FnMut(usize, usize) + Send),
    ) -> Result<SyncStats> {
        if self.finished {
            return Ok(SyncStats::default());
        }

        self.check_order(&page.records)?;
        if page.records.is_empty() && page.more_remaining {
            return Err(SyncError::Remote(format!(
                "empty {} page with more remaining",
                D::KIND
            )));
        }

        let mut stats = SyncStats::default();
        let total = page.records.len();

        for (index, remote) in page.records.iter().enumerate() {
            let key = self.descriptor.key(remote);

            while self.local.front().is_some_and(|local| local.key < key) {
                if let Some(skipped) = self.local.pop_front() {
                    self.candidates.push(skipped);
                }
            }

            match self.local.front() {
                Some(local) if local.key == key => {
                    let local = *local;
                    self.local.pop_front();
                    if self.descriptor.needs_update(&local, remote) {
                        trace!(entity = %D::KIND, key = ?key, "Updating");
                        let result = self.descriptor.update(conn, env, &local, remote).await;
                        if applied(result, key)? {
                            stats.updated += 1;
                        }
                    }
                }
                _ if self.tombstones.contains(&key) => {
                    trace!(entity = %D::KIND, key = ?key, "Skipping tombstoned record");
                }
                _ => {
                    trace!(entity = %D::KIND, key = ?key, "Inserting");
                    let result = self.descriptor.insert(conn, env, remote).await;
                    if applied(result, key)? {
                        stats.inserted += 1;
                    }
                }
            }

            let sync_time = self.descriptor.sync_time(remote);
            self.newest_sync_time = self.newest_sync_time.max(sync_time);
            self.last_key = Some(key);
            on_item(index + 1, total);
        }

        if !page.more_remaining {
            self.candidates.extend(self.local.drain(..));
            for local in std::mem::take(&mut self.candidates) {
                trace!(entity = %D::KIND, key = ?local.key, "Deleting");
                self.descriptor.delete(conn, env, &local, pending).await?;
                stats.deleted += 1;
            }
            self.finished = true;
        }

        self.stats += stats;
        Ok(stats)
    }

    /// Keys must ascend strictly, across page boundaries as well.
    fn check_order(&self, records: &[D::Remote]) -> Result<()> {
        let mut previous = self.last_key;
        for remote in records {
            let key = self.descriptor.key(remote);
            if previous.is_some_and(|prev| key <= prev) {
                return Err(SyncError::OutOfOrderBatch {
                    entity: D::KIND,
                    sync_id: format!("{key:?}"),
                });
            }
            previous = Some(key);
        }
        Ok(())
    }
}

/// `Ok(false)` when the record was skipped because its parent is tombstoned.
fn applied<K: std::fmt::Debug>(result: Result<()>, key: K) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(SyncError::TombstonedParent {
            entity,
            parent,
            parent_sync_id,
            ..
        }) => {
            trace!(
                entity = %entity,
                key = ?key,
                parent = %parent,
                parent_sync_id,
                "Skipping record of tombstoned parent"
            );
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ArtistEntity, PlaylistSongEntity};
    use bridge_traits::{RemoteArtist, RemotePlaylistSong};
    use core_library::create_test_pool;
    use sqlx::{query, query_as, SqlitePool};

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

    fn artist(sync_id: i64, sync_time: i64) -> RemoteArtist {
        RemoteArtist {
            sync_id,
            sync_time,
            name: format!("Artist {sync_id}"),
            photo: None,
        }
    }

    async fn merge_all(
        conn: &mut SqliteConnection,
        pages: Vec<RemotePage<RemoteArtist>>,
    ) -> Result<SyncStats> {
        let mut merger = TableMerger::begin(ArtistEntity, conn, SourceId(1)).await?;
        let mut pending = PendingFiles::new();
        for page in pages {
            merger
                .merge_page(conn, &env(), page, &mut pending, &mut |_, _| {})
                .await?;
        }
        assert!(merger.is_finished());
        Ok(merger.stats())
    }

    async fn artist_rows(conn: &mut SqliteConnection) -> Vec<(i64, i64)> {
        query_as("SELECT sync_id, sync_time FROM artists ORDER BY sync_id")
            .fetch_all(&mut *conn)
            .await
            .unwrap()
    }

    #[core_async::test]
    async fn test_identical_snapshot_is_idempotent() {
        let pool = setup_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let snapshot = || {
            vec![
                RemotePage::partial(vec![artist(1, 10), artist(2, 10)]),
                RemotePage::last(vec![artist(5, 10)]),
            ]
        };

        let first = merge_all(&mut conn, snapshot()).await.unwrap();
        assert_eq!(first.inserted, 3);

        let second = merge_all(&mut conn, snapshot()).await.unwrap();
        assert!(second.is_empty());
    }

    #[core_async::test]
    async fn test_newer_sync_time_updates_once() {
        let pool = setup_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        merge_all(&mut conn, vec![RemotePage::last(vec![artist(1, 10), artist(2, 10)])])
            .await
            .unwrap();

        let stats = merge_all(
            &mut conn,
            vec![RemotePage::last(vec![artist(1, 10), artist(2, 25)])],
        )
        .await
        .unwrap();

        assert_eq!((stats.inserted, stats.updated, stats.deleted), (0, 1, 0));
        assert_eq!(artist_rows(&mut conn).await, vec![(1, 10), (2, 25)]);
    }

    #[core_async::test]
    async fn test_older_sync_time_is_ignored() {
        let pool = setup_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        merge_all(&mut conn, vec![RemotePage::last(vec![artist(1, 50)])])
            .await
            .unwrap();

        let stats = merge_all(&mut conn, vec![RemotePage::last(vec![artist(1, 20)])])
            .await
            .unwrap();
        assert!(stats.is_empty());
        assert_eq!(artist_rows(&mut conn).await, vec![(1, 50)]);
    }

    #[core_async::test]
    async fn test_absent_rows_deleted_only_after_final_page() {
        let pool = setup_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        merge_all(
            &mut conn,
            vec![RemotePage::last(vec![artist(1, 1), artist(2, 1), artist(3, 1), artist(4, 1)])],
        )
        .await
        .unwrap();

        let mut merger = TableMerger::begin(ArtistEntity, &mut conn, SourceId(1))
            .await
            .unwrap();
        let mut pending = PendingFiles::new();

        let first = merger
            .merge_page(
                &mut conn,
                &env(),
                RemotePage::partial(vec![artist(3, 1)]),
                &mut pending,
                &mut |_, _| {},
            )
            .await
            .unwrap();
        assert_eq!(first.deleted, 0);
        assert_eq!(artist_rows(&mut conn).await.len(), 4);

        let last = merger
            .merge_page(&mut conn, &env(), RemotePage::last(vec![]), &mut pending, &mut |_, _| {})
            .await
            .unwrap();
        assert_eq!(last.deleted, 3);
        assert_eq!(artist_rows(&mut conn).await, vec![(3, 1)]);

        let (tombstones,): (i64,) = query_as("SELECT COUNT(*) FROM deleted_artists")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(tombstones, 3);
    }

    #[core_async::test]
    async fn test_tombstoned_sync_id_is_not_reinserted() {
        let pool = setup_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        merge_all(&mut conn, vec![RemotePage::last(vec![artist(1, 1), artist(2, 1)])])
            .await
            .unwrap();
        merge_all(&mut conn, vec![RemotePage::last(vec![artist(1, 1)])])
            .await
            .unwrap();

        let stats = merge_all(&mut conn, vec![RemotePage::last(vec![artist(1, 1), artist(2, 9)])])
            .await
            .unwrap();
        assert!(stats.is_empty());
        assert_eq!(artist_rows(&mut conn).await, vec![(1, 1)]);
    }

    #[core_async::test]
    async fn test_out_of_order_page_rejected() {
        let pool = setup_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let within = merge_all(&mut conn, vec![RemotePage::last(vec![artist(2, 1), artist(1, 1)])]).await;
        assert!(matches!(within, Err(SyncError::OutOfOrderBatch { .. })));

        let across = merge_all(
            &mut conn,
            vec![
                RemotePage::partial(vec![artist(1, 1), artist(4, 1)]),
                RemotePage::last(vec![artist(4, 1)]),
            ],
        )
        .await;
        assert!(matches!(across, Err(SyncError::OutOfOrderBatch { .. })));
    }

    #[core_async::test]
    async fn test_empty_partial_page_is_protocol_error() {
        let pool = setup_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let result = merge_all(&mut conn, vec![RemotePage::partial(vec![])]).await;
        assert!(matches!(result, Err(SyncError::Remote(_))));
    }

    #[core_async::test]
    async fn test_tracks_newest_sync_time_and_cursor() {
        let pool = setup_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut merger = TableMerger::begin(ArtistEntity, &mut conn, SourceId(1))
            .await
            .unwrap();
        let mut seen = Vec::new();

        merger
            .merge_page(
                &mut conn,
                &env(),
                RemotePage::partial(vec![artist(3, 40), artist(8, 15)]),
                &mut PendingFiles::new(),
                &mut |index, total| seen.push((index, total)),
            )
            .await
            .unwrap();

        assert_eq!(merger.cursor(), Some(8));
        assert_eq!(merger.newest_sync_time(), Some(40));
        assert!(!merger.is_finished());
        assert_eq!(seen, vec![(1, 2), (2, 2)]);
    }

    #[core_async::test]
    async fn test_playlist_songs_merge_on_composite_key() {
        let pool = setup_test_pool().await;
        let statements = [
            "INSERT INTO artists (id, source_id, sync_id, sync_time, name) VALUES (1, 1, 1, 1, 'Low')",
            "INSERT INTO songs (id, source_id, sync_id, sync_time, artist_id, title) VALUES
             (1, 1, 11, 1, 1, 'Monkey'), (2, 1, 12, 1, 1, 'Canada')",
            "INSERT INTO playlists (id, source_id, sync_id, sync_time, name) VALUES
             (1, 1, 30, 1, 'Mix'), (2, 1, 31, 1, 'Other')",
        ];
        for sql in statements {
            query(sql).execute(&pool).await.unwrap();
        }
        let mut conn = pool.acquire().await.unwrap();
        let member = |playlist, position, song| RemotePlaylistSong {
            playlist_sync_id: playlist,
            position,
            song_sync_id: song,
        };

        let mut merger = TableMerger::begin(PlaylistSongEntity, &mut conn, SourceId(1))
            .await
            .unwrap();
        let stats = merger
            .merge_page(
                &mut conn,
                &env(),
                RemotePage::last(vec![member(30, 0, 11), member(30, 1, 12), member(31, 0, 12)]),
                &mut PendingFiles::new(),
                &mut |_, _| {},
            )
            .await
            .unwrap();
        assert_eq!(stats.inserted, 3);
        assert_eq!(merger.newest_sync_time(), None);

        let mut merger = TableMerger::begin(PlaylistSongEntity, &mut conn, SourceId(1))
            .await
            .unwrap();
        let stats = merger
            .merge_page(
                &mut conn,
                &env(),
                RemotePage::last(vec![member(30, 0, 12), member(31, 0, 12)]),
                &mut PendingFiles::new(),
                &mut |_, _| {},
            )
            .await
            .unwrap();
        assert_eq!((stats.inserted, stats.updated, stats.deleted), (0, 1, 1));

        let (remaining,): (i64,) = query_as("SELECT COUNT(*) FROM playlist_songs")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(remaining, 2);
    }
}
