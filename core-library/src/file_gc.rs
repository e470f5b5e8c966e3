//! # File Lifecycle GC
//!
//! Rows own files on disk: a song its cached media, an artist its photo, an
//! album its two artwork sizes. Deleting the row is authoritative; removing the
//! file is best-effort.
//!
//! Paths are collected into [`PendingFiles`] on the deleting transaction's
//! connection, *before* the rows disappear (cascades would otherwise hide the
//! children), and handed to [`FileReaper::reap`] only once that transaction has
//! committed. A rolled-back transaction simply drops its `PendingFiles`.

use bridge_traits::storage::FileSystemAccess;
use sqlx::{query_as, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{AlbumId, ArtistId, SongId};

/// Where media files live on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPaths {
    /// Cached song media. Relative `cache_path` values resolve against it.
    pub cache_dir: PathBuf,
    /// Artist photos and album artwork
    pub artwork_dir: PathBuf,
}

impl MediaPaths {
    pub fn new(cache_dir: impl Into<PathBuf>, artwork_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            artwork_dir: artwork_dir.into(),
        }
    }

    pub fn artist_photo(&self, id: ArtistId) -> PathBuf {
        self.artwork_dir.join("artists").join(id.to_string())
    }

    pub fn album_artwork(&self, id: AlbumId) -> PathBuf {
        self.artwork_dir.join("albums").join(id.to_string())
    }

    pub fn album_artwork_big(&self, id: AlbumId) -> PathBuf {
        self.artwork_dir.join("albums").join(format!("{id}-big"))
    }

    pub fn song_cache(&self, cache_path: &str) -> PathBuf {
        let path = Path::new(cache_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cache_dir.join(path)
        }
    }
}

/// Files whose owning rows were deleted by a still-open transaction
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingFiles(Vec<PathBuf>);

impl PendingFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: PathBuf) {
        self.0.push(path);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.0
    }
}

/// Outcome of a removal pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReapReport {
    pub removed: u64,
    /// Files that could not be removed; logged and left behind
    pub failed: u64,
}

/// Removes files owned by deleted rows
pub struct FileReaper {
    fs: Arc<dyn FileSystemAccess>,
    paths: MediaPaths,
}

impl FileReaper {
    pub fn new(fs: Arc<dyn FileSystemAccess>, paths: MediaPaths) -> Self {
        Self { fs, paths }
    }

    pub fn paths(&self) -> &MediaPaths {
        &self.paths
    }

    /// Collect an artist's photo plus everything its cascade will take down:
    /// its albums' artwork and the cached media of its songs.
    pub async fn collect_artist(
        &self,
        conn: &mut SqliteConnection,
        id: ArtistId,
        pending: &mut PendingFiles,
    ) -> Result<()> {
        pending.push(self.paths.artist_photo(id));

        let albums: Vec<(AlbumId,)> = query_as("SELECT id FROM albums WHERE artist_id = ?")
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;
        for (album,) in albums {
            pending.push(self.paths.album_artwork(album));
            pending.push(self.paths.album_artwork_big(album));
        }

        let songs: Vec<(String,)> = query_as(
            "SELECT cache_path FROM songs WHERE artist_id = ? AND cache_path IS NOT NULL",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;
        for (cache_path,) in songs {
            pending.push(self.paths.song_cache(&cache_path));
        }

        Ok(())
    }

    /// Collect both artwork sizes of an album. Its songs survive the delete
    /// (their album reference is cleared), so their media stays.
    pub fn collect_album(&self, id: AlbumId, pending: &mut PendingFiles) {
        pending.push(self.paths.album_artwork(id));
        pending.push(self.paths.album_artwork_big(id));
    }

    pub async fn collect_song(
        &self,
        conn: &mut SqliteConnection,
        id: SongId,
        pending: &mut PendingFiles,
    ) -> Result<()> {
        let cache_path: Option<(Option<String>,)> =
            query_as("SELECT cache_path FROM songs WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

        if let Some((Some(cache_path),)) = cache_path {
            pending.push(self.paths.song_cache(&cache_path));
        }

        Ok(())
    }

    /// Remove collected files. Never fails: a file that cannot be removed is
    /// logged and counted, a file that is already gone is skipped.
    pub async fn reap(&self, pending: PendingFiles) -> ReapReport {
        let mut report = ReapReport::default();

        for path in pending.0 {
            match self.fs.delete_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed orphaned file");
                    report.removed += 1;
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove orphaned file");
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Remove files in the cache directory that no song references.
    pub async fn sweep_cache_dir(&self, pool: &SqlitePool) -> Result<ReapReport> {
        let cache_dir = &self.paths.cache_dir;
        if !self.fs.exists(cache_dir).await? {
            return Ok(ReapReport::default());
        }

        let referenced: HashSet<PathBuf> =
            query_as::<_, (String,)>("SELECT cache_path FROM songs WHERE cache_path IS NOT NULL")
                .fetch_all(pool)
                .await?
                .into_iter()
                .map(|(p,)| self.paths.song_cache(&p))
                .collect();

        let mut orphans = PendingFiles::new();
        for entry in self.fs.list_directory(cache_dir).await? {
            if referenced.contains(&entry) {
                continue;
            }
            match self.fs.metadata(&entry).await {
                Ok(meta) if meta.is_directory => {}
                Ok(_) => orphans.push(entry),
                Err(e) => {
                    warn!(path = %entry.display(), error = %e, "Skipping unreadable cache entry");
                }
            }
        }

        let report = self.reap(orphans).await;
        debug!(
            removed = report.removed,
            failed = report.failed,
            "Cache directory sweep complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use async_trait::async_trait;
    use bridge_traits::error::BridgeError;
    use bridge_traits::storage::FileMetadata;
    use mockall::mock;
    use sqlx::query;

    mock! {
        pub Fs {}

        #[async_trait]
        impl FileSystemAccess for Fs {
            async fn exists(&self, path: &Path) -> bridge_traits::error::Result<bool>;
            async fn metadata(&self, path: &Path) -> bridge_traits::error::Result<FileMetadata>;
            async fn delete_file(&self, path: &Path) -> bridge_traits::error::Result<()>;
            async fn list_directory(&self, path: &Path) -> bridge_traits::error::Result<Vec<PathBuf>>;
        }
    }

    fn media() -> MediaPaths {
        MediaPaths::new("/var/cache/music", "/var/lib/music/artwork")
    }

    #[test]
    fn test_media_file_naming() {
        let paths = media();
        assert_eq!(
            paths.artist_photo(ArtistId(3)),
            PathBuf::from("/var/lib/music/artwork/artists/3")
        );
        assert_eq!(
            paths.album_artwork(AlbumId(9)),
            PathBuf::from("/var/lib/music/artwork/albums/9")
        );
        assert_eq!(
            paths.album_artwork_big(AlbumId(9)),
            PathBuf::from("/var/lib/music/artwork/albums/9-big")
        );
        assert_eq!(
            paths.song_cache("12.mp3"),
            PathBuf::from("/var/cache/music/12.mp3")
        );
        assert_eq!(paths.song_cache("/tmp/x.ogg"), PathBuf::from("/tmp/x.ogg"));
    }

    #[core_async::test]
    async fn test_reap_logs_failures_and_skips_missing() {
        let mut fs = MockFs::new();
        fs.expect_delete_file().times(3).returning(|path| {
            if path.ends_with("gone") {
                Err(BridgeError::Io(std::io::Error::from(
                    std::io::ErrorKind::NotFound,
                )))
            } else if path.ends_with("locked") {
                Err(BridgeError::OperationFailed("permission denied".into()))
            } else {
                Ok(())
            }
        });

        let reaper = FileReaper::new(Arc::new(fs), media());
        let mut pending = PendingFiles::new();
        pending.push(PathBuf::from("/a/ok"));
        pending.push(PathBuf::from("/a/gone"));
        pending.push(PathBuf::from("/a/locked"));

        let report = reaper.reap(pending).await;
        assert_eq!(report, ReapReport { removed: 1, failed: 1 });
    }

    #[core_async::test]
    async fn test_collect_artist_includes_cascade() {
        let pool = create_test_pool().await.unwrap();
        query("INSERT INTO sources (id, host, port) VALUES (1, 'h', 1)")
            .execute(&pool)
            .await
            .unwrap();
        query("INSERT INTO artists (id, source_id, sync_id, sync_time, name) VALUES (5, 1, 1, 1, 'Low')")
            .execute(&pool)
            .await
            .unwrap();
        query("INSERT INTO albums (id, source_id, sync_id, sync_time, artist_id, name) VALUES (7, 1, 1, 1, 5, 'Things We Lost')")
            .execute(&pool)
            .await
            .unwrap();
        query(
            "INSERT INTO songs (source_id, sync_id, sync_time, artist_id, album_id, title, length, cache_path)
             VALUES (1, 1, 1, 5, 7, 'Sunflower', 270, '1.mp3'), (1, 2, 1, 5, 7, 'Laser Beam', 120, NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let reaper = FileReaper::new(Arc::new(MockFs::new()), media());
        let mut pending = PendingFiles::new();
        let mut conn = pool.acquire().await.unwrap();
        reaper
            .collect_artist(&mut conn, ArtistId(5), &mut pending)
            .await
            .unwrap();

        let paths = media();
        assert_eq!(
            pending.paths(),
            &[
                paths.artist_photo(ArtistId(5)),
                paths.album_artwork(AlbumId(7)),
                paths.album_artwork_big(AlbumId(7)),
                paths.song_cache("1.mp3"),
            ]
        );
    }

    #[core_async::test]
    async fn test_sweep_cache_dir_removes_unreferenced_files() {
        let pool = create_test_pool().await.unwrap();
        query("INSERT INTO sources (id, host, port) VALUES (1, 'h', 1)")
            .execute(&pool)
            .await
            .unwrap();
        query("INSERT INTO artists (id, source_id, sync_id, sync_time, name) VALUES (1, 1, 1, 1, 'Low')")
            .execute(&pool)
            .await
            .unwrap();
        query("INSERT INTO songs (source_id, sync_id, sync_time, artist_id, title, length, cache_path) VALUES (1, 1, 1, 1, 'Lullaby', 1, 'kept.mp3')")
            .execute(&pool)
            .await
            .unwrap();

        let mut fs = MockFs::new();
        fs.expect_exists().returning(|_| Ok(true));
        fs.expect_list_directory().returning(|dir| {
            Ok(vec![
                dir.join("kept.mp3"),
                dir.join("stale.mp3"),
                dir.join("partial"),
            ])
        });
        fs.expect_metadata().returning(|path| {
            Ok(FileMetadata {
                size: 1,
                modified_at: None,
                is_directory: path.ends_with("partial"),
            })
        });
        fs.expect_delete_file()
            .withf(|path| path.ends_with("stale.mp3"))
            .times(1)
            .returning(|_| Ok(()));

        let reaper = FileReaper::new(Arc::new(fs), media());
        let report = reaper.sweep_cache_dir(&pool).await.unwrap();
        assert_eq!(report, ReapReport { removed: 1, failed: 0 });
    }
}
