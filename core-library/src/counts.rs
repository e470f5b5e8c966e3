//! # Count Maintainer
//!
//! `num_songs` / `num_albums` are denormalized for cheap listing. They are
//! never tracked incrementally: every pass recomputes them from the child rows
//! with grouped aggregation and rewrites the ones that drifted, all inside one
//! transaction. Running it twice in a row changes nothing the second time.

use sqlx::{query, SqliteConnection, SqlitePool};
use tracing::{debug, instrument};

use crate::error::Result;

/// Rows whose counts were rewritten, per table
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CountReport {
    pub artists: u64,
    pub albums: u64,
    pub playlists: u64,
}

impl CountReport {
    pub fn rows_changed(&self) -> u64 {
        self.artists + self.albums + self.playlists
    }
}

const ARTIST_COUNTS: &str = r#"
    WITH counts AS (
        SELECT a.id AS id,
               COUNT(s.id) AS songs,
               COUNT(DISTINCT s.album_id) AS albums
        FROM artists a
        LEFT JOIN songs s ON s.artist_id = a.id
        GROUP BY a.id
    )
    UPDATE artists
    SET num_songs = counts.songs,
        num_albums = counts.albums
    FROM counts
    WHERE counts.id = artists.id
      AND (artists.num_songs != counts.songs OR artists.num_albums != counts.albums)
"#;

const ALBUM_COUNTS: &str = r#"
    WITH counts AS (
        SELECT al.id AS id, COUNT(s.id) AS songs
        FROM albums al
        LEFT JOIN songs s ON s.album_id = al.id
        GROUP BY al.id
    )
    UPDATE albums
    SET num_songs = counts.songs
    FROM counts
    WHERE counts.id = albums.id
      AND albums.num_songs != counts.songs
"#;

const PLAYLIST_COUNTS: &str = r#"
    WITH counts AS (
        SELECT p.id AS id, COUNT(ps.id) AS songs
        FROM playlists p
        LEFT JOIN playlist_songs ps ON ps.playlist_id = p.id
        GROUP BY p.id
    )
    UPDATE playlists
    SET num_songs = counts.songs
    FROM counts
    WHERE counts.id = playlists.id
      AND playlists.num_songs != counts.songs
"#;

/// Recomputes denormalized counts from ground truth
#[derive(Clone)]
pub struct CountMaintainer {
    pool: SqlitePool,
}

impl CountMaintainer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Recompute every count column in one transaction.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<CountReport> {
        let mut tx = self.pool.begin().await?;
        let report = recompute(&mut tx).await?;
        tx.commit().await?;

        debug!(
            artists = report.artists,
            albums = report.albums,
            playlists = report.playlists,
            "Counts recomputed"
        );
        Ok(report)
    }
}

/// Recompute counts on an already open connection or transaction.
pub async fn recompute(conn: &mut SqliteConnection) -> Result<CountReport> {
    let artists = query(ARTIST_COUNTS).execute(&mut *conn).await?.rows_affected();
    let albums = query(ALBUM_COUNTS).execute(&mut *conn).await?.rows_affected();
    let playlists = query(PLAYLIST_COUNTS)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    Ok(CountReport {
        artists,
        albums,
        playlists,
    })
}
