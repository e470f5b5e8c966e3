//! Hierarchical library addressing
//!
//! Presentation code refers to library content by path, e.g.
//! `media/music/artists/4/albums` or `media/music/playlists/2/song/0`.
//! A path is parsed once into an [`AddressedQuery`] (what to read, how to
//! filter it, which join shapes the rows) and then executed by
//! [`LibraryQueryService`] against the repositories.
//!
//! ```
//! use core_library::address::{AddressKind, Filter, Join, LibraryPath};
//! use core_library::models::ArtistId;
//!
//! let path = LibraryPath::parse("media/music/artists/4/albums").unwrap();
//! assert_eq!(path.query().kind, AddressKind::Albums);
//! assert_eq!(path.query().filter, Filter::Artist(ArtistId(4)));
//! assert_eq!(path.query().join, Join::ArtistSongs);
//! ```

use bridge_traits::EntityKind;
use sqlx::SqlitePool;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::counts::{CountMaintainer, CountReport};
use crate::error::{LibraryError, Result};
use crate::file_gc::MediaPaths;
use crate::models::{
    Album, AlbumId, Artist, ArtistId, Playlist, PlaylistEntry, PlaylistId, PlaylistSong,
    PlaylistSongId, Song, SongId, Source, SourceId, Tombstone,
};
use crate::repositories::{
    AlbumRepository, ArtistRepository, PlaylistRepository, SongRepository, SourceRepository,
    SqliteAlbumRepository, SqliteArtistRepository, SqlitePlaylistRepository,
    SqliteSongRepository, SqliteSourceRepository, SqliteTombstoneRepository,
    TombstoneRepository,
};

/// What an address reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Sources,
    Artists,
    Albums,
    Songs,
    Playlists,
    /// Raw playlist membership rows
    PlaylistSongs,
    /// Tombstones of one entity kind
    Deleted(EntityKind),
    ArtistPhoto,
    AlbumArtwork,
    AlbumArtworkBig,
    /// Maintenance: recompute denormalized counts
    AdjustCounts,
}

/// Row selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    All,
    Source(SourceId),
    Artist(ArtistId),
    Album(AlbumId),
    Song(SongId),
    Playlist(PlaylistId),
    PlaylistSong(PlaylistSongId),
    ArtistOnAlbum(ArtistId, AlbumId),
    PlaylistPosition(PlaylistId, i64),
    /// Albums with more than three songs
    Complete,
}

/// Shape of the rows returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    None,
    /// Albums aggregated from an artist's songs (counts that artist only)
    ArtistSongs,
    /// Songs reached through playlist membership, carrying their position
    PlaylistMembership,
}

/// Parsed form of a library path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressedQuery {
    pub kind: AddressKind,
    pub filter: Filter,
    pub join: Join,
}

impl AddressedQuery {
    const fn new(kind: AddressKind, filter: Filter, join: Join) -> Self {
        Self { kind, filter, join }
    }

    const fn plain(kind: AddressKind, filter: Filter) -> Self {
        Self::new(kind, filter, Join::None)
    }
}

/// A validated library path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPath {
    raw: String,
    query: AddressedQuery,
}

impl LibraryPath {
    /// Parse a path. Leading and trailing slashes are ignored.
    ///
    /// # Errors
    /// Returns `InvalidPath` for anything outside the known address set.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim_matches('/');
        let segments: Vec<&str> = trimmed.split('/').collect();
        let invalid = || LibraryError::InvalidPath(path.to_string());

        let query = match segments.as_slice() {
            ["sources"] => AddressedQuery::plain(AddressKind::Sources, Filter::All),
            ["sources", id] => AddressedQuery::plain(
                AddressKind::Sources,
                Filter::Source(SourceId(number(id).ok_or_else(invalid)?)),
            ),
            ["media", "music", rest @ ..] => parse_music(rest).ok_or_else(invalid)?,
            _ => return Err(invalid()),
        };

        Ok(Self {
            raw: trimmed.to_string(),
            query,
        })
    }

    pub fn query(&self) -> &AddressedQuery {
        &self.query
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for LibraryPath {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for LibraryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// `#` segments: non-negative decimal ids
fn number(segment: &str) -> Option<i64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

fn parse_music(rest: &[&str]) -> Option<AddressedQuery> {
    use AddressKind as K;

    let query = match rest {
        ["adjust_counts"] => AddressedQuery::plain(K::AdjustCounts, Filter::All),

        ["artists"] => AddressedQuery::plain(K::Artists, Filter::All),
        ["artists", "deleted"] => {
            AddressedQuery::plain(K::Deleted(EntityKind::Artist), Filter::All)
        }
        ["artists", id] => AddressedQuery::plain(K::Artists, Filter::Artist(ArtistId(number(id)?))),
        ["artists", id, "albums"] => AddressedQuery::new(
            K::Albums,
            Filter::Artist(ArtistId(number(id)?)),
            Join::ArtistSongs,
        ),
        ["artists", artist, "albums", album, "songs"] => AddressedQuery::plain(
            K::Songs,
            Filter::ArtistOnAlbum(ArtistId(number(artist)?), AlbumId(number(album)?)),
        ),
        ["artists", id, "songs"] => {
            AddressedQuery::plain(K::Songs, Filter::Artist(ArtistId(number(id)?)))
        }
        ["artists", id, "photo"] => {
            AddressedQuery::plain(K::ArtistPhoto, Filter::Artist(ArtistId(number(id)?)))
        }

        ["albums"] => AddressedQuery::plain(K::Albums, Filter::All),
        ["albums", "complete"] => AddressedQuery::plain(K::Albums, Filter::Complete),
        ["albums", "deleted"] => AddressedQuery::plain(K::Deleted(EntityKind::Album), Filter::All),
        ["albums", id] => AddressedQuery::plain(K::Albums, Filter::Album(AlbumId(number(id)?))),
        ["albums", id, "songs"] => {
            AddressedQuery::plain(K::Songs, Filter::Album(AlbumId(number(id)?)))
        }
        ["albums", id, "artwork"] => {
            AddressedQuery::plain(K::AlbumArtwork, Filter::Album(AlbumId(number(id)?)))
        }
        ["albums", id, "artwork", "big"] => {
            AddressedQuery::plain(K::AlbumArtworkBig, Filter::Album(AlbumId(number(id)?)))
        }

        ["songs"] => AddressedQuery::plain(K::Songs, Filter::All),
        ["songs", "deleted"] => AddressedQuery::plain(K::Deleted(EntityKind::Song), Filter::All),
        ["songs", id] => AddressedQuery::plain(K::Songs, Filter::Song(SongId(number(id)?))),

        ["playlists"] => AddressedQuery::plain(K::Playlists, Filter::All),
        ["playlists", "deleted"] => {
            AddressedQuery::plain(K::Deleted(EntityKind::Playlist), Filter::All)
        }
        ["playlists", "songs"] => AddressedQuery::plain(K::PlaylistSongs, Filter::All),
        ["playlists", "songs", id] => AddressedQuery::plain(
            K::PlaylistSongs,
            Filter::PlaylistSong(PlaylistSongId(number(id)?)),
        ),
        ["playlists", id] => {
            AddressedQuery::plain(K::Playlists, Filter::Playlist(PlaylistId(number(id)?)))
        }
        ["playlists", id, "songs"] => AddressedQuery::new(
            K::Songs,
            Filter::Playlist(PlaylistId(number(id)?)),
            Join::PlaylistMembership,
        ),
        ["playlists", id, "song", position] => AddressedQuery::new(
            K::Songs,
            Filter::PlaylistPosition(PlaylistId(number(id)?), number(position)?),
            Join::PlaylistMembership,
        ),

        _ => return None,
    };

    Some(query)
}

/// Rows (or a file location) produced by executing an address
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Sources(Vec<Source>),
    Artists(Vec<Artist>),
    Albums(Vec<Album>),
    Songs(Vec<Song>),
    PlaylistEntries(Vec<PlaylistEntry>),
    Playlists(Vec<Playlist>),
    PlaylistSongs(Vec<PlaylistSong>),
    Tombstones(Vec<Tombstone>),
    /// Location of a media file; it may not exist yet
    File(PathBuf),
    CountsAdjusted(CountReport),
}

/// Executes addressed queries against the canonical store
pub struct LibraryQueryService {
    pool: SqlitePool,
    media: MediaPaths,
}

impl LibraryQueryService {
    pub fn new(pool: SqlitePool, media: MediaPaths) -> Self {
        Self { pool, media }
    }

    /// Parse and execute a path in one step
    pub async fn resolve_path(&self, path: &str) -> Result<Resolved> {
        let path = LibraryPath::parse(path)?;
        self.resolve(path.query()).await
    }

    /// Execute a parsed address.
    ///
    /// # Errors
    /// Returns `NotFound` when a single-row address names a missing row and
    /// `InvalidPath` for combinations no path produces.
    pub async fn resolve(&self, query: &AddressedQuery) -> Result<Resolved> {
        use AddressKind as K;

        let pool = self.pool.clone();
        let resolved = match (query.kind, query.filter, query.join) {
            (K::Sources, Filter::All, _) => {
                Resolved::Sources(SqliteSourceRepository::new(pool).list().await?)
            }
            (K::Sources, Filter::Source(id), _) => {
                let source = SqliteSourceRepository::new(pool).find_by_id(id).await?;
                Resolved::Sources(vec![source.ok_or_else(|| LibraryError::not_found("Source", id))?])
            }

            (K::Artists, Filter::All, _) => {
                Resolved::Artists(SqliteArtistRepository::new(pool).list().await?)
            }
            (K::Artists, Filter::Artist(id), _) => {
                let artist = SqliteArtistRepository::new(pool).find_by_id(id).await?;
                Resolved::Artists(vec![artist.ok_or_else(|| LibraryError::not_found("Artist", id))?])
            }

            (K::Albums, Filter::All, _) => {
                Resolved::Albums(SqliteAlbumRepository::new(pool).list().await?)
            }
            (K::Albums, Filter::Complete, _) => {
                Resolved::Albums(SqliteAlbumRepository::new(pool).list_complete().await?)
            }
            (K::Albums, Filter::Artist(id), Join::ArtistSongs) => Resolved::Albums(
                SqliteAlbumRepository::new(pool)
                    .list_with_artist_songs(id)
                    .await?,
            ),
            (K::Albums, Filter::Artist(id), _) => {
                Resolved::Albums(SqliteAlbumRepository::new(pool).list_by_artist(id).await?)
            }
            (K::Albums, Filter::Album(id), _) => {
                let album = SqliteAlbumRepository::new(pool).find_by_id(id).await?;
                Resolved::Albums(vec![album.ok_or_else(|| LibraryError::not_found("Album", id))?])
            }

            (K::Songs, Filter::Playlist(id), Join::PlaylistMembership) => {
                Resolved::PlaylistEntries(SqlitePlaylistRepository::new(pool).list_songs(id).await?)
            }
            (K::Songs, Filter::PlaylistPosition(id, position), Join::PlaylistMembership) => {
                let entry = SqlitePlaylistRepository::new(pool)
                    .song_at(id, position)
                    .await?
                    .ok_or_else(|| {
                        LibraryError::not_found("PlaylistSong", format!("{id}@{position}"))
                    })?;
                Resolved::PlaylistEntries(vec![entry])
            }
            (K::Songs, Filter::All, _) => {
                Resolved::Songs(SqliteSongRepository::new(pool).list().await?)
            }
            (K::Songs, Filter::Artist(id), _) => {
                Resolved::Songs(SqliteSongRepository::new(pool).list_by_artist(id).await?)
            }
            (K::Songs, Filter::Album(id), _) => {
                Resolved::Songs(SqliteSongRepository::new(pool).list_by_album(id).await?)
            }
            (K::Songs, Filter::ArtistOnAlbum(artist, album), _) => Resolved::Songs(
                SqliteSongRepository::new(pool)
                    .list_by_artist_on_album(artist, album)
                    .await?,
            ),
            (K::Songs, Filter::Song(id), _) => {
                let song = SqliteSongRepository::new(pool).find_by_id(id).await?;
                Resolved::Songs(vec![song.ok_or_else(|| LibraryError::not_found("Song", id))?])
            }

            (K::Playlists, Filter::All, _) => {
                Resolved::Playlists(SqlitePlaylistRepository::new(pool).list().await?)
            }
            (K::Playlists, Filter::Playlist(id), _) => {
                let playlist = SqlitePlaylistRepository::new(pool).find_by_id(id).await?;
                Resolved::Playlists(vec![
                    playlist.ok_or_else(|| LibraryError::not_found("Playlist", id))?
                ])
            }
            (K::PlaylistSongs, Filter::All, _) => Resolved::PlaylistSongs(
                SqlitePlaylistRepository::new(pool)
                    .list_memberships()
                    .await?,
            ),
            (K::PlaylistSongs, Filter::PlaylistSong(id), _) => {
                let row = SqlitePlaylistRepository::new(pool)
                    .find_membership(id)
                    .await?;
                Resolved::PlaylistSongs(vec![
                    row.ok_or_else(|| LibraryError::not_found("PlaylistSong", id))?
                ])
            }

            (K::Deleted(kind), Filter::All, _) => {
                Resolved::Tombstones(SqliteTombstoneRepository::new(pool).list(kind).await?)
            }

            (K::ArtistPhoto, Filter::Artist(id), _) => {
                Resolved::File(self.media.artist_photo(id))
            }
            (K::AlbumArtwork, Filter::Album(id), _) => {
                Resolved::File(self.media.album_artwork(id))
            }
            (K::AlbumArtworkBig, Filter::Album(id), _) => {
                Resolved::File(self.media.album_artwork_big(id))
            }

            (K::AdjustCounts, _, _) => Resolved::CountsAdjusted(CountMaintainer::new(pool).run().await?),

            _ => return Err(LibraryError::InvalidPath(format!("{query:?}"))),
        };

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use sqlx::query;

    fn parse(path: &str) -> AddressedQuery {
        *LibraryPath::parse(path).unwrap().query()
    }

    #[test]
    fn test_parse_entity_paths() {
        assert_eq!(
            parse("sources/3"),
            AddressedQuery::plain(AddressKind::Sources, Filter::Source(SourceId(3)))
        );
        assert_eq!(
            parse("/media/music/artists/"),
            AddressedQuery::plain(AddressKind::Artists, Filter::All)
        );
        assert_eq!(
            parse("media/music/artists/2/albums/5/songs"),
            AddressedQuery::plain(
                AddressKind::Songs,
                Filter::ArtistOnAlbum(ArtistId(2), AlbumId(5))
            )
        );
        assert_eq!(
            parse("media/music/albums/complete"),
            AddressedQuery::plain(AddressKind::Albums, Filter::Complete)
        );
        assert_eq!(
            parse("media/music/albums/8/artwork/big"),
            AddressedQuery::plain(AddressKind::AlbumArtworkBig, Filter::Album(AlbumId(8)))
        );
        assert_eq!(
            parse("media/music/playlists/4/song/0"),
            AddressedQuery::new(
                AddressKind::Songs,
                Filter::PlaylistPosition(PlaylistId(4), 0),
                Join::PlaylistMembership
            )
        );
        assert_eq!(
            parse("media/music/playlists/songs/11"),
            AddressedQuery::plain(
                AddressKind::PlaylistSongs,
                Filter::PlaylistSong(PlaylistSongId(11))
            )
        );
        assert_eq!(
            parse("media/music/songs/deleted"),
            AddressedQuery::plain(AddressKind::Deleted(EntityKind::Song), Filter::All)
        );
        assert_eq!(
            parse("media/music/adjust_counts"),
            AddressedQuery::plain(AddressKind::AdjustCounts, Filter::All)
        );
    }

    #[test]
    fn test_parse_rejects_unknown_paths() {
        for path in [
            "",
            "media/music",
            "media/video/artists",
            "media/music/artists/abc",
            "media/music/artists/-1",
            "media/music/playlists/songs/deleted",
            "media/music/artists/1/albums/2",
            "sources/1/extra",
        ] {
            assert!(
                matches!(LibraryPath::parse(path), Err(LibraryError::InvalidPath(_))),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn test_display_round_trips_normalized_path() {
        let path: LibraryPath = "/media/music/albums/1/songs/".parse().unwrap();
        assert_eq!(path.to_string(), "media/music/albums/1/songs");
        assert_eq!(path.as_str(), "media/music/albums/1/songs");
    }

    async fn service() -> LibraryQueryService {
        let pool = create_test_pool().await.unwrap();
        let statements = [
            "INSERT INTO sources (id, host, port) VALUES (1, 'music.local', 5545)",
            "INSERT INTO artists (id, source_id, sync_id, sync_time, name) VALUES (1, 1, 1, 1, 'Low')",
            "INSERT INTO albums (id, source_id, sync_id, sync_time, artist_id, name) VALUES (1, 1, 1, 1, 1, 'C''mon')",
            "INSERT INTO songs (id, source_id, sync_id, sync_time, artist_id, album_id, title, track, length) VALUES
             (1, 1, 1, 1, 1, 1, 'Try to Sleep', 1, 1), (2, 1, 2, 1, 1, 1, 'Witches', 2, 1)",
            "INSERT INTO playlists (id, source_id, sync_id, sync_time, name) VALUES (1, 1, 1, 1, 'Slowcore')",
            "INSERT INTO playlist_songs (playlist_id, song_id, position) VALUES (1, 2, 0)",
        ];
        for sql in statements {
            query(sql).execute(&pool).await.unwrap();
        }
        LibraryQueryService::new(pool, MediaPaths::new("/cache", "/artwork"))
    }

    #[core_async::test]
    async fn test_resolve_paths() {
        let service = service().await;

        match service.resolve_path("media/music/albums/1/songs").await.unwrap() {
            Resolved::Songs(songs) => assert_eq!(songs.len(), 2),
            other => panic!("unexpected {other:?}"),
        }

        match service.resolve_path("media/music/playlists/1/song/0").await.unwrap() {
            Resolved::PlaylistEntries(entries) => assert_eq!(entries[0].song.title, "Witches"),
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(
            service.resolve_path("media/music/artists/1/photo").await.unwrap(),
            Resolved::File(PathBuf::from("/artwork/artists/1"))
        );
    }

    #[core_async::test]
    async fn test_resolve_missing_row_is_not_found() {
        let service = service().await;
        assert!(matches!(
            service.resolve_path("media/music/songs/99").await,
            Err(LibraryError::NotFound { .. })
        ));
    }

    #[core_async::test]
    async fn test_adjust_counts_runs_maintainer() {
        let service = service().await;

        match service.resolve_path("media/music/adjust_counts").await.unwrap() {
            Resolved::CountsAdjusted(report) => assert_eq!(report.rows_changed(), 3),
            other => panic!("unexpected {other:?}"),
        }

        match service.resolve_path("media/music/artists/1").await.unwrap() {
            Resolved::Artists(artists) => {
                assert_eq!((artists[0].num_songs, artists[0].num_albums), (2, 1))
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
