//! Platform locations for the library when the host names none.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "library-sync";

/// Where the database, cached media and artwork live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryDirs {
    pub database_path: PathBuf,
    pub cache_dir: PathBuf,
    pub artwork_dir: PathBuf,
}

impl LibraryDirs {
    /// Database and artwork under the user data directory, media under the
    /// user cache directory. Falls back to the temp directory on hosts
    /// without either.
    pub fn platform() -> Self {
        let data = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR);
        let cache = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR);

        Self {
            database_path: data.join("library.db"),
            cache_dir: cache.join("media"),
            artwork_dir: data.join("artwork"),
        }
    }

    /// Everything below one root, for portable installs and tests.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            database_path: root.join("library.db"),
            cache_dir: root.join("cache"),
            artwork_dir: root.join("artwork"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_dirs_are_distinct() {
        let dirs = LibraryDirs::platform();
        assert_ne!(dirs.cache_dir, dirs.artwork_dir);
        assert!(dirs.database_path.ends_with("library-sync/library.db"));
    }

    #[test]
    fn test_under_root() {
        let dirs = LibraryDirs::under("/srv/music");
        assert_eq!(dirs.cache_dir, PathBuf::from("/srv/music/cache"));
        assert_eq!(dirs.artwork_dir, PathBuf::from("/srv/music/artwork"));
    }
}
