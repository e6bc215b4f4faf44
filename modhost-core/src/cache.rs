//! Content-addressed cache for mod binaries.
//!
//! Every mod's primary binary is copied into a shared cache directory
//! under a name derived from its content digest. Two mods shipping
//! byte-identical binaries share one cache entry, and a rebuilt binary
//! (new digest) gets a fresh entry instead of colliding with a stale
//! loaded one. Entries are never deleted by this subsystem.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::checksum;

/// Platform extension for shared libraries, also used for cache entries.
#[cfg(windows)]
pub const BINARY_EXT: &str = "dll";
#[cfg(target_os = "macos")]
pub const BINARY_EXT: &str = "dylib";
#[cfg(all(unix, not(target_os = "macos")))]
pub const BINARY_EXT: &str = "so";

/// A cache-preparation failure. The caller must not proceed to load
/// when any of these is returned.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read mod binary {path}: {source}")]
    ReadSource { path: PathBuf, source: io::Error },

    #[error("failed to create cache directory {path}: {source}")]
    CreateRoot { path: PathBuf, source: io::Error },

    #[error("failed to populate cache entry {path}: {source}")]
    Populate { path: PathBuf, source: io::Error },
}

/// Shared cache directory, addressed by content digest.
///
/// The root is an explicit configuration value resolved once at startup
/// and threaded through to each loader; it is created lazily and never
/// torn down here.
#[derive(Debug, Clone)]
pub struct BinaryCache {
    root: PathBuf,
}

impl BinaryCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The default process-wide cache root under the system temp directory.
    pub fn default_root() -> PathBuf {
        std::env::temp_dir().join("modhost").join("dlls")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the cache path for `source`'s contents, copying it into the
    /// cache if no entry with that digest exists yet.
    ///
    /// Idempotent: the same content always maps to the same path, and at
    /// most one physical copy is performed no matter how many mods ship
    /// that binary. An existing entry is trusted without re-verification.
    pub fn ensure_cached(&self, source: &Path) -> Result<PathBuf, CacheError> {
        let bytes = std::fs::read(source).map_err(|e| CacheError::ReadSource {
            path: source.to_path_buf(),
            source: e,
        })?;
        let digest = checksum::digest(&bytes);
        let cached = self.root.join(format!("{digest}.{BINARY_EXT}"));

        std::fs::create_dir_all(&self.root).map_err(|e| CacheError::CreateRoot {
            path: self.root.clone(),
            source: e,
        })?;

        if cached.exists() {
            return Ok(cached);
        }

        debug!(
            "new binary {}, copying it to cache entry {}",
            source.display(),
            cached.display()
        );

        // Write through a temp file in the same directory and rename into
        // place so a concurrent loader never observes a torn entry.
        // Losing the no-clobber race is fine: the winner wrote identical
        // contents.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root).map_err(|e| {
            CacheError::Populate {
                path: cached.clone(),
                source: e,
            }
        })?;
        tmp.write_all(&bytes).map_err(|e| CacheError::Populate {
            path: cached.clone(),
            source: e,
        })?;
        match tmp.persist_noclobber(&cached) {
            Ok(_) => {}
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {}
            Err(err) => {
                return Err(CacheError::Populate {
                    path: cached,
                    source: err.error,
                })
            }
        }

        Ok(cached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache_in(temp: &TempDir) -> BinaryCache {
        BinaryCache::new(temp.path().join("cache"))
    }

    fn entry_count(cache: &BinaryCache) -> usize {
        std::fs::read_dir(cache.root())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[test]
    fn caches_and_reuses_identical_content() {
        let temp = TempDir::new().unwrap();
        let cache = cache_in(&temp);

        let a = temp.path().join("a.bin");
        let b = temp.path().join("b.bin");
        std::fs::write(&a, b"identical contents").unwrap();
        std::fs::write(&b, b"identical contents").unwrap();

        let first = cache.ensure_cached(&a).unwrap();
        let second = cache.ensure_cached(&b).unwrap();

        assert_eq!(first, second);
        assert_eq!(entry_count(&cache), 1);
    }

    #[test]
    fn distinct_content_gets_distinct_entries() {
        let temp = TempDir::new().unwrap();
        let cache = cache_in(&temp);

        let a = temp.path().join("a.bin");
        let b = temp.path().join("b.bin");
        std::fs::write(&a, b"one binary").unwrap();
        std::fs::write(&b, b"another binary").unwrap();

        let first = cache.ensure_cached(&a).unwrap();
        let second = cache.ensure_cached(&b).unwrap();

        assert_ne!(first, second);
        assert_eq!(entry_count(&cache), 2);
    }

    #[test]
    fn entry_name_is_decimal_digest() {
        let temp = TempDir::new().unwrap();
        let cache = cache_in(&temp);

        let src = temp.path().join("mod.bin");
        std::fs::write(&src, b"123456789").unwrap();

        let cached = cache.ensure_cached(&src).unwrap();
        let expected = format!("{}.{BINARY_EXT}", 0xCBF4_3926u32);
        assert_eq!(cached.file_name().unwrap().to_str().unwrap(), expected);
    }

    #[test]
    fn existing_entry_is_trusted() {
        let temp = TempDir::new().unwrap();
        let cache = cache_in(&temp);

        let src = temp.path().join("mod.bin");
        std::fs::write(&src, b"payload").unwrap();

        let cached = cache.ensure_cached(&src).unwrap();
        // Scribble over the entry; a second call must return it unchanged.
        std::fs::write(&cached, b"scribbled").unwrap();
        let again = cache.ensure_cached(&src).unwrap();

        assert_eq!(cached, again);
        assert_eq!(std::fs::read(&again).unwrap(), b"scribbled");
    }

    #[test]
    fn missing_source_is_an_error() {
        let temp = TempDir::new().unwrap();
        let cache = cache_in(&temp);

        let err = cache
            .ensure_cached(&temp.path().join("nonexistent.bin"))
            .unwrap_err();
        assert!(matches!(err, CacheError::ReadSource { .. }));
    }

    #[test]
    fn uncreatable_root_is_an_error() {
        let temp = TempDir::new().unwrap();
        // A regular file where a path component of the root should be
        let occupied = temp.path().join("occupied");
        std::fs::write(&occupied, b"").unwrap();

        let cache = BinaryCache::new(occupied.join("cache"));
        let src = temp.path().join("mod.bin");
        std::fs::write(&src, b"payload").unwrap();

        let err = cache.ensure_cached(&src).unwrap_err();
        assert!(matches!(err, CacheError::CreateRoot { .. }));
    }
}
