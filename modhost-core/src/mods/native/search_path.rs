//! Search-path registration for a mod's companion libraries.
//!
//! A mod's `dlls` directory may carry shared libraries its primary binary
//! links against. Registration makes those resolvable while the mod is
//! loaded, without touching the global search path for anyone else, and
//! deregistration on drop exactly pairs with the registration no matter
//! in which order mods are torn down.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Token for one registered search path. Dropping it deregisters the
/// path; each guard deregisters exactly what it registered.
pub struct SearchPathGuard {
    dir: PathBuf,
    inner: platform::Registration,
}

impl SearchPathGuard {
    /// Registers `dir` as an additional search path for native library
    /// resolution. `primary` names the mod's primary binary, which is
    /// never treated as a companion.
    pub fn register(dir: &Path, primary: &str) -> Self {
        debug!("registering native search path {}", dir.display());
        Self {
            dir: dir.to_path_buf(),
            inner: platform::register(dir, primary),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for SearchPathGuard {
    fn drop(&mut self) {
        debug!("deregistering native search path {}", self.dir.display());
    }
}

#[cfg(windows)]
mod platform {
    use std::ffi::c_void;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;

    // Kernel32's per-process DLL search path API. The cookie returned by
    // AddDllDirectory pairs with exactly one RemoveDllDirectory.
    #[link(name = "kernel32")]
    extern "system" {
        fn AddDllDirectory(new_directory: *const u16) -> *mut c_void;
        fn RemoveDllDirectory(cookie: *mut c_void) -> i32;
    }

    pub(super) struct Registration {
        cookie: *mut c_void,
    }

    pub(super) fn register(dir: &Path, _primary: &str) -> Registration {
        let wide: Vec<u16> = dir.as_os_str().encode_wide().chain(Some(0)).collect();
        let cookie = unsafe { AddDllDirectory(wide.as_ptr()) };
        Registration { cookie }
    }

    impl Drop for Registration {
        fn drop(&mut self) {
            if !self.cookie.is_null() {
                unsafe {
                    RemoveDllDirectory(self.cookie);
                }
            }
        }
    }
}

#[cfg(unix)]
mod platform {
    use std::path::Path;

    use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_NOW};
    use tracing::debug;

    use crate::cache::BINARY_EXT;

    /// Unix has no per-process search-path API after startup, so the
    /// directory's companion libraries are mapped eagerly with
    /// `RTLD_GLOBAL` instead; the primary binary then resolves against
    /// them. Dropping the registration releases the mappings.
    pub(super) struct Registration {
        _preloaded: Vec<Library>,
    }

    pub(super) fn register(dir: &Path, primary: &str) -> Registration {
        let mut preloaded = Vec::new();

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return Registration { _preloaded: preloaded },
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(BINARY_EXT) {
                continue;
            }
            if path.file_name().and_then(|n| n.to_str()) == Some(primary) {
                continue;
            }

            match unsafe { Library::open(Some(&path), RTLD_NOW | RTLD_GLOBAL) } {
                Ok(library) => preloaded.push(library),
                // The primary may still resolve this via rpath; not fatal.
                Err(err) => debug!(
                    "could not preload companion library {}: {err}",
                    path.display()
                ),
            }
        }

        Registration {
            _preloaded: preloaded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn register_and_drop_empty_dir() {
        let temp = TempDir::new().unwrap();
        let guard = SearchPathGuard::register(temp.path(), "libmain.so");
        assert_eq!(guard.dir(), temp.path());
        drop(guard);
    }

    #[test]
    fn register_missing_dir_is_harmless() {
        let temp = TempDir::new().unwrap();
        let gone = temp.path().join("nonexistent");
        let _guard = SearchPathGuard::register(&gone, "libmain.so");
    }

    #[cfg(unix)]
    #[test]
    fn garbage_companions_are_skipped() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(format!("libhelper.{}", crate::cache::BINARY_EXT)),
            b"not a real shared library",
        )
        .unwrap();
        let _guard = SearchPathGuard::register(temp.path(), "libmain.so");
    }
}
