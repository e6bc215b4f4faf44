//! Native module loading using libloading.

use std::path::Path;

use libloading::Library;
use tracing::debug;

use crate::cache::BinaryCache;
use crate::mods::error::InstallError;

use super::abi::{StartFn, UninstallFn, START_SYMBOL, UNINSTALL_SYMBOL};
use super::search_path::SearchPathGuard;

/// Conventional subdirectory of a mod root holding its native binaries.
pub const NATIVE_DIR_NAME: &str = "dlls";

/// Conventional filename of a mod's primary native binary.
#[cfg(windows)]
pub const PRIMARY_BINARY: &str = "main.dll";
#[cfg(target_os = "macos")]
pub const PRIMARY_BINARY: &str = "libmain.dylib";
#[cfg(all(unix, not(target_os = "macos")))]
pub const PRIMARY_BINARY: &str = "libmain.so";

/// A loaded native mod binary.
///
/// Holds the mapped library, the two resolved entry points, and the
/// search-path registration for the mod's companion libraries. If this
/// struct exists, both entry points resolved; partial resolution never
/// leaves a usable handle behind.
pub struct NativeModule {
    // Field order is load-bearing: the library must unload before the
    // search path deregisters.
    library: Library,
    start_fn: StartFn,
    uninstall_fn: UninstallFn,
    _search_path: SearchPathGuard,
}

impl NativeModule {
    /// Loads the primary binary from `dlls_dir` through the shared cache.
    ///
    /// # Safety contract
    ///
    /// Loading executes code from an external binary. Only mods the user
    /// chose to install reach this point; nothing here verifies what the
    /// binary does.
    pub fn load(dlls_dir: &Path, cache: &BinaryCache) -> Result<NativeModule, InstallError> {
        if !dlls_dir.is_dir() {
            return Err(InstallError::NoNativeDir(dlls_dir.to_path_buf()));
        }

        let cached = cache.ensure_cached(&dlls_dir.join(PRIMARY_BINARY))?;

        // Companion libraries resolve from the mod's own directory; the
        // guard stays owned through load failures so the registration is
        // always paired with a deregistration.
        let search_path = SearchPathGuard::register(dlls_dir, PRIMARY_BINARY);

        debug!("loading native module from {}", cached.display());
        let library = unsafe {
            Library::new(&cached).map_err(|source| InstallError::Load {
                path: cached.clone(),
                source,
            })?
        };

        let start_fn = match unsafe { resolve::<StartFn>(&library, START_SYMBOL) } {
            Some(f) => f,
            None => {
                // Unload before reporting; a half-resolved module must
                // not stay mapped.
                drop(library);
                return Err(InstallError::MissingSymbol {
                    symbol: "start_mod",
                    path: cached,
                });
            }
        };

        let uninstall_fn = match unsafe { resolve::<UninstallFn>(&library, UNINSTALL_SYMBOL) } {
            Some(f) => f,
            None => {
                drop(library);
                return Err(InstallError::MissingSymbol {
                    symbol: "uninstall_mod",
                    path: cached,
                });
            }
        };

        Ok(NativeModule {
            library,
            start_fn,
            uninstall_fn,
            _search_path: search_path,
        })
    }

    pub fn start_fn(&self) -> StartFn {
        self.start_fn
    }

    pub fn uninstall_fn(&self) -> UninstallFn {
        self.uninstall_fn
    }
}

/// Copies a function pointer out of the library so no `Symbol` borrow
/// escapes the resolution step.
unsafe fn resolve<T: Copy>(library: &Library, symbol: &[u8]) -> Option<T> {
    library.get::<T>(symbol).ok().map(|symbol| *symbol)
}

impl std::fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeModule")
            .field("search_path", &self._search_path.dir())
            .finish_non_exhaustive()
    }
}
