use std::path::PathBuf;

use thiserror::Error;

use crate::cache::CacheError;

/// Why a mod's native component could not be installed.
///
/// Every variant is terminal for that mod's install attempt; none is
/// retried. `NoNativeDir` is the one expected condition, since most mods
/// ship no native component at all.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("no native binary directory at {0}")]
    NoNativeDir(PathBuf),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to load native binary {path}: {source}")]
    Load {
        path: PathBuf,
        source: libloading::Error,
    },

    #[error("missing required symbol `{symbol}` in {path}")]
    MissingSymbol { symbol: &'static str, path: PathBuf },
}
