//! Host configuration.
//!
//! Settings come from a `modhost.toml` file; every field has a default so
//! a bare host runs with no configuration at all. The cache root is part
//! of the settings and is threaded explicitly into the
//! [`BinaryCache`](crate::cache::BinaryCache); there is no ambient
//! global.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::BinaryCache;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostSettings {
    /// Directory scanned for mod folders.
    pub mods_dir: PathBuf,
    /// Shared content-addressed cache for mod binaries.
    pub cache_dir: PathBuf,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            mods_dir: PathBuf::from("mods"),
            cache_dir: BinaryCache::default_root(),
        }
    }
}

impl HostSettings {
    /// Loads settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse settings file {}", path.display()))
    }

    /// Loads settings from `path` when given, otherwise from the first of
    /// `./modhost.toml` and `~/.modhost/modhost.toml` that exists, falling
    /// back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        for candidate in Self::default_locations() {
            if candidate.exists() {
                return Self::load(&candidate);
            }
        }

        Ok(Self::default())
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from("modhost.toml")];
        if let Some(home) = dirs::home_dir() {
            locations.push(home.join(".modhost").join("modhost.toml"));
        }
        locations
    }
}
