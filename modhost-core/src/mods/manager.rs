//! Mod discovery and session-wide lifecycle broadcast.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::cache::BinaryCache;
use crate::mods::native::abi::ScriptEnv;
use crate::mods::native_mod::NativeMod;

/// Owns every mod discovered for the current host session and fans each
/// lifecycle event out to all of them, in discovery order.
pub struct ModManager {
    cache: BinaryCache,
    mods: Vec<NativeMod>,
}

impl ModManager {
    pub fn new(cache: BinaryCache) -> Self {
        Self {
            cache,
            mods: Vec::new(),
        }
    }

    /// Scans `mods_dir` for mod directories and constructs a mod for each,
    /// in name order. Returns how many were discovered; mods whose native
    /// component failed to install are kept and flagged, not dropped.
    pub fn scan(&mut self, mods_dir: &Path) -> Result<usize> {
        let entries = std::fs::read_dir(mods_dir)
            .with_context(|| format!("failed to read mods directory {}", mods_dir.display()))?;

        let mut roots = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| {
                format!("failed to read entry in {}", mods_dir.display())
            })?;
            if entry.path().is_dir() {
                roots.push(entry.path());
            }
        }
        roots.sort();

        let before = self.mods.len();
        for root in roots {
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.mods.push(NativeMod::new(name, root, &self.cache));
        }

        let discovered = self.mods.len() - before;
        info!(
            "discovered {} mods in {} ({} installable)",
            discovered,
            mods_dir.display(),
            self.installable_count()
        );
        Ok(discovered)
    }

    pub fn mods(&self) -> &[NativeMod] {
        &self.mods
    }

    pub fn count(&self) -> usize {
        self.mods.len()
    }

    pub fn installable_count(&self) -> usize {
        self.mods.iter().filter(|m| m.is_installable()).count()
    }

    pub fn started_count(&self) -> usize {
        self.mods.iter().filter(|m| m.is_started()).count()
    }

    /// Starts every installable mod.
    pub fn start_all(&mut self) {
        for m in &mut self.mods {
            m.start();
        }
    }

    /// Uninstalls every started mod, in discovery order.
    pub fn uninstall_all(&mut self) {
        for m in &mut self.mods {
            m.uninstall();
        }
    }

    pub fn fire_script_start(&mut self, env: &ScriptEnv) {
        for m in &mut self.mods {
            m.fire_script_start(env);
        }
    }

    /// Variant of [`fire_script_start`](Self::fire_script_start) naming
    /// the mod whose scripting environment came up.
    pub fn fire_script_start_for(&mut self, mod_name: &str, env: &ScriptEnv) {
        for m in &mut self.mods {
            m.fire_script_start_for(mod_name, env);
        }
    }

    pub fn fire_script_stop(&mut self, env: &ScriptEnv) {
        for m in &mut self.mods {
            m.fire_script_stop(env);
        }
    }

    /// Variant of [`fire_script_stop`](Self::fire_script_stop) naming the
    /// mod whose scripting environment is going away.
    pub fn fire_script_stop_for(&mut self, mod_name: &str, env: &ScriptEnv) {
        for m in &mut self.mods {
            m.fire_script_stop_for(mod_name, env);
        }
    }

    pub fn fire_engine_init(&mut self) {
        for m in &mut self.mods {
            m.fire_engine_init();
        }
    }

    pub fn fire_program_start(&mut self) {
        for m in &mut self.mods {
            m.fire_program_start();
        }
    }

    pub fn fire_update(&mut self) {
        for m in &mut self.mods {
            m.fire_update();
        }
    }

    /// Tells every mod that another native library appeared in the
    /// process, so companions can find each other.
    pub fn fire_library_loaded(&mut self, library_name: &str) {
        for m in &mut self.mods {
            m.fire_library_loaded(library_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mods::native::loader::NATIVE_DIR_NAME;
    use tempfile::TempDir;

    fn manager_in(temp: &TempDir) -> ModManager {
        ModManager::new(BinaryCache::new(temp.path().join("cache")))
    }

    #[test]
    fn scan_missing_dir_is_an_error() {
        let temp = TempDir::new().unwrap();
        let mut manager = manager_in(&temp);
        assert!(manager.scan(&temp.path().join("nonexistent")).is_err());
    }

    #[test]
    fn scan_empty_dir_discovers_nothing() {
        let temp = TempDir::new().unwrap();
        let mods_dir = temp.path().join("mods");
        std::fs::create_dir_all(&mods_dir).unwrap();

        let mut manager = manager_in(&temp);
        assert_eq!(manager.scan(&mods_dir).unwrap(), 0);
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn scan_keeps_mods_without_native_components() {
        let temp = TempDir::new().unwrap();
        let mods_dir = temp.path().join("mods");
        std::fs::create_dir_all(mods_dir.join("script-only-mod")).unwrap();
        std::fs::create_dir_all(mods_dir.join("broken-mod").join(NATIVE_DIR_NAME)).unwrap();
        // A stray file must not be picked up as a mod
        std::fs::write(mods_dir.join("readme.txt"), b"hello").unwrap();

        let mut manager = manager_in(&temp);
        assert_eq!(manager.scan(&mods_dir).unwrap(), 2);
        assert_eq!(manager.count(), 2);
        assert_eq!(manager.installable_count(), 0);

        // Discovery order is name order
        assert_eq!(manager.mods()[0].name(), "broken-mod");
        assert_eq!(manager.mods()[1].name(), "script-only-mod");
    }

    #[test]
    fn lifecycle_broadcast_without_instances_is_safe() {
        let temp = TempDir::new().unwrap();
        let mods_dir = temp.path().join("mods");
        std::fs::create_dir_all(mods_dir.join("a")).unwrap();
        std::fs::create_dir_all(mods_dir.join("b")).unwrap();

        let mut manager = manager_in(&temp);
        manager.scan(&mods_dir).unwrap();

        manager.start_all();
        assert_eq!(manager.started_count(), 0);

        let env = ScriptEnv::empty();
        manager.fire_script_start(&env);
        manager.fire_engine_init();
        manager.fire_program_start();
        manager.fire_update();
        manager.fire_library_loaded("companion");
        manager.fire_script_stop(&env);
        manager.uninstall_all();
    }
}
