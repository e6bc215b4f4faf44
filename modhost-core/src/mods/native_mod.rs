//! A single mod's native component and its lifecycle.

use std::any::Any;
use std::ffi::CString;
use std::panic;
use std::path::PathBuf;
use std::ptr::NonNull;

use tracing::{info, warn};

use crate::cache::BinaryCache;
use crate::mods::error::InstallError;
use crate::mods::native::abi::{RawModInstance, ScriptEnv, StartFn};
use crate::mods::native::loader::{NativeModule, NATIVE_DIR_NAME, PRIMARY_BINARY};

/// One mod's loaded native module plus the running instance obtained from
/// it, driven through `start -> events -> uninstall` by the host.
///
/// Construction never fails: a mod whose native component cannot be
/// installed is kept, flagged not-installable, and every later call on it
/// is a no-op. A mod is never restarted; a fresh activation builds a
/// fresh `NativeMod`.
pub struct NativeMod {
    name: String,
    dlls_dir: PathBuf,
    module: Option<NativeModule>,
    instance: Option<NonNull<RawModInstance>>,
    started: bool,
}

impl NativeMod {
    /// Prepares the mod rooted at `mod_root`: caches, loads, and resolves
    /// its primary binary. Failures are logged once and flag the mod
    /// not-installable.
    pub fn new(
        name: impl Into<String>,
        mod_root: impl Into<PathBuf>,
        cache: &BinaryCache,
    ) -> Self {
        let name = name.into();
        let dlls_dir = mod_root.into().join(NATIVE_DIR_NAME);

        let module = match NativeModule::load(&dlls_dir, cache) {
            Ok(module) => Some(module),
            Err(InstallError::NoNativeDir(_)) => {
                warn!("could not find the dlls folder for mod {name}");
                None
            }
            Err(err) => {
                warn!("mod {name} is not installable: {err}");
                None
            }
        };

        Self {
            name,
            dlls_dir,
            module,
            instance: None,
            started: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the native component loaded and resolved successfully.
    pub fn is_installable(&self) -> bool {
        self.module.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Invokes the mod's `start_mod` entry point.
    ///
    /// This is the one place third-party code runs unvetted for the first
    /// time, so the call is guarded: a fault inside the entry point is
    /// caught here, leaves the instance absent, and never propagates into
    /// the host. Later event forwards are deliberately not guarded.
    pub fn start(&mut self) {
        let Some(module) = &self.module else { return };

        match guarded_start(module.start_fn()) {
            Ok(instance) => {
                self.instance = instance;
                self.started = self.instance.is_some();
            }
            Err(fault) => {
                let binary = self.dlls_dir.join(PRIMARY_BINARY);
                if tracing::enabled!(tracing::Level::WARN) {
                    warn!(
                        "failed to start mod {} from {}: {fault}",
                        self.name,
                        binary.display()
                    );
                } else {
                    // The diagnostics sink would drop this; don't lose it.
                    eprintln!(
                        "internal error: failed to start mod {} from {}: {fault}",
                        self.name,
                        binary.display()
                    );
                }
            }
        }
    }

    /// Releases the running instance through `uninstall_mod`. No-op when
    /// the mod was never started.
    pub fn uninstall(&mut self) {
        info!("stopping mod {} for uninstall", self.name);
        if let Some(module) = &self.module {
            if let Some(instance) = self.instance.take() {
                unsafe { (module.uninstall_fn())(instance.as_ptr()) };
            }
        }
        self.started = false;
    }

    /// A scripting environment was attached.
    pub fn fire_script_start(&mut self, env: &ScriptEnv) {
        if let Some((data, vtable)) = self.instance_parts() {
            if let Some(f) = vtable.on_script_start {
                unsafe { f(data, env) };
            }
        }
    }

    /// A scripting environment was attached for the named mod.
    pub fn fire_script_start_for(&mut self, mod_name: &str, env: &ScriptEnv) {
        let Ok(name) = CString::new(mod_name) else {
            return;
        };
        if let Some((data, vtable)) = self.instance_parts() {
            if let Some(f) = vtable.on_script_start_named {
                unsafe { f(data, name.as_ptr(), env) };
            }
        }
    }

    /// A scripting environment is about to be detached.
    pub fn fire_script_stop(&mut self, env: &ScriptEnv) {
        if let Some((data, vtable)) = self.instance_parts() {
            if let Some(f) = vtable.on_script_stop {
                unsafe { f(data, env) };
            }
        }
    }

    /// A scripting environment is about to be detached for the named mod.
    pub fn fire_script_stop_for(&mut self, mod_name: &str, env: &ScriptEnv) {
        let Ok(name) = CString::new(mod_name) else {
            return;
        };
        if let Some((data, vtable)) = self.instance_parts() {
            if let Some(f) = vtable.on_script_stop_named {
                unsafe { f(data, name.as_ptr(), env) };
            }
        }
    }

    /// The underlying engine finished initializing.
    pub fn fire_engine_init(&mut self) {
        if let Some((data, vtable)) = self.instance_parts() {
            if let Some(f) = vtable.on_engine_init {
                unsafe { f(data) };
            }
        }
    }

    /// The host program started.
    pub fn fire_program_start(&mut self) {
        if let Some((data, vtable)) = self.instance_parts() {
            if let Some(f) = vtable.on_program_start {
                unsafe { f(data) };
            }
        }
    }

    /// One host tick.
    pub fn fire_update(&mut self) {
        if let Some((data, vtable)) = self.instance_parts() {
            if let Some(f) = vtable.on_update {
                unsafe { f(data) };
            }
        }
    }

    /// The host loaded another native library.
    pub fn fire_library_loaded(&mut self, library_name: &str) {
        let Ok(name) = CString::new(library_name) else {
            return;
        };
        if let Some((data, vtable)) = self.instance_parts() {
            if let Some(f) = vtable.on_library_loaded {
                unsafe { f(data, name.as_ptr()) };
            }
        }
    }

    fn instance_parts(
        &self,
    ) -> Option<(*mut std::ffi::c_void, &crate::mods::native::abi::ModEventVTable)> {
        let instance = self.instance?;
        let raw = unsafe { instance.as_ref() };
        if raw.vtable.is_null() {
            return None;
        }
        Some((raw.data, unsafe { &*raw.vtable }))
    }
}

impl Drop for NativeMod {
    fn drop(&mut self) {
        // Uninstall-then-unload-then-deregister, exactly once; the module
        // field's own drop handles unload and deregistration in order.
        if self.instance.is_some() {
            self.uninstall();
        }
    }
}

// The raw instance pointer is managed exclusively by this mod and freed
// through uninstall_mod; no aliasing handle exists elsewhere.
unsafe impl Send for NativeMod {}
unsafe impl Sync for NativeMod {}

fn guarded_start(start: StartFn) -> Result<Option<NonNull<RawModInstance>>, String> {
    match panic::catch_unwind(|| unsafe { start() }) {
        Ok(ptr) => Ok(NonNull::new(ptr)),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown error in mod entry point".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mods::native::abi::ModEventVTable;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    unsafe extern "C-unwind" fn panicking_start() -> *mut RawModInstance {
        panic!("mod init exploded");
    }

    unsafe extern "C-unwind" fn null_start() -> *mut RawModInstance {
        std::ptr::null_mut()
    }

    #[test]
    fn guarded_start_catches_faults() {
        let err = guarded_start(panicking_start).unwrap_err();
        assert!(err.contains("exploded"));
    }

    #[test]
    fn guarded_start_treats_null_as_absent() {
        assert!(guarded_start(null_start).unwrap().is_none());
    }

    fn not_installable_mod() -> (TempDir, NativeMod) {
        let temp = TempDir::new().unwrap();
        let cache = BinaryCache::new(temp.path().join("cache"));
        let root = temp.path().join("bare-mod");
        std::fs::create_dir_all(&root).unwrap();
        let m = NativeMod::new("bare-mod", &root, &cache);
        (temp, m)
    }

    #[test]
    fn mod_without_native_dir_is_not_installable() {
        let (_temp, m) = not_installable_mod();
        assert!(!m.is_installable());
        assert!(!m.is_started());
    }

    #[test]
    fn lifecycle_calls_are_noops_without_instance() {
        let (_temp, mut m) = not_installable_mod();
        let env = ScriptEnv::empty();

        m.start();
        assert!(!m.is_started());

        m.fire_script_start(&env);
        m.fire_script_start_for("bare-mod", &env);
        m.fire_script_stop(&env);
        m.fire_script_stop_for("bare-mod", &env);
        m.fire_engine_init();
        m.fire_program_start();
        m.fire_update();
        m.fire_library_loaded("companion.dll");
        m.uninstall();
    }

    static UPDATES: AtomicUsize = AtomicUsize::new(0);
    static PROGRAM_STARTS: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C-unwind" fn count_update(_data: *mut std::ffi::c_void) {
        UPDATES.fetch_add(1, Ordering::SeqCst);
    }

    unsafe extern "C-unwind" fn count_program_start(_data: *mut std::ffi::c_void) {
        PROGRAM_STARTS.fetch_add(1, Ordering::SeqCst);
    }

    static COUNTING_VTABLE: ModEventVTable = ModEventVTable {
        on_script_start: None,
        on_script_start_named: None,
        on_script_stop: None,
        on_script_stop_named: None,
        on_engine_init: None,
        on_program_start: Some(count_program_start),
        on_update: Some(count_update),
        on_library_loaded: None,
    };

    #[test]
    fn events_reach_the_instance_through_the_vtable() {
        let raw = Box::into_raw(Box::new(RawModInstance {
            data: std::ptr::null_mut(),
            vtable: &COUNTING_VTABLE,
        }));

        let (_temp, mut m) = not_installable_mod();
        m.instance = NonNull::new(raw);
        m.started = true;

        m.fire_program_start();
        m.fire_update();
        m.fire_update();
        m.fire_update();
        // Unhandled events fall through the empty slots
        m.fire_engine_init();

        assert_eq!(PROGRAM_STARTS.load(Ordering::SeqCst), 1);
        assert_eq!(UPDATES.load(Ordering::SeqCst), 3);

        // No module, so uninstall must not touch the instance
        m.uninstall();
        assert!(m.instance.is_some());
        assert!(!m.is_started());

        m.instance = None;
        drop(m);
        drop(unsafe { Box::from_raw(raw) });
    }

    #[test]
    fn null_vtable_instance_is_inert() {
        let raw = Box::into_raw(Box::new(RawModInstance {
            data: std::ptr::null_mut(),
            vtable: std::ptr::null(),
        }));

        let (_temp, mut m) = not_installable_mod();
        m.instance = NonNull::new(raw);
        m.started = true;

        m.fire_update();
        m.fire_program_start();

        m.instance = None;
        drop(unsafe { Box::from_raw(raw) });
    }
}
