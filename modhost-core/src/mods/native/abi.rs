//! ABI definitions for native mod loading.
//!
//! This module defines the C ABI that every native mod binary must
//! implement: exactly two exported symbols, a factory and a destructor.
//!
//! ```c
//! // Required: create the mod instance
//! RawModInstance* start_mod();
//!
//! // Required: destroy the mod instance
//! void uninstall_mod(RawModInstance* instance);
//! ```
//!
//! The instance returned by `start_mod` pairs an opaque data pointer with
//! an event vtable. The host never constructs or inspects the data; all
//! lifecycle events are forwarded through the vtable, and any vtable slot
//! may be null if the mod does not handle that event.
//!
//! The entry points use the `"C-unwind"` ABI so a panic inside a
//! Rust-built mod unwinds back to the host's guarded start call instead
//! of aborting the process.

use std::ffi::{c_char, c_void};

/// Exported factory symbol, NUL-terminated for symbol lookup.
pub const START_SYMBOL: &[u8] = b"start_mod\0";

/// Exported destructor symbol.
pub const UNINSTALL_SYMBOL: &[u8] = b"uninstall_mod\0";

/// Opaque handle to a scripting context owned by the host's scripting
/// engine. Passed through to mods unmodified.
pub type ScriptContext = *mut c_void;

/// The set of scripting contexts handed to a mod on attach/detach: the
/// mod's own context, the shared main and background contexts, and any
/// auxiliary hook contexts.
#[repr(C)]
pub struct ScriptEnv {
    pub primary: ScriptContext,
    pub main: ScriptContext,
    pub background: ScriptContext,
    /// Pointer to `hooks_len` auxiliary contexts; may be null when empty.
    pub hooks: *const ScriptContext,
    pub hooks_len: usize,
}

impl ScriptEnv {
    /// An environment with no live contexts, for hosts without a
    /// scripting engine.
    pub fn empty() -> Self {
        Self {
            primary: std::ptr::null_mut(),
            main: std::ptr::null_mut(),
            background: std::ptr::null_mut(),
            hooks: std::ptr::null(),
            hooks_len: 0,
        }
    }

    /// The auxiliary hook contexts as a slice.
    pub fn hooks(&self) -> &[ScriptContext] {
        if self.hooks.is_null() || self.hooks_len == 0 {
            &[]
        } else {
            // Invariant: `hooks` points at `hooks_len` live contexts for
            // the duration of the event call.
            unsafe { std::slice::from_raw_parts(self.hooks, self.hooks_len) }
        }
    }
}

/// Event callbacks implemented by a mod instance. Any slot may be null.
#[repr(C)]
pub struct ModEventVTable {
    pub on_script_start:
        Option<unsafe extern "C-unwind" fn(data: *mut c_void, env: *const ScriptEnv)>,
    pub on_script_start_named: Option<
        unsafe extern "C-unwind" fn(
            data: *mut c_void,
            mod_name: *const c_char,
            env: *const ScriptEnv,
        ),
    >,
    pub on_script_stop:
        Option<unsafe extern "C-unwind" fn(data: *mut c_void, env: *const ScriptEnv)>,
    pub on_script_stop_named: Option<
        unsafe extern "C-unwind" fn(
            data: *mut c_void,
            mod_name: *const c_char,
            env: *const ScriptEnv,
        ),
    >,
    pub on_engine_init: Option<unsafe extern "C-unwind" fn(data: *mut c_void)>,
    pub on_program_start: Option<unsafe extern "C-unwind" fn(data: *mut c_void)>,
    pub on_update: Option<unsafe extern "C-unwind" fn(data: *mut c_void)>,
    pub on_library_loaded:
        Option<unsafe extern "C-unwind" fn(data: *mut c_void, library_name: *const c_char)>,
}

/// The object returned by `start_mod` and consumed by `uninstall_mod`.
#[repr(C)]
pub struct RawModInstance {
    /// Mod-private state; opaque to the host.
    pub data: *mut c_void,
    /// Event dispatch table; may be null for a mod with no event handlers.
    pub vtable: *const ModEventVTable,
}

/// Signature of the `start_mod` export.
pub type StartFn = unsafe extern "C-unwind" fn() -> *mut RawModInstance;

/// Signature of the `uninstall_mod` export.
pub type UninstallFn = unsafe extern "C-unwind" fn(*mut RawModInstance);

/// Trait implemented by Rust-authored mods. All handlers default to
/// no-ops; implement only the events you care about and export the type
/// with [`modhost_mod!`](crate::modhost_mod).
pub trait ModEvents {
    /// A scripting environment was attached.
    fn on_script_start(&mut self, _env: &ScriptEnv) {}

    /// A scripting environment was attached for the named mod.
    fn on_script_start_for(&mut self, _mod_name: &str, _env: &ScriptEnv) {}

    /// A scripting environment is about to be detached.
    fn on_script_stop(&mut self, _env: &ScriptEnv) {}

    /// A scripting environment is about to be detached for the named mod.
    fn on_script_stop_for(&mut self, _mod_name: &str, _env: &ScriptEnv) {}

    /// The underlying engine finished initializing. Fired once per process.
    fn on_engine_init(&mut self) {}

    /// The host program started.
    fn on_program_start(&mut self) {}

    /// One host tick. Fired every frame while the mod is active.
    fn on_update(&mut self) {}

    /// The host loaded another native library.
    fn on_library_loaded(&mut self, _library_name: &str) {}
}

/// Declares a native mod.
///
/// Generates the `start_mod`/`uninstall_mod` exports and the event vtable
/// for a type implementing [`ModEvents`]. Build the crate as a `cdylib`
/// named `main`.
///
/// # Example
///
/// ```rust,ignore
/// use modhost_core::mods::native::abi::ModEvents;
///
/// struct MyMod;
///
/// impl MyMod {
///     fn new() -> Self { MyMod }
/// }
///
/// impl ModEvents for MyMod {
///     fn on_update(&mut self) { /* per-tick work */ }
/// }
///
/// modhost_core::modhost_mod!(MyMod, MyMod::new);
/// ```
#[macro_export]
macro_rules! modhost_mod {
    ($ty:ty, $constructor:expr) => {
        unsafe extern "C-unwind" fn __modhost_on_script_start(
            data: *mut ::std::ffi::c_void,
            env: *const $crate::mods::native::abi::ScriptEnv,
        ) {
            if env.is_null() {
                return;
            }
            let this = &mut *(data as *mut $ty);
            <$ty as $crate::mods::native::abi::ModEvents>::on_script_start(this, &*env);
        }

        unsafe extern "C-unwind" fn __modhost_on_script_start_named(
            data: *mut ::std::ffi::c_void,
            mod_name: *const ::std::ffi::c_char,
            env: *const $crate::mods::native::abi::ScriptEnv,
        ) {
            if env.is_null() {
                return;
            }
            let name = if mod_name.is_null() {
                ::std::borrow::Cow::Borrowed("")
            } else {
                ::std::ffi::CStr::from_ptr(mod_name).to_string_lossy()
            };
            let this = &mut *(data as *mut $ty);
            <$ty as $crate::mods::native::abi::ModEvents>::on_script_start_for(this, &name, &*env);
        }

        unsafe extern "C-unwind" fn __modhost_on_script_stop(
            data: *mut ::std::ffi::c_void,
            env: *const $crate::mods::native::abi::ScriptEnv,
        ) {
            if env.is_null() {
                return;
            }
            let this = &mut *(data as *mut $ty);
            <$ty as $crate::mods::native::abi::ModEvents>::on_script_stop(this, &*env);
        }

        unsafe extern "C-unwind" fn __modhost_on_script_stop_named(
            data: *mut ::std::ffi::c_void,
            mod_name: *const ::std::ffi::c_char,
            env: *const $crate::mods::native::abi::ScriptEnv,
        ) {
            if env.is_null() {
                return;
            }
            let name = if mod_name.is_null() {
                ::std::borrow::Cow::Borrowed("")
            } else {
                ::std::ffi::CStr::from_ptr(mod_name).to_string_lossy()
            };
            let this = &mut *(data as *mut $ty);
            <$ty as $crate::mods::native::abi::ModEvents>::on_script_stop_for(this, &name, &*env);
        }

        unsafe extern "C-unwind" fn __modhost_on_engine_init(data: *mut ::std::ffi::c_void) {
            let this = &mut *(data as *mut $ty);
            <$ty as $crate::mods::native::abi::ModEvents>::on_engine_init(this);
        }

        unsafe extern "C-unwind" fn __modhost_on_program_start(data: *mut ::std::ffi::c_void) {
            let this = &mut *(data as *mut $ty);
            <$ty as $crate::mods::native::abi::ModEvents>::on_program_start(this);
        }

        unsafe extern "C-unwind" fn __modhost_on_update(data: *mut ::std::ffi::c_void) {
            let this = &mut *(data as *mut $ty);
            <$ty as $crate::mods::native::abi::ModEvents>::on_update(this);
        }

        unsafe extern "C-unwind" fn __modhost_on_library_loaded(
            data: *mut ::std::ffi::c_void,
            library_name: *const ::std::ffi::c_char,
        ) {
            let name = if library_name.is_null() {
                ::std::borrow::Cow::Borrowed("")
            } else {
                ::std::ffi::CStr::from_ptr(library_name).to_string_lossy()
            };
            let this = &mut *(data as *mut $ty);
            <$ty as $crate::mods::native::abi::ModEvents>::on_library_loaded(this, &name);
        }

        static __MODHOST_VTABLE: $crate::mods::native::abi::ModEventVTable =
            $crate::mods::native::abi::ModEventVTable {
                on_script_start: Some(__modhost_on_script_start),
                on_script_start_named: Some(__modhost_on_script_start_named),
                on_script_stop: Some(__modhost_on_script_stop),
                on_script_stop_named: Some(__modhost_on_script_stop_named),
                on_engine_init: Some(__modhost_on_engine_init),
                on_program_start: Some(__modhost_on_program_start),
                on_update: Some(__modhost_on_update),
                on_library_loaded: Some(__modhost_on_library_loaded),
            };

        #[no_mangle]
        pub unsafe extern "C-unwind" fn start_mod(
        ) -> *mut $crate::mods::native::abi::RawModInstance {
            let data = ::std::boxed::Box::new($constructor());
            let instance = $crate::mods::native::abi::RawModInstance {
                data: ::std::boxed::Box::into_raw(data) as *mut ::std::ffi::c_void,
                vtable: &__MODHOST_VTABLE,
            };
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(instance))
        }

        #[no_mangle]
        pub unsafe extern "C-unwind" fn uninstall_mod(
            instance: *mut $crate::mods::native::abi::RawModInstance,
        ) {
            if instance.is_null() {
                return;
            }
            let instance = ::std::boxed::Box::from_raw(instance);
            if !instance.data.is_null() {
                drop(::std::boxed::Box::from_raw(instance.data as *mut $ty));
            }
        }
    };
}
