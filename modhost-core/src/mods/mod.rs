//! The mod subsystem: per-mod native loading and host-driven lifecycle.
//!
//! Within one mod's activation the steps are strictly ordered:
//! cache-preparation, load, symbol resolution, start, per-tick updates,
//! uninstall, unload. Failure at any step prevents all later steps and
//! flags the mod not-installable for the rest of the session.

pub mod error;
pub mod manager;
pub mod native;
pub mod native_mod;

pub use error::InstallError;
pub use manager::ModManager;
pub use native_mod::NativeMod;
