pub mod cache;
pub mod checksum;
pub mod mods;
pub mod settings;

// Public library API - hosts embedding modhost as a library should only
// need these (but everything is public so go nuts).
pub use cache::BinaryCache;
pub use mods::manager::ModManager;
pub use mods::native::abi::{ModEvents, ScriptContext, ScriptEnv};
pub use mods::native_mod::NativeMod;
pub use settings::HostSettings;
