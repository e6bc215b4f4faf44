//! Native mod support: loading shared libraries (.so, .dylib, .dll) that
//! implement the two-symbol mod ABI.
//!
//! A native mod ships its binaries in a `dlls` directory inside the mod
//! root; the primary binary must export `start_mod` and `uninstall_mod`.
//! Binaries are deduplicated through the content-addressed
//! [`BinaryCache`](crate::cache::BinaryCache) before loading, so editing
//! and rebuilding a mod's binary always maps a fresh file rather than an
//! already-loaded stale one.
//!
//! **Security note**: native mods run with full access to the host
//! process. There is no sandboxing or signature verification; only
//! install mods from trusted sources.
//!
//! ## Writing a mod in Rust
//!
//! ```rust,ignore
//! use modhost_core::mods::native::abi::ModEvents;
//!
//! struct MyMod;
//!
//! impl MyMod {
//!     fn new() -> Self { MyMod }
//! }
//!
//! impl ModEvents for MyMod {
//!     fn on_update(&mut self) { /* per-tick work */ }
//! }
//!
//! modhost_core::modhost_mod!(MyMod, MyMod::new);
//! ```

pub mod abi;
pub mod loader;
pub mod search_path;

pub use abi::{ModEvents, ScriptContext, ScriptEnv};
pub use loader::{NativeModule, NATIVE_DIR_NAME, PRIMARY_BINARY};
pub use search_path::SearchPathGuard;
