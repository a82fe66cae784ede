//! Workspace facade crate.
//!
//! Exposes the workspace crates behind a single dependency so host
//! applications can enable `desktop-shims` and get the import core, the
//! runtime (logging, configuration, events) and the desktop bridges wired
//! together without listing each crate.

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;
#[cfg(feature = "desktop-shims")]
pub use core_import;
#[cfg(feature = "desktop-shims")]
pub use core_runtime;
