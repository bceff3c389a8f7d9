//! Workspace umbrella crate.
//!
//! Re-exports the core service so host applications can depend on
//! `audioshelf-workspace` and enable the `desktop-shims` feature instead of
//! wiring each workspace crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
