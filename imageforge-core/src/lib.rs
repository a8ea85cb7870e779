//! Embeddable core library for imageforge.
//!
//! Provides a clap-free, I/O-abstracted entry point suitable for
//! linking into a host orchestration engine or the bundled CLI.
//!
//! # Port traits
//!
//! All I/O is abstracted behind port traits in [`ports`]:
//! - [`ImageCatalog`](ports::ImageCatalog) — query and mutate the provider's image catalog
//! - [`ProcessRunner`](ports::ProcessRunner) — run external binaries with full output capture
//! - [`WorkspaceProvisioner`](ports::WorkspaceProvisioner) — scoped temporary build workspaces
//!
//! The [`adapters`] module provides the default OpenStack-CLI and
//! filesystem-backed implementations.
//!
//! # Entry point
//!
//! - [`reconcile`](pipeline::reconcile) — one full reconciliation pass,
//!   declared parameters in, `ActionResult` out

pub mod adapters;
pub mod executor;
pub mod pipeline;
pub mod ports;
pub mod settings;

pub use pipeline::{Capabilities, ReconcileError, reconcile};
pub use settings::RunSettings;

// Re-export the result type so embedders don't need imageforge-types directly.
pub use imageforge_types::result::ActionResult;
