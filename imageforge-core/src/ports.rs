//! Port traits abstracting all I/O away from the pipeline.

use camino::{Utf8Path, Utf8PathBuf};
use imageforge_types::spec::ImageRecord;
use thiserror::Error;

/// Provider catalog access failure. Distinct from "not found": a query
/// error must never be treated as an absent image.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("provider query failed: {message}")]
    Query { message: String },

    #[error("{kind} `{name}` not found in provider catalog")]
    NotFound { kind: &'static str, name: String },
}

/// Read and mutate access to the provider's image and network catalogs.
pub trait ImageCatalog {
    /// Look up an image by exact (whitespace-insensitive) name.
    /// Absence is `Ok(None)`; only real query failures are errors.
    fn find_image(&self, name: &str) -> Result<Option<ImageRecord>, CatalogError>;

    /// Resolve a base-image name to its provider id.
    fn resolve_image_id(&self, name: &str) -> Result<String, CatalogError>;

    /// Resolve a network name to its provider id.
    fn resolve_network_id(&self, name: &str) -> Result<String, CatalogError>;

    /// Delete an image by provider id.
    fn delete_image(&self, id: &str) -> Result<(), CatalogError>;
}

/// A fully specified subprocess invocation.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub program: Utf8PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<Utf8PathBuf>,
}

/// Captured outcome of a finished subprocess.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Subprocess execution with full output capture.
///
/// `run` blocks until the process exits; there is no streaming or
/// partial-result contract. Spawn failures are errors, non-zero exits
/// are not — they come back in the `ProcessOutput`.
pub trait ProcessRunner {
    fn run(&self, request: &ProcessRequest) -> anyhow::Result<ProcessOutput>;
}

/// A scoped temporary build workspace. Dropping it removes the
/// directory; `keep` disables cleanup for operator inspection.
pub trait Workspace {
    fn path(&self) -> &Utf8Path;

    /// Retain the directory past this invocation and return its path.
    fn keep(self: Box<Self>) -> anyhow::Result<Utf8PathBuf>;
}

/// Source of scoped workspaces, one per reconciliation.
pub trait WorkspaceProvisioner {
    fn provision(&self, label: &str) -> anyhow::Result<Box<dyn Workspace>>;
}
