//! Build execution: materialize the template into a scoped workspace,
//! invoke the build binary, and map its exit status to an outcome.

use crate::ports::{ProcessOutput, ProcessRequest, ProcessRunner, WorkspaceProvisioner};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use imageforge_domain::{render, synth::MANIFEST_FILE};
use imageforge_types::result::ExecutionResult;
use imageforge_types::template::{BuildManifest, Template};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("workspace error: {0:#}")]
    Workspace(anyhow::Error),

    #[error("render template: {0}")]
    Render(#[from] serde_json::Error),

    #[error("invoke `{program}`: {source:#}")]
    Spawn {
        program: Utf8PathBuf,
        source: anyhow::Error,
    },
}

/// Outcome of one executor pass.
#[derive(Debug)]
pub struct BuildOutcome {
    pub result: ExecutionResult,
    /// Artifact id recovered from the build manifest, on success.
    pub image_id: Option<String>,
    /// Hex sha256 of the rendered template, when one was materialized.
    pub template_sha256: Option<String>,
    /// Workspace path retained for inspection, when requested.
    pub retained_workspace: Option<Utf8PathBuf>,
}

impl BuildOutcome {
    /// Check-mode outcome: nothing was materialized or executed.
    pub fn skipped() -> Self {
        Self {
            result: ExecutionResult::Skipped,
            image_id: None,
            template_sha256: None,
            retained_workspace: None,
        }
    }
}

/// Runs the external build binary against a synthesized template inside
/// a scoped workspace. No retries; the only observable signal is the
/// final exit status plus captured output.
pub struct BuildExecutor<'a> {
    pub runner: &'a dyn ProcessRunner,
    pub workspaces: &'a dyn WorkspaceProvisioner,
    pub packer_bin: &'a Utf8Path,
}

impl BuildExecutor<'_> {
    pub fn execute(
        &self,
        image_name: &str,
        template: &Template,
        env: &[(String, String)],
        no_clean: bool,
    ) -> Result<BuildOutcome, ExecutorError> {
        let workspace = self
            .workspaces
            .provision(image_name)
            .map_err(ExecutorError::Workspace)?;

        let rendered = render(template)?;
        let template_sha256 = format!("{:x}", Sha256::digest(rendered.as_bytes()));

        let template_path = workspace.path().join("template.json");
        fs::write(&template_path, &rendered)
            .with_context(|| format!("write {template_path}"))
            .map_err(ExecutorError::Workspace)?;
        debug!(template = %template_path, sha256 = %template_sha256, "materialized template");

        // Pre-flight syntax check, then the build proper. Either failing
        // maps to a failed execution with its captured output.
        let mut image_id = None;
        let validate = self.run_packer("validate", &template_path, workspace.path(), env)?;
        let result = if !validate.success() {
            failed(validate)
        } else {
            let build = self.run_packer("build", &template_path, workspace.path(), env)?;
            if build.success() {
                image_id = read_manifest(workspace.path());
                info!(image_name, image_id = ?image_id, "build succeeded");
                ExecutionResult::Succeeded {
                    stdout: build.stdout,
                }
            } else {
                failed(build)
            }
        };

        let retained_workspace = if no_clean {
            let path = workspace.keep().map_err(ExecutorError::Workspace)?;
            info!(workspace = %path, "workspace retained for inspection");
            Some(path)
        } else {
            drop(workspace);
            None
        };

        Ok(BuildOutcome {
            result,
            image_id,
            template_sha256: Some(template_sha256),
            retained_workspace,
        })
    }

    fn run_packer(
        &self,
        subcommand: &str,
        template_path: &Utf8Path,
        cwd: &Utf8Path,
        env: &[(String, String)],
    ) -> Result<ProcessOutput, ExecutorError> {
        let request = ProcessRequest {
            program: self.packer_bin.to_path_buf(),
            args: vec![subcommand.to_string(), template_path.to_string()],
            env: env.to_vec(),
            cwd: Some(cwd.to_path_buf()),
        };
        debug!(program = %self.packer_bin, subcommand, "invoking build tool");
        self.runner
            .run(&request)
            .map_err(|source| ExecutorError::Spawn {
                program: self.packer_bin.to_path_buf(),
                source,
            })
    }
}

fn failed(output: ProcessOutput) -> ExecutionResult {
    ExecutionResult::Failed {
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
    }
}

/// Best effort: a successful build without a readable manifest still
/// reports success, just without an artifact id.
fn read_manifest(workspace: &Utf8Path) -> Option<String> {
    let manifest_path = workspace.join(MANIFEST_FILE);
    let contents = match fs::read_to_string(&manifest_path) {
        Ok(contents) => contents,
        Err(err) => {
            warn!(manifest = %manifest_path, error = %err, "build manifest unreadable");
            return None;
        }
    };
    match serde_json::from_str::<BuildManifest>(&contents) {
        Ok(manifest) => manifest.artifact_id().map(str::to_string),
        Err(err) => {
            warn!(manifest = %manifest_path, error = %err, "build manifest unparsable");
            None
        }
    }
}
