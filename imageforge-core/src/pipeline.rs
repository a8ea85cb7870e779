//! The reconcile pipeline: declared parameters in, `ActionResult` out.
//!
//! One synchronous pass through validate → inspect → plan → execute.
//! All I/O happens through the injected capabilities; the pipeline
//! itself never touches the filesystem, network, or subprocesses.

use crate::adapters::provider_env;
use crate::executor::{BuildExecutor, BuildOutcome, ExecutorError};
use crate::ports::{CatalogError, ImageCatalog, ProcessRunner, WorkspaceProvisioner};
use crate::settings::RunSettings;
use chrono::Utc;
use imageforge_domain::{
    ResolvedIds, ValidationError, classify, declared_attributes, recorded_attributes, synthesize,
    validate,
};
use imageforge_types::params::RawParams;
use imageforge_types::result::{
    ActionDiff, ActionResult, ExecutionResult, ReconciliationVerdict,
};
use imageforge_types::spec::{
    BuildIntent, CatalogRef, DeclaredIntent, ImageRecord, ProviderSession,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

/// Everything the pipeline needs from the outside world, injected by
/// the host. Substituting fakes here is how the pipeline is tested.
pub struct Capabilities<'a> {
    pub catalog: &'a dyn ImageCatalog,
    pub runner: &'a dyn ProcessRunner,
    pub workspaces: &'a dyn WorkspaceProvisioner,
}

/// The four fatal error kinds. Each terminates the pass immediately;
/// none are retried.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("provider inspection failed: {0}")]
    Inspection(#[from] CatalogError),

    #[error("workspace error: {0:#}")]
    Workspace(anyhow::Error),

    #[error("build tool invocation failed: {0}")]
    Execution(ExecutorError),
}

impl From<ExecutorError> for ReconcileError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Workspace(inner) => ReconcileError::Workspace(inner),
            other => ReconcileError::Execution(other),
        }
    }
}

/// Run one full reconciliation pass.
///
/// Never panics and never returns an error: every failure kind is
/// folded into an `ActionResult` with `failed = true`, which is the
/// only shape the host engine consumes.
pub fn reconcile(params: &RawParams, settings: &RunSettings, caps: &Capabilities) -> ActionResult {
    let started_at = Utc::now();
    let result = match try_reconcile(params, settings, caps) {
        Ok(result) => result,
        Err(err) => {
            error!(error = %err, "reconciliation failed");
            ActionResult::failure(err.to_string())
        }
    };
    info!(
        changed = result.changed,
        failed = result.failed,
        duration_ms = (Utc::now() - started_at).num_milliseconds(),
        "reconciliation finished"
    );
    result
}

fn try_reconcile(
    params: &RawParams,
    settings: &RunSettings,
    caps: &Capabilities,
) -> Result<ActionResult, ReconcileError> {
    let spec = validate(params)?;
    info!(
        name = %spec.name,
        state = ?spec.state(),
        check_mode = settings.check_mode,
        "reconciling image"
    );

    match &spec.intent {
        DeclaredIntent::Absent { .. } => reconcile_absent(&spec.name, settings, caps),
        DeclaredIntent::Present { provider, build } => {
            reconcile_present(&spec.name, provider, build, spec.no_clean, settings, caps)
        }
    }
}

fn reconcile_absent(
    name: &str,
    settings: &RunSettings,
    caps: &Capabilities,
) -> Result<ActionResult, ReconcileError> {
    let record = caps.catalog.find_image(name)?;

    let mut result = match &record {
        None => ActionResult::unchanged(format!("image `{name}` already absent")),
        Some(record) => {
            let mut result = if settings.check_mode {
                ActionResult::changed(format!(
                    "image `{name}` (id {}) would be deleted",
                    record.id
                ))
            } else {
                caps.catalog.delete_image(&record.id)?;
                info!(name, image_id = %record.id, "image deleted");
                ActionResult::changed(format!("image `{name}` (id {}) deleted", record.id))
            };
            result.image_id = Some(record.id.clone());
            result
        }
    };

    if settings.diff_mode {
        result.diff = Some(ActionDiff {
            before: recorded_attributes(record.as_ref()),
            after: Value::Null,
        });
    }
    Ok(result)
}

fn reconcile_present(
    name: &str,
    provider: &ProviderSession,
    build: &BuildIntent,
    no_clean: bool,
    settings: &RunSettings,
    caps: &Capabilities,
) -> Result<ActionResult, ReconcileError> {
    let record = caps.catalog.find_image(name)?;
    let verdict = classify(build, record.as_ref());

    if let ReconciliationVerdict::PresentMatching { image_id } = &verdict {
        debug!(name, image_id = %image_id, "image matches declared state");
        let mut result =
            ActionResult::unchanged(format!("image `{name}` is up to date (id {image_id})"));
        result.image_id = Some(image_id.clone());
        return Ok(result);
    }

    // Planned: a build is necessary. The diff is attached in both check
    // and apply mode.
    let diff = settings.diff_mode.then(|| ActionDiff {
        before: recorded_attributes(record.as_ref()),
        after: declared_attributes(build),
    });

    let outcome = if settings.check_mode {
        BuildOutcome::skipped()
    } else {
        let ids = resolve_ids(build, caps.catalog)?;
        let template = synthesize(name, &provider.region, build, &ids);
        let executor = BuildExecutor {
            runner: caps.runner,
            workspaces: caps.workspaces,
            packer_bin: &settings.packer_bin,
        };
        executor.execute(name, &template, &provider_env(provider), no_clean)?
    };

    let mut result = match outcome.result {
        ExecutionResult::Skipped => {
            ActionResult::changed(planned_message(name, record.as_ref(), &verdict, true))
        }
        ExecutionResult::Succeeded { .. } => {
            let mut result =
                ActionResult::changed(planned_message(name, record.as_ref(), &verdict, false));
            result.image_id = outcome.image_id;
            result
        }
        ExecutionResult::Failed {
            exit_code,
            stdout,
            stderr,
        } => ActionResult::failure(format!(
            "build of image `{name}` failed with exit code {exit_code}\n\
             --- captured stdout ---\n{stdout}\n--- captured stderr ---\n{stderr}"
        )),
    };

    result.diff = diff;
    result.template_sha256 = outcome.template_sha256;
    if let Some(workspace) = outcome.retained_workspace {
        result
            .message
            .push_str(&format!("; workspace retained at {workspace}"));
        result.workspace = Some(workspace);
    }
    Ok(result)
}

fn planned_message(
    name: &str,
    record: Option<&ImageRecord>,
    verdict: &ReconciliationVerdict,
    check_mode: bool,
) -> String {
    let action = match (record, check_mode) {
        (None, true) => "would be built",
        (None, false) => "built",
        (Some(_), true) => "would be rebuilt",
        (Some(_), false) => "rebuilt",
    };
    match verdict {
        ReconciliationVerdict::PresentDivergent { fields, .. } => {
            format!("image `{name}` {action} (diverged in: {})", fields.join(", "))
        }
        _ => format!("image `{name}` {action}"),
    }
}

fn resolve_ids(
    build: &BuildIntent,
    catalog: &dyn ImageCatalog,
) -> Result<ResolvedIds, ReconcileError> {
    let source_image_id = match &build.base_image {
        CatalogRef::Id(id) => id.clone(),
        CatalogRef::Name(name) => catalog.resolve_image_id(name)?,
    };
    let network_id = match &build.network {
        CatalogRef::Id(id) => id.clone(),
        CatalogRef::Name(name) => catalog.resolve_network_id(name)?,
    };
    Ok(ResolvedIds {
        source_image_id,
        network_id,
    })
}
