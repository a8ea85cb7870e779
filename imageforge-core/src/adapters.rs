//! Default port implementations: OpenStack CLI catalog, shell process
//! runner, and tempdir-backed workspaces.

use crate::ports::{
    CatalogError, ImageCatalog, ProcessOutput, ProcessRequest, ProcessRunner, Workspace,
    WorkspaceProvisioner,
};
use crate::settings::RunSettings;
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use imageforge_types::spec::{ImageRecord, ProviderSession};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// The provider environment handed to both the catalog CLI and the
/// build subprocess.
pub fn provider_env(session: &ProviderSession) -> Vec<(String, String)> {
    vec![
        ("OS_REGION_NAME".to_string(), session.region.clone()),
        ("OS_AUTH_URL".to_string(), session.auth.auth_url.clone()),
        ("OS_USERNAME".to_string(), session.auth.username.clone()),
        ("OS_TENANT_ID".to_string(), session.auth.tenant_id.clone()),
        ("OS_PASSWORD".to_string(), session.auth.token.clone()),
    ]
}

/// Runs subprocesses via `std::process::Command`, blocking until exit
/// with full output capture.
#[derive(Debug, Clone, Default)]
pub struct ShellProcessRunner;

impl ProcessRunner for ShellProcessRunner {
    fn run(&self, request: &ProcessRequest) -> anyhow::Result<ProcessOutput> {
        let mut command = std::process::Command::new(request.program.as_std_path());
        command.args(&request.args);
        for (key, value) in &request.env {
            command.env(key, value);
        }
        if let Some(cwd) = &request.cwd {
            command.current_dir(cwd.as_std_path());
        }

        debug!(program = %request.program, args = ?request.args, "spawning subprocess");
        let output = command
            .output()
            .with_context(|| format!("spawn {}", request.program))?;

        Ok(ProcessOutput {
            // A missing code means the process died to a signal.
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Image and network catalog access through the OpenStack command-line
/// clients, authenticated via the OS_* environment.
pub struct OpenStackCliCatalog<'a> {
    runner: &'a dyn ProcessRunner,
    env: Vec<(String, String)>,
    openstack_bin: Utf8PathBuf,
    neutron_bin: Utf8PathBuf,
}

#[derive(Debug, Deserialize)]
struct ImageRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Properties", default)]
    properties: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct NetworkRow {
    id: String,
    name: String,
}

impl<'a> OpenStackCliCatalog<'a> {
    pub fn new(
        runner: &'a dyn ProcessRunner,
        session: &ProviderSession,
        settings: &RunSettings,
    ) -> Self {
        Self {
            runner,
            env: provider_env(session),
            openstack_bin: settings.openstack_bin.clone(),
            neutron_bin: settings.neutron_bin.clone(),
        }
    }

    /// A catalog with no credentials. Every query will be rejected by
    /// the provider, which surfaces as `CatalogError::Query`.
    pub fn unauthenticated(runner: &'a dyn ProcessRunner, settings: &RunSettings) -> Self {
        Self {
            runner,
            env: vec![],
            openstack_bin: settings.openstack_bin.clone(),
            neutron_bin: settings.neutron_bin.clone(),
        }
    }

    fn run_cli(&self, program: &Utf8Path, args: &[&str]) -> Result<ProcessOutput, CatalogError> {
        let request = ProcessRequest {
            program: program.to_path_buf(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: self.env.clone(),
            cwd: None,
        };
        let output = self
            .runner
            .run(&request)
            .map_err(|err| CatalogError::Query {
                message: format!("{err:#}"),
            })?;

        if !output.success() {
            return Err(CatalogError::Query {
                message: format!(
                    "`{} {}` exited with code {}: {}",
                    program,
                    args.join(" "),
                    output.exit_code,
                    output.stderr.trim()
                ),
            });
        }
        Ok(output)
    }

    fn list_images(&self, private_only: bool) -> Result<Vec<ImageRow>, CatalogError> {
        let mut args = vec!["image", "list"];
        if private_only {
            args.push("--private");
        }
        args.extend(["--long", "-f", "json"]);
        let output = self.run_cli(&self.openstack_bin, &args)?;
        parse_rows(&output.stdout, "image list")
    }
}

impl ImageCatalog for OpenStackCliCatalog<'_> {
    fn find_image(&self, name: &str) -> Result<Option<ImageRecord>, CatalogError> {
        let record = self
            .list_images(true)?
            .into_iter()
            .find(|row| names_match(&row.name, name))
            .map(|row| ImageRecord {
                base_image: property(&row.properties, "base_image"),
                flavor: property(&row.properties, "flavor"),
                network: property(&row.properties, "network"),
                id: row.id,
                name: row.name,
            });
        debug!(name, found = record.is_some(), "image catalog lookup");
        Ok(record)
    }

    fn resolve_image_id(&self, name: &str) -> Result<String, CatalogError> {
        self.list_images(false)?
            .into_iter()
            .find(|row| names_match(&row.name, name))
            .map(|row| row.id)
            .ok_or_else(|| CatalogError::NotFound {
                kind: "image",
                name: name.to_string(),
            })
    }

    fn resolve_network_id(&self, name: &str) -> Result<String, CatalogError> {
        let output = self.run_cli(&self.neutron_bin, &["net-list", "-f", "json"])?;
        let rows: Vec<NetworkRow> = parse_rows(&output.stdout, "net-list")?;
        rows.into_iter()
            .find(|row| names_match(&row.name, name))
            .map(|row| row.id)
            .ok_or_else(|| CatalogError::NotFound {
                kind: "network",
                name: name.to_string(),
            })
    }

    fn delete_image(&self, id: &str) -> Result<(), CatalogError> {
        self.run_cli(&self.openstack_bin, &["image", "delete", id])?;
        Ok(())
    }
}

fn parse_rows<T: serde::de::DeserializeOwned>(
    stdout: &str,
    what: &str,
) -> Result<Vec<T>, CatalogError> {
    serde_json::from_str(stdout).map_err(|err| CatalogError::Query {
        message: format!("unexpected {what} output: {err}"),
    })
}

/// The provider CLI pads some name columns; compare with all
/// whitespace stripped.
fn names_match(recorded: &str, declared: &str) -> bool {
    let squash = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    squash(recorded) == squash(declared)
}

fn property(properties: &Option<Value>, key: &str) -> Option<String> {
    properties
        .as_ref()?
        .get(key)?
        .as_str()
        .map(str::to_string)
}

/// Provisions scoped workspaces under the system temp directory.
#[derive(Debug, Clone, Default)]
pub struct TempWorkspaces;

struct TempWorkspace {
    dir: tempfile::TempDir,
    path: Utf8PathBuf,
}

impl WorkspaceProvisioner for TempWorkspaces {
    fn provision(&self, label: &str) -> anyhow::Result<Box<dyn Workspace>> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("imageforge-{label}."))
            .tempdir()
            .context("create build workspace")?;
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(|p| anyhow::anyhow!("workspace path is not UTF-8: {}", p.display()))?;
        debug!(workspace = %path, "provisioned build workspace");
        Ok(Box::new(TempWorkspace { dir, path }))
    }
}

impl Workspace for TempWorkspace {
    fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn keep(self: Box<Self>) -> anyhow::Result<Utf8PathBuf> {
        let path = self.dir.keep();
        Utf8PathBuf::from_path_buf(path)
            .map_err(|p| anyhow::anyhow!("workspace path is not UTF-8: {}", p.display()))
    }
}
