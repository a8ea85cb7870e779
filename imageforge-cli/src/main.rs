use std::io::Read;
use std::process::ExitCode;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use fs_err as fs;
use imageforge_core::adapters::{OpenStackCliCatalog, ShellProcessRunner, TempWorkspaces};
use imageforge_core::{Capabilities, RunSettings, reconcile};
use imageforge_types::params::RawParams;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "imageforge",
    version,
    about = "Reconcile a declared machine image against the provider catalog."
)]
struct Cli {
    /// Path to the declared-parameter JSON document, or `-` for stdin.
    #[arg(long, default_value = "-")]
    params: String,

    /// Report the intended change without mutating anything.
    #[arg(long, default_value_t = false)]
    check: bool,

    /// Attach a structured before/after diff to the result.
    #[arg(long, default_value_t = false)]
    diff: bool,

    /// Path to the packer binary.
    #[arg(long, env = "IMAGEFORGE_PACKER_BIN")]
    packer_bin: Option<Utf8PathBuf>,

    /// Path to the openstack CLI client.
    #[arg(long, env = "IMAGEFORGE_OPENSTACK_BIN")]
    openstack_bin: Option<Utf8PathBuf>,

    /// Path to the neutron CLI client.
    #[arg(long, env = "IMAGEFORGE_NEUTRON_BIN")]
    neutron_bin: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match run(cli) {
        Ok(result) => result,
        Err(e) => {
            error!("{:?}", e);
            return ExitCode::from(2);
        }
    };

    // The result document is the program's one stdout artifact.
    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            error!("serialize result: {e}");
            return ExitCode::from(2);
        }
    }
    if result.failed {
        ExitCode::from(1)
    } else {
        ExitCode::from(0)
    }
}

fn run(cli: Cli) -> anyhow::Result<imageforge_core::ActionResult> {
    let params = read_params(&cli.params)?;

    let mut settings = RunSettings {
        check_mode: cli.check,
        diff_mode: cli.diff,
        ..Default::default()
    };
    if let Some(bin) = cli.packer_bin {
        settings.packer_bin = bin;
    }
    if let Some(bin) = cli.openstack_bin {
        settings.openstack_bin = bin;
    }
    if let Some(bin) = cli.neutron_bin {
        settings.neutron_bin = bin;
    }

    let runner = ShellProcessRunner;
    let workspaces = TempWorkspaces;

    // Catalog authentication needs validated credentials, so validate
    // up front; reconcile repeats the (pure) validation and reports the
    // error itself when the document is malformed.
    let catalog = match imageforge_domain::validate(&params) {
        Ok(spec) => match spec.provider() {
            Some(session) => OpenStackCliCatalog::new(&runner, session, &settings),
            None => OpenStackCliCatalog::unauthenticated(&runner, &settings),
        },
        Err(_) => OpenStackCliCatalog::unauthenticated(&runner, &settings),
    };

    let caps = Capabilities {
        catalog: &catalog,
        runner: &runner,
        workspaces: &workspaces,
    };
    Ok(reconcile(&params, &settings, &caps))
}

fn read_params(source: &str) -> anyhow::Result<RawParams> {
    let contents = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read parameters from stdin")?;
        buf
    } else {
        fs::read_to_string(source).with_context(|| format!("read parameters from {source}"))?
    };
    serde_json::from_str(&contents).context("parse parameter document")
}
