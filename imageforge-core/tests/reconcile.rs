//! End-to-end pipeline tests against fake ports. No real provider,
//! no real build binary; every interaction is scripted and counted.

use std::cell::RefCell;

use imageforge_core::adapters::TempWorkspaces;
use imageforge_core::ports::{
    CatalogError, ImageCatalog, ProcessOutput, ProcessRequest, ProcessRunner,
};
use imageforge_core::{Capabilities, RunSettings, reconcile};
use imageforge_types::params::RawParams;
use imageforge_types::spec::ImageRecord;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

/// Catalog backed by a fixed image list, recording every mutation.
#[derive(Default)]
struct FakeCatalog {
    images: Vec<ImageRecord>,
    networks: Vec<(String, String)>,
    deleted: RefCell<Vec<String>>,
    fail_queries: bool,
}

impl ImageCatalog for FakeCatalog {
    fn find_image(&self, name: &str) -> Result<Option<ImageRecord>, CatalogError> {
        if self.fail_queries {
            return Err(CatalogError::Query {
                message: "connection refused".to_string(),
            });
        }
        Ok(self.images.iter().find(|img| img.name == name).cloned())
    }

    fn resolve_image_id(&self, name: &str) -> Result<String, CatalogError> {
        self.images
            .iter()
            .find(|img| img.name == name)
            .map(|img| img.id.clone())
            .ok_or_else(|| CatalogError::NotFound {
                kind: "image",
                name: name.to_string(),
            })
    }

    fn resolve_network_id(&self, name: &str) -> Result<String, CatalogError> {
        self.networks
            .iter()
            .find(|(net_name, _)| net_name == name)
            .map(|(_, id)| id.clone())
            .ok_or_else(|| CatalogError::NotFound {
                kind: "network",
                name: name.to_string(),
            })
    }

    fn delete_image(&self, id: &str) -> Result<(), CatalogError> {
        self.deleted.borrow_mut().push(id.to_string());
        Ok(())
    }
}

/// Runner that always succeeds, recording every request. On `build`
/// it drops a manifest into the workspace like the real tool does.
#[derive(Default)]
struct CountingRunner {
    requests: RefCell<Vec<ProcessRequest>>,
    manifest_artifact: Option<String>,
    build_exit_code: i32,
}

impl ProcessRunner for CountingRunner {
    fn run(&self, request: &ProcessRequest) -> anyhow::Result<ProcessOutput> {
        self.requests.borrow_mut().push(request.clone());
        if request.args[0] == "build" {
            if let Some(artifact) = &self.manifest_artifact {
                let manifest = json!({"builds": [{"artifact_id": artifact}]});
                let cwd = request.cwd.as_ref().expect("cwd");
                std::fs::write(
                    cwd.join("manifest.json").as_std_path(),
                    manifest.to_string(),
                )?;
            }
            return Ok(ProcessOutput {
                exit_code: self.build_exit_code,
                stdout: "build output\n".to_string(),
                stderr: if self.build_exit_code == 0 {
                    String::new()
                } else {
                    "builder error\n".to_string()
                },
            });
        }
        Ok(ProcessOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

fn caps<'a>(
    catalog: &'a FakeCatalog,
    runner: &'a CountingRunner,
    workspaces: &'a TempWorkspaces,
) -> Capabilities<'a> {
    Capabilities {
        catalog,
        runner,
        workspaces,
    }
}

fn present_params() -> RawParams {
    RawParams::from([
        ("name", json!("MyCentos7")),
        ("state", json!("present")),
        ("region", json!("REG1")),
        ("provider_auth_url", json!("https://auth.example/v2.0")),
        ("provider_username", json!("builder")),
        ("provider_token", json!("s3cret")),
        ("tenant_id", json!("tenant-1")),
        ("base_image", json!("Centos 7")),
        ("network_name", json!("Ext-Net")),
        ("flavor", json!("s1-2")),
        ("ssh_username", json!("centos")),
        (
            "provisioners",
            json!([{"type": "shell", "inline": ["yum -y update"]}]),
        ),
    ])
}

fn absent_params() -> RawParams {
    RawParams::from([("name", json!("MyCentos7")), ("state", json!("absent"))])
}

fn matching_record() -> ImageRecord {
    ImageRecord {
        id: "img-existing".to_string(),
        name: "MyCentos7".to_string(),
        base_image: Some("Centos 7".to_string()),
        flavor: Some("s1-2".to_string()),
        network: Some("Ext-Net".to_string()),
    }
}

fn seeded_catalog() -> FakeCatalog {
    FakeCatalog {
        images: vec![
            ImageRecord {
                id: "img-base".to_string(),
                name: "Centos 7".to_string(),
                base_image: None,
                flavor: None,
                network: None,
            },
        ],
        networks: vec![("Ext-Net".to_string(), "net-456".to_string())],
        ..Default::default()
    }
}

#[test]
fn missing_image_triggers_exactly_one_build() {
    let catalog = seeded_catalog();
    let runner = CountingRunner {
        manifest_artifact: Some("img-new".to_string()),
        ..Default::default()
    };
    let workspaces = TempWorkspaces;

    let result = reconcile(
        &present_params(),
        &RunSettings::default(),
        &caps(&catalog, &runner, &workspaces),
    );

    assert!(result.changed);
    assert!(!result.failed);
    assert_eq!(result.image_id.as_deref(), Some("img-new"));
    assert!(result.template_sha256.is_some());

    let requests = runner.requests.borrow();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].args[0], "validate");
    assert_eq!(requests[1].args[0], "build");
    // Provider credentials travel as environment, never as arguments.
    assert!(
        requests[1]
            .env
            .iter()
            .any(|(k, v)| k == "OS_PASSWORD" && v == "s3cret")
    );
    assert!(requests[1].args.iter().all(|arg| !arg.contains("s3cret")));
}

#[test]
fn matching_image_is_a_no_op() {
    let mut catalog = seeded_catalog();
    catalog.images.push(matching_record());
    let runner = CountingRunner::default();
    let workspaces = TempWorkspaces;

    let result = reconcile(
        &present_params(),
        &RunSettings::default(),
        &caps(&catalog, &runner, &workspaces),
    );

    assert!(!result.changed);
    assert!(!result.failed);
    assert_eq!(result.image_id.as_deref(), Some("img-existing"));
    assert_eq!(runner.requests.borrow().len(), 0);
}

#[test]
fn check_mode_reports_the_change_without_executing() {
    let catalog = seeded_catalog();
    let runner = CountingRunner::default();
    let workspaces = TempWorkspaces;
    let settings = RunSettings {
        check_mode: true,
        ..Default::default()
    };

    let result = reconcile(
        &present_params(),
        &settings,
        &caps(&catalog, &runner, &workspaces),
    );

    assert!(result.changed);
    assert!(!result.failed);
    assert!(result.message.contains("would be built"));
    assert_eq!(runner.requests.borrow().len(), 0);
    assert_eq!(result.template_sha256, None);
}

#[test]
fn diff_mode_attaches_before_and_after() {
    let mut catalog = seeded_catalog();
    catalog.images.push(ImageRecord {
        flavor: Some("s1-8".to_string()),
        ..matching_record()
    });
    let runner = CountingRunner::default();
    let workspaces = TempWorkspaces;
    let settings = RunSettings {
        check_mode: true,
        diff_mode: true,
        ..Default::default()
    };

    let result = reconcile(
        &present_params(),
        &settings,
        &caps(&catalog, &runner, &workspaces),
    );

    assert!(result.changed);
    assert!(result.message.contains("flavor"));
    let diff = result.diff.expect("diff");
    assert_eq!(
        diff.before,
        json!({"base_image": "Centos 7", "flavor": "s1-8", "network": "Ext-Net"})
    );
    assert_eq!(
        diff.after,
        json!({"base_image": "Centos 7", "flavor": "s1-2", "network": "Ext-Net"})
    );
}

#[test]
fn validation_error_reaches_neither_catalog_nor_runner() {
    let catalog = FakeCatalog {
        fail_queries: true, // would error loudly if consulted
        ..Default::default()
    };
    let runner = CountingRunner::default();
    let workspaces = TempWorkspaces;
    let params = RawParams::from([("name", json!("MyCentos7")), ("state", json!("present"))]);

    let result = reconcile(
        &params,
        &RunSettings::default(),
        &caps(&catalog, &runner, &workspaces),
    );

    assert!(result.failed);
    assert!(!result.changed);
    assert!(result.message.contains("validation failed"));
    assert_eq!(runner.requests.borrow().len(), 0);
}

#[test]
fn catalog_failure_is_never_treated_as_absence() {
    let catalog = FakeCatalog {
        fail_queries: true,
        ..Default::default()
    };
    let runner = CountingRunner::default();
    let workspaces = TempWorkspaces;

    let result = reconcile(
        &present_params(),
        &RunSettings::default(),
        &caps(&catalog, &runner, &workspaces),
    );

    assert!(result.failed);
    assert!(result.message.contains("provider inspection failed"));
    assert_eq!(runner.requests.borrow().len(), 0);
}

#[test]
fn failed_build_surfaces_captured_output() {
    let catalog = seeded_catalog();
    let runner = CountingRunner {
        build_exit_code: 1,
        ..Default::default()
    };
    let workspaces = TempWorkspaces;

    let result = reconcile(
        &present_params(),
        &RunSettings::default(),
        &caps(&catalog, &runner, &workspaces),
    );

    assert!(result.failed);
    assert!(!result.changed);
    assert!(result.message.contains("exit code 1"));
    assert!(result.message.contains("build output"));
    assert!(result.message.contains("builder error"));
}

#[test]
fn absent_image_already_gone_is_a_no_op() {
    let catalog = FakeCatalog::default();
    let runner = CountingRunner::default();
    let workspaces = TempWorkspaces;

    let result = reconcile(
        &absent_params(),
        &RunSettings::default(),
        &caps(&catalog, &runner, &workspaces),
    );

    assert!(!result.changed);
    assert!(!result.failed);
    assert!(catalog.deleted.borrow().is_empty());
}

#[test]
fn absent_deletes_the_existing_image() {
    let catalog = FakeCatalog {
        images: vec![matching_record()],
        ..Default::default()
    };
    let runner = CountingRunner::default();
    let workspaces = TempWorkspaces;

    let result = reconcile(
        &absent_params(),
        &RunSettings::default(),
        &caps(&catalog, &runner, &workspaces),
    );

    assert!(result.changed);
    assert!(!result.failed);
    assert_eq!(result.image_id.as_deref(), Some("img-existing"));
    assert_eq!(catalog.deleted.borrow().as_slice(), ["img-existing"]);
}

#[test]
fn absent_in_check_mode_deletes_nothing() {
    let catalog = FakeCatalog {
        images: vec![matching_record()],
        ..Default::default()
    };
    let runner = CountingRunner::default();
    let workspaces = TempWorkspaces;
    let settings = RunSettings {
        check_mode: true,
        diff_mode: true,
        ..Default::default()
    };

    let result = reconcile(
        &absent_params(),
        &settings,
        &caps(&catalog, &runner, &workspaces),
    );

    assert!(result.changed);
    assert!(result.message.contains("would be deleted"));
    assert!(catalog.deleted.borrow().is_empty());
    let diff = result.diff.expect("diff");
    assert_eq!(diff.after, Value::Null);
    assert!(diff.before.is_object());
}

#[test]
fn unresolvable_base_image_fails_before_any_invocation() {
    let catalog = FakeCatalog {
        networks: vec![("Ext-Net".to_string(), "net-456".to_string())],
        ..Default::default()
    };
    let runner = CountingRunner::default();
    let workspaces = TempWorkspaces;

    let result = reconcile(
        &present_params(),
        &RunSettings::default(),
        &caps(&catalog, &runner, &workspaces),
    );

    assert!(result.failed);
    assert!(result.message.contains("image `Centos 7` not found"));
    assert_eq!(runner.requests.borrow().len(), 0);
}
