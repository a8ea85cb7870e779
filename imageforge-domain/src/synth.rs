//! Template synthesis: validated intent in, Packer template out.
//!
//! Deterministic by construction: given the same spec and resolved ids
//! the rendered document is byte-identical. Diff mode and test
//! reproducibility both rely on this.

use imageforge_types::spec::{BuildIntent, CatalogRef, Provisioner};
use imageforge_types::template::{
    BuilderMetadata, ManifestPostProcessor, OpenStackBuilder, ProvisionerDescriptor, Template,
};

/// Provider ids resolved from the spec's declared names (or passed
/// through when the spec carried direct ids).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIds {
    pub source_image_id: String,
    pub network_id: String,
}

/// Manifest output path, relative to the build workspace.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Synthesize the build-tool template for `intent`.
///
/// The builder field map is fixed and versioned: every spec field maps
/// to exactly one builder field, and the metadata block records the
/// declared attributes so later reconciliations can detect drift.
pub fn synthesize(image_name: &str, region: &str, intent: &BuildIntent, ids: &ResolvedIds) -> Template {
    let builder = OpenStackBuilder {
        kind: "openstack".to_string(),
        region: region.to_string(),
        image_name: image_name.to_string(),
        source_image: ids.source_image_id.clone(),
        flavor: intent.flavor.clone(),
        insecure: "true".to_string(),
        ssh_ip_version: "4".to_string(),
        networks: vec![ids.network_id.clone()],
        communicator: "ssh".to_string(),
        ssh_username: intent.ssh_username.clone(),
        metadata: BuilderMetadata {
            base_image: declared_label(&intent.base_image),
            flavor: intent.flavor.clone(),
            network: declared_label(&intent.network),
        },
    };

    let provisioners = intent
        .provisioners
        .iter()
        .map(|p| match p {
            Provisioner::Shell { script, inline } => ProvisionerDescriptor::Shell {
                script: script.as_ref().map(|s| s.to_string()),
                inline: inline.clone(),
            },
        })
        .collect();

    Template {
        builders: vec![builder],
        provisioners,
        post_processors: vec![ManifestPostProcessor::new(MANIFEST_FILE)],
    }
}

/// Render the template to its on-disk JSON form.
pub fn render(template: &Template) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(template)
}

fn declared_label(reference: &CatalogRef) -> String {
    match reference {
        CatalogRef::Name(name) => name.clone(),
        CatalogRef::Id(id) => id.clone(),
    }
}
