//! The synthesized Packer template document and the manifest read back
//! after a build.
//!
//! Field names and the fixed builder values mirror the Packer OpenStack
//! builder schema (version-pinned mapping). Struct field order is the
//! serialization order, which is what makes rendering deterministic.

use serde::{Deserialize, Serialize};

/// A complete build-tool template: one builder, the declared
/// provisioners in order, and a manifest post-processor so the built
/// artifact id can be read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub builders: Vec<OpenStackBuilder>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provisioners: Vec<ProvisionerDescriptor>,

    #[serde(rename = "post-processors")]
    pub post_processors: Vec<ManifestPostProcessor>,
}

/// The OpenStack builder section. Values that Packer expects as strings
/// ("true", "4") stay strings here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenStackBuilder {
    #[serde(rename = "type")]
    pub kind: String,
    pub region: String,
    pub image_name: String,
    pub source_image: String,
    pub flavor: String,
    pub insecure: String,
    pub ssh_ip_version: String,
    pub networks: Vec<String>,
    pub communicator: String,
    pub ssh_username: String,
    pub metadata: BuilderMetadata,
}

/// Build attributes stamped onto the resulting image so a later
/// reconciliation can detect drift against the declared spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderMetadata {
    pub base_image: String,
    pub flavor: String,
    pub network: String,
}

/// One provisioner section; declaration order is preserved exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProvisionerDescriptor {
    Shell {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        script: Option<String>,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        inline: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestPostProcessor {
    #[serde(rename = "type")]
    pub kind: String,
    pub output: String,
    pub strip_path: String,
}

impl ManifestPostProcessor {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            kind: "manifest".to_string(),
            output: output.into(),
            strip_path: "true".to_string(),
        }
    }
}

/// The manifest Packer writes after a successful build.
///
/// Parsed tolerantly: unknown fields are ignored, `builds` defaults to
/// empty so a truncated manifest surfaces as "no artifact" rather than
/// a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildManifest {
    #[serde(default)]
    pub builds: Vec<ManifestBuild>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestBuild {
    pub artifact_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder_type: Option<String>,
}

impl BuildManifest {
    /// Artifact id of the first (and for this template, only) build.
    pub fn artifact_id(&self) -> Option<&str> {
        self.builds.first().map(|b| b.artifact_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn post_processors_key_is_hyphenated() {
        let template = Template {
            builders: vec![],
            provisioners: vec![],
            post_processors: vec![ManifestPostProcessor::new("manifest.json")],
        };
        let json = serde_json::to_string(&template).expect("serialize");
        assert!(json.contains(r#""post-processors""#));
        assert!(json.contains(r#""type":"manifest""#));
        assert!(json.contains(r#""strip_path":"true""#));
    }

    #[test]
    fn manifest_parses_packer_output() {
        let manifest: BuildManifest = serde_json::from_str(
            r#"{
                "builds": [
                    {
                        "name": "openstack",
                        "builder_type": "openstack",
                        "artifact_id": "0a1b2c3d",
                        "packer_run_uuid": "ignored"
                    }
                ],
                "last_run_uuid": "ignored"
            }"#,
        )
        .expect("parse");
        assert_eq!(manifest.artifact_id(), Some("0a1b2c3d"));
    }

    #[test]
    fn empty_manifest_has_no_artifact() {
        let manifest: BuildManifest = serde_json::from_str("{}").expect("parse");
        assert_eq!(manifest.artifact_id(), None);
    }
}
