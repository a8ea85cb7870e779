//! The validated build specification and the provider catalog record.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Declared target state for the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    Present,
    Absent,
}

/// A catalog object referenced either by name (resolved at build time)
/// or directly by provider id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogRef {
    Name(String),
    Id(String),
}

/// Credentials and scope for talking to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAuth {
    pub auth_url: String,
    pub username: String,
    pub token: String,
    pub tenant_id: String,
}

/// Region plus credentials; everything needed to derive the provider
/// environment for catalog queries and the build subprocess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSession {
    pub region: String,
    pub auth: ProviderAuth,
}

/// An ordered provisioning step. Only shell steps are recognized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Provisioner {
    Shell {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        script: Option<Utf8PathBuf>,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        inline: Vec<String>,
    },
}

/// Build-specific intent; carried only by present-state specs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildIntent {
    pub base_image: CatalogRef,
    pub network: CatalogRef,
    pub flavor: String,
    pub ssh_username: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provisioners: Vec<Provisioner>,
}

/// What the declared state requires of the provider. Present-state
/// specs always carry a full provider session and build intent; the
/// deletion path needs neither, though it uses a session when one was
/// declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeclaredIntent {
    Present {
        provider: ProviderSession,
        build: BuildIntent,
    },
    Absent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<ProviderSession>,
    },
}

/// The validated declared intent. Constructed only by the validator;
/// all downstream components consume this typed form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub name: String,

    #[serde(flatten)]
    pub intent: DeclaredIntent,

    #[serde(default)]
    pub no_clean: bool,
}

impl BuildSpec {
    pub fn state(&self) -> DesiredState {
        match self.intent {
            DeclaredIntent::Present { .. } => DesiredState::Present,
            DeclaredIntent::Absent { .. } => DesiredState::Absent,
        }
    }

    pub fn build(&self) -> Option<&BuildIntent> {
        match &self.intent {
            DeclaredIntent::Present { build, .. } => Some(build),
            DeclaredIntent::Absent { .. } => None,
        }
    }

    pub fn provider(&self) -> Option<&ProviderSession> {
        match &self.intent {
            DeclaredIntent::Present { provider, .. } => Some(provider),
            DeclaredIntent::Absent { provider } => provider.as_ref(),
        }
    }
}

/// A provider image-catalog entry, as much of it as the adapter could
/// recover. Build attributes are recorded as image metadata at build
/// time; older or foreign images may not carry them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}
