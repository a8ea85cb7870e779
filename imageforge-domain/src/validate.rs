//! Declared-parameter validation: `RawParams` in, typed `BuildSpec` out.
//!
//! Pure transformation; no silent defaults for required fields. The
//! error names the offending field so the host engine can surface it
//! verbatim.

use imageforge_types::params::RawParams;
use imageforge_types::spec::{
    BuildIntent, BuildSpec, CatalogRef, DeclaredIntent, DesiredState, ProviderAuth,
    ProviderSession, Provisioner,
};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required parameter `{field}`")]
    Missing { field: &'static str },

    #[error("parameter `{field}`: {reason}")]
    Invalid { field: String, reason: String },

    #[error("unknown parameter `{key}`")]
    UnknownKey { key: String },
}

/// Every key the declared-parameter contract recognizes. Anything else
/// is rejected, not ignored.
///
/// `provisionners` is the spelling the original module interface
/// shipped with; it is kept as an accepted alias of `provisioners`.
const KNOWN_KEYS: &[&str] = &[
    "name",
    "state",
    "region",
    "base_image",
    "base_image_id",
    "flavor",
    "network_name",
    "network_id",
    "ssh_username",
    "provider_auth_url",
    "provider_username",
    "provider_token",
    "tenant_id",
    "provisioners",
    "provisionners",
    "no_clean",
];

/// Validate and normalize the declared parameters into a `BuildSpec`.
pub fn validate(params: &RawParams) -> Result<BuildSpec, ValidationError> {
    for key in params.keys() {
        if !KNOWN_KEYS.contains(&key) {
            return Err(ValidationError::UnknownKey {
                key: key.to_string(),
            });
        }
    }

    let name = require_str(params, "name")?.to_string();
    let state = parse_state(params)?;
    let no_clean = parse_no_clean(params)?;

    let intent = match state {
        DesiredState::Present => DeclaredIntent::Present {
            provider: require_provider(params)?,
            build: require_build_intent(params)?,
        },
        DesiredState::Absent => {
            // Build-specific fields are ignored for deletion; a provider
            // session is still picked up when the full block is present.
            let provider = optional_provider(params);
            debug!(name = %name, has_provider = provider.is_some(), "validated absent-state spec");
            DeclaredIntent::Absent { provider }
        }
    };

    Ok(BuildSpec {
        name,
        intent,
        no_clean,
    })
}

fn require_str<'a>(params: &'a RawParams, field: &'static str) -> Result<&'a str, ValidationError> {
    match params.get(field) {
        None => Err(ValidationError::Missing { field }),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) => Err(ValidationError::Missing { field }),
        Some(other) => Err(ValidationError::Invalid {
            field: field.to_string(),
            reason: format!("expected a string, got {}", json_kind(other)),
        }),
    }
}

fn parse_state(params: &RawParams) -> Result<DesiredState, ValidationError> {
    match require_str(params, "state")? {
        "present" => Ok(DesiredState::Present),
        "absent" => Ok(DesiredState::Absent),
        other => Err(ValidationError::Invalid {
            field: "state".to_string(),
            reason: format!("expected `present` or `absent`, got `{other}`"),
        }),
    }
}

fn parse_no_clean(params: &RawParams) -> Result<bool, ValidationError> {
    match params.get("no_clean") {
        None => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) if s == "true" => Ok(true),
        Some(Value::String(s)) if s == "false" => Ok(false),
        Some(other) => Err(ValidationError::Invalid {
            field: "no_clean".to_string(),
            reason: format!("expected a boolean, got {}", json_kind(other)),
        }),
    }
}

fn require_provider(params: &RawParams) -> Result<ProviderSession, ValidationError> {
    Ok(ProviderSession {
        region: require_str(params, "region")?.to_string(),
        auth: ProviderAuth {
            auth_url: require_str(params, "provider_auth_url")?.to_string(),
            username: require_str(params, "provider_username")?.to_string(),
            token: require_str(params, "provider_token")?.to_string(),
            tenant_id: require_str(params, "tenant_id")?.to_string(),
        },
    })
}

/// All-or-nothing: a provider session is only constructed when the
/// complete block was declared. Partial blocks on the absent path are
/// ignored like every other build-specific field.
fn optional_provider(params: &RawParams) -> Option<ProviderSession> {
    require_provider(params).ok()
}

fn require_build_intent(params: &RawParams) -> Result<BuildIntent, ValidationError> {
    // A declared name takes precedence over a direct id, matching the
    // provider module's documented behaviour.
    let base_image = match (params.get_str("base_image"), params.get_str("base_image_id")) {
        (Some(name), _) => CatalogRef::Name(name.to_string()),
        (None, Some(id)) => CatalogRef::Id(id.to_string()),
        (None, None) => return Err(ValidationError::Missing { field: "base_image" }),
    };

    let network = match (params.get_str("network_name"), params.get_str("network_id")) {
        (Some(name), _) => CatalogRef::Name(name.to_string()),
        (None, Some(id)) => CatalogRef::Id(id.to_string()),
        (None, None) => {
            return Err(ValidationError::Missing {
                field: "network_name",
            });
        }
    };

    Ok(BuildIntent {
        base_image,
        network,
        flavor: require_str(params, "flavor")?.to_string(),
        ssh_username: require_str(params, "ssh_username")?.to_string(),
        provisioners: parse_provisioners(params)?,
    })
}

fn parse_provisioners(params: &RawParams) -> Result<Vec<Provisioner>, ValidationError> {
    let (field, value) = match (params.get("provisioners"), params.get("provisionners")) {
        (Some(v), _) => ("provisioners", v),
        (None, Some(v)) => ("provisionners", v),
        (None, None) => return Ok(vec![]),
    };

    let entries = value.as_array().ok_or_else(|| ValidationError::Invalid {
        field: field.to_string(),
        reason: format!("expected a list, got {}", json_kind(value)),
    })?;

    let mut provisioners = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        provisioners.push(parse_provisioner(field, index, entry)?);
    }
    Ok(provisioners)
}

fn parse_provisioner(
    field: &str,
    index: usize,
    entry: &Value,
) -> Result<Provisioner, ValidationError> {
    let invalid = |reason: String| ValidationError::Invalid {
        field: format!("{field}[{index}]"),
        reason,
    };

    let obj = entry
        .as_object()
        .ok_or_else(|| invalid(format!("expected an object, got {}", json_kind(entry))))?;

    match obj.get("type").and_then(Value::as_str) {
        Some("shell") => {}
        Some(other) => return Err(invalid(format!("unrecognized type `{other}`"))),
        None => return Err(invalid("missing `type`".to_string())),
    }

    let script = match obj.get("script") {
        None => None,
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str().into()),
        Some(other) => {
            return Err(invalid(format!(
                "`script` must be a non-empty string, got {}",
                json_kind(other)
            )));
        }
    };

    let inline = match obj.get("inline") {
        None => vec![],
        Some(Value::Array(items)) => {
            let mut commands = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => commands.push(s.clone()),
                    other => {
                        return Err(invalid(format!(
                            "`inline` entries must be strings, got {}",
                            json_kind(other)
                        )));
                    }
                }
            }
            commands
        }
        Some(other) => {
            return Err(invalid(format!(
                "`inline` must be a list of strings, got {}",
                json_kind(other)
            )));
        }
    };

    match (&script, inline.is_empty()) {
        (None, true) => Err(invalid("requires `script` or `inline`".to_string())),
        (Some(_), false) => Err(invalid(
            "`script` and `inline` are mutually exclusive".to_string(),
        )),
        _ => Ok(Provisioner::Shell { script, inline }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
