//! Drift classification: declared intent vs the provider's catalog
//! record.

use imageforge_types::result::ReconciliationVerdict;
use imageforge_types::spec::{BuildIntent, CatalogRef, ImageRecord};
use serde_json::{Value, json};
use tracing::debug;

/// Classify the provider's current state relative to the declared spec.
///
/// Attribute comparison is conservative: a record that does not carry a
/// given attribute compares as matching on that axis, since drift
/// cannot be established from missing data. Only explicit mismatches
/// mark the image divergent.
pub fn classify(intent: &BuildIntent, record: Option<&ImageRecord>) -> ReconciliationVerdict {
    let Some(record) = record else {
        return ReconciliationVerdict::Absent;
    };

    let mut fields = Vec::new();
    if differs(record.base_image.as_deref(), declared_ref(&intent.base_image)) {
        fields.push("base_image");
    }
    if differs(record.flavor.as_deref(), Some(intent.flavor.as_str())) {
        fields.push("flavor");
    }
    if differs(record.network.as_deref(), declared_ref(&intent.network)) {
        fields.push("network");
    }

    if fields.is_empty() {
        ReconciliationVerdict::PresentMatching {
            image_id: record.id.clone(),
        }
    } else {
        debug!(image_id = %record.id, ?fields, "recorded attributes diverge from spec");
        ReconciliationVerdict::PresentDivergent {
            image_id: record.id.clone(),
            fields,
        }
    }
}

/// The declared attributes as a diff-friendly JSON value.
pub fn declared_attributes(intent: &BuildIntent) -> Value {
    json!({
        "base_image": declared_ref(&intent.base_image),
        "flavor": intent.flavor,
        "network": declared_ref(&intent.network),
    })
}

/// The recorded attributes of an existing image, or `null` when the
/// image is absent.
pub fn recorded_attributes(record: Option<&ImageRecord>) -> Value {
    match record {
        None => Value::Null,
        Some(record) => json!({
            "base_image": record.base_image,
            "flavor": record.flavor,
            "network": record.network,
        }),
    }
}

fn declared_ref(reference: &CatalogRef) -> Option<&str> {
    match reference {
        CatalogRef::Name(name) => Some(name.as_str()),
        CatalogRef::Id(id) => Some(id.as_str()),
    }
}

fn differs(recorded: Option<&str>, declared: Option<&str>) -> bool {
    match (recorded, declared) {
        (Some(recorded), Some(declared)) => recorded != declared,
        _ => false,
    }
}
