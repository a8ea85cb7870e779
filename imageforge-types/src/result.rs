//! Reconciliation outcomes: the verdict, the execution result, and the
//! `ActionResult` handed back to the host engine.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification of the provider's current state relative to the
/// declared spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationVerdict {
    /// No image with the declared name exists.
    Absent,
    /// An image exists and its recorded attributes match the spec.
    PresentMatching { image_id: String },
    /// An image exists but at least one recorded attribute differs.
    PresentDivergent {
        image_id: String,
        /// Names of the attributes that differ, in a fixed order.
        fields: Vec<&'static str>,
    },
}

/// Outcome of running the external build binary. Transient; lives only
/// for the duration of one reconciliation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Succeeded {
        stdout: String,
    },
    Failed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    Skipped,
}

/// Structured before/after representation attached in diff mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDiff {
    pub before: Value,
    pub after: Value,
}

/// The value returned to the host engine. Constructed fresh per
/// invocation, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub schema: String,
    pub changed: bool,
    pub failed: bool,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<ActionDiff>,

    /// Provider id of the freshly built (or deleted) image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,

    /// Hex sha256 of the rendered template, when one was synthesized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_sha256: Option<String>,

    /// Path of the retained workspace when `no_clean` was set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<Utf8PathBuf>,
}

impl ActionResult {
    fn new(changed: bool, failed: bool, message: impl Into<String>) -> Self {
        Self {
            schema: crate::schema::IMAGEFORGE_RESULT_V1.to_string(),
            changed,
            failed,
            message: message.into(),
            diff: None,
            image_id: None,
            template_sha256: None,
            workspace: None,
        }
    }

    pub fn unchanged(message: impl Into<String>) -> Self {
        Self::new(false, false, message)
    }

    pub fn changed(message: impl Into<String>) -> Self {
        Self::new(true, false, message)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(false, true, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_are_omitted_when_unset() {
        let json = serde_json::to_string(&ActionResult::unchanged("up to date")).expect("serialize");
        assert!(!json.contains("diff"));
        assert!(!json.contains("image_id"));
        assert!(!json.contains("workspace"));
        assert!(json.contains(r#""changed":false"#));
    }

    #[test]
    fn failure_sets_failed_only() {
        let result = ActionResult::failure("boom");
        assert!(result.failed);
        assert!(!result.changed);
        assert_eq!(result.message, "boom");
    }
}
