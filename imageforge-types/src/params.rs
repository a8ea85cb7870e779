//! The raw declared-parameter document supplied by the host engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The declared parameters exactly as the host engine handed them over.
///
/// Keys are kept in a sorted map so validation error ordering is
/// deterministic. Values stay as raw JSON until the validator has
/// checked them; nothing downstream reads `RawParams` directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawParams {
    pub entries: BTreeMap<String, Value>,
}

impl RawParams {
    pub fn new(entries: BTreeMap<String, Value>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns the value for `key` if it is a non-empty string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<const N: usize> From<[(&str, Value); N]> for RawParams {
    fn from(pairs: [(&str, Value); N]) -> Self {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}
