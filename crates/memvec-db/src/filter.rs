//! Record filters applied before scoring.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::{MetadataValue, VectorRecord};

/// Predicate deciding whether a record takes part in a search.
pub trait RecordFilter: Send + Sync {
    fn matches(&self, record: &VectorRecord) -> bool;
}

impl<F> RecordFilter for F
where
    F: Fn(&VectorRecord) -> bool + Send + Sync,
{
    fn matches(&self, record: &VectorRecord) -> bool {
        self(record)
    }
}

// ============================================================================
// MetadataFilter
// ============================================================================

/// Declarative filter over record ids and metadata.
///
/// All fields are optional. When multiple fields are specified, they are
/// combined with AND logic. Empty fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataFilter {
    /// Filter by id prefix (e.g., "doc-").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_prefix: Option<String>,

    /// Metadata keys that must be present with exactly these values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub equals: BTreeMap<String, MetadataValue>,

    /// Metadata keys that must be present with any value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub has_keys: Vec<String>,
}

impl MetadataFilter {
    /// Create an empty filter (matches all).
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by id prefix.
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = Some(prefix.into());
        self
    }

    /// Require a metadata key to equal a value.
    pub fn with_equals(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    /// Require a metadata key to be present.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.has_keys.push(key.into());
        self
    }

    /// Check if the filter is empty (matches all).
    pub fn is_empty(&self) -> bool {
        self.id_prefix.is_none() && self.equals.is_empty() && self.has_keys.is_empty()
    }
}

impl RecordFilter for MetadataFilter {
    fn matches(&self, record: &VectorRecord) -> bool {
        if let Some(ref prefix) = self.id_prefix {
            if !record.id.starts_with(prefix.as_str()) {
                return false;
            }
        }

        for (key, expected) in &self.equals {
            match record.metadata.get(key) {
                Some(actual) if actual == expected => {}
                _ => return false,
            }
        }

        self.has_keys
            .iter()
            .all(|key| record.metadata.contains_key(key))
    }
}

// ============================================================================
// Tests
// ============================================================================
