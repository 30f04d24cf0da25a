//! Stored record types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DbError;

// ============================================================================
// MetadataValue
// ============================================================================

/// A scalar metadata value attached to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl MetadataValue {
    /// Get the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the scalar type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            MetadataValue::Bool(_) => "bool",
            MetadataValue::Int(_) => "int",
            MetadataValue::Float(_) => "float",
            MetadataValue::String(_) => "string",
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Int(i) => write!(f, "{}", i),
            MetadataValue::Float(x) => write!(f, "{}", x),
            MetadataValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        MetadataValue::Int(i64::from(value))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl TryFrom<serde_json::Value> for MetadataValue {
    type Error = DbError;

    /// Convert a JSON scalar. Arrays, objects and null are rejected.
    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;

        match value {
            Value::Bool(b) => Ok(MetadataValue::Bool(b)),
            Value::String(s) => Ok(MetadataValue::String(s)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(MetadataValue::Int(i))
                } else if let Some(x) = n.as_f64() {
                    Ok(MetadataValue::Float(x))
                } else {
                    Err(DbError::invalid_argument(format!(
                        "metadata number {} is out of range",
                        n
                    )))
                }
            }
            other => Err(DbError::invalid_argument(format!(
                "metadata values must be scalars, got {}",
                other
            ))),
        }
    }
}

/// Metadata map. Ordered so that serialized records are stable.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Build a [`Metadata`] map from a JSON object.
pub fn metadata_from_json(value: serde_json::Value) -> Result<Metadata, DbError> {
    match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| MetadataValue::try_from(v).map(|v| (k, v)))
            .collect(),
        serde_json::Value::Null => Ok(Metadata::new()),
        other => Err(DbError::invalid_argument(format!(
            "metadata must be a JSON object, got {}",
            other
        ))),
    }
}

// ============================================================================
// VectorRecord
// ============================================================================

/// A vector with its id and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorRecord {
    /// Unique identifier, immutable once stored.
    pub id: String,

    /// The embedding vector.
    pub vector: Vec<f32>,

    /// Scalar metadata used for filtering.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,

    /// Timestamp when the record was created.
    pub created_at: DateTime<Utc>,

    /// Timestamp when the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl VectorRecord {
    /// Create a new record with empty metadata.
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            vector,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add a single metadata entry.
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Length of the vector.
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }

    /// Update the updated_at timestamp to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = VectorRecord::new("doc-1", vec![1.0, 2.0, 3.0])
            .with_entry("category", "fruit")
            .with_entry("rank", 3i64)
            .with_entry("fresh", true);

        assert_eq!(record.id, "doc-1");
        assert_eq!(record.dimension(), 3);
        assert_eq!(record.metadata.get("category"), Some(&MetadataValue::from("fruit")));
        assert_eq!(record.metadata.get("rank"), Some(&MetadataValue::Int(3)));
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_record_serialization() {
        let record = VectorRecord::new("doc-1", vec![0.5]).with_entry("color", "red");

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"id\":\"doc-1\""));
        assert!(json.contains("\"createdAt\""));
        assert!(json.contains("\"color\":\"red\""));

        let parsed: VectorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_metadata_from_json() {
        let metadata = metadata_from_json(serde_json::json!({
            "author": "Alice",
            "pages": 12,
            "score": 0.5,
            "draft": false
        }))
        .unwrap();

        assert_eq!(metadata["author"].as_str(), Some("Alice"));
        assert_eq!(metadata["pages"], MetadataValue::Int(12));
        assert_eq!(metadata["score"], MetadataValue::Float(0.5));
        assert_eq!(metadata["draft"], MetadataValue::Bool(false));
    }

    #[test]
    fn test_metadata_rejects_nested_values() {
        let err = metadata_from_json(serde_json::json!({"tags": ["a", "b"]})).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument { .. }));

        assert!(metadata_from_json(serde_json::json!([1, 2])).is_err());
        assert!(metadata_from_json(serde_json::Value::Null).unwrap().is_empty());
    }
}
