//! Configuration for a [`Database`](crate::Database).
//!
//! A [`DatabaseConfig`] can be built in code, loaded from a YAML or TOML file,
//! and adjusted with `MEMVEC_*` environment variables.
//!
//! # Example YAML
//!
//! ```yaml
//! dimension: 384
//! similarityStrategy: cosine
//! maxRecords: 10000
//! scoreThreshold: 0.2
//! parallelThreshold: 1024
//! ```

use std::fs;
use std::path::Path;

use memvec_db::{QueryOptions, SimilarityKind, StoreOptions, DEFAULT_PARALLEL_THRESHOLD};
use serde::{Deserialize, Serialize};

use crate::errors::VecDbError;

// ============================================================================
// Environment Variables
// ============================================================================

/// Overrides [`DatabaseConfig::dimension`].
pub const ENV_DIMENSION: &str = "MEMVEC_DIMENSION";

/// Overrides [`DatabaseConfig::similarity_strategy`].
pub const ENV_SIMILARITY: &str = "MEMVEC_SIMILARITY";

/// Overrides [`DatabaseConfig::max_records`].
pub const ENV_MAX_RECORDS: &str = "MEMVEC_MAX_RECORDS";

/// Dimension above which `validate` warns.
const LARGE_DIMENSION_WARNING: usize = 65_536;

// ============================================================================
// DatabaseConfig
// ============================================================================

/// Construction options for a database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Fixed vector dimension. When omitted, the first insert sets it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,

    /// Similarity strategy used to rank search results.
    #[serde(default, alias = "metric")]
    pub similarity_strategy: SimilarityKind,

    /// Maximum number of stored records. Unlimited when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_records: Option<usize>,

    /// Drop search hits scoring worse than this.
    ///
    /// For cosine/dot this is a minimum score, for euclidean a maximum distance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f32>,

    /// Record count from which search scores records in parallel.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
}

fn default_parallel_threshold() -> usize {
    DEFAULT_PARALLEL_THRESHOLD
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dimension: None,
            similarity_strategy: SimilarityKind::default(),
            max_records: None,
            score_threshold: None,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl DatabaseConfig {
    /// Default configuration: inferred dimension, cosine similarity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the vector dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Set the similarity strategy.
    pub fn with_similarity(mut self, kind: SimilarityKind) -> Self {
        self.similarity_strategy = kind;
        self
    }

    /// Limit the number of stored records.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    /// Set the score threshold.
    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    /// Set the parallel scoring threshold.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Load configuration from a YAML or TOML file.
    ///
    /// The format is chosen by extension (`.toml`, otherwise YAML). If the
    /// file does not exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VecDbError::ConfigFile`] if the file exists but cannot be read or parsed.
    /// Returns [`VecDbError::InvalidConfiguration`] if validation fails.
    pub fn from_path(path: &Path) -> Result<Self, VecDbError> {
        if !path.exists() {
            tracing::debug!("Config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| VecDbError::ConfigFile {
            path: path.to_path_buf(),
            message: format!("Failed to read: {}", e),
        })?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let parsed = if is_toml {
            toml::from_str::<Self>(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str::<Self>(&content).map_err(|e| e.to_string())
        };
        let config = parsed.map_err(|message| VecDbError::ConfigFile {
            path: path.to_path_buf(),
            message: format!("Failed to parse: {}", message),
        })?;

        let warnings = config.validate()?;
        for warning in warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok(config)
    }

    /// Apply `MEMVEC_*` environment variable overrides.
    pub fn apply_env_overrides(self) -> Result<Self, VecDbError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up through `lookup` (keys are the `ENV_*` names).
    pub fn apply_overrides_from<F>(mut self, lookup: F) -> Result<Self, VecDbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_DIMENSION) {
            let dimension = raw.trim().parse::<usize>().map_err(|_| {
                VecDbError::invalid_configuration(
                    format!("{}={:?} is not a positive integer", ENV_DIMENSION, raw),
                    "Set it to the vector length, e.g. 384",
                )
            })?;
            self.dimension = Some(dimension);
        }

        if let Some(raw) = lookup(ENV_SIMILARITY) {
            self.similarity_strategy = raw
                .trim()
                .parse::<SimilarityKind>()
                .map_err(|e| VecDbError::invalid_configuration(e, "Check MEMVEC_SIMILARITY"))?;
        }

        if let Some(raw) = lookup(ENV_MAX_RECORDS) {
            let max_records = raw.trim().parse::<usize>().map_err(|_| {
                VecDbError::invalid_configuration(
                    format!("{}={:?} is not a positive integer", ENV_MAX_RECORDS, raw),
                    "Unset it for an unlimited store",
                )
            })?;
            self.max_records = Some(max_records);
        }

        Ok(self)
    }

    /// Validates the configuration, returning warnings for questionable values.
    ///
    /// # Errors
    /// Returns an error if `dimension`, `maxRecords` or `parallelThreshold`
    /// is 0, or if `scoreThreshold` is not finite.
    ///
    /// # Warnings
    /// - `dimension > 65536`: every search scans `n * dimension` floats
    /// - cosine `scoreThreshold` outside `[-1, 1]`: filters nothing or everything
    /// - euclidean `scoreThreshold < 0`: distances are never negative
    pub fn validate(&self) -> Result<Vec<String>, VecDbError> {
        let mut warnings = Vec::new();

        if self.dimension == Some(0) {
            return Err(VecDbError::invalid_configuration(
                "dimension cannot be 0",
                "Omit dimension to infer it from the first insert",
            ));
        }

        if self.max_records == Some(0) {
            return Err(VecDbError::invalid_configuration(
                "maxRecords cannot be 0",
                "Omit maxRecords for an unlimited store",
            ));
        }

        if self.parallel_threshold == 0 {
            return Err(VecDbError::invalid_configuration(
                "parallelThreshold cannot be 0",
                format!("Use at least 1 (default: {})", DEFAULT_PARALLEL_THRESHOLD),
            ));
        }

        if let Some(threshold) = self.score_threshold {
            if !threshold.is_finite() {
                return Err(VecDbError::invalid_configuration(
                    format!("scoreThreshold={} is not finite", threshold),
                    "Use a finite number or omit scoreThreshold",
                ));
            }

            match self.similarity_strategy {
                SimilarityKind::Cosine if !(-1.0..=1.0).contains(&threshold) => {
                    warnings.push(format!(
                        "scoreThreshold={} is outside the cosine range [-1, 1]",
                        threshold
                    ));
                }
                SimilarityKind::Euclidean if threshold < 0.0 => {
                    warnings.push(format!(
                        "scoreThreshold={} is negative; euclidean distances are never negative",
                        threshold
                    ));
                }
                _ => {}
            }
        }

        if let Some(dimension) = self.dimension {
            if dimension > LARGE_DIMENSION_WARNING {
                warnings.push(format!(
                    "dimension={} is very large; every search scans all vectors in full",
                    dimension
                ));
            }
        }

        Ok(warnings)
    }

    /// Store options derived from this config.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            dimension: self.dimension,
            max_records: self.max_records,
        }
    }

    /// Query engine options derived from this config.
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            score_threshold: self.score_threshold,
            parallel_threshold: self.parallel_threshold,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_builder() {
        let config = DatabaseConfig::new()
            .with_dimension(128)
            .with_similarity(SimilarityKind::Euclidean)
            .with_max_records(10_000)
            .with_score_threshold(2.5)
            .with_parallel_threshold(64);

        assert_eq!(config.dimension, Some(128));
        assert_eq!(config.similarity_strategy, SimilarityKind::Euclidean);
        assert_eq!(config.store_options().max_records, Some(10_000));
        assert_eq!(config.query_options().score_threshold, Some(2.5));
        assert_eq!(config.query_options().parallel_threshold, 64);
    }

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.dimension, None);
        assert_eq!(config.similarity_strategy, SimilarityKind::Cosine);
        assert_eq!(config.parallel_threshold, DEFAULT_PARALLEL_THRESHOLD);
        assert!(config.validate().unwrap().is_empty());
    }

    #[test]
    fn test_yaml_parsing() {
        let config: DatabaseConfig = serde_yaml::from_str(
            "dimension: 3\nsimilarityStrategy: euclidean\nmaxRecords: 10\n",
        )
        .unwrap();
        assert_eq!(config.dimension, Some(3));
        assert_eq!(config.similarity_strategy, SimilarityKind::Euclidean);
        assert_eq!(config.max_records, Some(10));
        assert_eq!(config.parallel_threshold, DEFAULT_PARALLEL_THRESHOLD);

        let aliased: DatabaseConfig = serde_yaml::from_str("metric: dot\n").unwrap();
        assert_eq!(aliased.similarity_strategy, SimilarityKind::Dot);
    }

    #[test]
    fn test_validation_errors() {
        let zero_dim = DatabaseConfig::new().with_dimension(0);
        assert!(matches!(
            zero_dim.validate(),
            Err(VecDbError::InvalidConfiguration { .. })
        ));

        let zero_parallel = DatabaseConfig::new().with_parallel_threshold(0);
        assert!(zero_parallel.validate().is_err());

        let zero_capacity = DatabaseConfig::new().with_max_records(0);
        assert!(zero_capacity.validate().is_err());

        let nan_threshold = DatabaseConfig::new().with_score_threshold(f32::NAN);
        assert!(nan_threshold.validate().is_err());
    }

    #[test]
    fn test_validation_warnings() {
        let warnings = DatabaseConfig::new()
            .with_score_threshold(1.5)
            .validate()
            .unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("cosine"));

        let warnings = DatabaseConfig::new()
            .with_similarity(SimilarityKind::Euclidean)
            .with_score_threshold(-1.0)
            .validate()
            .unwrap();
        assert_eq!(warnings.len(), 1);

        let warnings = DatabaseConfig::new()
            .with_similarity(SimilarityKind::Dot)
            .with_score_threshold(42.0)
            .validate()
            .unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DIMENSION, "64"),
            (ENV_SIMILARITY, "L2"),
            (ENV_MAX_RECORDS, " 500 "),
        ]);

        let config = DatabaseConfig::new()
            .apply_overrides_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.dimension, Some(64));
        assert_eq!(config.similarity_strategy, SimilarityKind::Euclidean);
        assert_eq!(config.max_records, Some(500));
    }

    #[test]
    fn test_invalid_overrides() {
        let result = DatabaseConfig::new()
            .apply_overrides_from(|key| (key == ENV_DIMENSION).then(|| "many".to_string()));
        assert!(matches!(
            result,
            Err(VecDbError::InvalidConfiguration { .. })
        ));

        let result = DatabaseConfig::new()
            .apply_overrides_from(|key| (key == ENV_SIMILARITY).then(|| "hamming".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = DatabaseConfig::from_path(Path::new("/nonexistent/memvec/config.yaml")).unwrap();
        assert_eq!(config, DatabaseConfig::default());
    }
}
