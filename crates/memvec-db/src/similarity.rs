//! Similarity strategies.
//!
//! A strategy scores a pair of vectors and declares which direction ranks
//! better. Similarities (cosine, dot) rank higher scores first; distances
//! (euclidean) rank lower scores first.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DbError, DbResult};

// ============================================================================
// SimilarityKind
// ============================================================================

/// Built-in similarity strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityKind {
    /// Cosine similarity (default).
    #[default]
    Cosine,
    /// Euclidean (L2) distance.
    #[serde(alias = "l2")]
    Euclidean,
    /// Dot product.
    #[serde(alias = "dot_product")]
    Dot,
}

impl SimilarityKind {
    /// Get the strategy name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityKind::Cosine => "cosine",
            SimilarityKind::Euclidean => "euclidean",
            SimilarityKind::Dot => "dot",
        }
    }

    /// Ranking direction of this strategy's scores.
    pub fn direction(&self) -> RankDirection {
        match self {
            SimilarityKind::Cosine | SimilarityKind::Dot => RankDirection::HigherIsBetter,
            SimilarityKind::Euclidean => RankDirection::LowerIsBetter,
        }
    }

    /// Build the strategy for this kind.
    pub fn strategy(&self) -> Arc<dyn SimilarityStrategy> {
        match self {
            SimilarityKind::Cosine => Arc::new(CosineSimilarity),
            SimilarityKind::Euclidean => Arc::new(EuclideanDistance),
            SimilarityKind::Dot => Arc::new(DotProduct),
        }
    }
}

impl fmt::Display for SimilarityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SimilarityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            "dot" | "dot_product" => Ok(Self::Dot),
            _ => Err(format!(
                "Unknown similarity strategy: '{}'. Use 'cosine', 'euclidean', or 'dot'.",
                s
            )),
        }
    }
}

// ============================================================================
// RankDirection
// ============================================================================

/// Which end of the score range ranks first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankDirection {
    HigherIsBetter,
    LowerIsBetter,
}

impl RankDirection {
    /// Order two scores so that the better one sorts first.
    ///
    /// NaN always sorts last regardless of direction.
    pub fn compare(&self, a: f32, b: f32) -> Ordering {
        match (a.is_nan(), b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => match self {
                RankDirection::HigherIsBetter => b.total_cmp(&a),
                RankDirection::LowerIsBetter => a.total_cmp(&b),
            },
        }
    }

    /// Whether `score` is at least as good as `threshold`.
    pub fn passes(&self, score: f32, threshold: f32) -> bool {
        match self {
            RankDirection::HigherIsBetter => score >= threshold,
            RankDirection::LowerIsBetter => score <= threshold,
        }
    }
}

// ============================================================================
// SimilarityStrategy Trait
// ============================================================================

/// Scores a pair of vectors.
///
/// Implementations must be pure: the same input always yields the same score
/// and scoring has no side effects.
pub trait SimilarityStrategy: Send + Sync + fmt::Debug {
    /// Short name used in logs and results.
    fn name(&self) -> &'static str;

    /// Ranking direction of the produced scores.
    fn direction(&self) -> RankDirection;

    /// Score assuming `a` and `b` have equal length.
    fn score_unchecked(&self, a: &[f32], b: &[f32]) -> f32;

    /// Score two vectors, failing if their lengths differ.
    fn score(&self, a: &[f32], b: &[f32]) -> DbResult<f32> {
        if a.len() != b.len() {
            return Err(DbError::DimensionMismatch {
                expected: a.len(),
                actual: b.len(),
            });
        }
        Ok(self.score_unchecked(a, b))
    }
}

/// Cosine similarity in `[-1, 1]`. Zero vectors score 0.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineSimilarity;

impl SimilarityStrategy for CosineSimilarity {
    fn name(&self) -> &'static str {
        SimilarityKind::Cosine.as_str()
    }

    fn direction(&self) -> RankDirection {
        RankDirection::HigherIsBetter
    }

    fn score_unchecked(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }
}

/// Euclidean (L2) distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanDistance;

impl SimilarityStrategy for EuclideanDistance {
    fn name(&self) -> &'static str {
        SimilarityKind::Euclidean.as_str()
    }

    fn direction(&self) -> RankDirection {
        RankDirection::LowerIsBetter
    }

    fn score_unchecked(&self, a: &[f32], b: &[f32]) -> f32 {
        euclidean_distance(a, b)
    }
}

/// Raw dot product.
#[derive(Debug, Clone, Copy, Default)]
pub struct DotProduct;

impl SimilarityStrategy for DotProduct {
    fn name(&self) -> &'static str {
        SimilarityKind::Dot.as_str()
    }

    fn direction(&self) -> RankDirection {
        RankDirection::HigherIsBetter
    }

    fn score_unchecked(&self, a: &[f32], b: &[f32]) -> f32 {
        dot_product(a, b)
    }
}

// ============================================================================
// Similarity Functions
// ============================================================================

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Compute dot product between two vectors.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute Euclidean (L2) distance between two vectors.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

// ============================================================================
// Tests
// ============================================================================
