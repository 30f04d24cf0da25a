//! Full-scan similarity search.
//!
//! The engine scores every record of a store snapshot against the query,
//! ranks by the active strategy's direction and keeps the best `top_k`.
//! Exact score ties go to the record inserted first.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{DbError, DbResult};
use crate::filter::RecordFilter;
use crate::record::{Metadata, VectorRecord};
use crate::similarity::{RankDirection, SimilarityStrategy};
use crate::store::{RecordStore, Snapshot};

/// Snapshot size from which scoring runs on the rayon thread pool.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 1024;

// ============================================================================
// QueryOptions
// ============================================================================

/// Tuning options for the query engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    /// Drop hits that score worse than this (direction-aware).
    pub score_threshold: Option<f32>,

    /// Minimum snapshot size for parallel scoring.
    pub parallel_threshold: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            score_threshold: None,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

// ============================================================================
// QueryResult
// ============================================================================

/// A single ranked match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// Id of the matched record.
    pub id: String,

    /// Strategy score (higher is better for cosine/dot, lower for euclidean).
    pub score: f32,

    /// Metadata of the matched record.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// Ranked search results, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Hits in rank order, at most `top_k`.
    pub hits: Vec<SearchHit>,

    /// Name of the strategy that produced the scores.
    pub strategy: String,

    /// Ranking direction of the scores.
    pub direction: RankDirection,

    /// Number of records in the snapshot that was searched.
    pub scanned: usize,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Hit ids in rank order.
    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.id.as_str()).collect()
    }

    /// The best hit, if any.
    pub fn best(&self) -> Option<&SearchHit> {
        self.hits.first()
    }
}

impl IntoIterator for QueryResult {
    type Item = SearchHit;
    type IntoIter = std::vec::IntoIter<SearchHit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}

// ============================================================================
// QueryEngine
// ============================================================================

struct Scored {
    position: usize,
    score: f32,
    record: Arc<VectorRecord>,
}

/// Scores store snapshots with one similarity strategy.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    strategy: Arc<dyn SimilarityStrategy>,
    options: QueryOptions,
}

impl QueryEngine {
    pub fn new(strategy: Arc<dyn SimilarityStrategy>, options: QueryOptions) -> Self {
        Self { strategy, options }
    }

    /// The active strategy.
    pub fn strategy(&self) -> &Arc<dyn SimilarityStrategy> {
        &self.strategy
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Same options, different strategy.
    pub fn with_strategy(&self, strategy: Arc<dyn SimilarityStrategy>) -> Self {
        Self {
            strategy,
            options: self.options,
        }
    }

    /// Search the current contents of `store`.
    pub fn search(
        &self,
        store: &RecordStore,
        query: &[f32],
        top_k: usize,
        filter: Option<&dyn RecordFilter>,
    ) -> DbResult<QueryResult> {
        let snapshot = store.all()?;
        self.search_snapshot(&snapshot, query, top_k, filter)
    }

    /// Search an already taken snapshot.
    ///
    /// # Errors
    ///
    /// - [`DbError::DimensionMismatch`] if the snapshot has an established
    ///   dimension and the query length differs.
    /// - [`DbError::InvalidArgument`] if `top_k` is zero, or the query is
    ///   empty or has non-finite components.
    pub fn search_snapshot(
        &self,
        snapshot: &Snapshot,
        query: &[f32],
        top_k: usize,
        filter: Option<&dyn RecordFilter>,
    ) -> DbResult<QueryResult> {
        if let Some(expected) = snapshot.dimension() {
            if query.len() != expected {
                return Err(DbError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }
        if top_k < 1 {
            return Err(DbError::invalid_argument("top_k must be at least 1"));
        }
        if query.is_empty() {
            return Err(DbError::invalid_argument("query vector must not be empty"));
        }
        if query.iter().any(|x| !x.is_finite()) {
            return Err(DbError::invalid_argument(
                "query vector contains non-finite components",
            ));
        }

        let start = Instant::now();
        let strategy = self.strategy.as_ref();
        let direction = strategy.direction();
        let threshold = self.options.score_threshold;

        let score_one = |(position, record): (usize, &Arc<VectorRecord>)| -> Option<Scored> {
            if let Some(filter) = filter {
                if !filter.matches(record) {
                    return None;
                }
            }
            let score = strategy.score_unchecked(query, &record.vector);
            if let Some(threshold) = threshold {
                if !direction.passes(score, threshold) {
                    return None;
                }
            }
            Some(Scored {
                position,
                score,
                record: record.clone(),
            })
        };

        // Both paths collect in snapshot order, so ranking is identical.
        let parallel = snapshot.len() >= self.options.parallel_threshold;
        let mut scored: Vec<Scored> = if parallel {
            snapshot
                .records()
                .par_iter()
                .enumerate()
                .filter_map(score_one)
                .collect()
        } else {
            snapshot
                .records()
                .iter()
                .enumerate()
                .filter_map(score_one)
                .collect()
        };
        let matched = scored.len();

        scored.sort_by(|a, b| {
            direction
                .compare(a.score, b.score)
                .then_with(|| a.position.cmp(&b.position))
        });
        scored.truncate(top_k);

        let hits: Vec<SearchHit> = scored
            .into_iter()
            .map(|s| SearchHit {
                id: s.record.id.clone(),
                score: s.score,
                metadata: s.record.metadata.clone(),
            })
            .collect();

        debug!(
            "Search ({}) matched {} of {} records, returned {} in {:?}{}",
            strategy.name(),
            matched,
            snapshot.len(),
            hits.len(),
            start.elapsed(),
            if parallel { " (parallel)" } else { "" }
        );
        trace!("Search hits: {:?}", hits.iter().map(|h| &h.id).collect::<Vec<_>>());

        Ok(QueryResult {
            hits,
            strategy: strategy.name().to_string(),
            direction,
            scanned: snapshot.len(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
