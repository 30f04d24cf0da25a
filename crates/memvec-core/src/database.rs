//! The `Database` façade.
//!
//! [`Database`] owns the record store, the observer registry and the query
//! engine. It validates input at the boundary, delegates to the memvec-db
//! layer and translates every error into [`VecDbError`].

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use memvec_db::{
    Metadata, NotificationError, Observer, ObserverRegistry, QueryEngine, QueryResult,
    RecordFilter, RecordStore, SimilarityKind, SimilarityStrategy, Snapshot, SubscriptionId,
    VectorRecord,
};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::db_adapter::IntoVecDbResult;
use crate::errors::{VecDbError, VecDbResult};

// ============================================================================
// BatchReport
// ============================================================================

/// A record rejected by [`Database::batch_add`].
#[derive(Debug)]
pub struct BatchFailure {
    /// Id of the rejected record.
    pub id: String,
    /// Why it was rejected.
    pub error: VecDbError,
}

/// Outcome of [`Database::batch_add`].
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Number of records that were stored.
    pub inserted: usize,

    /// Records that were not stored, in input order.
    pub failures: Vec<BatchFailure>,

    /// Observer failures for records that *were* stored.
    pub notification_errors: Vec<NotificationError>,
}

impl BatchReport {
    /// True when every record was stored and every observer succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.notification_errors.is_empty()
    }

    /// Ids of the rejected records.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.id.as_str()).collect()
    }
}

// ============================================================================
// Database
// ============================================================================

/// In-memory vector database.
///
/// Every vector shares one dimension, fixed by the configuration or by the
/// first inserted record. Searches scan a point-in-time snapshot of the
/// store and rank it with the active [`SimilarityStrategy`].
///
/// Mutations notify subscribed observers after they are applied. When an
/// observer fails, the mutation stays applied and the operation returns
/// [`VecDbError::ObserverNotification`]; check
/// [`VecDbError::is_committed`] to tell it apart from a rejected call.
///
/// # Example
///
/// ```
/// use memvec_core::{Database, DatabaseConfig};
///
/// let db = Database::new(DatabaseConfig::new().with_dimension(2)).unwrap();
/// db.add("a", vec![1.0, 0.0]).unwrap();
/// db.add("b", vec![0.0, 1.0]).unwrap();
///
/// let result = db.search(&[0.9, 0.1], 1, None).unwrap();
/// assert_eq!(result.ids(), vec!["a"]);
/// ```
#[derive(Debug)]
pub struct Database {
    config: DatabaseConfig,
    store: RecordStore,
    observers: Arc<ObserverRegistry>,
    engine: RwLock<QueryEngine>,
}

impl Database {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Open an empty database using the configured similarity strategy.
    pub fn new(config: DatabaseConfig) -> VecDbResult<Self> {
        let strategy = config.similarity_strategy.strategy();
        Self::with_strategy(config, strategy)
    }

    /// Open an empty database with a custom similarity strategy.
    ///
    /// `config.similarity_strategy` is ignored.
    pub fn with_strategy(
        config: DatabaseConfig,
        strategy: Arc<dyn SimilarityStrategy>,
    ) -> VecDbResult<Self> {
        for warning in config.validate()? {
            warn!("Config warning: {}", warning);
        }

        info!(
            "Opening database (dimension={:?}, strategy={}, max_records={:?})",
            config.dimension,
            strategy.name(),
            config.max_records
        );

        let observers = Arc::new(ObserverRegistry::new());
        let store = RecordStore::new(config.store_options(), observers.clone());
        let engine = QueryEngine::new(strategy, config.query_options());

        Ok(Self {
            config,
            store,
            observers,
            engine: RwLock::new(engine),
        })
    }

    /// Configuration this database was opened with.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Observers
    // -------------------------------------------------------------------------

    /// Subscribe an observer to mutation events.
    ///
    /// The database only holds a weak reference: dropping the last `Arc`
    /// ends the subscription.
    pub fn subscribe<O>(&self, observer: &Arc<O>) -> SubscriptionId
    where
        O: Observer + 'static,
    {
        self.observers.subscribe(observer)
    }

    /// Remove a subscription. Returns false if it was not active.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Number of live subscriptions.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Insert a vector under a new id.
    ///
    /// # Errors
    ///
    /// - [`VecDbError::InvalidArgument`] for an empty id
    /// - [`VecDbError::DuplicateId`] if `id` is already stored
    /// - [`VecDbError::DimensionMismatch`] if the length differs from the
    ///   store dimension, including an empty vector
    /// - [`VecDbError::InvalidArgument`] for non-finite components, or an
    ///   empty vector while no dimension is established
    /// - [`VecDbError::CapacityExceeded`] if `maxRecords` is reached
    pub fn add(&self, id: impl Into<String>, vector: Vec<f32>) -> VecDbResult<()> {
        self.insert(VectorRecord::new(id, vector))
    }

    /// Insert a vector with metadata.
    pub fn add_with_metadata(
        &self,
        id: impl Into<String>,
        vector: Vec<f32>,
        metadata: Metadata,
    ) -> VecDbResult<()> {
        self.insert(VectorRecord::new(id, vector).with_metadata(metadata))
    }

    /// Insert a fully built record.
    pub fn insert(&self, record: VectorRecord) -> VecDbResult<()> {
        validate_id(&record.id)?;
        debug!("add '{}' (dimension {})", record.id, record.dimension());
        self.store.add(record).into_vecdb_result()
    }

    /// Insert many records, each independently.
    ///
    /// A rejected record does not stop the batch. Observer failures for
    /// stored records are collected in
    /// [`BatchReport::notification_errors`].
    pub fn batch_add<I>(&self, records: I) -> BatchReport
    where
        I: IntoIterator<Item = VectorRecord>,
    {
        let start = Instant::now();
        let mut report = BatchReport::default();

        for record in records {
            let id = record.id.clone();
            match self.insert(record) {
                Ok(()) => report.inserted += 1,
                Err(VecDbError::ObserverNotification(inner)) => {
                    report.inserted += 1;
                    report.notification_errors.push(inner);
                }
                Err(error) => {
                    debug!("batch_add rejected '{}': {}", id, error);
                    report.failures.push(BatchFailure { id, error });
                }
            }
        }

        debug!(
            "batch_add: {} inserted, {} rejected in {:?}",
            report.inserted,
            report.failures.len(),
            start.elapsed()
        );
        report
    }

    /// Replace the vector stored under `id`. Metadata is kept.
    ///
    /// A missing `id` is always [`VecDbError::NotFound`], whatever the vector.
    pub fn update(&self, id: &str, vector: Vec<f32>) -> VecDbResult<()> {
        debug!("update '{}'", id);
        self.store.update(id, Some(vector), None).into_vecdb_result()
    }

    /// Replace the metadata stored under `id`. The vector is kept.
    pub fn update_metadata(&self, id: &str, metadata: Metadata) -> VecDbResult<()> {
        debug!("update metadata of '{}'", id);
        self.store.update(id, None, Some(metadata)).into_vecdb_result()
    }

    /// Replace both vector and metadata of `id`.
    pub fn update_record(&self, id: &str, vector: Vec<f32>, metadata: Metadata) -> VecDbResult<()> {
        debug!("update record '{}'", id);
        self.store
            .update(id, Some(vector), Some(metadata))
            .into_vecdb_result()
    }

    /// Remove the record stored under `id`.
    pub fn delete(&self, id: &str) -> VecDbResult<()> {
        debug!("delete '{}'", id);
        self.store.delete(id).into_vecdb_result()
    }

    /// Remove every record and return how many were removed.
    ///
    /// The dimension stays fixed. Observers receive one `Clear` event.
    pub fn clear(&self) -> VecDbResult<usize> {
        self.store.clear().into_vecdb_result()
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Get a copy of the record stored under `id`.
    pub fn get(&self, id: &str) -> VecDbResult<VectorRecord> {
        let record = self.store.get(id).into_vecdb_result()?;
        Ok(VectorRecord::clone(&record))
    }

    /// Rank stored vectors against `query` and return the best `top_k`.
    ///
    /// Only records accepted by `filter` are scored. Ties keep insertion
    /// order. If fewer than `top_k` records match, all of them are returned.
    ///
    /// # Errors
    ///
    /// - [`VecDbError::DimensionMismatch`] if the store has a dimension and
    ///   the query length differs
    /// - [`VecDbError::InvalidArgument`] if `top_k` is 0, or the query is
    ///   empty or has non-finite components
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&dyn RecordFilter>,
    ) -> VecDbResult<QueryResult> {
        let engine = self.engine_read()?.clone();
        engine
            .search(&self.store, query, top_k, filter)
            .into_vecdb_result()
    }

    /// Number of stored records.
    pub fn count(&self) -> VecDbResult<usize> {
        self.store.len().into_vecdb_result()
    }

    pub fn is_empty(&self) -> VecDbResult<bool> {
        self.store.is_empty().into_vecdb_result()
    }

    pub fn contains(&self, id: &str) -> VecDbResult<bool> {
        self.store.contains(id).into_vecdb_result()
    }

    /// Store dimension, once known.
    pub fn dimension(&self) -> VecDbResult<Option<usize>> {
        self.store.dimension().into_vecdb_result()
    }

    /// Point-in-time view of every record in insertion order.
    pub fn snapshot(&self) -> VecDbResult<Snapshot> {
        self.store.all().into_vecdb_result()
    }

    // -------------------------------------------------------------------------
    // Strategy
    // -------------------------------------------------------------------------

    /// The active similarity strategy.
    pub fn similarity(&self) -> VecDbResult<Arc<dyn SimilarityStrategy>> {
        Ok(self.engine_read()?.strategy().clone())
    }

    /// Switch to a built-in similarity strategy.
    ///
    /// Searches already running keep the strategy they started with.
    pub fn set_strategy(&self, kind: SimilarityKind) -> VecDbResult<()> {
        self.set_custom_strategy(kind.strategy())
    }

    /// Switch to a custom similarity strategy.
    pub fn set_custom_strategy(&self, strategy: Arc<dyn SimilarityStrategy>) -> VecDbResult<()> {
        let mut engine = self.engine_write()?;
        info!(
            "Similarity strategy changed: {} -> {}",
            engine.strategy().name(),
            strategy.name()
        );
        *engine = engine.with_strategy(strategy);
        Ok(())
    }

    fn engine_read(&self) -> VecDbResult<RwLockReadGuard<'_, QueryEngine>> {
        self.engine
            .read()
            .map_err(|e| VecDbError::Internal(format!("Engine lock poisoned: {}", e)))
    }

    fn engine_write(&self) -> VecDbResult<RwLockWriteGuard<'_, QueryEngine>> {
        self.engine
            .write()
            .map_err(|e| VecDbError::Internal(format!("Engine lock poisoned: {}", e)))
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_id(id: &str) -> VecDbResult<()> {
    if id.is_empty() {
        return Err(VecDbError::InvalidArgument("id must not be empty".to_string()));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
