//! In-memory record store.
//!
//! The store is the single source of truth for records. Every record gets an
//! insertion sequence number when it is added; snapshots list records in that
//! order, which is what makes search tie-breaks deterministic. Updates keep
//! the original sequence number.
//!
//! Records are held as `Arc<VectorRecord>` and replaced, never mutated, so a
//! snapshot taken before a mutation keeps seeing the old state.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, trace};

use crate::delivery::{DeliveryOrder, Ticket};
use crate::error::{DbError, DbResult};
use crate::observer::{MutationEvent, ObserverRegistry};
use crate::record::{Metadata, VectorRecord};

// ============================================================================
// StoreOptions
// ============================================================================

/// Construction options for a [`RecordStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Fixed dimension. When `None`, the first inserted record sets it.
    pub dimension: Option<usize>,

    /// Maximum number of records, unlimited when `None`.
    pub max_records: Option<usize>,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the dimension up front.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Limit the number of stored records.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time view of the store, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    dimension: Option<usize>,
    records: Vec<Arc<VectorRecord>>,
}

impl Snapshot {
    /// Dimension established when the snapshot was taken.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[Arc<VectorRecord>] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &VectorRecord> {
        self.records.iter().map(|r| r.as_ref())
    }
}

impl IntoIterator for Snapshot {
    type Item = Arc<VectorRecord>;
    type IntoIter = std::vec::IntoIter<Arc<VectorRecord>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

// ============================================================================
// RecordStore
// ============================================================================

#[derive(Debug, Default)]
struct StoreState {
    dimension: Option<usize>,
    next_seq: u64,
    /// id -> insertion sequence.
    index: HashMap<String, u64>,
    /// insertion sequence -> record.
    records: BTreeMap<u64, Arc<VectorRecord>>,
}

impl StoreState {
    fn check_dimension(&self, actual: usize) -> DbResult<()> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(DbError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    /// Dimension first, so a wrong-length vector is always a mismatch once
    /// the dimension is known.
    fn check_vector(&self, vector: &[f32]) -> DbResult<()> {
        self.check_dimension(vector.len())?;
        if vector.is_empty() {
            return Err(DbError::invalid_argument("vector must not be empty"));
        }
        if let Some(pos) = vector.iter().position(|x| !x.is_finite()) {
            return Err(DbError::invalid_argument(format!(
                "vector component {} is not finite ({})",
                pos, vector[pos]
            )));
        }
        Ok(())
    }
}

/// In-memory id -> record store.
///
/// All mutations are serialized by a single lock. Observers are notified
/// after the lock is released, in commit order.
#[derive(Debug)]
pub struct RecordStore {
    state: RwLock<StoreState>,
    max_records: Option<usize>,
    observers: Arc<ObserverRegistry>,
    delivery: DeliveryOrder,
}

impl RecordStore {
    /// Create an empty store that reports mutations to `observers`.
    pub fn new(options: StoreOptions, observers: Arc<ObserverRegistry>) -> Self {
        debug!(
            "Creating RecordStore (dimension={:?}, max_records={:?})",
            options.dimension, options.max_records
        );
        Self {
            state: RwLock::new(StoreState {
                dimension: options.dimension,
                ..StoreState::default()
            }),
            max_records: options.max_records,
            observers,
            delivery: DeliveryOrder::new(),
        }
    }

    /// The registry this store notifies.
    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.observers
    }

    /// Insert a new record.
    ///
    /// The first record inserted into a store without a fixed dimension
    /// establishes the dimension.
    pub fn add(&self, record: VectorRecord) -> DbResult<()> {
        let committed = {
            let mut state = self.write()?;

            if state.index.contains_key(&record.id) {
                return Err(DbError::duplicate_id(record.id));
            }
            state.check_vector(&record.vector)?;
            if let Some(limit) = self.max_records {
                if state.index.len() >= limit {
                    return Err(DbError::CapacityExceeded { limit });
                }
            }

            if state.dimension.is_none() {
                debug!("Store dimension set to {} by '{}'", record.dimension(), record.id);
                state.dimension = Some(record.dimension());
            }

            let seq = state.next_seq;
            state.next_seq += 1;
            let record = Arc::new(record);
            state.index.insert(record.id.clone(), seq);
            state.records.insert(seq, record.clone());
            trace!("Inserted record '{}' at seq {}", record.id, seq);

            (MutationEvent::insert(record), self.delivery.issue())
        };

        self.notify(committed)
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> DbResult<Arc<VectorRecord>> {
        let state = self.read()?;
        state
            .index
            .get(id)
            .and_then(|seq| state.records.get(seq))
            .cloned()
            .ok_or_else(|| DbError::not_found(id))
    }

    /// Replace a record's vector and/or metadata.
    ///
    /// The id and insertion order are kept; `updated_at` is refreshed.
    pub fn update(
        &self,
        id: &str,
        vector: Option<Vec<f32>>,
        metadata: Option<Metadata>,
    ) -> DbResult<()> {
        let committed = {
            let mut state = self.write()?;

            let seq = *state.index.get(id).ok_or_else(|| DbError::not_found(id))?;
            if let Some(ref vector) = vector {
                state.check_vector(vector)?;
            }

            let current = state
                .records
                .get(&seq)
                .ok_or_else(|| DbError::internal(format!("index entry for '{}' is dangling", id)))?;
            let mut updated = VectorRecord::clone(current);
            if let Some(vector) = vector {
                updated.vector = vector;
            }
            if let Some(metadata) = metadata {
                updated.metadata = metadata;
            }
            updated.touch();

            let updated = Arc::new(updated);
            state.records.insert(seq, updated.clone());
            trace!("Updated record '{}'", id);

            (MutationEvent::update(updated), self.delivery.issue())
        };

        self.notify(committed)
    }

    /// Remove a record.
    pub fn delete(&self, id: &str) -> DbResult<()> {
        let committed = {
            let mut state = self.write()?;

            let seq = state.index.remove(id).ok_or_else(|| DbError::not_found(id))?;
            let removed = state
                .records
                .remove(&seq)
                .ok_or_else(|| DbError::internal(format!("index entry for '{}' is dangling", id)))?;
            trace!("Deleted record '{}'", id);

            (MutationEvent::delete(removed), self.delivery.issue())
        };

        self.notify(committed)
    }

    /// Remove every record. The established dimension is kept.
    ///
    /// Returns the number of removed records.
    pub fn clear(&self) -> DbResult<usize> {
        let (removed, ticket) = {
            let mut state = self.write()?;
            let removed = state.records.len();
            state.index.clear();
            state.records.clear();
            (removed, self.delivery.issue())
        };
        debug!("Cleared {} records", removed);

        self.notify((MutationEvent::clear(), ticket))?;
        Ok(removed)
    }

    /// Take a snapshot of all records in insertion order.
    pub fn all(&self) -> DbResult<Snapshot> {
        let state = self.read()?;
        Ok(Snapshot {
            dimension: state.dimension,
            records: state.records.values().cloned().collect(),
        })
    }

    pub fn contains(&self, id: &str) -> DbResult<bool> {
        Ok(self.read()?.index.contains_key(id))
    }

    pub fn len(&self) -> DbResult<usize> {
        Ok(self.read()?.index.len())
    }

    pub fn is_empty(&self) -> DbResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Established dimension, if any.
    pub fn dimension(&self) -> DbResult<Option<usize>> {
        Ok(self.read()?.dimension)
    }

    /// Deliver once every earlier commit has been delivered.
    fn notify(&self, (event, ticket): (MutationEvent, Ticket)) -> DbResult<()> {
        self.delivery
            .deliver(ticket, || self.observers.notify(&event))
            .map_err(DbError::from)
    }

    fn read(&self) -> DbResult<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> DbResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire write lock: {}", e)))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{EventKind, ObserverError};
    use std::sync::{Barrier, Mutex};
    use std::thread;
    use std::time::Duration;

    fn store_with(options: StoreOptions) -> RecordStore {
        RecordStore::new(options, Arc::new(ObserverRegistry::new()))
    }

    fn ids(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_add_then_get() {
        let store = store_with(StoreOptions::new().with_dimension(2));
        let record = VectorRecord::new("a", vec![1.0, 0.0]).with_entry("kind", "unit");

        store.add(record.clone()).unwrap();
        assert_eq!(*store.get("a").unwrap(), record);
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.contains("a").unwrap());
    }

    #[test]
    fn test_duplicate_id_leaves_store_unchanged() {
        let store = store_with(StoreOptions::new());
        store.add(VectorRecord::new("a", vec![1.0, 0.0])).unwrap();

        let err = store.add(VectorRecord::new("a", vec![0.0, 1.0])).unwrap_err();
        assert!(matches!(err, DbError::DuplicateId { ref id } if id == "a"));
        assert_eq!(store.get("a").unwrap().vector, vec![1.0, 0.0]);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_first_insert_sets_dimension() {
        let store = store_with(StoreOptions::new());
        assert_eq!(store.dimension().unwrap(), None);

        store.add(VectorRecord::new("a", vec![1.0, 2.0, 3.0])).unwrap();
        assert_eq!(store.dimension().unwrap(), Some(3));

        let err = store.add(VectorRecord::new("b", vec![1.0])).unwrap_err();
        assert!(matches!(
            err,
            DbError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_empty_vector_rejected() {
        let store = store_with(StoreOptions::new());
        let err = store.add(VectorRecord::new("a", Vec::new())).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument { .. }));
        assert_eq!(store.dimension().unwrap(), None);
    }

    #[test]
    fn test_wrong_length_is_mismatch_once_dimension_known() {
        let store = store_with(StoreOptions::new().with_dimension(2));

        assert!(matches!(
            store.add(VectorRecord::new("x", Vec::new())),
            Err(DbError::DimensionMismatch {
                expected: 2,
                actual: 0
            })
        ));
        assert!(matches!(
            store.add(VectorRecord::new("x", vec![f32::NAN])),
            Err(DbError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert!(matches!(
            store.add(VectorRecord::new("x", vec![f32::NAN, 0.0])),
            Err(DbError::InvalidArgument { .. })
        ));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_update_missing_is_not_found_for_any_vector() {
        let store = store_with(StoreOptions::new().with_dimension(2));

        for vector in [Vec::new(), vec![f32::NAN, 0.0], vec![1.0, 2.0, 3.0]] {
            assert!(matches!(
                store.update("missing", Some(vector), None),
                Err(DbError::NotFound { ref id }) if id == "missing"
            ));
        }
    }

    #[test]
    fn test_update_rejects_non_finite() {
        let store = store_with(StoreOptions::new());
        store.add(VectorRecord::new("a", vec![1.0, 0.0])).unwrap();

        assert!(matches!(
            store.update("a", Some(vec![f32::INFINITY, 0.0]), None),
            Err(DbError::InvalidArgument { .. })
        ));
        assert_eq!(store.get("a").unwrap().vector, vec![1.0, 0.0]);
    }

    #[test]
    fn test_update_replaces_and_keeps_order() {
        let store = store_with(StoreOptions::new());
        store.add(VectorRecord::new("a", vec![1.0, 0.0])).unwrap();
        store.add(VectorRecord::new("b", vec![0.0, 1.0])).unwrap();

        let mut metadata = Metadata::new();
        metadata.insert("updated".to_string(), true.into());
        store
            .update("a", Some(vec![0.5, 0.5]), Some(metadata.clone()))
            .unwrap();

        let a = store.get("a").unwrap();
        assert_eq!(a.vector, vec![0.5, 0.5]);
        assert_eq!(a.metadata, metadata);
        assert!(a.updated_at >= a.created_at);
        assert_eq!(ids(&store.all().unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn test_update_metadata_only() {
        let store = store_with(StoreOptions::new());
        store
            .add(VectorRecord::new("a", vec![1.0]).with_entry("v", 1i64))
            .unwrap();

        store.update("a", None, Some(Metadata::new())).unwrap();
        let a = store.get("a").unwrap();
        assert_eq!(a.vector, vec![1.0]);
        assert!(a.metadata.is_empty());
    }

    #[test]
    fn test_update_errors() {
        let store = store_with(StoreOptions::new().with_dimension(2));
        assert!(matches!(
            store.update("missing", Some(vec![1.0, 0.0]), None),
            Err(DbError::NotFound { .. })
        ));

        store.add(VectorRecord::new("a", vec![1.0, 0.0])).unwrap();
        assert!(matches!(
            store.update("a", Some(vec![1.0]), None),
            Err(DbError::DimensionMismatch { .. })
        ));
        assert_eq!(store.get("a").unwrap().vector, vec![1.0, 0.0]);
    }

    #[test]
    fn test_delete() {
        let store = store_with(StoreOptions::new());
        assert!(matches!(store.delete("missing"), Err(DbError::NotFound { .. })));
        assert!(store.is_empty().unwrap());

        store.add(VectorRecord::new("a", vec![1.0])).unwrap();
        store.delete("a").unwrap();
        assert!(matches!(store.get("a"), Err(DbError::NotFound { .. })));

        // The id can be reused and goes to the back of the order.
        store.add(VectorRecord::new("b", vec![2.0])).unwrap();
        store.add(VectorRecord::new("a", vec![3.0])).unwrap();
        assert_eq!(ids(&store.all().unwrap()), vec!["b", "a"]);
    }

    #[test]
    fn test_snapshot_is_point_in_time() {
        let store = store_with(StoreOptions::new());
        store.add(VectorRecord::new("a", vec![1.0])).unwrap();
        store.add(VectorRecord::new("b", vec![2.0])).unwrap();

        let before = store.all().unwrap();
        store.delete("a").unwrap();
        store.update("b", Some(vec![9.0]), None).unwrap();

        assert_eq!(ids(&before), vec!["a", "b"]);
        assert_eq!(before.records()[1].vector, vec![2.0]);

        let after = store.all().unwrap();
        assert_eq!(ids(&after), vec!["b"]);
        assert_eq!(after.dimension(), Some(1));
    }

    #[test]
    fn test_capacity_limit() {
        let store = store_with(StoreOptions::new().with_max_records(1));
        store.add(VectorRecord::new("a", vec![1.0])).unwrap();

        let err = store.add(VectorRecord::new("b", vec![1.0])).unwrap_err();
        assert!(matches!(err, DbError::CapacityExceeded { limit: 1 }));
        assert!(!store.contains("b").unwrap());
    }

    #[test]
    fn test_clear_keeps_dimension() {
        let store = store_with(StoreOptions::new());
        store.add(VectorRecord::new("a", vec![1.0, 2.0])).unwrap();
        store.add(VectorRecord::new("b", vec![3.0, 4.0])).unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.is_empty().unwrap());
        assert_eq!(store.dimension().unwrap(), Some(2));
    }

    #[test]
    fn test_one_event_per_successful_mutation() {
        let registry = Arc::new(ObserverRegistry::new());
        let store = RecordStore::new(StoreOptions::new(), registry.clone());
        let events = Arc::new(Mutex::new(Vec::new()));
        let recorder = {
            let events = events.clone();
            Arc::new(move |event: &MutationEvent| {
                events.lock().unwrap().push((event.kind, event.id.clone()));
                Ok::<(), ObserverError>(())
            })
        };
        registry.subscribe(&recorder);

        store.add(VectorRecord::new("a", vec![1.0])).unwrap();
        store.add(VectorRecord::new("a", vec![1.0])).unwrap_err();
        store.update("a", Some(vec![2.0]), None).unwrap();
        store.update("zzz", None, None).unwrap_err();
        store.delete("a").unwrap();
        store.clear().unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                (EventKind::Insert, Some("a".to_string())),
                (EventKind::Update, Some("a".to_string())),
                (EventKind::Delete, Some("a".to_string())),
                (EventKind::Clear, None),
            ]
        );
    }

    #[test]
    fn test_observer_failure_does_not_roll_back() {
        let registry = Arc::new(ObserverRegistry::new());
        let store = RecordStore::new(StoreOptions::new(), registry.clone());
        let failing = Arc::new(|_: &MutationEvent| Err::<(), ObserverError>(ObserverError::new("offline")));
        registry.subscribe(&failing);

        let err = store.add(VectorRecord::new("a", vec![1.0])).unwrap_err();
        assert!(err.is_committed());
        assert!(store.contains("a").unwrap());
    }

    #[test]
    fn test_observer_can_read_store_during_notification() {
        let registry = Arc::new(ObserverRegistry::new());
        let store = Arc::new(RecordStore::new(StoreOptions::new(), registry.clone()));
        let seen_len = Arc::new(Mutex::new(None));
        let reader = {
            let store = Arc::downgrade(&store);
            let seen_len = seen_len.clone();
            Arc::new(move |_: &MutationEvent| {
                if let Some(store) = store.upgrade() {
                    *seen_len.lock().unwrap() = store.len().ok();
                }
                Ok::<(), ObserverError>(())
            })
        };
        registry.subscribe(&reader);

        store.add(VectorRecord::new("a", vec![1.0])).unwrap();
        assert_eq!(*seen_len.lock().unwrap(), Some(1));
    }

    #[test]
    fn test_events_arrive_in_commit_order() {
        let registry = Arc::new(ObserverRegistry::new());
        let store = Arc::new(RecordStore::new(StoreOptions::new(), registry.clone()));

        // Holds the insert delivery open until the delete has committed.
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let gate = {
            let entered = entered.clone();
            let release = release.clone();
            Arc::new(move |event: &MutationEvent| {
                if event.kind == EventKind::Insert {
                    entered.wait();
                    release.wait();
                }
                Ok::<(), ObserverError>(())
            })
        };
        let events = Arc::new(Mutex::new(Vec::new()));
        let recorder = {
            let events = events.clone();
            Arc::new(move |event: &MutationEvent| {
                events.lock().unwrap().push((event.kind, event.id.clone()));
                Ok::<(), ObserverError>(())
            })
        };
        registry.subscribe(&gate);
        registry.subscribe(&recorder);

        let inserter = {
            let store = store.clone();
            thread::spawn(move || store.add(VectorRecord::new("a", vec![1.0])))
        };
        entered.wait();

        let deleter = {
            let store = store.clone();
            thread::spawn(move || store.delete("a"))
        };
        while store.contains("a").unwrap() {
            thread::sleep(Duration::from_millis(1));
        }
        release.wait();

        inserter.join().unwrap().unwrap();
        deleter.join().unwrap().unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                (EventKind::Insert, Some("a".to_string())),
                (EventKind::Delete, Some("a".to_string())),
            ]
        );
        assert!(!store.contains("a").unwrap());
    }

    #[test]
    fn test_observer_can_mutate_store_during_notification() {
        let registry = Arc::new(ObserverRegistry::new());
        let store = Arc::new(RecordStore::new(StoreOptions::new(), registry.clone()));
        let follower = {
            let store = Arc::downgrade(&store);
            Arc::new(move |event: &MutationEvent| -> Result<(), ObserverError> {
                if let (Some(store), Some("a")) = (store.upgrade(), event.id.as_deref()) {
                    if event.kind == EventKind::Insert {
                        store
                            .add(VectorRecord::new("a-copy", vec![2.0]))
                            .map_err(|e| ObserverError::new(e.to_string()))?;
                    }
                }
                Ok(())
            })
        };
        registry.subscribe(&follower);

        store.add(VectorRecord::new("a", vec![1.0])).unwrap();
        store.add(VectorRecord::new("b", vec![3.0])).unwrap();

        assert_eq!(ids(&store.all().unwrap()), vec!["a", "a-copy", "b"]);
    }
}
