//! # memvec-db
//!
//! Infrastructure layer for memvec - the in-memory record store, similarity
//! strategies, mutation observers and the full-scan query engine.
//!
//! The public database API lives in `memvec-core`, which wraps these pieces
//! behind a single façade and error taxonomy.
//!
//! ## Architecture
//!
//! ```text
//! memvec-core::Database
//!        ↓ validates, translates errors
//! RecordStore ──notify──→ ObserverRegistry ──→ Observer(s)
//!        ↑ snapshot
//! QueryEngine ──score──→ SimilarityStrategy
//! ```
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use memvec_db::{
//!     ObserverRegistry, QueryEngine, QueryOptions, RecordStore, SimilarityKind, StoreOptions,
//!     VectorRecord,
//! };
//!
//! let store = RecordStore::new(StoreOptions::new(), Arc::new(ObserverRegistry::new()));
//! store.add(VectorRecord::new("a", vec![1.0, 0.0])).unwrap();
//!
//! let engine = QueryEngine::new(SimilarityKind::Cosine.strategy(), QueryOptions::default());
//! let result = engine.search(&store, &[1.0, 0.0], 1, None).unwrap();
//! assert_eq!(result.ids(), vec!["a"]);
//! ```

mod delivery;
pub mod error;
pub mod filter;
pub mod observer;
pub mod query;
pub mod record;
pub mod similarity;
pub mod store;

pub use error::{DbError, DbResult};
pub use filter::{MetadataFilter, RecordFilter};
pub use observer::{
    EventKind, MutationEvent, NotificationError, Observer, ObserverError, ObserverFailure,
    ObserverRegistry, SubscriptionId, TracingObserver,
};
pub use query::{QueryEngine, QueryOptions, QueryResult, SearchHit, DEFAULT_PARALLEL_THRESHOLD};
pub use record::{metadata_from_json, Metadata, MetadataValue, VectorRecord};
pub use similarity::{
    CosineSimilarity, DotProduct, EuclideanDistance, RankDirection, SimilarityKind,
    SimilarityStrategy,
};
pub use store::{RecordStore, Snapshot, StoreOptions};
