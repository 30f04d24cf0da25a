//! # memvec-core
//!
//! **memvec** – an in-memory vector database with pluggable similarity search.
//!
//! This crate is the public API. It wraps the `memvec-db` infrastructure
//! (record store, similarity strategies, observers, query engine) behind one
//! façade and one error type.
//!
//! ## Main Types
//!
//! - [`Database`] – CRUD, batch insert and top-k similarity search
//! - [`DatabaseConfig`] – construction options, loadable from YAML or TOML
//! - [`VecDbError`] – domain-specific error type
//!
//! ## Modules
//!
//! - [`config`] – configuration loading, validation and env overrides
//! - [`database`] – the Database façade
//! - [`db_adapter`] – `DbError` to `VecDbError` translation
//! - [`errors`] – error types
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use memvec_core::{Database, DatabaseConfig, MetadataFilter, MutationEvent, ObserverError};
//!
//! let db = Database::new(DatabaseConfig::new()).unwrap();
//!
//! let audit = Arc::new(|event: &MutationEvent| {
//!     println!("{} {:?}", event.kind, event.id);
//!     Ok::<(), ObserverError>(())
//! });
//! db.subscribe(&audit);
//!
//! db.add("A", vec![1.0, 0.0]).unwrap();
//! db.add("B", vec![0.0, 1.0]).unwrap();
//! db.add("C", vec![0.7, 0.7]).unwrap();
//!
//! let result = db.search(&[1.0, 0.0], 2, None).unwrap();
//! assert_eq!(result.ids(), vec!["A", "C"]);
//!
//! let only_b = MetadataFilter::new().with_id_prefix("B");
//! let result = db.search(&[1.0, 0.0], 2, Some(&only_b)).unwrap();
//! assert_eq!(result.ids(), vec!["B"]);
//! ```

pub mod config;
pub mod database;
pub mod db_adapter;
pub mod errors;

pub use config::DatabaseConfig;
pub use database::{BatchFailure, BatchReport, Database};
pub use errors::{VecDbError, VecDbResult};

// Re-export the record, filter, observer and strategy types callers need.
pub use memvec_db::{
    EventKind, Metadata, MetadataFilter, MetadataValue, MutationEvent, NotificationError,
    Observer, ObserverError, ObserverFailure, QueryResult, RankDirection, RecordFilter,
    SearchHit, SimilarityKind, SimilarityStrategy, Snapshot, SubscriptionId, TracingObserver,
    VectorRecord,
};
