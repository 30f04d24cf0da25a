//! Mutation observers.
//!
//! The registry holds weak references to observers and delivers every
//! mutation event to each live observer in subscription order. A failing or
//! panicking observer never stops delivery to the others; failures are
//! collected into a single [`NotificationError`].

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::record::VectorRecord;

// ============================================================================
// Events
// ============================================================================

/// Kind of mutation that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Insert,
    Update,
    Delete,
    Clear,
}

impl EventKind {
    /// Get the event kind as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Insert => "insert",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
            EventKind::Clear => "clear",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A store mutation, delivered after the mutation has been applied.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationEvent {
    /// What happened.
    pub kind: EventKind,

    /// Affected record id. `None` for [`EventKind::Clear`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Record state after an insert or update, or the removed record on delete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Arc<VectorRecord>>,
}

impl MutationEvent {
    pub fn insert(record: Arc<VectorRecord>) -> Self {
        Self {
            kind: EventKind::Insert,
            id: Some(record.id.clone()),
            record: Some(record),
        }
    }

    pub fn update(record: Arc<VectorRecord>) -> Self {
        Self {
            kind: EventKind::Update,
            id: Some(record.id.clone()),
            record: Some(record),
        }
    }

    pub fn delete(record: Arc<VectorRecord>) -> Self {
        Self {
            kind: EventKind::Delete,
            id: Some(record.id.clone()),
            record: Some(record),
        }
    }

    pub fn clear() -> Self {
        Self {
            kind: EventKind::Clear,
            id: None,
            record: None,
        }
    }
}

// ============================================================================
// Observer Trait
// ============================================================================

/// Error returned by an observer that could not handle an event.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ObserverError {
    pub message: String,
}

impl ObserverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Listener for store mutations.
pub trait Observer: Send + Sync {
    /// Handle one mutation event.
    fn on_event(&self, event: &MutationEvent) -> Result<(), ObserverError>;
}

impl<F> Observer for F
where
    F: Fn(&MutationEvent) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_event(&self, event: &MutationEvent) -> Result<(), ObserverError> {
        self(event)
    }
}

/// Observer that logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &MutationEvent) -> Result<(), ObserverError> {
        match &event.id {
            Some(id) => info!("Record {}: {}", event.kind, id),
            None => info!("Store {}", event.kind),
        }
        Ok(())
    }
}

// ============================================================================
// Subscription Handles
// ============================================================================

/// Handle returned by [`ObserverRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Get the underlying handle value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Notification Errors
// ============================================================================

/// One observer's failure to handle an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverFailure {
    pub subscription: SubscriptionId,
    pub message: String,
}

impl fmt::Display for ObserverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer {}: {}", self.subscription, self.message)
    }
}

/// All observer failures from a single notification pass.
#[derive(Debug, Clone, Error)]
#[error("{} observer(s) failed to handle {kind} event: {}", .failures.len(), join_failures(.failures))]
pub struct NotificationError {
    pub kind: EventKind,
    pub failures: Vec<ObserverFailure>,
}

fn join_failures(failures: &[ObserverFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// ObserverRegistry
// ============================================================================

#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    observer: Weak<dyn Observer>,
}

/// Set of subscribed observers.
///
/// The registry never keeps an observer alive: once the caller drops its last
/// `Arc`, the subscription is skipped and pruned on the next notification.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe an observer. Delivery order follows subscription order.
    pub fn subscribe<O>(&self, observer: &Arc<O>) -> SubscriptionId
    where
        O: Observer + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let strong: Arc<dyn Observer> = observer.clone();
        self.write().push(Subscriber {
            id,
            observer: Arc::downgrade(&strong),
        });
        debug!("Observer {} subscribed", id);
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        let removed = subscribers.len() != before;
        if removed {
            debug!("Observer {} unsubscribed", id);
        }
        removed
    }

    /// Whether the subscription exists and its observer is still alive.
    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.read()
            .iter()
            .any(|s| s.id == id && s.observer.strong_count() > 0)
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.read()
            .iter()
            .filter(|s| s.observer.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every live observer.
    ///
    /// The registry lock is released before delivery, so observers may
    /// subscribe or unsubscribe from inside a callback. An observer removed
    /// during the pass is not called afterwards.
    pub fn notify(&self, event: &MutationEvent) -> Result<(), NotificationError> {
        let live: Vec<(SubscriptionId, Arc<dyn Observer>)> = {
            let mut subscribers = self.write();
            subscribers.retain(|s| s.observer.strong_count() > 0);
            subscribers
                .iter()
                .filter_map(|s| s.observer.upgrade().map(|o| (s.id, o)))
                .collect()
        };

        let mut failures = Vec::new();
        for (id, observer) in live {
            if !self.is_subscribed(id) {
                continue;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(event)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.message,
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };

            warn!(
                "Observer {} failed on {} event: {}",
                id, event.kind, message
            );
            failures.push(ObserverFailure {
                subscription: id,
                message,
            });
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotificationError {
                kind: event.kind,
                failures,
            })
        }
    }

    // Subscriber list updates are single push/retain calls and cannot be
    // left half-applied, so a poisoned lock is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, Vec<Subscriber>> {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(EventKind, Option<String>)>>,
    }

    impl Observer for Recorder {
        fn on_event(&self, event: &MutationEvent) -> Result<(), ObserverError> {
            self.seen
                .lock()
                .unwrap()
                .push((event.kind, event.id.clone()));
            Ok(())
        }
    }

    #[test]
    fn test_event_serialization() {
        let record = Arc::new(VectorRecord::new("a", vec![1.0, 2.0]));
        let json = serde_json::to_value(MutationEvent::insert(record)).unwrap();
        assert_eq!(json["kind"], "insert");
        assert_eq!(json["id"], "a");
        assert_eq!(json["record"]["vector"], serde_json::json!([1.0, 2.0]));

        let json = serde_json::to_value(MutationEvent::clear()).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "clear" }));
    }

    struct Failing;

    impl Observer for Failing {
        fn on_event(&self, _event: &MutationEvent) -> Result<(), ObserverError> {
            Err(ObserverError::new("sink unavailable"))
        }
    }

    struct Panicking;

    impl Observer for Panicking {
        fn on_event(&self, _event: &MutationEvent) -> Result<(), ObserverError> {
            panic!("observer exploded");
        }
    }

    fn insert_event(id: &str) -> MutationEvent {
        MutationEvent::insert(Arc::new(VectorRecord::new(id, vec![1.0])))
    }

    #[test]
    fn test_notify_in_subscription_order() {
        let registry = ObserverRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let order = order.clone();
            Arc::new(move |_: &MutationEvent| {
                order.lock().unwrap().push("first");
                Ok::<(), ObserverError>(())
            })
        };
        let second = {
            let order = order.clone();
            Arc::new(move |_: &MutationEvent| {
                order.lock().unwrap().push("second");
                Ok::<(), ObserverError>(())
            })
        };

        registry.subscribe(&first);
        registry.subscribe(&second);
        registry.notify(&insert_event("a")).unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_failures_are_isolated() {
        let registry = ObserverRegistry::new();
        let failing = Arc::new(Failing);
        let panicking = Arc::new(Panicking);
        let recorder = Arc::new(Recorder::default());

        let failing_id = registry.subscribe(&failing);
        let panicking_id = registry.subscribe(&panicking);
        registry.subscribe(&recorder);

        let err = registry.notify(&insert_event("a")).unwrap_err();
        assert_eq!(err.kind, EventKind::Insert);
        assert_eq!(err.failures.len(), 2);
        assert_eq!(err.failures[0].subscription, failing_id);
        assert_eq!(err.failures[0].message, "sink unavailable");
        assert_eq!(err.failures[1].subscription, panicking_id);
        assert!(err.failures[1].message.contains("observer exploded"));

        // The healthy observer still received the event.
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(*seen, vec![(EventKind::Insert, Some("a".to_string()))]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let registry = ObserverRegistry::new();
        let recorder = Arc::new(Recorder::default());

        let id = registry.subscribe(&recorder);
        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));

        registry.notify(&insert_event("a")).unwrap();
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_registry_does_not_own_observers() {
        let registry = ObserverRegistry::new();
        let recorder = Arc::new(Recorder::default());
        let id = registry.subscribe(&recorder);
        assert_eq!(registry.len(), 1);
        assert_eq!(Arc::strong_count(&recorder), 1);

        drop(recorder);
        assert!(!registry.is_subscribed(id));
        assert!(registry.is_empty());
        registry.notify(&MutationEvent::clear()).unwrap();
    }

    #[test]
    fn test_unsubscribe_from_inside_callback() {
        let registry = Arc::new(ObserverRegistry::new());
        let recorder = Arc::new(Recorder::default());
        let recorder_id = Arc::new(Mutex::new(None));

        let remover = {
            let registry = Arc::downgrade(&registry);
            let recorder_id = recorder_id.clone();
            Arc::new(move |_: &MutationEvent| {
                if let (Some(registry), Some(id)) =
                    (registry.upgrade(), *recorder_id.lock().unwrap())
                {
                    registry.unsubscribe(id);
                }
                Ok::<(), ObserverError>(())
            })
        };

        registry.subscribe(&remover);
        *recorder_id.lock().unwrap() = Some(registry.subscribe(&recorder));

        registry.notify(&insert_event("a")).unwrap();
        assert!(recorder.seen.lock().unwrap().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_notification_error_message() {
        let err = NotificationError {
            kind: EventKind::Delete,
            failures: vec![ObserverFailure {
                subscription: SubscriptionId(3),
                message: "boom".to_string(),
            }],
        };
        assert_eq!(
            err.to_string(),
            "1 observer(s) failed to handle delete event: observer #3: boom"
        );
    }
}
