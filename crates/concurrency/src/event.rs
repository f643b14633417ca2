//! Engine events and the per-instance event bus
//!
//! ## Wire Format
//!
//! ```json
//! {"id": 3, "type": "update"}
//! {"id": 3, "type": "error", "error": {"code": "aborted", "message": "..."}}
//! {"id": 3, "type": "complete"}
//! ```
//!
//! Unrecognized `type` values decode to [`EventKind::Unknown`] rather than
//! failing, so newer engines can add event kinds without breaking older
//! coordinators.
//!
//! ## Bus
//!
//! Each database instance owns one [`EventBus`]. The engine publishes
//! through an [`EventPublisher`]; the coordinator consumes a
//! [`Subscription`], which unsubscribes itself when dropped.
//!
//! Only the [`EventBus`] keeps the bus alive. Publishers and subscriptions
//! hold weak references, so dropping the bus closes every subscription
//! even while an engine still holds a publisher.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tessera_core::{EngineError, TxnId};
use tokio::sync::mpsc;

/// What the engine is reporting about a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// The engine wants the update function run (first attempt or retry)
    Update,
    /// The transaction failed; terminal
    Error(Option<EngineError>),
    /// The transaction committed; terminal
    Complete,
    /// Unrecognized event type
    Unknown(String),
}

impl EventKind {
    /// Wire name of the event kind
    pub fn name(&self) -> &str {
        match self {
            EventKind::Update => "update",
            EventKind::Error(_) => "error",
            EventKind::Complete => "complete",
            EventKind::Unknown(kind) => kind,
        }
    }

    /// Whether this event ends the transaction
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::Error(_) | EventKind::Complete)
    }
}

/// Event emitted by the engine for one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireEvent", into = "WireEvent")]
pub struct EngineEvent {
    /// Transaction the event refers to
    pub id: TxnId,
    /// Event payload
    pub kind: EventKind,
}

impl EngineEvent {
    /// `update` event
    pub fn update(id: TxnId) -> Self {
        Self {
            id,
            kind: EventKind::Update,
        }
    }

    /// `error` event carrying the engine's failure
    pub fn error(id: TxnId, error: EngineError) -> Self {
        Self {
            id,
            kind: EventKind::Error(Some(error)),
        }
    }

    /// `complete` event
    pub fn complete(id: TxnId) -> Self {
        Self {
            id,
            kind: EventKind::Complete,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireEvent {
    id: TxnId,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<EngineError>,
}

impl From<WireEvent> for EngineEvent {
    fn from(wire: WireEvent) -> Self {
        let kind = match wire.kind.as_str() {
            "update" => EventKind::Update,
            "error" => EventKind::Error(wire.error),
            "complete" => EventKind::Complete,
            _ => EventKind::Unknown(wire.kind),
        };
        EngineEvent { id: wire.id, kind }
    }
}

impl From<EngineEvent> for WireEvent {
    fn from(event: EngineEvent) -> Self {
        let (kind, error) = match event.kind {
            EventKind::Update => ("update".to_string(), None),
            EventKind::Error(error) => ("error".to_string(), error),
            EventKind::Complete => ("complete".to_string(), None),
            EventKind::Unknown(kind) => (kind, None),
        };
        WireEvent {
            id: event.id,
            kind,
            error,
        }
    }
}

// ============================================================================
// Event bus
// ============================================================================

struct BusInner {
    name: String,
    next_subscriber: AtomicU64,
    subscribers: RwLock<FxHashMap<u64, mpsc::UnboundedSender<EngineEvent>>>,
}

/// Publish/subscribe channel scoped to one database instance
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus for the named instance
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                name: name.into(),
                next_subscriber: AtomicU64::new(0),
                subscribers: RwLock::new(FxHashMap::default()),
            }),
        }
    }

    /// Name of the owning instance
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.write().insert(id, tx);
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Handle the engine uses to publish events
    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }
}

/// Cloneable publishing half of an [`EventBus`]
#[derive(Clone)]
pub struct EventPublisher {
    bus: Weak<BusInner>,
}

impl EventPublisher {
    /// Deliver an event to every subscriber
    ///
    /// Returns the number of subscribers that received it; zero once the
    /// bus has been dropped.
    pub fn publish(&self, event: EngineEvent) -> usize {
        let Some(inner) = self.bus.upgrade() else {
            tracing::debug!(
                txn_id = %event.id,
                kind = event.kind.name(),
                "Dropping transaction event for closed bus"
            );
            return 0;
        };
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let subscribers = inner.subscribers.read();
            for (id, tx) in subscribers.iter() {
                match tx.send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(_) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = inner.subscribers.write();
            for id in closed {
                subscribers.remove(&id);
            }
        }

        if delivered == 0 {
            tracing::debug!(
                instance = %inner.name,
                txn_id = %event.id,
                kind = event.kind.name(),
                "Dropping transaction event with no subscribers"
            );
        }
        delivered
    }
}

/// Receiving half of an [`EventBus`] registration
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<EngineEvent>,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Wait for the next event
    ///
    /// Returns `None` once the bus and every publisher are gone.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is queued
    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        self.rx.try_recv().ok()
    }

    /// Explicitly unsubscribe
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.subscribers.write().remove(&self.id);
        }
    }
}
