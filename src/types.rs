//! Public types for the Tessera API.
//!
//! This module re-exports types from internal crates with a clean public interface.

// Values and documents
pub use tessera_core::{DocumentPath, DocumentSnapshot, FieldPath, Map, Value};

// Buffered writes
pub use tessera_core::{SetOptions, WriteCommand};

// Identity and diagnostics
pub use tessera_core::{CallSite, TxnId};

// Transaction errors
pub use tessera_core::{EngineError, TransactionError, NON_FUTURE_UPDATE_MESSAGE};

// Coordination
pub use tessera_concurrency::{
    CoordinatorConfig, CoordinatorMetrics, EngineEvent, EventBus, EventKind, EventPublisher,
    ReturnPolicy, Subscription, Transaction, TransactionCoordinator, TransactionEngine,
    TransactionFuture, TxnState, UpdateOutcome, DEFAULT_INSTANCE_NAME,
};
