//! Transaction coordination for Tessera
//!
//! This crate drives client-side transactions over an external engine:
//! - TransactionCoordinator: pending-transaction registry and event dispatch
//! - Transaction: per-attempt write buffer handed to update functions
//! - EventBus: per-instance channel carrying engine events
//! - TransactionEngine: the engine surface (begin / update response / dispose)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod event;
pub mod handle;
mod registry;
pub mod update;

pub use config::{ConfigError, CoordinatorConfig, ReturnPolicy, DEFAULT_INSTANCE_NAME};
pub use coordinator::{CoordinatorMetrics, TransactionCoordinator, TransactionFuture};
pub use engine::TransactionEngine;
pub use event::{EngineEvent, EventBus, EventKind, EventPublisher, Subscription};
pub use handle::Transaction;
pub use registry::TxnState;
pub use update::UpdateOutcome;
