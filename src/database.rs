//! Main entry point for Tessera.
//!
//! This module provides the `Tessera` struct: one database instance with
//! its own event bus, coordinator, and dispatcher task.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tessera_concurrency::{
    CoordinatorConfig, CoordinatorMetrics, EventBus, EventPublisher, ReturnPolicy, Transaction,
    TransactionCoordinator, TransactionEngine, TransactionFuture, UpdateOutcome,
    DEFAULT_INSTANCE_NAME,
};
use tessera_core::TransactionError;
use tokio::task::JoinHandle;
use tracing::info;

/// A Tessera database instance.
///
/// Create one with [`Tessera::open`] or [`Tessera::builder`]. Must be
/// opened inside a tokio runtime.
///
/// # Example
///
/// ```ignore
/// use tessera::prelude::*;
///
/// let db = Tessera::open(|events| MyEngine::connect(events))?;
///
/// let n = db
///     .run_transaction(|txn| async move {
///         txn.set(&DocumentPath::parse("counters/a")?, json!({"n": 1}))?;
///         Ok::<_, TransactionError>(1)
///     })
///     .await?;
///
/// db.close();
/// ```
pub struct Tessera {
    name: String,
    bus: EventBus,
    coordinator: TransactionCoordinator,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Tessera {
    /// Open the default instance with default settings.
    ///
    /// `make_engine` receives the publisher the engine reports events on.
    pub fn open<E, F>(make_engine: F) -> Result<Self>
    where
        E: TransactionEngine,
        F: FnOnce(EventPublisher) -> E,
    {
        Self::builder().open(make_engine)
    }

    /// Create a builder for instance configuration.
    pub fn builder() -> TesseraBuilder {
        TesseraBuilder::new()
    }

    /// Instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run a transaction.
    ///
    /// See [`TransactionCoordinator::run_transaction`].
    #[track_caller]
    pub fn run_transaction<F, Fut, T, E>(&self, update: F) -> TransactionFuture<T>
    where
        F: Fn(Transaction) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<TransactionError> + 'static,
    {
        self.coordinator.run_transaction(update)
    }

    /// Run a transaction whose update function returns an [`UpdateOutcome`].
    #[track_caller]
    pub fn run_transaction_with<F, T>(&self, update: F) -> TransactionFuture<T>
    where
        F: Fn(Transaction) -> UpdateOutcome<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        self.coordinator.run_transaction_with(update)
    }

    /// Another publisher for this instance's event bus.
    pub fn publisher(&self) -> EventPublisher {
        self.bus.publisher()
    }

    /// The instance's coordinator.
    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    /// Number of transactions waiting on the engine.
    pub fn pending_count(&self) -> usize {
        self.coordinator.pending_count()
    }

    /// Transaction counters.
    pub fn metrics(&self) -> CoordinatorMetrics {
        self.coordinator.metrics()
    }

    /// Stop dispatching events and reject every pending transaction.
    ///
    /// Returns the number of transactions rejected. Calling it again is a
    /// no-op.
    pub fn close(&self) -> usize {
        if let Some(dispatcher) = self.dispatcher.lock().take() {
            dispatcher.abort();
        }
        let rejected = self.coordinator.shutdown();
        if rejected > 0 {
            info!(instance = %self.name, rejected, "Closed with pending transactions");
        }
        rejected
    }

    /// Whether the dispatcher is still running.
    pub fn is_open(&self) -> bool {
        self.dispatcher
            .lock()
            .as_ref()
            .map_or(false, |d| !d.is_finished())
    }
}

impl Drop for Tessera {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Tessera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tessera")
            .field("name", &self.name)
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Builder for instance configuration.
///
/// # Example
///
/// ```ignore
/// let db = Tessera::builder()
///     .name("analytics")
///     .return_policy(ReturnPolicy::AllowImmediate)
///     .capture_backtraces(true)
///     .open(|events| MyEngine::connect(events))?;
/// ```
pub struct TesseraBuilder {
    config: CoordinatorConfig,
}

impl TesseraBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: CoordinatorConfig::default(),
        }
    }

    /// Start from a TOML coordinator config.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(Self {
            config: CoordinatorConfig::from_toml_str(s)?,
        })
    }

    /// Replace the coordinator config.
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the instance name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config = self.config.with_instance_name(name);
        self
    }

    /// Set how plain (non-future) update results are handled.
    pub fn return_policy(mut self, policy: ReturnPolicy) -> Self {
        self.config = self.config.with_return_policy(policy);
        self
    }

    /// Always capture a backtrace when a transaction starts.
    pub fn capture_backtraces(mut self, capture: bool) -> Self {
        self.config = self.config.with_capture_backtraces(capture);
        self
    }

    /// Open the instance.
    ///
    /// Creates the event bus, hands its publisher to `make_engine`, and
    /// spawns the dispatcher on the current tokio runtime.
    pub fn open<E, F>(self, make_engine: F) -> Result<Tessera>
    where
        E: TransactionEngine,
        F: FnOnce(EventPublisher) -> E,
    {
        tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Runtime(format!("Tessera must be opened inside a tokio runtime: {}", e)))?;

        let name = if self.config.instance_name.is_empty() {
            DEFAULT_INSTANCE_NAME.to_string()
        } else {
            self.config.instance_name.clone()
        };
        let config = self.config.with_instance_name(name.clone());

        let bus = EventBus::new(name.clone());
        let engine: Arc<dyn TransactionEngine> = Arc::new(make_engine(bus.publisher()));
        let coordinator = TransactionCoordinator::new(engine, config);
        let dispatcher = coordinator.spawn_dispatcher(bus.subscribe());

        info!(instance = %name, "Opened instance");

        Ok(Tessera {
            name,
            bus,
            coordinator,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }
}

impl Default for TesseraBuilder {
    fn default() -> Self {
        Self::new()
    }
}
