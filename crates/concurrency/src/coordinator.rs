//! Transaction coordinator
//!
//! Bridges user update functions with the transaction engine:
//!
//! 1. `run_transaction()` registers the update function and calls `begin`
//! 2. On `update`, run one attempt and forward its command buffer
//! 3. On `error`, reject with the engine's code/message and the caller's
//!    call site
//! 4. On `complete`, resolve with the latest attempt's result
//!
//! Failures inside the update function (error, panic, plain value where a
//! future is required) reject immediately without another engine
//! round-trip. Every terminal outcome deregisters the transaction and
//! calls `dispose` exactly once.
//!
//! ```text
//!                 update                     update (retry)
//!   Started ───────────▶ UpdateRunning ──▶ UpdateSent ──────┐
//!                            │   ▲                          │
//!                            │   └──────────────────────────┘
//!              local failure │                 │ complete / error
//!                            ▼                 ▼
//!                          Error        Complete / Error
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tessera_core::{CallSite, EngineError, Result, TransactionError, TxnId};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::CoordinatorConfig;
use crate::engine::TransactionEngine;
use crate::event::{EngineEvent, EventKind, Subscription};
use crate::handle::Transaction;
use crate::registry::{PendingTransaction, Registry, TxnState};
use crate::update::{AttemptFuture, TypedEntry, UpdateOutcome};

/// Future returned by [`TransactionCoordinator::run_transaction`]
///
/// Resolves once the engine reports a terminal outcome. Dropping it does
/// not cancel the transaction.
#[must_use = "transactions run regardless; await the future to observe the outcome"]
pub struct TransactionFuture<T> {
    id: TxnId,
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> TransactionFuture<T> {
    /// Id of the underlying transaction
    pub fn id(&self) -> TxnId {
        self.id
    }
}

impl<T> Future for TransactionFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TransactionError::Disposed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Snapshot of coordinator counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorMetrics {
    /// Transactions started
    pub started: u64,
    /// Transactions resolved successfully
    pub committed: u64,
    /// Transactions rejected (engine, user, or usage errors, and shutdown)
    pub failed: u64,
    /// Update attempts run
    pub attempts: u64,
    /// Transactions currently registered
    pub active: u64,
}

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    committed: AtomicU64,
    failed: AtomicU64,
    attempts: AtomicU64,
}

/// How a transaction ends
enum Outcome {
    Resolve,
    Reject(TransactionError),
    /// Engine failure, attributed to the transaction's call site
    RejectEngine(EngineError),
}

struct Inner {
    engine: Arc<dyn TransactionEngine>,
    registry: Registry,
    config: CoordinatorConfig,
    counters: Counters,
}

/// Registry and event dispatcher for client-side transactions
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct TransactionCoordinator {
    inner: Arc<Inner>,
}

impl TransactionCoordinator {
    /// Create a coordinator driving `engine`
    pub fn new(engine: Arc<dyn TransactionEngine>, config: CoordinatorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                registry: Registry::default(),
                config,
                counters: Counters::default(),
            }),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Run a transaction whose update function returns a future
    ///
    /// The update function may run several times if the engine retries.
    /// Each run gets a handle with an empty command buffer; the value of
    /// the last successful run is what the returned future resolves to.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let total = coordinator
    ///     .run_transaction(|txn| async move {
    ///         let doc = DocumentPath::parse("counters/visits")?;
    ///         let n = txn.get(&doc).await?.get("n").and_then(Value::as_int).unwrap_or(0);
    ///         txn.update_field(&doc, "n", n + 1)?;
    ///         Ok(n + 1)
    ///     })
    ///     .await?;
    /// ```
    #[track_caller]
    pub fn run_transaction<F, Fut, T, E>(&self, update: F) -> TransactionFuture<T>
    where
        F: Fn(Transaction) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<TransactionError> + 'static,
    {
        self.run_transaction_with(move |txn| {
            let fut = update(txn);
            UpdateOutcome::pending(async move { fut.await.map_err(Into::<TransactionError>::into) })
        })
    }

    /// Run a transaction whose update function returns an [`UpdateOutcome`]
    ///
    /// [`UpdateOutcome::Ready`] is rejected with a usage error unless the
    /// config's return policy is `AllowImmediate`.
    #[track_caller]
    pub fn run_transaction_with<F, T>(&self, update: F) -> TransactionFuture<T>
    where
        F: Fn(Transaction) -> UpdateOutcome<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let call_site = if self.inner.config.capture_backtraces {
            CallSite::force_capture()
        } else {
            CallSite::capture()
        };

        let id = TxnId::next();
        let (tx, rx) = oneshot::channel();
        let handle = Transaction::new(id, Arc::clone(&self.inner.engine));
        let entry = Box::new(TypedEntry::new(update, tx));

        self.inner
            .registry
            .insert(PendingTransaction::new(id, call_site, handle, entry));
        self.inner.counters.started.fetch_add(1, Ordering::Relaxed);

        debug!(
            txn_id = %id,
            instance = %self.inner.config.instance_name,
            "Transaction started"
        );

        if let Err(e) = self.inner.engine.begin(id) {
            warn!(txn_id = %id, code = %e.code, "Engine failed to begin transaction");
            self.inner.finish(id, Outcome::RejectEngine(e), false);
        }

        TransactionFuture { id, rx }
    }

    /// Route one engine event
    ///
    /// `update` events run the update function and complete once its
    /// command buffer has been forwarded (or the attempt failed).
    pub async fn handle_event(&self, event: EngineEvent) {
        let id = event.id;
        match event.kind {
            EventKind::Update => {
                if let Some((handle, attempt)) = self.inner.start_update(id) {
                    self.inner.forward_update(id, handle, attempt).await;
                }
            }
            EventKind::Error(error) => self.inner.handle_error(id, error),
            EventKind::Complete => self.inner.handle_complete(id),
            EventKind::Unknown(kind) => {
                warn!(txn_id = %id, kind = %kind, "Ignoring unknown transaction event");
            }
        }
    }

    /// Consume events from `subscription` on a background task
    ///
    /// Events are applied to the registry in arrival order. For `update`,
    /// the update function is called inline; only awaiting its future and
    /// forwarding the buffer are spawned, so a slow update function never
    /// delays events for other transactions. The task ends when the bus is
    /// dropped; aborting it drops the subscription.
    pub fn spawn_dispatcher(&self, mut subscription: Subscription) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let id = event.id;
                match event.kind {
                    EventKind::Update => {
                        if let Some((handle, attempt)) = coordinator.inner.start_update(id) {
                            let coordinator = coordinator.clone();
                            tokio::spawn(async move {
                                coordinator.inner.forward_update(id, handle, attempt).await
                            });
                        }
                    }
                    _ => coordinator.handle_event(event).await,
                }
            }
            debug!(
                instance = %coordinator.inner.config.instance_name,
                "Event bus closed, dispatcher exiting"
            );
        })
    }

    /// Reject every pending transaction with [`TransactionError::Disposed`]
    ///
    /// Each transaction is disposed with `pending_abort = true`. Returns the
    /// number of transactions rejected.
    pub fn shutdown(&self) -> usize {
        let drained = self.inner.registry.drain();
        let count = drained.len();
        for pending in drained {
            self.inner.engine.dispose(pending.id, true);
            pending.entry.reject(TransactionError::Disposed);
        }
        self.inner
            .counters
            .failed
            .fetch_add(count as u64, Ordering::Relaxed);
        if count > 0 {
            debug!(
                instance = %self.inner.config.instance_name,
                count,
                "Disposed pending transactions on shutdown"
            );
        }
        count
    }

    /// Number of registered transactions
    pub fn pending_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Whether `id` is registered
    pub fn is_pending(&self, id: TxnId) -> bool {
        self.inner.registry.contains(id)
    }

    /// Lifecycle state of a registered transaction
    pub fn state(&self, id: TxnId) -> Option<TxnState> {
        self.inner.registry.state(id)
    }

    /// Current counters
    pub fn metrics(&self) -> CoordinatorMetrics {
        let c = &self.inner.counters;
        CoordinatorMetrics {
            started: c.started.load(Ordering::Relaxed),
            committed: c.committed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            attempts: c.attempts.load(Ordering::Relaxed),
            active: self.inner.registry.len() as u64,
        }
    }
}

impl Inner {
    /// Prepare the attempt and call the update function
    ///
    /// Returns `None` (after disposing) if the transaction is not
    /// registered.
    fn start_update(&self, id: TxnId) -> Option<(Transaction, AttemptFuture)> {
        let Some(attempt) = self.registry.begin_attempt(id, self.config.return_policy) else {
            // A local failure already settled this transaction while the
            // engine queued a retry.
            debug!(txn_id = %id, "Update for unknown transaction, disposing");
            self.engine.dispose(id, true);
            return None;
        };
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);

        let handle = attempt.handle;
        debug!(txn_id = %id, attempt = handle.attempt(), "Running update function");
        let future = (attempt.runner)(handle.clone());
        Some((handle, future))
    }

    /// Await the attempt, then forward its buffer or reject
    async fn forward_update(&self, id: TxnId, handle: Transaction, attempt: AttemptFuture) {
        if let Err(error) = attempt.await {
            warn!(
                txn_id = %id,
                attempt = handle.attempt(),
                code = error.code(),
                "Update function failed"
            );
            self.finish(id, Outcome::Reject(error), true);
            return;
        }

        let commands = handle.take_commands();
        if !self.registry.mark_sent(id) {
            debug!(txn_id = %id, "Transaction settled during update, dropping buffer");
            return;
        }

        debug!(
            txn_id = %id,
            attempt = handle.attempt(),
            commands = commands.len(),
            "Forwarding command buffer"
        );
        if let Err(e) = self.engine.process_update_response(id, commands) {
            warn!(txn_id = %id, code = %e.code, "Engine rejected command buffer");
            self.finish(id, Outcome::RejectEngine(e), true);
        }
    }

    fn handle_error(&self, id: TxnId, error: Option<EngineError>) {
        let error = error.unwrap_or_else(|| {
            EngineError::new("unknown", "transaction failed without an error payload")
        });
        let code = error.code.clone();
        if self.finish(id, Outcome::RejectEngine(error), false) {
            debug!(txn_id = %id, code = %code, "Transaction failed");
        } else {
            debug!(txn_id = %id, code = %code, "Error for unknown transaction");
        }
    }

    fn handle_complete(&self, id: TxnId) {
        if self.finish(id, Outcome::Resolve, false) {
            debug!(txn_id = %id, "Transaction complete");
        } else {
            debug!(txn_id = %id, "Complete for unknown transaction");
        }
    }

    /// Deregister, dispose, and settle a transaction
    ///
    /// Returns false if the transaction was not registered.
    fn finish(&self, id: TxnId, outcome: Outcome, pending_abort: bool) -> bool {
        let Some(pending) = self.registry.remove(id) else {
            return false;
        };
        self.engine.dispose(id, pending_abort);

        let resolved = match outcome {
            Outcome::Resolve => pending.entry.resolve(),
            Outcome::Reject(error) => {
                pending.entry.reject(error);
                false
            }
            Outcome::RejectEngine(error) => {
                pending
                    .entry
                    .reject(TransactionError::engine(error, Some(pending.call_site)));
                false
            }
        };

        let counter = if resolved {
            &self.counters.committed
        } else {
            &self.counters.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
        true
    }
}
