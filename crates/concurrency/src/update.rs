//! Update functions and their type-erased pending state
//!
//! The registry holds transactions with different result types in one
//! map. [`PendingEntry`] erases the result type: each entry knows how to
//! run one attempt of its update function, where to keep the tentative
//! result, and how to settle the caller's future.

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tessera_core::{Result, TransactionError};
use tokio::sync::oneshot;

use crate::config::ReturnPolicy;
use crate::handle::Transaction;

/// What an update function produced for one attempt
pub enum UpdateOutcome<T> {
    /// A future to await
    Pending(BoxFuture<'static, Result<T>>),
    /// A plain value, accepted only under [`ReturnPolicy::AllowImmediate`]
    Ready(Result<T>),
}

impl<T> UpdateOutcome<T> {
    /// Wrap a future
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        UpdateOutcome::Pending(Box::pin(fut))
    }

    /// A plain successful value
    pub fn ready(value: T) -> Self {
        UpdateOutcome::Ready(Ok(value))
    }

    /// A plain failure
    pub fn failed(error: TransactionError) -> Self {
        UpdateOutcome::Ready(Err(error))
    }
}

impl<T> std::fmt::Debug for UpdateOutcome<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateOutcome::Pending(_) => f.write_str("UpdateOutcome::Pending"),
            UpdateOutcome::Ready(Ok(_)) => f.write_str("UpdateOutcome::Ready(Ok)"),
            UpdateOutcome::Ready(Err(e)) => write!(f, "UpdateOutcome::Ready(Err({}))", e),
        }
    }
}

/// Future for one attempt; stores the tentative result on success
pub(crate) type AttemptFuture = BoxFuture<'static, Result<()>>;

/// One prepared attempt, invoked outside the registry lock
pub(crate) type AttemptRunner = Box<dyn FnOnce(Transaction) -> AttemptFuture + Send>;

/// Result-type-erased half of a pending transaction
pub(crate) trait PendingEntry: Send {
    /// Prepare the next attempt of the update function
    fn attempt(&self, policy: ReturnPolicy) -> AttemptRunner;

    /// Resolve the caller with the latest tentative result
    ///
    /// Rejects with an internal error if no attempt has succeeded; returns
    /// whether the caller was resolved.
    fn resolve(self: Box<Self>) -> bool;

    /// Reject the caller
    fn reject(self: Box<Self>, error: TransactionError);
}

pub(crate) struct TypedEntry<T, F> {
    update: Arc<F>,
    result: Arc<Mutex<Option<T>>>,
    sender: oneshot::Sender<Result<T>>,
}

impl<T, F> TypedEntry<T, F>
where
    T: Send + 'static,
    F: Fn(Transaction) -> UpdateOutcome<T> + Send + Sync + 'static,
{
    pub(crate) fn new(update: F, sender: oneshot::Sender<Result<T>>) -> Self {
        Self {
            update: Arc::new(update),
            result: Arc::new(Mutex::new(None)),
            sender,
        }
    }
}

impl<T, F> PendingEntry for TypedEntry<T, F>
where
    T: Send + 'static,
    F: Fn(Transaction) -> UpdateOutcome<T> + Send + Sync + 'static,
{
    fn attempt(&self, policy: ReturnPolicy) -> AttemptRunner {
        let update = Arc::clone(&self.update);
        let slot = Arc::clone(&self.result);

        Box::new(move |txn: Transaction| -> AttemptFuture {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| update(txn))) {
                Ok(outcome) => outcome,
                Err(payload) => return future::ready(Err(panicked(payload))).boxed(),
            };

            match (outcome, policy) {
                (UpdateOutcome::Pending(fut), _) => async move {
                    let value = AssertUnwindSafe(fut)
                        .catch_unwind()
                        .await
                        .map_err(panicked)??;
                    *slot.lock() = Some(value);
                    Ok::<(), TransactionError>(())
                }
                .boxed(),
                (UpdateOutcome::Ready(_), ReturnPolicy::RequireFuture) => {
                    future::ready(Err(TransactionError::non_future_update())).boxed()
                }
                (UpdateOutcome::Ready(result), ReturnPolicy::AllowImmediate) => {
                    let stored = result.map(|value| {
                        *slot.lock() = Some(value);
                    });
                    future::ready(stored).boxed()
                }
            }
        })
    }

    fn resolve(self: Box<Self>) -> bool {
        let value = self.result.lock().take();
        match value {
            Some(value) => {
                let _ = self.sender.send(Ok(value));
                true
            }
            None => {
                let _ = self.sender.send(Err(TransactionError::internal(
                    "engine completed a transaction before any attempt succeeded",
                )));
                false
            }
        }
    }

    fn reject(self: Box<Self>, error: TransactionError) {
        let _ = self.sender.send(Err(error));
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> TransactionError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    };
    TransactionError::Panicked { message }
}
