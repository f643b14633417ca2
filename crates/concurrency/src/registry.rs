//! Pending-transaction registry
//!
//! Maps a transaction id to everything needed to drive it: the caller's
//! diagnostic context, the handle, and the type-erased update function
//! with its completion sender.
//!
//! # Lifecycle
//!
//! ```text
//! Started -> (UpdateRunning -> UpdateSent)* -> removed
//! ```
//!
//! An entry is present only between `run_transaction` and its terminal
//! outcome; [`Registry::remove`] hands the entry to exactly one caller, so
//! a transaction is settled at most once.
//!
//! The lock is never held while user code runs or across an `.await`.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tessera_core::{CallSite, TxnId};

use crate::config::ReturnPolicy;
use crate::handle::Transaction;
use crate::update::{AttemptRunner, PendingEntry};

/// Where a pending transaction is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Registered, engine `begin` issued, no update seen yet
    Started,
    /// The update function is running
    UpdateRunning,
    /// The command buffer was forwarded; waiting for the engine
    UpdateSent,
}

pub(crate) struct PendingTransaction {
    pub(crate) id: TxnId,
    pub(crate) call_site: CallSite,
    pub(crate) handle: Transaction,
    pub(crate) entry: Box<dyn PendingEntry>,
    pub(crate) state: TxnState,
}

impl PendingTransaction {
    pub(crate) fn new(
        id: TxnId,
        call_site: CallSite,
        handle: Transaction,
        entry: Box<dyn PendingEntry>,
    ) -> Self {
        Self {
            id,
            call_site,
            handle,
            entry,
            state: TxnState::Started,
        }
    }
}

/// A prepared attempt taken from the registry
pub(crate) struct Attempt {
    pub(crate) handle: Transaction,
    pub(crate) runner: AttemptRunner,
}

#[derive(Default)]
pub(crate) struct Registry {
    pending: Mutex<FxHashMap<TxnId, PendingTransaction>>,
}

impl Registry {
    /// Register a transaction
    pub(crate) fn insert(&self, pending: PendingTransaction) {
        self.pending.lock().insert(pending.id, pending);
    }

    /// Deregister a transaction
    pub(crate) fn remove(&self, id: TxnId) -> Option<PendingTransaction> {
        self.pending.lock().remove(&id)
    }

    /// Deregister every transaction
    pub(crate) fn drain(&self) -> Vec<PendingTransaction> {
        self.pending.lock().drain().map(|(_, p)| p).collect()
    }

    pub(crate) fn contains(&self, id: TxnId) -> bool {
        self.pending.lock().contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub(crate) fn state(&self, id: TxnId) -> Option<TxnState> {
        self.pending.lock().get(&id).map(|p| p.state)
    }

    /// Start the next attempt: reset the handle's buffer and prepare the
    /// update function
    ///
    /// Returns `None` if the transaction is not registered.
    pub(crate) fn begin_attempt(&self, id: TxnId, policy: ReturnPolicy) -> Option<Attempt> {
        let mut map = self.pending.lock();
        let pending = map.get_mut(&id)?;
        pending.handle.prepare();
        pending.state = TxnState::UpdateRunning;
        Some(Attempt {
            handle: pending.handle.clone(),
            runner: pending.entry.attempt(policy),
        })
    }

    /// Record that the command buffer was forwarded
    ///
    /// Returns false if the transaction was removed while the attempt ran.
    pub(crate) fn mark_sent(&self, id: TxnId) -> bool {
        match self.pending.lock().get_mut(&id) {
            Some(pending) => {
                pending.state = TxnState::UpdateSent;
                true
            }
            None => false,
        }
    }
}
