//! Transaction engine contract
//!
//! The engine physically executes transactions: it owns read snapshots,
//! conflict detection, retry policy, and commit. The coordinator only
//! drives it through the calls below and learns outcomes through
//! [`EngineEvent`](crate::EngineEvent)s published on the instance's
//! event bus.
//!
//! ```text
//!  coordinator                         engine
//!  ───────────                         ──────
//!  begin(id)              ───────────▶
//!                         ◀─────────── update(id)
//!  process_update_response(id, cmds) ─▶
//!                         ◀─────────── update(id)      (retry)
//!  process_update_response(id, cmds) ─▶
//!                         ◀─────────── complete(id) | error(id)
//!  dispose(id, false)     ───────────▶
//! ```

use futures::future::BoxFuture;
use std::sync::Arc;
use tessera_core::{DocumentPath, DocumentSnapshot, EngineError, TxnId, WriteCommand};

/// Engine collaborator driven by the coordinator
///
/// Every call except `get_document` is a signal: its effect is reported
/// later through events, not through the return value. Implementations
/// must not call back into the coordinator synchronously.
pub trait TransactionEngine: Send + Sync + 'static {
    /// Start a transaction session for `id`
    fn begin(&self, id: TxnId) -> Result<(), EngineError>;

    /// Read a document inside the transaction's snapshot
    fn get_document(
        &self,
        id: TxnId,
        path: &DocumentPath,
    ) -> BoxFuture<'static, Result<DocumentSnapshot, EngineError>>;

    /// Submit the buffered writes of the latest successful attempt
    fn process_update_response(
        &self,
        id: TxnId,
        commands: Vec<WriteCommand>,
    ) -> Result<(), EngineError>;

    /// Release engine-side state for `id`
    ///
    /// `pending_abort` is true when the engine may still believe the
    /// transaction is open and must abort it.
    fn dispose(&self, id: TxnId, pending_abort: bool);
}

impl<E: TransactionEngine + ?Sized> TransactionEngine for Arc<E> {
    fn begin(&self, id: TxnId) -> Result<(), EngineError> {
        (**self).begin(id)
    }

    fn get_document(
        &self,
        id: TxnId,
        path: &DocumentPath,
    ) -> BoxFuture<'static, Result<DocumentSnapshot, EngineError>> {
        (**self).get_document(id, path)
    }

    fn process_update_response(
        &self,
        id: TxnId,
        commands: Vec<WriteCommand>,
    ) -> Result<(), EngineError> {
        (**self).process_update_response(id, commands)
    }

    fn dispose(&self, id: TxnId, pending_abort: bool) {
        (**self).dispose(id, pending_abort)
    }
}
