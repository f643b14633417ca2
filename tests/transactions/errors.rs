//! Transaction Failure Tests
//!
//! Engine errors, user errors, panics, and usage errors.

use crate::common::*;
use std::fmt;
use tessera::{
    EngineError, EngineEvent, EventKind, ReturnPolicy, TransactionError, UpdateOutcome,
    NON_FUTURE_UPDATE_MESSAGE,
};

#[derive(Debug, PartialEq)]
struct InsufficientFunds {
    needed: i64,
}

impl fmt::Display for InsufficientFunds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "insufficient funds: need {}", self.needed)
    }
}

impl std::error::Error for InsufficientFunds {}

impl From<InsufficientFunds> for TransactionError {
    fn from(e: InsufficientFunds) -> Self {
        TransactionError::user(e)
    }
}

// ============================================================================
// Engine Errors
// ============================================================================

#[tokio::test]
async fn error_event_carries_engine_code_and_start_site() {
    let (db, engine) = open(Script::fail("aborted", "too much contention"));

    let line = line!() + 1;
    let fut = db.run_transaction(|_txn| async { Ok::<_, TransactionError>(()) });
    let id = fut.id();
    let err = settle(fut).await.unwrap_err();

    assert!(err.is_engine());
    assert_eq!(err.code(), "aborted");
    assert!(err.to_string().contains("too much contention"));

    let site = err.call_site().expect("call site attached");
    assert!(site.location().file().ends_with("errors.rs"));
    assert_eq!(site.location().line(), line);
    assert_eq!(site.trace_lines()[0], format!("at {}", site.location()));

    assert_eq!(engine.disposals_for(id), vec![false]);
}

#[tokio::test]
async fn forced_backtrace_is_captured() {
    init_tracing();
    let db = tessera::Tessera::builder()
        .capture_backtraces(true)
        .open(|events| RecordingEngine::new(events, Script::fail("aborted", "x")))
        .unwrap();

    let err = settle(db.run_transaction(|_txn| async { Ok::<_, TransactionError>(()) }))
        .await
        .unwrap_err();

    assert!(err.call_site().unwrap().has_backtrace());
}

#[tokio::test]
async fn error_event_without_payload() {
    let (db, engine) = open(Script::Manual);

    let fut = db.run_transaction(|_txn| async { Ok::<_, TransactionError>(()) });
    let id = fut.id();
    engine.emit(EngineEvent {
        id,
        kind: EventKind::Error(None),
    });

    let err = settle(fut).await.unwrap_err();
    assert_eq!(err.code(), "unknown");
    assert!(err.call_site().is_some());
    assert_eq!(engine.disposals_for(id), vec![false]);
}

#[tokio::test]
async fn error_after_retry_discards_tentative_result() {
    let (db, engine) = open(Script::Manual);

    let fut = db.run_transaction(|_txn| async { Ok::<_, TransactionError>(7) });
    let id = fut.id();
    engine.emit(EngineEvent::update(id));
    eventually(|| engine.buffers_for(id).len() == 1).await;
    engine.emit(EngineEvent::error(id, EngineError::new("failed-precondition", "stale read")));

    let err = settle(fut).await.unwrap_err();
    assert_eq!(err.code(), "failed-precondition");
}

#[tokio::test]
async fn begin_failure_rejects_without_events() {
    let (db, engine) = open(Script::Manual);
    engine.fail_begin_with(EngineError::new("unavailable", "engine offline"));

    let fut = db.run_transaction(|_txn| async { Ok::<_, TransactionError>(()) });
    let id = fut.id();
    let err = settle(fut).await.unwrap_err();

    assert_eq!(err.code(), "unavailable");
    assert!(err.call_site().is_some());
    assert_eq!(engine.disposals_for(id), vec![false]);
    assert_eq!(db.pending_count(), 0);
}

#[tokio::test]
async fn rejected_buffer_aborts_transaction() {
    let (db, engine) = open(Script::commit());
    engine.fail_process_with(EngineError::new("invalid-argument", "bad write"));

    let fut = db.run_transaction(|txn| async move {
        txn.delete(&doc("users/a"));
        Ok::<_, TransactionError>(())
    });
    let id = fut.id();
    let err = settle(fut).await.unwrap_err();

    assert!(err.is_engine());
    assert_eq!(err.code(), "invalid-argument");
    assert_eq!(engine.buffers_for(id).len(), 1);
    assert_eq!(engine.disposals_for(id), vec![true]);
}

// ============================================================================
// Update Function Failures
// ============================================================================

#[tokio::test]
async fn user_error_is_returned_unchanged() {
    let (db, engine) = open(Script::commit());

    let fut = db.run_transaction(|txn| async move {
        txn.set(&doc("users/a"), json!({"x": 1}))?;
        Err::<(), TransactionError>(InsufficientFunds { needed: 30 }.into())
    });
    let id = fut.id();
    let err = settle(fut).await.unwrap_err();

    assert_eq!(
        err.downcast_user_ref::<InsufficientFunds>(),
        Some(&InsufficientFunds { needed: 30 })
    );
    assert!(engine.buffers_for(id).is_empty());
    assert_eq!(engine.disposals_for(id), vec![true]);
}

#[tokio::test]
async fn custom_error_type_converts() {
    let (db, _engine) = open(Script::commit());

    let err = settle(db.run_transaction(|_txn| async {
        Err::<(), _>(InsufficientFunds { needed: 5 })
    }))
    .await
    .unwrap_err();

    assert_eq!(err.code(), "user");
    assert_eq!(err.to_string(), "insufficient funds: need 5");
}

#[tokio::test]
async fn invalid_write_rejects_transaction() {
    let (db, engine) = open(Script::commit());

    let fut = db.run_transaction(|txn| async move {
        txn.set(&doc("users/a"), json!([1, 2, 3]))?;
        Ok::<_, TransactionError>(())
    });
    let id = fut.id();
    let err = settle(fut).await.unwrap_err();

    assert_eq!(err.code(), "invalid-argument");
    assert!(engine.buffers_for(id).is_empty());
}

#[tokio::test]
async fn panic_in_update_function_rejects() {
    let (db, engine) = open(Script::commit());

    let fut = db.run_transaction(|_txn| async {
        if true {
            panic!("update exploded");
        }
        Ok::<_, TransactionError>(())
    });
    let id = fut.id();
    let err = settle(fut).await.unwrap_err();

    assert!(matches!(err, TransactionError::Panicked { ref message } if message == "update exploded"));
    assert!(engine.buffers_for(id).is_empty());
    assert_eq!(engine.disposals_for(id), vec![true]);
    assert!(db.is_open());
}

// ============================================================================
// Return Policy
// ============================================================================

#[tokio::test]
async fn plain_value_is_usage_error() {
    let (db, engine) = open(Script::commit());

    let fut = db.run_transaction_with(|txn| {
        txn.delete(&doc("users/a"));
        UpdateOutcome::ready(1)
    });
    let id = fut.id();
    let err = settle(fut).await.unwrap_err();

    assert!(err.is_usage());
    assert_eq!(err.to_string(), NON_FUTURE_UPDATE_MESSAGE);
    assert!(engine.buffers_for(id).is_empty());
    assert_eq!(engine.disposals_for(id), vec![true]);
}

#[tokio::test]
async fn plain_value_allowed_by_policy() {
    let (db, engine) = open_with(Script::commit(), ReturnPolicy::AllowImmediate);

    let fut = db.run_transaction_with(|txn| {
        txn.delete(&doc("users/a"));
        UpdateOutcome::ready("done")
    });
    let id = fut.id();

    assert_eq!(settle(fut).await.unwrap(), "done");
    assert_eq!(engine.buffers_for(id)[0].len(), 1);
}

#[tokio::test]
async fn plain_failure_allowed_by_policy_still_rejects() {
    let (db, engine) = open_with(Script::commit(), ReturnPolicy::AllowImmediate);

    let fut = db.run_transaction_with(|_txn| {
        UpdateOutcome::<()>::failed(TransactionError::invalid_argument("nope"))
    });
    let id = fut.id();

    assert_eq!(settle(fut).await.unwrap_err().code(), "invalid-argument");
    assert!(engine.buffers_for(id).is_empty());
}
