//! Transaction Lifecycle Tests
//!
//! Start, attempt, forward, settle, dispose.

use crate::common::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tessera::{Error, Tessera, TransactionError, TxnState, Value, WriteCommand};

// ============================================================================
// Happy Path
// ============================================================================

#[tokio::test]
async fn set_then_complete_resolves_with_value() {
    let (db, engine) = open(Script::commit());

    let fut = db.run_transaction(|txn| async move {
        txn.set(&doc("users/a"), json!({"name": "Ada"}))?;
        Ok::<_, TransactionError>(42)
    });
    let id = fut.id();

    assert_eq!(settle(fut).await.unwrap(), 42);

    let buffers = engine.buffers_for(id);
    assert_eq!(buffers.len(), 1);
    match &buffers[0][..] {
        [WriteCommand::Set { path, data, .. }] => {
            assert_eq!(path, &doc("users/a"));
            assert_eq!(data.get("name"), Some(&Value::from("Ada")));
        }
        other => panic!("unexpected buffer {:?}", other),
    }
    assert_eq!(engine.disposals_for(id), vec![false]);
    assert_eq!(db.pending_count(), 0);
}

#[tokio::test]
async fn empty_buffer_is_still_forwarded() {
    let (db, engine) = open(Script::commit());

    let fut = db.run_transaction(|_txn| async { Ok::<_, TransactionError>("nothing") });
    let id = fut.id();

    assert_eq!(settle(fut).await.unwrap(), "nothing");
    assert_eq!(engine.buffers_for(id), vec![Vec::<WriteCommand>::new()]);
}

#[tokio::test]
async fn reads_go_through_engine() {
    let (db, engine) = open(Script::commit());
    engine.put_document("accounts/alice", json!({"balance": 100}));

    let balance = settle(db.run_transaction(|txn| async move {
        let account = doc("accounts/alice");
        let snap = txn.get(&account).await?;
        let balance = snap.get("balance").and_then(Value::as_int).unwrap_or(0);
        txn.update_field(&account, "balance", balance - 30)?;
        Ok::<_, TransactionError>(balance - 30)
    }))
    .await
    .unwrap();

    assert_eq!(balance, 70);
}

#[tokio::test]
async fn missing_document_reads_as_absent() {
    let (db, _engine) = open(Script::commit());

    let exists = settle(db.run_transaction(|txn| async move {
        Ok::<_, TransactionError>(txn.get(&doc("accounts/nobody")).await?.exists())
    }))
    .await
    .unwrap();

    assert!(!exists);
}

// ============================================================================
// Retries
// ============================================================================

#[tokio::test]
async fn retry_forwards_only_that_attempts_commands() {
    let (db, engine) = open(Script::retry_then_commit(2));
    let runs = Arc::new(AtomicU32::new(0));

    let r = Arc::clone(&runs);
    let fut = db.run_transaction(move |txn| {
        let n = r.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            txn.set(&doc(&format!("runs/{}", n)), json!({"attempt": n}))?;
            Ok::<_, TransactionError>(n)
        }
    });
    let id = fut.id();

    // Resolves with the value of the last attempt
    assert_eq!(settle(fut).await.unwrap(), 3);
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    let buffers = engine.buffers_for(id);
    assert_eq!(buffers.len(), 3);
    for (i, buffer) in buffers.iter().enumerate() {
        assert_eq!(buffer.len(), 1, "attempt {} buffer", i + 1);
        assert_eq!(buffer[0].path(), &doc(&format!("runs/{}", i + 1)));
    }
    assert_eq!(engine.disposals_for(id), vec![false]);
}

#[tokio::test]
async fn handle_reports_attempt_number() {
    let (db, _engine) = open(Script::retry_then_commit(1));

    let attempt = settle(db.run_transaction(|txn| async move {
        Ok::<_, TransactionError>(txn.attempt())
    }))
    .await
    .unwrap();

    assert_eq!(attempt, 2);
}

// ============================================================================
// State and Metrics
// ============================================================================

#[tokio::test]
async fn state_follows_events() {
    let (db, engine) = open(Script::Manual);

    let fut = db.run_transaction(|_txn| async { Ok::<_, TransactionError>(()) });
    let id = fut.id();
    assert_eq!(db.coordinator().state(id), Some(TxnState::Started));

    engine.emit(tessera::EngineEvent::update(id));
    eventually(|| db.coordinator().state(id) == Some(TxnState::UpdateSent)).await;

    engine.emit(tessera::EngineEvent::complete(id));
    settle(fut).await.unwrap();
    assert_eq!(db.coordinator().state(id), None);
}

#[tokio::test]
async fn metrics_count_outcomes() {
    let (db, _engine) = open(Script::retry_then_commit(1));

    settle(db.run_transaction(|_txn| async { Ok::<_, TransactionError>(()) }))
        .await
        .unwrap();
    let err = settle(db.run_transaction(|_txn| async {
        Err::<(), _>(TransactionError::invalid_argument("bad input"))
    }))
    .await
    .unwrap_err();
    assert_eq!(err.code(), "invalid-argument");

    let metrics = db.metrics();
    assert_eq!(metrics.started, 2);
    assert_eq!(metrics.committed, 1);
    assert_eq!(metrics.failed, 1);
    assert_eq!(metrics.attempts, 3);
    assert_eq!(metrics.active, 0);
}

// ============================================================================
// Instance Lifecycle
// ============================================================================

#[test]
fn open_outside_runtime_fails() {
    let result = Tessera::open(|events| RecordingEngine::new(events, Script::Manual));
    assert!(matches!(result, Err(Error::Runtime(_))));
}

#[tokio::test]
async fn default_instance_name() {
    let (db, _engine) = open(Script::Manual);
    assert_eq!(db.name(), tessera::DEFAULT_INSTANCE_NAME);
    assert!(db.is_open());
}

#[tokio::test]
async fn builder_from_toml() {
    let db = Tessera::builder()
        .name("ignored")
        .config(
            tessera::CoordinatorConfig::from_toml_str(
                "instance_name = \"analytics\"\nreturn_policy = \"allow_immediate\"",
            )
            .unwrap(),
        )
        .open(|events| RecordingEngine::new(events, Script::commit()))
        .unwrap();

    assert_eq!(db.name(), "analytics");
    let v = settle(db.run_transaction_with(|_txn| tessera::UpdateOutcome::ready(5)))
        .await
        .unwrap();
    assert_eq!(v, 5);
}

#[tokio::test]
async fn close_rejects_pending_transactions() {
    let (db, engine) = open(Script::Manual);

    let a = db.run_transaction(|_txn| async { Ok::<_, TransactionError>(1) });
    let b = db.run_transaction(|_txn| async { Ok::<_, TransactionError>(2) });
    let (ida, idb) = (a.id(), b.id());

    assert_eq!(db.close(), 2);
    assert!(matches!(settle(a).await, Err(TransactionError::Disposed)));
    assert!(matches!(settle(b).await, Err(TransactionError::Disposed)));
    assert_eq!(engine.disposals_for(ida), vec![true]);
    assert_eq!(engine.disposals_for(idb), vec![true]);

    // Second close is a no-op
    assert_eq!(db.close(), 0);
    assert!(!db.is_open());
}

#[tokio::test]
async fn instances_do_not_share_events() {
    let (_primary, primary_engine) = open(Script::Manual);
    let (secondary, _secondary_engine) = open(Script::Manual);

    let fut = secondary.run_transaction(|_txn| async { Ok::<_, TransactionError>(()) });
    let id = fut.id();

    // Published on the wrong bus: the primary has no such transaction
    primary_engine.emit(tessera::EngineEvent::complete(id));
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert!(secondary.coordinator().is_pending(id));
    assert!(primary_engine.disposals_for(id).is_empty());
}
