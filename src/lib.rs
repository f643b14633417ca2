//! # Tessera
//!
//! Client-side transaction coordination for document databases.
//!
//! Tessera runs user update functions against an external transaction
//! engine. The engine owns snapshots, conflict detection, and retries; it
//! asks the client to run the update function through `update` events and
//! reports the outcome through `complete` or `error`. Tessera keeps the
//! registry of pending transactions, buffers each attempt's writes, and
//! settles the caller's future.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tessera::prelude::*;
//!
//! let db = Tessera::open(|events| MyEngine::connect(events))?;
//!
//! let balance = db
//!     .run_transaction(|txn| async move {
//!         let account = DocumentPath::parse("accounts/alice")?;
//!         let snap = txn.get(&account).await?;
//!         let balance = snap.get("balance").and_then(Value::as_int).unwrap_or(0);
//!         txn.update_field(&account, "balance", balance - 10)?;
//!         Ok::<_, TransactionError>(balance - 10)
//!     })
//!     .await?;
//! ```
//!
//! ## Failure Reporting
//!
//! - Engine failures carry the engine's code and message, plus the
//!   [`CallSite`] where the transaction was started
//! - Errors and panics inside the update function reject immediately,
//!   without another engine round-trip
//! - An update function that does not return a future is a usage error
//!   unless [`ReturnPolicy::AllowImmediate`] is configured

#![warn(missing_docs)]

mod database;
mod error;
mod types;

pub mod prelude;

// Re-export main entry points
pub use database::{Tessera, TesseraBuilder};
pub use error::{Error, Result};

// Re-export types
pub use types::*;
