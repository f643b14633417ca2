//! Core types for Tessera
//!
//! This crate defines the vocabulary shared by the transaction coordinator
//! and the transaction engine:
//! - [`TxnId`]: transaction identifier
//! - [`Value`], [`DocumentPath`], [`DocumentSnapshot`]: document model
//! - [`WriteCommand`]: buffered writes sent to the engine
//! - [`TransactionError`], [`EngineError`]: error taxonomy
//! - [`CallSite`]: diagnostic context captured at transaction start

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod diagnostic;
pub mod document;
pub mod error;
pub mod types;
pub mod value;

pub use command::{SetOptions, WriteCommand};
pub use diagnostic::CallSite;
pub use document::{DocumentPath, DocumentSnapshot, FieldPath};
pub use error::{BoxError, EngineError, Result, TransactionError, NON_FUTURE_UPDATE_MESSAGE};
pub use types::TxnId;
pub use value::{Map, Value};
