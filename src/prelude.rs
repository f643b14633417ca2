//! Convenient imports for Tessera.
//!
//! ```ignore
//! use tessera::prelude::*;
//!
//! let db = Tessera::open(|events| MyEngine::connect(events))?;
//! ```

// Main entry point
pub use crate::database::{Tessera, TesseraBuilder};

// Error handling
pub use crate::error::{Error, Result};

// Transaction API
pub use crate::types::{
    DocumentPath, DocumentSnapshot, EngineError, FieldPath, ReturnPolicy, SetOptions,
    Transaction, TransactionEngine, TransactionError, TxnId, UpdateOutcome, Value,
};

// Re-export serde_json for convenience
pub use serde_json::json;
