//! Core identifier types
//!
//! This module defines the identifiers shared between the coordinator and
//! the transaction engine:
//! - [`TxnId`]: process-wide unique identifier for a logical transaction

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Next transaction ID, shared by every database instance in the process.
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(0);

/// Identifier for a logical transaction
///
/// A TxnId correlates engine events with the pending transaction that
/// produced them. It is used in:
/// - Engine calls (`begin`, `process_update_response`, `dispose`)
/// - Inbound engine events
/// - Log fields
///
/// IDs are allocated from a process-wide monotonic counter and are never
/// reused, even across database instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxnId(u64);

impl TxnId {
    /// Create a transaction ID from a raw value
    ///
    /// Used when decoding engine events. New transactions should use
    /// [`TxnId::next`] instead.
    pub fn new(id: u64) -> Self {
        TxnId(id)
    }

    /// Allocate the next transaction ID
    ///
    /// # Examples
    ///
    /// ```
    /// use tessera_core::TxnId;
    ///
    /// let a = TxnId::next();
    /// let b = TxnId::next();
    /// assert!(b > a);
    /// ```
    pub fn next() -> Self {
        TxnId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TxnId {
    fn from(id: u64) -> Self {
        TxnId(id)
    }
}

impl std::fmt::Display for TxnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}
