//! Error types for transaction coordination
//!
//! ## Taxonomy
//!
//! | Variant | Origin | Detected |
//! |---------|--------|----------|
//! | Usage | update function returned a plain value where a future is required | locally |
//! | InvalidArgument | malformed path or document data passed to the handle | locally |
//! | User | update function returned its own error | locally |
//! | Panicked | update function panicked | locally |
//! | Engine | engine reported conflict, timeout, permission failure, ... | via `error` event |
//! | Disposed | database instance shut down before a terminal event | locally |
//! | Internal | engine protocol violation | locally |
//!
//! Locally detected failures reject immediately, without another engine
//! round-trip. Engine failures carry the [`CallSite`] captured when the
//! transaction started.

use crate::diagnostic::CallSite;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed error returned by user update functions
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Message used when an update function does not produce a future
pub const NON_FUTURE_UPDATE_MESSAGE: &str =
    "Update function for `run_transaction(update_fn)` must return a future.";

/// Error payload reported by the transaction engine
///
/// This is the wire shape of the `error` field of an engine event:
/// ```json
/// { "code": "aborted", "message": "Transaction was aborted" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("[{code}] {message}")]
pub struct EngineError {
    /// Engine error code (e.g. "aborted", "deadline-exceeded")
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl EngineError {
    /// Create a new engine error
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// All transaction errors.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The update function was used incorrectly
    #[error("{message}")]
    Usage {
        /// Description of the misuse
        message: String,
    },

    /// Invalid path or document data
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was invalid
        message: String,
    },

    /// Error returned by the user's update function, surfaced unchanged
    #[error(transparent)]
    User(BoxError),

    /// The update function panicked
    #[error("update function panicked: {message}")]
    Panicked {
        /// Panic payload, if it was a string
        message: String,
    },

    /// Failure reported by the transaction engine
    #[error("[{code}] {message}")]
    Engine {
        /// Engine error code
        code: String,
        /// Engine error message
        message: String,
        /// Where the transaction was started, when known
        call_site: Option<CallSite>,
    },

    /// The database instance was shut down before the transaction finished
    #[error("transaction disposed before completion")]
    Disposed,

    /// Engine protocol violation or invariant failure
    #[error("internal error: {message}")]
    Internal {
        /// Description of the violation
        message: String,
    },
}

/// Result type for transaction operations.
pub type Result<T> = std::result::Result<T, TransactionError>;

impl TransactionError {
    /// Usage error for an update function that did not return a future
    pub fn non_future_update() -> Self {
        TransactionError::Usage {
            message: NON_FUTURE_UPDATE_MESSAGE.to_string(),
        }
    }

    /// Invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        TransactionError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Wrap a user error
    pub fn user<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TransactionError::User(Box::new(error))
    }

    /// Build an engine error attributed to the given call site
    pub fn engine(error: EngineError, call_site: Option<CallSite>) -> Self {
        TransactionError::Engine {
            code: error.code,
            message: error.message,
            call_site,
        }
    }

    /// Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        TransactionError::Internal {
            message: message.into(),
        }
    }

    /// Canonical code for this error
    ///
    /// Engine errors report the engine's own code.
    pub fn code(&self) -> &str {
        match self {
            TransactionError::Usage { .. } => "usage",
            TransactionError::InvalidArgument { .. } => "invalid-argument",
            TransactionError::User(_) => "user",
            TransactionError::Panicked { .. } => "panicked",
            TransactionError::Engine { code, .. } => code,
            TransactionError::Disposed => "disposed",
            TransactionError::Internal { .. } => "internal",
        }
    }

    /// Call site captured when the transaction started, for engine errors
    pub fn call_site(&self) -> Option<&CallSite> {
        match self {
            TransactionError::Engine { call_site, .. } => call_site.as_ref(),
            _ => None,
        }
    }

    /// Check if this error was reported by the engine
    pub fn is_engine(&self) -> bool {
        matches!(self, TransactionError::Engine { .. })
    }

    /// Check if this is a usage error
    pub fn is_usage(&self) -> bool {
        matches!(self, TransactionError::Usage { .. })
    }

    /// Borrow the user's error as a concrete type
    pub fn downcast_user_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            TransactionError::User(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl From<EngineError> for TransactionError {
    fn from(e: EngineError) -> Self {
        TransactionError::engine(e, None)
    }
}
