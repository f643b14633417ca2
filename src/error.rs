//! Unified error types for Tessera.
//!
//! Transaction outcomes carry a [`TransactionError`]; this type adds the
//! failures of setting up an instance.

use tessera_concurrency::ConfigError;
use tessera_core::TransactionError;
use thiserror::Error;

/// All Tessera errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A transaction was rejected
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// No async runtime to host the event dispatcher
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Result type for Tessera operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if the engine rejected the transaction.
    pub fn is_engine(&self) -> bool {
        matches!(self, Error::Transaction(e) if e.is_engine())
    }

    /// Check if the update function broke the usage contract.
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Transaction(e) if e.is_usage())
    }

    /// Check if the instance shut down before the transaction settled.
    pub fn is_disposed(&self) -> bool {
        matches!(self, Error::Transaction(TransactionError::Disposed))
    }

    /// Error code of a transaction failure.
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Transaction(e) => Some(e.code()),
            _ => None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}
