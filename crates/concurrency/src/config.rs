//! Coordinator configuration
//!
//! # Example
//!
//! ```
//! use tessera_concurrency::{CoordinatorConfig, ReturnPolicy};
//!
//! let config = CoordinatorConfig::new()
//!     .with_instance_name("analytics")
//!     .with_return_policy(ReturnPolicy::AllowImmediate);
//!
//! let from_file = CoordinatorConfig::from_toml_str(r#"
//!     instance_name = "analytics"
//!     return_policy = "allow_immediate"
//! "#).unwrap();
//!
//! assert_eq!(config, from_file);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name used for the default database instance
pub const DEFAULT_INSTANCE_NAME: &str = "[DEFAULT]";

/// What to do when an update function produces a plain value instead of a future
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnPolicy {
    /// Reject the transaction with a usage error
    #[default]
    RequireFuture,
    /// Treat the value as an already-resolved future
    AllowImmediate,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed
    #[error("invalid coordinator config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for a [`TransactionCoordinator`](crate::TransactionCoordinator)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Handling of update functions that do not return a future
    pub return_policy: ReturnPolicy,
    /// Always capture a backtrace when a transaction starts
    ///
    /// When false, backtraces follow `RUST_BACKTRACE`.
    pub capture_backtraces: bool,
    /// Logical database instance name, used in log fields
    pub instance_name: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            return_policy: ReturnPolicy::default(),
            capture_backtraces: false,
            instance_name: DEFAULT_INSTANCE_NAME.to_string(),
        }
    }
}

impl CoordinatorConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Set the return policy
    pub fn with_return_policy(mut self, policy: ReturnPolicy) -> Self {
        self.return_policy = policy;
        self
    }

    /// Force backtrace capture at transaction start
    pub fn with_capture_backtraces(mut self, capture: bool) -> Self {
        self.capture_backtraces = capture;
        self
    }

    /// Set the instance name
    pub fn with_instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = name.into();
        self
    }
}
