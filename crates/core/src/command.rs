//! Buffered write commands
//!
//! Writes issued during a transaction attempt are not applied locally.
//! They accumulate as [`WriteCommand`]s and are handed to the engine as
//! one ordered batch when the attempt succeeds.
//!
//! ## Wire Format
//!
//! ```json
//! {"type": "SET", "path": "users/alice", "data": {...}, "options": {"mode": "merge"}}
//! {"type": "UPDATE", "path": "users/alice", "data": {"address.city": ...}}
//! {"type": "DELETE", "path": "users/alice"}
//! ```

use crate::document::{DocumentPath, FieldPath};
use crate::value::{Map, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a `set` combines with an existing document
///
/// `Merge` and `MergeFields` are mutually exclusive by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "fields", rename_all = "snake_case")]
pub enum SetOptions {
    /// Replace the whole document
    #[default]
    Overwrite,
    /// Merge the given fields into the existing document
    Merge,
    /// Merge only the listed fields
    MergeFields(Vec<FieldPath>),
}

/// One buffered write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteCommand {
    /// Create or replace a document
    Set {
        /// Target document
        path: DocumentPath,
        /// Document fields
        data: Map,
        /// Overwrite or merge
        #[serde(default)]
        options: SetOptions,
    },

    /// Update fields of an existing document
    Update {
        /// Target document
        path: DocumentPath,
        /// Field path to new value
        data: BTreeMap<FieldPath, Value>,
    },

    /// Delete a document
    Delete {
        /// Target document
        path: DocumentPath,
    },
}

impl WriteCommand {
    /// Document this command writes to
    pub fn path(&self) -> &DocumentPath {
        match self {
            WriteCommand::Set { path, .. }
            | WriteCommand::Update { path, .. }
            | WriteCommand::Delete { path } => path,
        }
    }

    /// Wire name of the command
    pub fn kind(&self) -> &'static str {
        match self {
            WriteCommand::Set { .. } => "SET",
            WriteCommand::Update { .. } => "UPDATE",
            WriteCommand::Delete { .. } => "DELETE",
        }
    }
}
