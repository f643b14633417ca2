//! Document addressing and snapshots
//!
//! - [`DocumentPath`]: `collection/doc[/collection/doc...]`
//! - [`FieldPath`]: dotted path to a field inside a document
//! - [`DocumentSnapshot`]: a document as read inside a transaction

use crate::error::{Result, TransactionError};
use crate::value::{Map, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Path to a single document
///
/// A valid path has an even number of non-empty, slash-separated segments,
/// alternating collection and document ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentPath(String);

impl DocumentPath {
    /// Parse and validate a document path
    ///
    /// # Examples
    ///
    /// ```
    /// use tessera_core::DocumentPath;
    ///
    /// let path = DocumentPath::parse("users/alice").unwrap();
    /// assert_eq!(path.collection(), "users");
    /// assert_eq!(path.id(), "alice");
    ///
    /// assert!(DocumentPath::parse("users").is_err());
    /// ```
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Err(TransactionError::invalid_argument("document path is empty"));
        }
        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(TransactionError::invalid_argument(format!(
                "document path '{}' contains an empty segment",
                path
            )));
        }
        if segments.len() % 2 != 0 {
            return Err(TransactionError::invalid_argument(format!(
                "'{}' is a collection path, expected a document path",
                path
            )));
        }
        Ok(DocumentPath(trimmed.to_string()))
    }

    /// The full slash-separated path
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Document id (last segment)
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Id of the collection containing this document
    pub fn collection(&self) -> &str {
        self.0.rsplit('/').nth(1).unwrap_or("")
    }

    /// Path of the collection containing this document
    pub fn parent(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentPath {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self> {
        DocumentPath::parse(s)
    }
}

impl TryFrom<String> for DocumentPath {
    type Error = TransactionError;

    fn try_from(s: String) -> Result<Self> {
        DocumentPath::parse(&s)
    }
}

impl TryFrom<&str> for DocumentPath {
    type Error = TransactionError;

    fn try_from(s: &str) -> Result<Self> {
        DocumentPath::parse(s)
    }
}

impl From<DocumentPath> for String {
    fn from(p: DocumentPath) -> Self {
        p.0
    }
}

/// Dotted path to a field inside a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Parse a dotted field path such as `address.city`
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(TransactionError::invalid_argument("field path is empty"));
        }
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(TransactionError::invalid_argument(format!(
                "field path '{}' contains an empty segment",
                path
            )));
        }
        Ok(FieldPath(segments))
    }

    /// Path segments, outermost first
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self> {
        FieldPath::parse(s)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = TransactionError;

    fn try_from(s: String) -> Result<Self> {
        FieldPath::parse(&s)
    }
}

impl From<FieldPath> for String {
    fn from(p: FieldPath) -> Self {
        p.to_string()
    }
}

/// A document as read inside a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    /// Path of the document
    pub path: DocumentPath,
    /// Document fields, `None` if the document does not exist
    pub data: Option<Map>,
}

impl DocumentSnapshot {
    /// Snapshot of an existing document
    pub fn found(path: DocumentPath, data: Map) -> Self {
        Self {
            path,
            data: Some(data),
        }
    }

    /// Snapshot of a missing document
    pub fn missing(path: DocumentPath) -> Self {
        Self { path, data: None }
    }

    /// Whether the document exists
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    /// Look up a field by dotted path
    ///
    /// Returns `None` if the document is missing, the field is absent, or an
    /// intermediate segment is not an object.
    pub fn get(&self, field: &str) -> Option<&Value> {
        let path = FieldPath::parse(field).ok()?;
        let mut segments = path.segments().iter();
        let first = segments.next()?;
        let mut current = self.data.as_ref()?.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}
