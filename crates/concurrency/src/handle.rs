//! Transaction handle passed to update functions
//!
//! A [`Transaction`] buffers writes for one attempt. Reads go straight to
//! the engine. Nothing written through the handle is visible until the
//! engine commits the whole buffer.
//!
//! Each attempt gets a fresh buffer. A clone of the handle kept past the
//! end of its attempt writes into that attempt's orphaned buffer and can
//! never leak commands into a retry.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tessera_core::{
    DocumentPath, DocumentSnapshot, FieldPath, Map, Result, SetOptions, TransactionError, TxnId,
    Value, WriteCommand,
};

use crate::engine::TransactionEngine;

/// Handle for reading and writing inside one transaction attempt
#[derive(Clone)]
pub struct Transaction {
    id: TxnId,
    attempt: u32,
    engine: Arc<dyn TransactionEngine>,
    buffer: Arc<Mutex<Vec<WriteCommand>>>,
}

impl Transaction {
    pub(crate) fn new(id: TxnId, engine: Arc<dyn TransactionEngine>) -> Self {
        Self {
            id,
            attempt: 0,
            engine,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Start a new attempt with an empty buffer
    pub(crate) fn prepare(&mut self) {
        self.attempt += 1;
        self.buffer = Arc::new(Mutex::new(Vec::new()));
    }

    /// Drain the buffered commands of the current attempt
    pub(crate) fn take_commands(&self) -> Vec<WriteCommand> {
        std::mem::take(&mut *self.buffer.lock())
    }

    /// Transaction this handle belongs to
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Attempt number, starting at 1 for the first update
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Number of buffered commands
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Whether no commands are buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Copy of the buffered commands, in issue order
    pub fn commands(&self) -> Vec<WriteCommand> {
        self.buffer.lock().clone()
    }

    /// Read a document through the engine
    pub fn get(
        &self,
        path: &DocumentPath,
    ) -> impl Future<Output = Result<DocumentSnapshot>> + Send + 'static {
        let read = self.engine.get_document(self.id, path);
        async move { read.await.map_err(TransactionError::from) }
    }

    /// Create or overwrite a document
    pub fn set(&self, path: &DocumentPath, data: impl Into<Value>) -> Result<&Self> {
        self.set_with_options(path, data, SetOptions::Overwrite)
    }

    /// Create or merge into a document
    ///
    /// With [`SetOptions::MergeFields`], every listed field must be present
    /// in `data`.
    pub fn set_with_options(
        &self,
        path: &DocumentPath,
        data: impl Into<Value>,
        options: SetOptions,
    ) -> Result<&Self> {
        let data = expect_object(data.into(), "set")?;
        if let SetOptions::MergeFields(fields) = &options {
            for field in fields {
                if !contains_field(&data, field) {
                    return Err(TransactionError::invalid_argument(format!(
                        "field '{}' is in the merge mask but missing from the document data",
                        field
                    )));
                }
            }
        }
        self.push(WriteCommand::Set {
            path: path.clone(),
            data,
            options,
        });
        Ok(self)
    }

    /// Update fields of an existing document
    ///
    /// Keys of `data` are dotted field paths.
    pub fn update(&self, path: &DocumentPath, data: impl Into<Value>) -> Result<&Self> {
        let data = expect_object(data.into(), "update")?;
        if data.is_empty() {
            return Err(TransactionError::invalid_argument(
                "update requires at least one field",
            ));
        }
        let fields: BTreeMap<FieldPath, Value> = data
            .into_iter()
            .map(|(key, value)| FieldPath::parse(&key).map(|field| (field, value)))
            .collect::<Result<_>>()?;
        self.push(WriteCommand::Update {
            path: path.clone(),
            data: fields,
        });
        Ok(self)
    }

    /// Update a single field of an existing document
    pub fn update_field(
        &self,
        path: &DocumentPath,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<&Self> {
        let field = FieldPath::parse(field)?;
        let mut data = BTreeMap::new();
        data.insert(field, value.into());
        self.push(WriteCommand::Update {
            path: path.clone(),
            data,
        });
        Ok(self)
    }

    /// Delete a document
    pub fn delete(&self, path: &DocumentPath) -> &Self {
        self.push(WriteCommand::Delete { path: path.clone() });
        self
    }

    fn push(&self, command: WriteCommand) {
        self.buffer.lock().push(command);
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("attempt", &self.attempt)
            .field("buffered", &self.len())
            .finish()
    }
}

fn expect_object(value: Value, op: &str) -> Result<Map> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(TransactionError::invalid_argument(format!(
            "{} expects an object, got {}",
            op,
            other.type_name()
        ))),
    }
}

fn contains_field(data: &Map, field: &FieldPath) -> bool {
    let mut segments = field.segments().iter();
    let Some(first) = segments.next() else {
        return false;
    };
    let Some(mut current) = data.get(first) else {
        return false;
    };
    for segment in segments {
        match current.as_object().and_then(|o| o.get(segment)) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}
