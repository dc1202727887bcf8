//! Store boundary: named record stores exposed by the host.
//!
//! The orchestrator never writes to stores itself (the installer does
//! that); it only resolves stores by name and looks records up to decide
//! whether a package still needs installing.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod memory;

pub use memory::{MemoryStore, MemoryStores};

/// Identifier of a record inside a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One record as returned by a store lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    id: RecordId,
    fields: HashMap<String, String>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    /// Field value by name; `None` when the record carries no such field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// One named record store.
pub trait Store: Send + Sync {
    fn name(&self) -> &str;

    /// Look up a record by identifier.
    ///
    /// `Ok(None)` means the record does not exist. `Err` means the lookup
    /// itself failed and the caller must not draw any conclusion from it.
    fn record(&self, id: &RecordId) -> anyhow::Result<Option<Record>>;
}

/// Resolves store names to stores.
pub trait StoreProvider: Send + Sync {
    /// Resolve a store by name; `None` when the host has no such store.
    fn resolve(&self, name: &str) -> Option<&dyn Store>;
}
