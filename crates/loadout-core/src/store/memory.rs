//! In-memory store provider backing the standalone binary and tests.

use std::collections::{BTreeMap, HashMap};

use crate::config::StoreSnapshot;

use super::{Record, RecordId, Store, StoreProvider};

/// A single in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    name: String,
    records: HashMap<RecordId, Record>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: HashMap::new(),
        }
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.insert(record);
        self
    }

    pub fn insert(&mut self, record: Record) {
        self.records.insert(record.id().clone(), record);
    }
}

impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn record(&self, id: &RecordId) -> anyhow::Result<Option<Record>> {
        Ok(self.records.get(id).cloned())
    }
}

/// A set of named in-memory stores.
#[derive(Debug, Clone, Default)]
pub struct MemoryStores {
    stores: HashMap<String, MemoryStore>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: MemoryStore) -> Self {
        self.insert(store);
        self
    }

    pub fn insert(&mut self, store: MemoryStore) {
        self.stores.insert(store.name().to_string(), store);
    }

    /// Build stores from a configuration snapshot.
    pub fn from_snapshot(snapshot: &BTreeMap<String, StoreSnapshot>) -> Self {
        let mut stores = Self::new();
        for (name, snap) in snapshot {
            let mut store = MemoryStore::new(name);
            for (id, fields) in &snap.records {
                let mut record = Record::new(RecordId::new(id));
                for (field, value) in fields {
                    record = record.with_field(field, value);
                }
                store.insert(record);
            }
            stores.insert(store);
        }
        stores
    }
}

impl StoreProvider for MemoryStores {
    fn resolve(&self, name: &str) -> Option<&dyn Store> {
        self.stores.get(name).map(|store| store as &dyn Store)
    }
}
