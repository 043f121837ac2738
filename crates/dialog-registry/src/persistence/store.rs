//! Dialog storage backends

use async_trait::async_trait;
use dashmap::DashMap;

use super::record::DialogRecord;
use crate::dialog::DialogKey;

/// Dialog storage backend. Apps plug their own (SQL, Redis); an in-memory
/// store is provided for tests and single-process setups.
#[async_trait]
pub trait DialogStore: Send + Sync + 'static {
    /// Every stored dialog
    async fn load_all(&self) -> anyhow::Result<Vec<DialogRecord>>;

    /// Insert or replace the record stored under `record.key()`
    async fn save(&self, record: &DialogRecord) -> anyhow::Result<()>;

    async fn remove(&self, key: DialogKey) -> anyhow::Result<()>;
}

/// In-memory dialog store
#[derive(Debug, Default)]
pub struct InMemoryDialogStore {
    inner: DashMap<DialogKey, DialogRecord>,
}

impl InMemoryDialogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, key: DialogKey) -> Option<DialogRecord> {
        self.inner.get(&key).map(|r| r.clone())
    }

    /// Seed a record directly
    pub fn insert(&self, record: DialogRecord) {
        self.inner.insert(record.key(), record);
    }
}

#[async_trait]
impl DialogStore for InMemoryDialogStore {
    async fn load_all(&self) -> anyhow::Result<Vec<DialogRecord>> {
        let mut records: Vec<DialogRecord> = self.inner.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(DialogRecord::key);
        Ok(records)
    }

    async fn save(&self, record: &DialogRecord) -> anyhow::Result<()> {
        self.inner.insert(record.key(), record.clone());
        Ok(())
    }

    async fn remove(&self, key: DialogKey) -> anyhow::Result<()> {
        self.inner.remove(&key);
        Ok(())
    }
}
