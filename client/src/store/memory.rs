//! In-memory store, for tests and ephemeral forms.

use super::LocalStore;
use crate::error::Result;
use async_trait::async_trait;
use autopatch_engine::{ActivityRecord, Seq, StateFilter, StoredLog};
use parking_lot::Mutex;
use std::collections::HashMap;

/// A store that keeps every namespace in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: Mutex<HashMap<String, StoredLog>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with records for a namespace.
    pub fn with_records(namespace: &str, records: &[ActivityRecord]) -> Self {
        let mut stored = StoredLog::new(namespace);
        stored.upsert(records);

        let store = Self::new();
        store.namespaces.lock().insert(namespace.to_string(), stored);
        store
    }

    /// Copy of every record stored for a namespace.
    pub fn snapshot(&self, namespace: &str) -> Vec<ActivityRecord> {
        self.namespaces
            .lock()
            .get(namespace)
            .map(|stored| stored.query(StateFilter::All))
            .unwrap_or_default()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn load(&self, namespace: &str, filter: StateFilter) -> Result<Vec<ActivityRecord>> {
        Ok(self
            .namespaces
            .lock()
            .get(namespace)
            .map(|stored| stored.query(filter))
            .unwrap_or_default())
    }

    async fn upsert(&self, namespace: &str, records: &[ActivityRecord]) -> Result<()> {
        self.namespaces
            .lock()
            .entry(namespace.to_string())
            .or_insert_with(|| StoredLog::new(namespace))
            .upsert(records);
        Ok(())
    }

    async fn remove(&self, namespace: &str, seqs: &[Seq]) -> Result<()> {
        if let Some(stored) = self.namespaces.lock().get_mut(namespace) {
            stored.remove(seqs);
        }
        Ok(())
    }

    async fn prune_accepted(&self, namespace: &str) -> Result<usize> {
        Ok(self
            .namespaces
            .lock()
            .get_mut(namespace)
            .map(StoredLog::prune_accepted)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopatch_engine::RecordState;
    use serde_json::json;

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = MemoryStore::new();
        let record = ActivityRecord::pending(1, "a", json!(1), 10);
        store.upsert("/one", &[record]).await.unwrap();

        assert_eq!(store.load("/one", StateFilter::Dirty).await.unwrap().len(), 1);
        assert!(store.load("/two", StateFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_remove_and_prune() {
        let mut accepted = ActivityRecord::pending(1, "a", json!(1), 10);
        accepted.state = RecordState::Accepted;
        let mut newer = ActivityRecord::pending(2, "a", json!(2), 20);
        newer.state = RecordState::Accepted;
        let pending = ActivityRecord::pending(3, "b", json!(3), 30);

        let store = MemoryStore::with_records("/f", &[accepted, newer, pending]);

        assert_eq!(store.prune_accepted("/f").await.unwrap(), 1);
        store.remove("/f", &[3]).await.unwrap();

        let left: Vec<_> = store.snapshot("/f").iter().map(|r| r.seq).collect();
        assert_eq!(left, vec![2]);
    }
}
