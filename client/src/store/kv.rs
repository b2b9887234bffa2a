//! Key-value store: one JSON document per namespace.
//!
//! Each namespace lives in `auto-patch-form.<action>.json` inside the
//! storage directory, with characters that are unsafe in file names
//! replaced by `_`. Documents are rewritten whole through a temporary file
//! and a rename.

use super::LocalStore;
use crate::error::Result;
use async_trait::async_trait;
use autopatch_engine::{ActivityRecord, Seq, StateFilter, StoredLog};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Prefix of every key-value store file.
pub const KEY_PREFIX: &str = "auto-patch-form.";

/// File-backed key-value store.
#[derive(Debug)]
pub struct KeyValueStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl KeyValueStore {
    /// Create a store rooted at a directory. The directory is created on
    /// first write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// File that holds a namespace.
    pub fn path_for(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{}{}.json", KEY_PREFIX, storage_key(namespace)))
    }

    async fn read(&self, namespace: &str) -> Result<StoredLog> {
        match tokio::fs::read_to_string(self.path_for(namespace)).await {
            Ok(json) => Ok(StoredLog::from_json(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredLog::new(namespace)),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, stored: &StoredLog) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&stored.namespace);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, stored.to_json()?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn modify<T>(&self, namespace: &str, f: impl FnOnce(&mut StoredLog) -> T) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self.read(namespace).await?;
        let out = f(&mut stored);
        self.write(&stored).await?;
        Ok(out)
    }
}

/// Map a namespace to a string safe for use in a file name.
pub fn storage_key(namespace: &str) -> String {
    namespace
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl LocalStore for KeyValueStore {
    async fn load(&self, namespace: &str, filter: StateFilter) -> Result<Vec<ActivityRecord>> {
        Ok(self.read(namespace).await?.query(filter))
    }

    async fn upsert(&self, namespace: &str, records: &[ActivityRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.modify(namespace, |stored| stored.upsert(records)).await
    }

    async fn remove(&self, namespace: &str, seqs: &[Seq]) -> Result<()> {
        if seqs.is_empty() {
            return Ok(());
        }
        self.modify(namespace, |stored| {
            stored.remove(seqs);
        })
        .await
    }

    async fn prune_accepted(&self, namespace: &str) -> Result<usize> {
        self.modify(namespace, StoredLog::prune_accepted).await
    }
}
