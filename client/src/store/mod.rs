//! Local persistence of activity records.
//!
//! Records are namespaced by the form's action URL. A store assumes it is
//! the only writer of a namespace: two controllers sharing one namespace
//! interleave their writes unpredictably.

mod kv;
mod memory;
mod sqlite;

pub use kv::*;
pub use memory::*;
pub use sqlite::*;

use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;
use autopatch_engine::{ActivityRecord, Seq, StateFilter};
use std::sync::Arc;

/// Durable storage for activity records.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Load the records of a namespace matching a filter, in seq order.
    async fn load(&self, namespace: &str, filter: StateFilter) -> Result<Vec<ActivityRecord>>;

    /// Insert or replace records by seq.
    async fn upsert(&self, namespace: &str, records: &[ActivityRecord]) -> Result<()>;

    /// Remove records by seq.
    async fn remove(&self, namespace: &str, seqs: &[Seq]) -> Result<()>;

    /// Drop accepted records shadowed by a later accepted record for the
    /// same path. Returns how many were dropped.
    async fn prune_accepted(&self, namespace: &str) -> Result<usize>;
}

/// Open the backend selected by the configuration.
///
/// `use_local_storage` picks the key-value file store, otherwise the
/// SQLite database is used.
pub async fn open(config: &Config) -> Result<Arc<dyn LocalStore>> {
    if config.form.use_local_storage {
        tracing::info!(dir = %config.storage_dir.display(), "Using key-value store");
        Ok(Arc::new(KeyValueStore::new(&config.storage_dir)))
    } else {
        tracing::info!(url = %config.database_url, "Using SQLite store");
        let store = SqliteStore::connect(&config.database_url).await?;
        Ok(Arc::new(store))
    }
}
