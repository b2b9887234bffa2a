//! The persisted form of a namespace's activity records.
//!
//! Storage backends without their own indexing (an in-memory map, a
//! key-value file) keep one [`StoredLog`] per namespace and use its query
//! helpers. It serializes deterministically with a format version.

use crate::{error::Result, ActivityRecord, Error, RecordState, Seq, StateFilter};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Version of the stored log format for future compatibility.
pub const STORED_LOG_FORMAT_VERSION: u32 = 1;

/// All stored activity records of one namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredLog {
    /// Format version
    pub format_version: u32,
    /// Namespace (the form's action URL)
    pub namespace: String,
    /// Records by sequence number
    pub records: BTreeMap<Seq, ActivityRecord>,
}

impl StoredLog {
    /// Create an empty stored log.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            format_version: STORED_LOG_FORMAT_VERSION,
            namespace: namespace.into(),
            records: BTreeMap::new(),
        }
    }

    /// Records matching a filter, in sequence order.
    pub fn query(&self, filter: StateFilter) -> Vec<ActivityRecord> {
        self.records
            .values()
            .filter(|r| filter.matches(r.state))
            .cloned()
            .collect()
    }

    /// Insert or replace records by sequence number.
    pub fn upsert<'a>(&mut self, records: impl IntoIterator<Item = &'a ActivityRecord>) {
        for record in records {
            self.records.insert(record.seq, record.clone());
        }
    }

    /// Remove records by sequence number.
    pub fn remove(&mut self, seqs: &[Seq]) -> usize {
        seqs.iter()
            .filter(|seq| self.records.remove(*seq).is_some())
            .count()
    }

    /// Drop accepted records shadowed by a later accepted record for the
    /// same path. Returns how many were dropped.
    pub fn prune_accepted(&mut self) -> usize {
        let mut latest: HashMap<&str, Seq> = HashMap::new();
        for record in self.records.values() {
            if record.state == RecordState::Accepted {
                latest.insert(&record.path, record.seq);
            }
        }

        let shadowed: Vec<Seq> = self
            .records
            .values()
            .filter(|r| {
                r.state == RecordState::Accepted && latest.get(r.path.as_str()) != Some(&r.seq)
            })
            .map(|r| r.seq)
            .collect();

        self.remove(&shadowed)
    }

    /// Highest stored sequence number.
    pub fn max_seq(&self) -> Option<Seq> {
        self.records.keys().next_back().copied()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let stored: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if stored.format_version > STORED_LOG_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported stored log format version: {} (max supported: {})",
                stored.format_version, STORED_LOG_FORMAT_VERSION
            )));
        }

        if let Some(record) = stored.records.iter().find(|(seq, r)| **seq != r.seq) {
            return Err(Error::InvalidSnapshot(format!(
                "record stored under seq {} claims seq {}",
                record.0, record.1.seq
            )));
        }

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(seq: Seq, path: &str, state: RecordState) -> ActivityRecord {
        let mut record = ActivityRecord::pending(seq, path, json!(seq), seq * 100);
        record.state = state;
        record
    }

    fn sample() -> StoredLog {
        let mut stored = StoredLog::new("https://api.example.com/profile");
        stored.upsert(&[
            record(1, "a", RecordState::Accepted),
            record(2, "a", RecordState::Accepted),
            record(3, "b", RecordState::Submitted),
            record(4, "b", RecordState::Pending),
            record(5, "c", RecordState::Superseded),
        ]);
        stored
    }

    #[test]
    fn query_by_state() {
        let stored = sample();

        let dirty: Vec<_> = stored.query(StateFilter::Dirty).iter().map(|r| r.seq).collect();
        assert_eq!(dirty, vec![4]);

        let acknowledged: Vec<_> = stored
            .query(StateFilter::Acknowledged)
            .iter()
            .map(|r| r.seq)
            .collect();
        assert_eq!(acknowledged, vec![1, 2, 3]);

        assert_eq!(stored.query(StateFilter::All).len(), 5);
    }

    #[test]
    fn upsert_replaces_by_seq() {
        let mut stored = sample();
        stored.upsert(&[record(4, "b", RecordState::Submitted)]);

        assert_eq!(stored.len(), 5);
        assert_eq!(stored.records[&4].state, RecordState::Submitted);
    }

    #[test]
    fn remove_counts_existing_only() {
        let mut stored = sample();
        assert_eq!(stored.remove(&[4, 5, 99]), 2);
        assert_eq!(stored.max_seq(), Some(3));
    }

    #[test]
    fn prune_keeps_latest_accepted_per_path() {
        let mut stored = sample();
        assert_eq!(stored.prune_accepted(), 1);
        assert!(!stored.records.contains_key(&1));
        assert!(stored.records.contains_key(&2));
        assert_eq!(stored.prune_accepted(), 0);
    }

    #[test]
    fn json_roundtrip() {
        let stored = sample();
        let json = stored.to_json().unwrap();
        assert_eq!(StoredLog::from_json(&json).unwrap(), stored);
    }

    #[test]
    fn rejects_future_format() {
        let mut stored = StoredLog::new("x");
        stored.format_version = STORED_LOG_FORMAT_VERSION + 1;
        let json = stored.to_json().unwrap();

        assert!(matches!(
            StoredLog::from_json(&json),
            Err(Error::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn rejects_mismatched_keys() {
        let json = r#"{
            "formatVersion": 1,
            "namespace": "x",
            "records": {"1": {"seq": 2, "time": 0, "path": "a", "value": 1, "state": "pending"}}
        }"#;
        assert!(StoredLog::from_json(json).is_err());
    }
}
