//! The activity log: an ordered, bounded record of edits.
//!
//! Every edit is appended as a PENDING record. After each append the log is
//! compacted so it does not grow without bound:
//!
//! 1. Records that are no longer PENDING are evicted as the scan meets them.
//! 2. When a path has two PENDING records, the earlier one is folded into the
//!    later one (its value becomes `previous`) and removed.
//!
//! Compaction stops as soon as the log is back within `max_len`. If nothing
//! removable is left the log stays above the limit; the bound is a soft
//! ceiling on growth.

use crate::{
    coalesce::PatchBatch, error::Result, ActivityRecord, Error, FieldPath, RecordState, Seq,
    Timestamp,
};
use serde_json::Value;
use std::collections::HashMap;

/// What a compaction pass removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compaction {
    /// Non-pending records dropped from the log
    pub evicted: Vec<Seq>,
    /// Pending duplicates folded away, as `(removed, folded_into)`
    pub folded: Vec<(Seq, Seq)>,
}

impl Compaction {
    /// Check if the pass removed nothing.
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty() && self.folded.is_empty()
    }
}

/// Result of appending an edit.
#[derive(Debug, Clone, PartialEq)]
pub struct Appended {
    /// Sequence number of the new record
    pub seq: Seq,
    /// Compaction performed right after the append
    pub compaction: Compaction,
}

/// Result of rolling back a failed batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rollback {
    /// Records returned to PENDING
    pub pending: Vec<Seq>,
    /// Records overtaken by a later submission for the same path
    pub superseded: Vec<Seq>,
}

/// Result of undoing the most recent pending edit.
#[derive(Debug, Clone, PartialEq)]
pub struct Undo {
    /// The undone record
    pub seq: Seq,
    /// Field the edit belonged to
    pub path: FieldPath,
    /// Value the field should show now, if the log knows it
    pub restored: Option<Value>,
    /// Whether the record was rewritten in place (true) or removed (false)
    pub rewritten: bool,
}

/// Ordered, bounded sequence of activity records.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityLog {
    records: Vec<ActivityRecord>,
    max_len: usize,
    next_seq: Seq,
}

impl ActivityLog {
    /// Create an empty log holding at most `max_len` records (soft limit).
    pub fn new(max_len: usize) -> Self {
        Self {
            records: Vec::new(),
            max_len,
            next_seq: 1,
        }
    }

    /// Rebuild a log from stored records.
    ///
    /// Records are ordered by sequence number. New records continue after
    /// the highest of `seq_floor` and every restored seq.
    pub fn restore(
        max_len: usize,
        records: impl IntoIterator<Item = ActivityRecord>,
        seq_floor: Seq,
    ) -> Self {
        let mut records: Vec<_> = records.into_iter().collect();
        records.sort_by_key(|r| r.seq);
        records.dedup_by_key(|r| r.seq);

        let highest = records.last().map(|r| r.seq).unwrap_or(0).max(seq_floor);

        Self {
            records,
            max_len,
            next_seq: highest + 1,
        }
    }

    /// Configured soft maximum length.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Sequence number the next append will receive.
    pub fn next_seq(&self) -> Seq {
        self.next_seq
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[ActivityRecord] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut [ActivityRecord] {
        &mut self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records still waiting to be sent.
    pub fn pending_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_pending()).count()
    }

    /// Check if any record is waiting to be sent.
    pub fn has_pending(&self) -> bool {
        self.records.iter().any(|r| r.is_pending())
    }

    /// Get a record by sequence number.
    pub fn get(&self, seq: Seq) -> Option<&ActivityRecord> {
        self.position(seq).map(|i| &self.records[i])
    }

    fn position(&self, seq: Seq) -> Option<usize> {
        self.records.binary_search_by_key(&seq, |r| r.seq).ok()
    }

    /// Append an edit as a pending record, then compact.
    pub fn append(
        &mut self,
        path: impl Into<FieldPath>,
        value: Value,
        time: Timestamp,
    ) -> Appended {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.records
            .push(ActivityRecord::pending(seq, path, value, time));

        let compaction = self.compact();
        Appended { seq, compaction }
    }

    /// Shrink the log towards `max_len` in a single forward pass.
    pub fn compact(&mut self) -> Compaction {
        let mut compaction = Compaction::default();
        let max = self.max_len;
        let mut len = self.records.len();
        // Most recent index of a pending record, per path
        let mut last_of_path: HashMap<FieldPath, usize> = HashMap::new();
        let mut i = 0;

        while i < len && len > max {
            if !self.records[i].is_pending() {
                let evicted = self.records.remove(i);
                compaction.evicted.push(evicted.seq);
                len -= 1;
                continue;
            }

            if let Some(earlier) = last_of_path.get(&self.records[i].path).copied() {
                let folded = self.records.remove(earlier);
                len -= 1;
                i -= 1;
                for index in last_of_path.values_mut() {
                    if *index > earlier {
                        *index -= 1;
                    }
                }

                let current = &mut self.records[i];
                current.previous = Some(folded.value);
                compaction.folded.push((folded.seq, current.seq));
            }

            last_of_path.insert(self.records[i].path.clone(), i);
            i += 1;
        }

        compaction
    }

    /// Revert the most recent pending edit.
    ///
    /// A record carrying a folded `previous` value is rewritten in place to
    /// that value, since the earlier edit was never sent. Otherwise the
    /// record is removed and the restored value is the latest remaining
    /// value for the path, if the log has one.
    pub fn undo_last(&mut self) -> Option<Undo> {
        let index = self.records.iter().rposition(|r| r.is_pending())?;

        if let Some(previous) = self.records[index].previous.take() {
            let record = &mut self.records[index];
            record.value = previous.clone();
            return Some(Undo {
                seq: record.seq,
                path: record.path.clone(),
                restored: Some(previous),
                rewritten: true,
            });
        }

        let removed = self.records.remove(index);
        let restored = self
            .records
            .iter()
            .rev()
            .find(|r| r.path == removed.path && r.state != RecordState::Superseded)
            .map(|r| r.value.clone());

        Some(Undo {
            seq: removed.seq,
            path: removed.path,
            restored,
            rewritten: false,
        })
    }

    /// Mark every record of a submitted batch as accepted.
    ///
    /// Records compaction evicted while the batch was in flight are skipped.
    /// Returns the seqs that were transitioned.
    pub fn accept(&mut self, batch: &PatchBatch) -> Result<Vec<Seq>> {
        let mut accepted = Vec::with_capacity(batch.submitted.len());
        for submitted in &batch.submitted {
            if let Some(index) = self.position(submitted.seq) {
                self.records[index].transition(RecordState::Accepted)?;
                accepted.push(submitted.seq);
            }
        }
        Ok(accepted)
    }

    /// Return every record of a failed batch to pending.
    ///
    /// Records compaction evicted while the batch was in flight are put back
    /// in sequence order, so the whole batch is eligible for the next
    /// coalesce. A record whose path already has a later SUBMITTED or
    /// ACCEPTED record is superseded instead: its value is older than what
    /// the remote holds or is about to receive.
    pub fn rollback(&mut self, batch: &PatchBatch) -> Result<Rollback> {
        let mut rollback = Rollback::default();
        for submitted in &batch.submitted {
            if submitted.state != RecordState::Submitted {
                return Err(Error::InvalidTransition {
                    seq: submitted.seq,
                    from: submitted.state,
                    to: RecordState::Pending,
                });
            }

            let overtaken = self.records.iter().any(|r| {
                r.seq > submitted.seq
                    && r.path == submitted.path
                    && matches!(r.state, RecordState::Submitted | RecordState::Accepted)
            });

            match self.position(submitted.seq) {
                Some(index) => {
                    let record = &mut self.records[index];
                    record.transition(RecordState::Pending)?;
                    if overtaken {
                        record.transition(RecordState::Superseded)?;
                    }
                }
                None if overtaken => {}
                None => {
                    let mut record = submitted.clone();
                    record.state = RecordState::Pending;
                    let index = self.records.partition_point(|r| r.seq < record.seq);
                    self.records.insert(index, record);
                }
            }

            if overtaken {
                rollback.superseded.push(submitted.seq);
            } else {
                rollback.pending.push(submitted.seq);
            }
        }
        Ok(rollback)
    }
}
