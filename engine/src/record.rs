//! Activity records: one entry per edit to a named field.

use crate::{error::Result, Error, FieldPath, Seq, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of an activity record.
///
/// The numeric codes are stable; storage backends index on them and the
/// ordering matters (`state >= Submitted` means "acknowledged or in flight").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    /// Recorded locally, not yet sent
    Pending = 0,
    /// Replaced by a later edit to the same path before it was sent
    Superseded = 1,
    /// Part of an in-flight PATCH
    Submitted = 2,
    /// Acknowledged by the remote endpoint
    Accepted = 3,
}

impl RecordState {
    /// Stable numeric code used by storage backends.
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Inverse of [`RecordState::code`].
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(RecordState::Pending),
            1 => Some(RecordState::Superseded),
            2 => Some(RecordState::Submitted),
            3 => Some(RecordState::Accepted),
            _ => None,
        }
    }

    /// Whether a record may move from `self` to `next`.
    ///
    /// Transitions are monotonic except the Submitted -> Pending rollback
    /// taken when a submission fails.
    pub fn can_transition_to(self, next: RecordState) -> bool {
        matches!(
            (self, next),
            (RecordState::Pending, RecordState::Superseded)
                | (RecordState::Pending, RecordState::Submitted)
                | (RecordState::Submitted, RecordState::Accepted)
                | (RecordState::Submitted, RecordState::Pending)
        )
    }

    /// Terminal states never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, RecordState::Superseded | RecordState::Accepted)
    }
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordState::Pending => write!(f, "pending"),
            RecordState::Superseded => write!(f, "superseded"),
            RecordState::Submitted => write!(f, "submitted"),
            RecordState::Accepted => write!(f, "accepted"),
        }
    }
}

/// Selects records by state when querying a local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StateFilter {
    /// Records not yet sent (`state == Pending`)
    Dirty,
    /// Records acknowledged or in flight (`state >= Submitted`)
    Acknowledged,
    /// Every record
    All,
}

impl StateFilter {
    /// Check whether a state passes this filter.
    pub fn matches(self, state: RecordState) -> bool {
        match self {
            StateFilter::Dirty => state == RecordState::Pending,
            StateFilter::Acknowledged => state >= RecordState::Submitted,
            StateFilter::All => true,
        }
    }
}

/// A single edit to a form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    /// Sequence number, unique within a namespace
    pub seq: Seq,
    /// When the edit happened (milliseconds since epoch)
    pub time: Timestamp,
    /// Dot-delimited field identifier
    pub path: FieldPath,
    /// The edited value
    pub value: Value,
    /// Current lifecycle state
    pub state: RecordState,
    /// Value of an earlier pending edit folded into this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Value>,
}

impl ActivityRecord {
    /// Create a new pending record.
    pub fn pending(seq: Seq, path: impl Into<FieldPath>, value: Value, time: Timestamp) -> Self {
        Self {
            seq,
            time,
            path: path.into(),
            value,
            state: RecordState::Pending,
            previous: None,
        }
    }

    /// Check if the record is still waiting to be sent.
    pub fn is_pending(&self) -> bool {
        self.state == RecordState::Pending
    }

    /// Move the record to a new state, enforcing the state machine.
    pub fn transition(&mut self, next: RecordState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                seq: self.seq,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_pending_record() {
        let record = ActivityRecord::pending(1, "$.name", json!("Alice"), 1000);

        assert_eq!(record.seq, 1);
        assert_eq!(record.path, "$.name");
        assert_eq!(record.value, json!("Alice"));
        assert_eq!(record.state, RecordState::Pending);
        assert!(record.previous.is_none());
        assert!(record.is_pending());
    }

    #[test]
    fn submit_then_accept() {
        let mut record = ActivityRecord::pending(1, "a", json!(1), 1000);
        record.transition(RecordState::Submitted).unwrap();
        record.transition(RecordState::Accepted).unwrap();

        assert_eq!(record.state, RecordState::Accepted);
        assert!(record.state.is_terminal());
    }

    #[test]
    fn rollback_is_the_only_backwards_step() {
        let mut record = ActivityRecord::pending(1, "a", json!(1), 1000);
        record.transition(RecordState::Submitted).unwrap();
        record.transition(RecordState::Pending).unwrap();
        assert!(record.is_pending());

        record.transition(RecordState::Submitted).unwrap();
        record.transition(RecordState::Accepted).unwrap();
        let err = record.transition(RecordState::Pending).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidTransition {
                seq: 1,
                from: RecordState::Accepted,
                to: RecordState::Pending,
            }
        );
    }

    #[test]
    fn pending_cannot_jump_to_accepted() {
        let mut record = ActivityRecord::pending(3, "a", json!(1), 1000);
        assert!(record.transition(RecordState::Accepted).is_err());
        assert!(record.is_pending());
    }

    #[test]
    fn state_codes_are_ordered() {
        for state in [
            RecordState::Pending,
            RecordState::Superseded,
            RecordState::Submitted,
            RecordState::Accepted,
        ] {
            assert_eq!(RecordState::from_code(state.code()), Some(state));
        }
        assert_eq!(RecordState::from_code(9), None);
        assert!(RecordState::Accepted > RecordState::Submitted);
        assert!(RecordState::Superseded < RecordState::Submitted);
    }

    #[test]
    fn state_filters() {
        assert!(StateFilter::Dirty.matches(RecordState::Pending));
        assert!(!StateFilter::Dirty.matches(RecordState::Submitted));
        assert!(StateFilter::Acknowledged.matches(RecordState::Submitted));
        assert!(StateFilter::Acknowledged.matches(RecordState::Accepted));
        assert!(!StateFilter::Acknowledged.matches(RecordState::Superseded));
        assert!(StateFilter::All.matches(RecordState::Superseded));
    }

    #[test]
    fn serialization_roundtrip() {
        let mut record = ActivityRecord::pending(4, "$.address.city", json!("Oslo"), 1000);
        record.previous = Some(json!("Bergen"));

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"state\":\"pending\""));
        let parsed: ActivityRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(record, parsed);
    }
}
