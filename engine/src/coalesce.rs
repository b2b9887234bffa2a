//! Coalescing pending edits into a single PATCH payload.
//!
//! The coalescer walks the log oldest to newest. A later pending edit to a
//! path supersedes any earlier one picked up in the same pass, so the body
//! carries exactly one entry per path: the most recent value.

use crate::{
    config::ContentType, error::Result, ActivityLog, ActivityRecord, Error, FieldPath,
    RecordState, Seq, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// JSON:API `type` used when no identity was learned from a GET.
pub const DEFAULT_RESOURCE_TYPE: &str = "merge";

/// JSON:API `id` used when no identity was learned from a GET.
pub const DEFAULT_RESOURCE_ID: &str = "self";

/// One entry of a PATCH body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchEntry {
    /// New value of the field
    pub value: Value,
    /// When the edit was made
    pub time: Timestamp,
}

/// PATCH body keyed by field path.
///
/// BTreeMap keeps the serialized order deterministic.
pub type PatchBody = BTreeMap<FieldPath, PatchEntry>;

/// A coalesced batch ready for submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchBatch {
    /// Net changes, one per path
    pub body: PatchBody,
    /// Records moved to SUBMITTED, as they were when the batch was built
    pub submitted: Vec<ActivityRecord>,
    /// Records moved to SUPERSEDED by a later edit in the same batch
    pub superseded: Vec<Seq>,
}

impl PatchBatch {
    /// Check if there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Sequence numbers of the submitted records.
    pub fn submitted_seqs(&self) -> Vec<Seq> {
        self.submitted.iter().map(|r| r.seq).collect()
    }

    /// The body as a JSON value.
    pub fn body_json(&self) -> Value {
        // A map of plain values always serializes
        serde_json::to_value(&self.body).unwrap_or(Value::Null)
    }
}

/// Build the PATCH payload from the pending records of a log.
///
/// Every record that makes it into the body is marked SUBMITTED; earlier
/// pending records for the same path are marked SUPERSEDED.
pub fn build_patch(log: &mut ActivityLog) -> PatchBatch {
    let mut body = PatchBody::new();
    // Path -> index into `submitted`
    let mut by_path: BTreeMap<FieldPath, usize> = BTreeMap::new();
    let mut submitted: Vec<Option<usize>> = Vec::new();
    let mut superseded = Vec::new();

    let records = log.records_mut();
    for index in 0..records.len() {
        if !records[index].is_pending() {
            continue;
        }

        if let Some(slot) = by_path.get(&records[index].path).copied() {
            if let Some(earlier) = submitted[slot].take() {
                records[earlier].state = RecordState::Superseded;
                superseded.push(records[earlier].seq);
            }
        }

        let record = &mut records[index];
        record.state = RecordState::Submitted;
        by_path.insert(record.path.clone(), submitted.len());
        submitted.push(Some(index));
        body.insert(
            record.path.clone(),
            PatchEntry {
                value: record.value.clone(),
                time: record.time,
            },
        );
    }

    let submitted = submitted
        .into_iter()
        .flatten()
        .map(|index| records[index].clone())
        .collect();

    PatchBatch {
        body,
        submitted,
        superseded,
    }
}

/// Resource identity used by the JSON:API envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentity {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
}

impl Default for ResourceIdentity {
    fn default() -> Self {
        Self {
            resource_type: DEFAULT_RESOURCE_TYPE.to_string(),
            id: DEFAULT_RESOURCE_ID.to_string(),
        }
    }
}

/// Wrap a PATCH body in the envelope required by the content type.
pub fn wrap_body(
    body: &PatchBody,
    content_type: ContentType,
    identity: Option<&ResourceIdentity>,
) -> Value {
    let attributes = serde_json::to_value(body).unwrap_or(Value::Null);
    match content_type {
        ContentType::Json => attributes,
        ContentType::JsonApi => {
            let fallback = ResourceIdentity::default();
            let identity = identity.unwrap_or(&fallback);
            json!({
                "data": {
                    "type": identity.resource_type,
                    "id": identity.id,
                    "attributes": attributes,
                }
            })
        }
    }
}

/// Extract the attributes of a GET response.
///
/// For JSON:API documents the resource identity is returned as well, so a
/// later PATCH can address the same resource.
pub fn unwrap_document(
    document: Value,
    content_type: ContentType,
) -> Result<(Value, Option<ResourceIdentity>)> {
    match content_type {
        ContentType::Json => Ok((document, None)),
        ContentType::JsonApi => {
            let Value::Object(mut root) = document else {
                return Err(Error::InvalidDocument("expected an object".into()));
            };
            let Some(Value::Object(mut data)) = root.remove("data") else {
                return Err(Error::InvalidDocument("missing 'data' object".into()));
            };
            let attributes = data
                .remove("attributes")
                .ok_or_else(|| Error::InvalidDocument("missing 'data.attributes'".into()))?;

            let identity = ResourceIdentity {
                resource_type: scalar_string(data.get("type"))
                    .unwrap_or_else(|| DEFAULT_RESOURCE_TYPE.to_string()),
                id: scalar_string(data.get("id")).unwrap_or_else(|| DEFAULT_RESOURCE_ID.to_string()),
            };

            Ok((attributes, Some(identity)))
        }
    }
}

fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
