//! The field model and startup layering.
//!
//! At startup the model is rebuilt from three layers, lowest to highest:
//!
//! 1. Locally stored records that were acknowledged or in flight
//! 2. The remote document, when a fetch was requested
//! 3. Locally stored records that were never sent
//!
//! Unsent local edits always win, so local intent is never silently
//! discarded by a remote snapshot.

use crate::{ActivityRecord, FieldPath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Root marker that may prefix a field path (`$.address.city`).
pub const ROOT_SEGMENT: &str = "$";

/// Current value of every known field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldModel {
    values: BTreeMap<FieldPath, Value>,
}

impl FieldModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value of a field.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.values.get(path)
    }

    /// Set the value of a field.
    pub fn set(&mut self, path: impl Into<FieldPath>, value: Value) {
        self.values.insert(path.into(), value);
    }

    /// Remove a field.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        self.values.remove(path)
    }

    /// Number of fields with a value.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no field has a value.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(path, value)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &Value)> {
        self.values.iter()
    }

    /// Overlay records onto the model, applying them in sequence order.
    pub fn apply_records<'a>(&mut self, records: impl IntoIterator<Item = &'a ActivityRecord>) {
        let mut records: Vec<_> = records.into_iter().collect();
        records.sort_by_key(|r| r.seq);
        for record in records {
            self.values.insert(record.path.clone(), record.value.clone());
        }
    }

    /// Overlay values from a remote document for the given paths.
    ///
    /// Paths the document does not contain are left untouched.
    pub fn merge_document<'a>(
        &mut self,
        document: &Value,
        paths: impl IntoIterator<Item = &'a str>,
    ) {
        for path in paths {
            if let Some(value) = resolve_path(document, path) {
                self.values.insert(path.to_string(), value.clone());
            }
        }
    }
}

/// Locate the value a dot-delimited path addresses inside a document.
///
/// A leading `$` segment is the document root. Numeric segments index
/// into arrays.
pub fn resolve_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.').peekable();
    if segments.peek() == Some(&ROOT_SEGMENT) {
        segments.next();
    }

    let mut node = document;
    for segment in segments {
        node = match node {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Build the startup model from its three layers.
///
/// `remote` is `None` when no fetch was requested or the fetch failed.
/// Only `paths` are taken from the remote document.
pub fn layer_startup_model<'a>(
    acknowledged: &[ActivityRecord],
    remote: Option<&Value>,
    paths: impl IntoIterator<Item = &'a str>,
    dirty: &[ActivityRecord],
) -> FieldModel {
    let mut model = FieldModel::new();
    model.apply_records(acknowledged);
    if let Some(document) = remote {
        model.merge_document(document, paths);
    }
    model.apply_records(dirty);
    model
}
