//! Adapter between the controller and whatever renders the fields.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;

/// Receives values the controller wants shown in bound fields.
pub trait FieldBinding: Send + Sync {
    /// Show `value` in the field at `path`.
    fn apply(&self, path: &str, value: &Value);
}

/// Binding that keeps the shown values in memory.
#[derive(Debug, Default)]
pub struct MemoryBinding {
    values: Mutex<BTreeMap<String, Value>>,
}

impl MemoryBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value currently shown for a path.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.values.lock().get(path).cloned()
    }

    /// Copy of every shown value.
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.values.lock().clone()
    }
}

impl FieldBinding for MemoryBinding {
    fn apply(&self, path: &str, value: &Value) {
        self.values.lock().insert(path.to_string(), value.clone());
    }
}

/// Binding that logs applied values, used by the command line client.
#[derive(Debug, Default)]
pub struct LogBinding;

impl FieldBinding for LogBinding {
    fn apply(&self, path: &str, value: &Value) {
        tracing::info!(path, %value, "Field updated");
    }
}
