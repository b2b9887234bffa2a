//! Lifecycle events emitted by a controller.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// Something observable that happened to a form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FormEvent {
    /// Startup finished and the merged model was applied to the fields
    Ready { fields: usize },
    /// A PATCH is about to be sent with this (enveloped) body
    Submit { body: Value },
    /// A PATCH finished
    Response { status: u16, accepted: usize },
    /// A request or persistence call failed
    Error { message: String },
    /// A change was rejected by field validation and not queued
    Invalid { path: String, reason: String },
}

pub type EventSender = mpsc::UnboundedSender<FormEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<FormEvent>;

/// Create the event channel for one controller.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_a_type_tag() {
        let event = FormEvent::Invalid {
            path: "$.age".into(),
            reason: "expected int".into(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "invalid", "path": "$.age", "reason": "expected int"})
        );
    }
}
