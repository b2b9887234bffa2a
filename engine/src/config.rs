//! Form configuration.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default quiet period before pending edits are sent, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 5000;

/// Default soft limit on the activity log length.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Lifecycle event fired once initial data has been loaded.
pub const READY_EVENT: &str = "ready";

/// Media type used for requests and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContentType {
    /// `application/json`
    #[default]
    #[serde(rename = "application/json")]
    Json,
    /// `application/vnd.api+json`, with the `{data: {type, id, attributes}}` envelope
    #[serde(rename = "application/vnd.api+json")]
    JsonApi,
}

impl ContentType {
    /// The media type string sent in `accept` and `content-type` headers.
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::JsonApi => "application/vnd.api+json",
        }
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "application/json" => Ok(ContentType::Json),
            "application/vnd.api+json" => Ok(ContentType::JsonApi),
            other => Err(Error::UnsupportedContentType(other.to_string())),
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of one auto-patching form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormConfig {
    /// Remote endpoint; also namespaces the local store
    pub action: String,
    /// Lifecycle events that trigger a GET of the action URL
    #[serde(default)]
    pub get_when: Vec<String>,
    /// Media type for requests
    #[serde(default)]
    pub content_type: ContentType,
    /// Send credentials with requests
    #[serde(default)]
    pub with_credentials: bool,
    /// Quiet period before pending edits are sent
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Soft limit on the activity log length
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Use the key-value backend instead of the structured database
    #[serde(default)]
    pub use_local_storage: bool,
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

impl FormConfig {
    /// Create a configuration for an action URL with default settings.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            get_when: Vec::new(),
            content_type: ContentType::Json,
            with_credentials: false,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_history: DEFAULT_MAX_HISTORY,
            use_local_storage: false,
        }
    }

    /// Set the fetch events from a comma-delimited list such as `"ready,focus"`.
    pub fn with_get_when(mut self, events: &str) -> Self {
        self.get_when = parse_event_list(events);
        self
    }

    /// Set the media type.
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Set whether credentials are sent.
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    /// Set the debounce interval in milliseconds.
    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// Set the activity log soft limit.
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Select the key-value storage backend.
    pub fn with_local_storage(mut self, use_local_storage: bool) -> Self {
        self.use_local_storage = use_local_storage;
        self
    }

    /// Check if a lifecycle event should trigger a remote fetch.
    pub fn fetches_on(&self, event: &str) -> bool {
        self.get_when.iter().any(|e| e == event)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.action.trim().is_empty() {
            return Err(Error::InvalidConfig("action must not be empty".into()));
        }
        if self.max_history == 0 {
            return Err(Error::InvalidConfig(
                "max_history must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Split a comma-delimited event list, trimming blanks.
pub fn parse_event_list(events: &str) -> Vec<String> {
    events
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(String::from)
        .collect()
}
