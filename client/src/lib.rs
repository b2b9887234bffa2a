//! Auto-patching form client.
//!
//! Edits to bound fields are recorded in a local activity log, persisted to
//! a local store and sent to the form's action URL as coalesced PATCH
//! requests after a quiet period. On startup the controller rebuilds the
//! form from acknowledged local records, an optional remote fetch and the
//! edits that never reached the remote, in that order.
//!
//! Storage, network and the rendering side are injected:
//!
//! - [`LocalStore`](store::LocalStore): [`SqliteStore`](store::SqliteStore),
//!   [`KeyValueStore`](store::KeyValueStore) or
//!   [`MemoryStore`](store::MemoryStore)
//! - [`RemoteGateway`](gateway::RemoteGateway): [`HttpGateway`](gateway::HttpGateway)
//! - [`FieldBinding`](binding::FieldBinding)

pub mod binding;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod gateway;
pub mod store;

pub use binding::{FieldBinding, LogBinding, MemoryBinding};
pub use config::{Config, ConfigError};
pub use controller::{Startup, SyncController};
pub use error::{Error, Result};
pub use events::FormEvent;
pub use gateway::{GatewayResponse, HttpGateway, Method, RemoteGateway};
pub use store::{KeyValueStore, LocalStore, MemoryStore, SqliteStore};
