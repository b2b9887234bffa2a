//! # Auto-Patch Engine
//!
//! The change-coalescing and reconciliation core of an auto-patching form.
//!
//! Edits to form fields are recorded in an ordered, bounded activity log.
//! After a quiet period the pending edits are coalesced into a single PATCH
//! payload carrying one net change per field. At startup the field values are
//! rebuilt by layering locally stored records over an optional remote
//! snapshot.
//!
//! ## Design Principles
//!
//! - **No IO**: storage, network and timers live in the client crate
//! - **Deterministic**: same inputs always produce the same log and payload
//! - **Testable**: pure logic, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Activity records
//!
//! Each edit is an [`ActivityRecord`] with a small state machine
//! ([`RecordState`]):
//! `Pending -> Submitted -> Accepted`, `Pending -> Superseded`, and the
//! `Submitted -> Pending` rollback taken when a submission fails.
//!
//! ### Activity log
//!
//! The [`ActivityLog`] appends records and compacts itself after every
//! append: resolved records are evicted and redundant pending edits to the
//! same field are folded together.
//!
//! ### Coalescing
//!
//! [`build_patch`] turns the pending records into a [`PatchBatch`], marking
//! them submitted. [`wrap_body`] adds the JSON:API envelope when configured.
//!
//! ### Startup layering
//!
//! [`layer_startup_model`] builds the [`FieldModel`]: acknowledged local
//! records, then remote values, then unsent local edits on top.
//!
//! ## Quick Start
//!
//! ```rust
//! use autopatch_engine::{build_patch, ActivityLog, RecordState};
//! use serde_json::json;
//!
//! let mut log = ActivityLog::new(50);
//! log.append("$.name", json!("Ad"), 1706745600000);
//! log.append("$.name", json!("Ada"), 1706745601000);
//! log.append("$.age", json!(36), 1706745602000);
//!
//! let batch = build_patch(&mut log);
//! assert_eq!(batch.body.len(), 2);
//! assert_eq!(batch.body["$.name"].value, json!("Ada"));
//! assert_eq!(log.records()[0].state, RecordState::Superseded);
//!
//! // The remote endpoint acknowledged the PATCH
//! log.accept(&batch).unwrap();
//! assert!(!log.has_pending());
//! ```

pub mod coalesce;
pub mod config;
pub mod error;
pub mod fields;
pub mod log;
pub mod model;
pub mod record;
pub mod snapshot;

// Re-export main types at crate root
pub use coalesce::{
    build_patch, unwrap_document, wrap_body, PatchBatch, PatchBody, PatchEntry, ResourceIdentity,
};
pub use config::{ContentType, FormConfig, DEFAULT_DEBOUNCE_MS, DEFAULT_MAX_HISTORY, READY_EVENT};
pub use error::Error;
pub use fields::{Constraint, FieldDef, FieldSet, FieldType};
pub use log::{ActivityLog, Appended, Compaction, Rollback, Undo};
pub use model::{layer_startup_model, resolve_path, FieldModel};
pub use record::{ActivityRecord, RecordState, StateFilter};
pub use snapshot::{StoredLog, STORED_LOG_FORMAT_VERSION};

/// Type aliases for clarity
pub type FieldPath = String;
pub type Seq = u64;
pub type Timestamp = u64;
