//! The sync controller: one per bound form.
//!
//! The controller owns the activity log and drives it through its life:
//!
//! - `start` reconciles local and remote state in a fixed order and shows
//!   the result in the bound fields.
//! - `on_change` appends each edit synchronously, then (re)arms a
//!   trailing-edge debounce timer and persists the record.
//! - When the timer fires, pending records are coalesced into one PATCH and
//!   resolved to ACCEPTED or rolled back to PENDING by the outcome.
//!
//! All log mutation happens under one short-held lock that is never held
//! across an await, so an edit made while a PATCH is in flight is simply
//! appended and picked up by the next cycle. At most one PATCH is in flight:
//! a flush requested meanwhile is deferred until the outstanding request
//! resolves, then rescheduled after a fresh quiet period.
//!
//! Store writes happen after the lock is released and are not ordered
//! across concurrent calls: two overlapping `on_change` or `flush_now`
//! calls may finish their writes in either order. The in-memory log is
//! authoritative for the session; the store relies on a single writer per
//! namespace.

use crate::binding::FieldBinding;
use crate::error::{Error, Result};
use crate::events::{self, EventReceiver, EventSender, FormEvent};
use crate::gateway::{Method, RemoteGateway};
use crate::store::LocalStore;
use autopatch_engine::{
    build_patch, layer_startup_model, unwrap_document, wrap_body, ActivityLog, ActivityRecord,
    FieldDef, FieldModel, FieldSet, FormConfig, PatchBatch, RecordState, ResourceIdentity, Seq,
    StateFilter, Timestamp, Undo, READY_EVENT,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Outcome of `start`.
///
/// Startup never fails: a broken store or an unreachable remote only
/// removes its layer from the model.
#[derive(Debug)]
pub struct Startup {
    /// The merged model applied to the bound fields
    pub model: FieldModel,
    /// Why the local layers are missing, if they are
    pub store_error: Option<Error>,
    /// Why the remote layer is missing, if a fetch was attempted and failed
    pub remote_error: Option<Error>,
}

/// Controller for one auto-patching form.
///
/// Cloning is cheap; clones share the same form.
#[derive(Clone)]
pub struct SyncController {
    inner: Arc<Inner>,
}

struct Inner {
    config: FormConfig,
    store: Arc<dyn LocalStore>,
    gateway: Arc<dyn RemoteGateway>,
    binding: Arc<dyn FieldBinding>,
    events: EventSender,
    state: Mutex<State>,
}

struct State {
    log: ActivityLog,
    fields: FieldSet,
    /// Values the remote is known to hold
    baseline: FieldModel,
    /// Resource identity learned from the last JSON:API GET
    identity: Option<ResourceIdentity>,
    patch_pending: bool,
    /// A PATCH has been sent and not yet resolved
    in_flight: bool,
    /// A flush was requested while a PATCH was in flight
    flush_deferred: bool,
    timer: Option<Timer>,
    generation: u64,
}

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

impl SyncController {
    /// Create a controller. Events are delivered on the returned receiver.
    pub fn new(
        config: FormConfig,
        store: Arc<dyn LocalStore>,
        gateway: Arc<dyn RemoteGateway>,
        binding: Arc<dyn FieldBinding>,
    ) -> (Self, EventReceiver) {
        let (events, receiver) = events::channel();
        let state = State {
            log: ActivityLog::new(config.max_history),
            fields: FieldSet::new(),
            baseline: FieldModel::new(),
            identity: None,
            patch_pending: false,
            in_flight: false,
            flush_deferred: false,
            timer: None,
            generation: 0,
        };

        let controller = Self {
            inner: Arc::new(Inner {
                config,
                store,
                gateway,
                binding,
                events,
                state: Mutex::new(state),
            }),
        };
        (controller, receiver)
    }

    /// Form settings.
    pub fn config(&self) -> &FormConfig {
        &self.inner.config
    }

    /// Store namespace of this form: its action URL.
    pub fn namespace(&self) -> &str {
        &self.inner.config.action
    }

    /// Bind a field. Only bound fields accept changes and receive values.
    pub fn register_field(&self, field: FieldDef) -> Option<FieldDef> {
        tracing::debug!(path = %field.path, "Registering field");
        self.inner.state.lock().fields.register(field)
    }

    /// Unbind a field.
    pub fn unregister_field(&self, path: &str) -> Option<FieldDef> {
        self.inner.state.lock().fields.unregister(path)
    }

    /// Check if a field is bound.
    pub fn is_registered(&self, path: &str) -> bool {
        self.inner.state.lock().fields.contains(path)
    }

    /// Whether unsent or unacknowledged edits exist.
    pub fn patch_pending(&self) -> bool {
        self.inner.state.lock().patch_pending
    }

    /// Copy of the activity log, oldest first.
    pub fn records(&self) -> Vec<ActivityRecord> {
        self.inner.state.lock().log.records().to_vec()
    }

    /// The current model: known remote values overlaid with every edit the
    /// remote has not acknowledged yet.
    pub fn model(&self) -> FieldModel {
        let state = self.inner.state.lock();
        current_model(&state)
    }

    /// Validate every bound field against the current model.
    ///
    /// The form is valid exactly when the list is empty.
    pub fn validate(&self) -> Vec<autopatch_engine::Error> {
        let state = self.inner.state.lock();
        state.fields.validate_all(&current_model(&state))
    }

    /// Reconcile local and remote state and show it in the bound fields.
    ///
    /// Layers, lowest first: acknowledged local records, the remote
    /// document (only when `ready` is in `get_when`), dirty local records.
    /// Call once, before any `on_change`.
    pub async fn start(&self) -> Startup {
        let namespace = self.namespace();
        let store = &self.inner.store;
        let mut store_error = None;

        let acknowledged = match store.load(namespace, StateFilter::Acknowledged).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(namespace, error = %e, "Failed to load acknowledged records");
                store_error = Some(e);
                Vec::new()
            }
        };

        let mut remote_error = None;
        let remote = if self.inner.config.fetches_on(READY_EVENT) {
            match self.fetch().await {
                Ok(document) => Some(document),
                Err(e) => {
                    tracing::warn!(namespace, error = %e, "Startup fetch failed, using local data");
                    remote_error = Some(e);
                    None
                }
            }
        } else {
            None
        };

        let mut dirty = match store.load(namespace, StateFilter::Dirty).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(namespace, error = %e, "Failed to load dirty records");
                if store_error.is_none() {
                    store_error = Some(e);
                }
                Vec::new()
            }
        };

        // Submissions interrupted by the end of the previous session never
        // got an answer; they go out again.
        let interrupted: Vec<ActivityRecord> = acknowledged
            .iter()
            .filter(|r| r.state == RecordState::Submitted)
            .cloned()
            .map(|mut r| {
                r.state = RecordState::Pending;
                r
            })
            .collect();
        dirty.extend(interrupted.iter().cloned());
        dirty.sort_by_key(|r| r.seq);

        let seq_floor = acknowledged
            .iter()
            .chain(&dirty)
            .map(|r| r.seq)
            .max()
            .unwrap_or(0);

        let (model, shown) = {
            let mut state = self.inner.state.lock();
            let paths: Vec<String> = state.fields.paths().map(str::to_string).collect();

            state.baseline = layer_startup_model(
                &acknowledged,
                remote.as_ref(),
                paths.iter().map(String::as_str),
                &[],
            );
            let mut model = state.baseline.clone();
            model.apply_records(&dirty);

            state.log = ActivityLog::restore(self.inner.config.max_history, dirty, seq_floor);
            state.patch_pending = state.log.has_pending();
            if state.patch_pending {
                self.schedule_flush(&mut state);
            }

            let shown = shown_values(&model, &paths);
            (model, shown)
        };

        for (path, value) in &shown {
            self.inner.binding.apply(path, value);
        }

        if !interrupted.is_empty() {
            tracing::info!(
                namespace,
                count = interrupted.len(),
                "Re-queued interrupted submissions"
            );
            self.persist(&interrupted, &[]).await;
        }

        tracing::info!(namespace, fields = shown.len(), "Form ready");
        self.emit(FormEvent::Ready {
            fields: shown.len(),
        });

        Startup {
            model,
            store_error,
            remote_error,
        }
    }

    /// Handle a lifecycle event.
    ///
    /// When the event is listed in `get_when` the remote document is fetched
    /// and shown, with edits the remote has not acknowledged kept on top.
    /// Returns whether a fetch happened. `ready` is handled by `start`.
    pub async fn lifecycle(&self, event: &str) -> Result<bool> {
        if event == READY_EVENT || !self.inner.config.fetches_on(event) {
            return Ok(false);
        }

        let document = match self.fetch().await {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(event, error = %e, "Refresh failed");
                self.emit(FormEvent::Error {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let shown = {
            let mut state = self.inner.state.lock();
            let paths: Vec<String> = state.fields.paths().map(str::to_string).collect();
            state
                .baseline
                .merge_document(&document, paths.iter().map(String::as_str));
            shown_values(&current_model(&state), &paths)
        };

        for (path, value) in &shown {
            self.inner.binding.apply(path, value);
        }

        tracing::debug!(event, fields = shown.len(), "Refreshed from remote");
        Ok(true)
    }

    /// Record an edit to a bound field.
    ///
    /// The edit is validated and appended before anything else happens; an
    /// invalid edit emits `Invalid` and is not queued. Persistence failures
    /// are reported as `Error` events without failing the edit.
    pub async fn on_change(&self, path: &str, value: Value) -> Result<Seq> {
        let (seq, upserts, removed) = {
            let mut state = self.inner.state.lock();
            if let Err(e) = state.fields.validate(path, &value) {
                drop(state);
                tracing::debug!(path, error = %e, "Rejected change");
                self.emit(FormEvent::Invalid {
                    path: path.to_string(),
                    reason: e.to_string(),
                });
                return Err(e.into());
            }

            let appended = state.log.append(path, value, now());
            state.patch_pending = true;
            self.schedule_flush(&mut state);

            // The new record, plus every record a fold rewrote
            let mut touched = vec![appended.seq];
            touched.extend(appended.compaction.folded.iter().map(|(_, into)| *into));
            touched.sort_unstable();
            touched.dedup();
            let upserts: Vec<ActivityRecord> = touched
                .iter()
                .filter_map(|seq| state.log.get(*seq).cloned())
                .collect();
            let removed: Vec<Seq> = appended
                .compaction
                .folded
                .iter()
                .map(|(removed, _)| *removed)
                .collect();

            (appended.seq, upserts, removed)
        };

        tracing::debug!(path, seq, "Queued change");
        self.persist(&upserts, &removed).await;
        Ok(seq)
    }

    /// Revert the most recent unsent edit and show the restored value.
    ///
    /// Returns `None` when nothing is pending.
    pub async fn undo(&self) -> Option<Undo> {
        let (undo, shown, upserts) = {
            let mut state = self.inner.state.lock();
            let undo = state.log.undo_last()?;
            state.patch_pending = state.log.has_pending();

            let shown = undo
                .restored
                .clone()
                .or_else(|| state.baseline.get(&undo.path).cloned());
            let upserts: Vec<ActivityRecord> = if undo.rewritten {
                state.log.get(undo.seq).cloned().into_iter().collect()
            } else {
                Vec::new()
            };
            (undo, shown, upserts)
        };

        if let Some(value) = &shown {
            self.inner.binding.apply(&undo.path, value);
        }

        let removed: Vec<Seq> = if undo.rewritten {
            Vec::new()
        } else {
            vec![undo.seq]
        };
        tracing::debug!(path = %undo.path, seq = undo.seq, "Undid change");
        self.persist(&upserts, &removed).await;
        Some(undo)
    }

    /// Coalesce and send every pending edit now.
    ///
    /// Returns the number of entries sent; nothing is sent when no edit is
    /// pending. While another PATCH is in flight nothing is sent either: the
    /// flush is deferred and rescheduled once that request resolves. A
    /// failed PATCH rolls its records back to PENDING and is not retried
    /// until the next edit or the next call.
    pub async fn flush_now(&self) -> Result<usize> {
        let (batch, body) = {
            let mut state = self.inner.state.lock();
            if state.in_flight {
                state.flush_deferred = true;
                tracing::debug!(namespace = self.namespace(), "Patch in flight, deferring flush");
                return Ok(0);
            }
            let batch = build_patch(&mut state.log);
            if batch.is_empty() {
                return Ok(0);
            }
            state.in_flight = true;
            let body = wrap_body(
                &batch.body,
                self.inner.config.content_type,
                state.identity.as_ref(),
            );
            (batch, body)
        };

        let entries = batch.body.len();
        self.persist(&batch.submitted, &batch.superseded).await;

        tracing::info!(namespace = self.namespace(), entries, "Submitting patch");
        self.emit(FormEvent::Submit { body: body.clone() });

        match self.inner.gateway.send(Method::Patch, Some(&body)).await {
            Ok(response) => {
                self.resolve_accepted(&batch).await?;
                tracing::info!(status = response.status, entries, "Patch accepted");
                self.emit(FormEvent::Response {
                    status: response.status,
                    accepted: batch.submitted.len(),
                });
                Ok(entries)
            }
            Err(e) => {
                self.resolve_failed(&batch).await?;
                tracing::warn!(error = %e, entries, "Patch failed, records back to pending");
                self.emit(FormEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn resolve_accepted(&self, batch: &PatchBatch) -> Result<()> {
        let accepted = {
            let mut state = self.inner.state.lock();
            state.in_flight = false;
            let accepted = state.log.accept(batch);
            if accepted.is_ok() {
                for (path, entry) in &batch.body {
                    state.baseline.set(path.clone(), entry.value.clone());
                }
            }
            state.patch_pending = state.log.has_pending();
            self.resume_deferred(&mut state);
            accepted
        };
        accepted?;

        // Records evicted while in flight are still stored as SUBMITTED
        let accepted = with_state(&batch.submitted, RecordState::Accepted);
        self.persist(&accepted, &[]).await;
        if let Err(e) = self.inner.store.prune_accepted(self.namespace()).await {
            tracing::warn!(error = %e, "Failed to prune accepted history");
        }
        Ok(())
    }

    async fn resolve_failed(&self, batch: &PatchBatch) -> Result<()> {
        let rollback = {
            let mut state = self.inner.state.lock();
            state.in_flight = false;
            let rollback = state.log.rollback(batch);
            state.patch_pending = state.log.has_pending();
            self.resume_deferred(&mut state);
            rollback
        }?;

        let pending: Vec<ActivityRecord> = batch
            .submitted
            .iter()
            .filter(|r| rollback.pending.contains(&r.seq))
            .cloned()
            .collect();
        let pending = with_state(&pending, RecordState::Pending);
        self.persist(&pending, &rollback.superseded).await;
        Ok(())
    }

    /// Rearm the timer for a flush that was deferred by an in-flight PATCH.
    fn resume_deferred(&self, state: &mut State) {
        if std::mem::take(&mut state.flush_deferred)
            && state.log.has_pending()
            && state.timer.is_none()
        {
            tracing::debug!(namespace = self.namespace(), "Rescheduling deferred flush");
            self.schedule_flush(state);
        }
    }

    async fn fetch(&self) -> Result<Value> {
        let response = self.inner.gateway.send(Method::Get, None).await?;
        let (document, identity) =
            unwrap_document(response.body, self.inner.config.content_type)?;
        if identity.is_some() {
            self.inner.state.lock().identity = identity;
        }
        Ok(document)
    }

    /// Cancel the running debounce timer and arm a new one.
    fn schedule_flush(&self, state: &mut State) {
        if let Some(timer) = state.timer.take() {
            timer.handle.abort();
        }
        state.generation += 1;
        let generation = state.generation;
        let delay = Duration::from_millis(self.inner.config.debounce_ms);
        let weak = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(controller) = upgrade(&weak) else {
                return;
            };
            if !controller.detach_timer(generation) {
                return;
            }
            // Errors are already logged and emitted
            let _ = controller.flush_now().await;
        });

        state.timer = Some(Timer { generation, handle });
    }

    /// Take the timer out of the controller so later edits arm a new one
    /// instead of aborting the flush about to start.
    fn detach_timer(&self, generation: u64) -> bool {
        let mut state = self.inner.state.lock();
        match &state.timer {
            Some(timer) if timer.generation == generation => {
                state.timer = None;
                true
            }
            _ => false,
        }
    }

    async fn persist(&self, upserts: &[ActivityRecord], removed: &[Seq]) {
        let namespace = self.namespace();
        let mut result = self.inner.store.upsert(namespace, upserts).await;
        if result.is_ok() {
            result = self.inner.store.remove(namespace, removed).await;
        }

        if let Err(e) = result {
            tracing::warn!(namespace, error = %e, "Failed to persist activity records");
            self.emit(FormEvent::Error {
                message: e.to_string(),
            });
        }
    }

    fn emit(&self, event: FormEvent) {
        // Nobody listening is fine
        let _ = self.inner.events.send(event);
    }
}

fn upgrade(weak: &Weak<Inner>) -> Option<SyncController> {
    weak.upgrade().map(|inner| SyncController { inner })
}

fn current_model(state: &State) -> FieldModel {
    let mut model = state.baseline.clone();
    model.apply_records(
        state
            .log
            .records()
            .iter()
            .filter(|r| matches!(r.state, RecordState::Pending | RecordState::Submitted)),
    );
    model
}

fn shown_values(model: &FieldModel, paths: &[String]) -> Vec<(String, Value)> {
    paths
        .iter()
        .filter_map(|path| model.get(path).map(|v| (path.clone(), v.clone())))
        .collect()
}

fn with_state(records: &[ActivityRecord], state: RecordState) -> Vec<ActivityRecord> {
    records
        .iter()
        .cloned()
        .map(|mut r| {
            r.state = state;
            r
        })
        .collect()
}

fn now() -> Timestamp {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
