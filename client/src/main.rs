//! Autopatch - command line form client.
//!
//! Reads edits from stdin, one per line:
//!
//! - `path=<json>` records an edit (`$.name="Ada"`, `$.age=36`)
//! - `:undo` reverts the last unsent edit
//! - `:flush` sends pending edits without waiting for the debounce
//! - `:<event>` runs a lifecycle event (`:focus`)
//!
//! On end of input pending edits are flushed and the process exits.

use autopatch_client::{store, Config, FormEvent, HttpGateway, LogBinding, SyncController};
use autopatch_engine::{FieldDef, FieldType};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autopatch_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting form client for {}", config.form.action);

    let store = store::open(&config).await?;
    let gateway = Arc::new(HttpGateway::new(&config.form)?);
    let (controller, mut events) = SyncController::new(
        config.form.clone(),
        store,
        gateway,
        Arc::new(LogBinding),
    );

    // Fields not declared up front are bound on first edit
    let declared = !config.fields.is_empty();
    for field in config.fields.iter().cloned() {
        controller.register_field(field);
    }

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match &event {
                FormEvent::Error { message } => tracing::error!(%message, "Form error"),
                FormEvent::Invalid { path, reason } => {
                    tracing::warn!(%path, %reason, "Invalid change")
                }
                other => tracing::info!(event = ?other, "Form event"),
            }
        }
    });

    let startup = controller.start().await;
    if let Some(e) = &startup.store_error {
        tracing::warn!("Local store unavailable: {}", e);
    }
    if let Some(e) = &startup.remote_error {
        tracing::warn!("Remote fetch failed: {}", e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            ":undo" => match controller.undo().await {
                Some(undo) => tracing::info!(path = %undo.path, "Undone"),
                None => tracing::info!("Nothing to undo"),
            },
            ":flush" => {
                let _ = controller.flush_now().await;
            }
            _ => match line.strip_prefix(':') {
                Some(event) => {
                    let _ = controller.lifecycle(event).await;
                }
                None => apply_edit(&controller, declared, line).await,
            },
        }
    }

    if controller.patch_pending() {
        tracing::info!("Flushing pending edits before exit");
        controller.flush_now().await?;
    }

    Ok(())
}

async fn apply_edit(controller: &SyncController, declared: bool, line: &str) {
    let Some((path, raw)) = line.split_once('=') else {
        tracing::warn!("Expected path=<json>, got {:?}", line);
        return;
    };
    let path = path.trim();
    let value = match serde_json::from_str(raw.trim()) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Invalid JSON for {}: {}", path, e);
            return;
        }
    };

    if !declared && !controller.is_registered(path) {
        controller.register_field(FieldDef::optional(path, FieldType::Json));
    }
    // Rejections are reported as events
    let _ = controller.on_change(path, value).await;
}
