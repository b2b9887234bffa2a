//! Unified error handling for the client.

use crate::config::ConfigError;

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] autopatch_engine::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Remote rejected {method} with status {status}")]
    Status { method: &'static str, status: u16 },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Check if the error came from local persistence.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Migration(_) | Error::Io(_) | Error::Unavailable(_)
        )
    }

    /// Check if the error came from the network boundary.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Status { .. })
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
