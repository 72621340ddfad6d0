//! Error types for the client binary and context construction.

use aula_core::RemoteError;

use crate::config::ConfigError;
use crate::persistence::PersistenceError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Telemetry error: {0}")]
    Telemetry(String),
}
