//! Error type definitions for the reconciliation engine.
//!
//! Mirrors the layered shape of the source project's error handling: a small
//! domain error per trait seam (`GeneratorError`), aggregated into a
//! top-level `Error` that `main` and the HTTP handlers deal in.

use thiserror::Error;

/// Errors a `ServiceGenerator`, `Annotator`, or `ConfigGenerator` can return.
///
/// The trait-seam error type shared by every collaborator: source and
/// annotator errors abort the current reconciliation pass, sink errors are
/// logged per-sink without stopping the remaining sinks.
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// Transient failure talking to an upstream source (HTTP, filesystem, store RPC).
    #[error("source unavailable: {0}")]
    Source(String),

    /// Malformed external data (JSON payload, service file, orchestrator event).
    #[error("parse error: {0}")]
    Parse(String),

    /// Local I/O failure (reading/writing the config file, watching a directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Coordination-store or routing-store RPC failure.
    #[error("store error: {0}")]
    Store(String),

    /// Sink reload failure: the artifact was written but the live process
    /// did not reload.
    #[error("reload failed: {0}")]
    Reload(String),
}

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("generator error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
pub type GeneratorResult<T> = std::result::Result<T, GeneratorError>;
