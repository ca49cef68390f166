//! Error types for the deploy engine.
//!
//! `ApiError` covers a single call to the remote deploy API. `DeployError`
//! names the phase of a deploy that failed: input validation, manifest build,
//! negotiation, readiness wait or upload.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Deploy creation failed: {0}")]
    Negotiate(#[source] ApiError),

    #[error("Preprocessing deploy {deploy_id} failed")]
    PreprocessingFailed { deploy_id: String },

    #[error("Preprocessing deploy {deploy_id} timed out after {}s", .timeout.as_secs())]
    PreprocessingTimeout { deploy_id: String, timeout: Duration },

    #[error("Upload of {path} failed: {source}")]
    Upload {
        path: String,
        #[source]
        source: ApiError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, DeployError>;

/// Result of a single remote API call.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
