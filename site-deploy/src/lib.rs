//! Site Deploy Library
//!
//! Content-addressed directory deploys: hash a site directory, ask the remote
//! which files it is missing, and upload exactly those with bounded
//! concurrency and retry.

pub mod api;
pub mod config;
pub mod executor;
pub mod fs;
pub mod utils;

// Re-export commonly used types
pub use api::{DeployApi, DeployRecord, DeployState, HttpDeployApi};
pub use config::Config;
pub use executor::manifest::{FileRecord, Manifest};
pub use executor::{DeployExecutor, DeployOptions};
pub use utils::errors::{ApiError, DeployError};
pub type Result<T> = std::result::Result<T, DeployError>;
