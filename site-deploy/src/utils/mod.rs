//! Utility modules for the deploy engine.

pub mod errors;
pub mod logger;

pub use errors::{ApiError, ApiResult, DeployError, Result};
