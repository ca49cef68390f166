//! Remote deploy API.
//!
//! The deploy engine only talks to the hosting service through [`DeployApi`]:
//! create a deploy from a digest listing, read back its status, and upload
//! the content of a single file. [`http::HttpDeployApi`] is the reqwest
//! implementation.

pub mod http;

use crate::utils::ApiResult;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use http::HttpDeployApi;

/// Body of a deploy creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployFiles {
    /// Relative path -> hex SHA-1 digest
    pub files: BTreeMap<String, String>,

    /// Ask the remote to preprocess the listing asynchronously
    #[serde(rename = "async")]
    pub is_async: bool,
}

/// Lifecycle state reported by the remote for a deploy.
///
/// Any state the engine has no special handling for maps to `Pending`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeployState {
    #[default]
    Pending,
    Prepared,
    Ready,
    Error,
}

impl DeployState {
    /// Preprocessing is done and the required digest list is final.
    pub fn is_ready(&self) -> bool {
        matches!(self, DeployState::Prepared | DeployState::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeployState::Pending => "pending",
            DeployState::Prepared => "prepared",
            DeployState::Ready => "ready",
            DeployState::Error => "error",
        }
    }
}

impl From<String> for DeployState {
    fn from(state: String) -> Self {
        match state.as_str() {
            "prepared" => DeployState::Prepared,
            "ready" => DeployState::Ready,
            "error" => DeployState::Error,
            _ => DeployState::Pending,
        }
    }
}

impl From<DeployState> for String {
    fn from(state: DeployState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deploy as known to the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRecord {
    pub id: String,

    pub site_id: String,

    #[serde(default)]
    pub state: DeployState,

    /// Digests whose content the remote does not have yet
    #[serde(default)]
    pub required: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_url: Option<String>,
}

/// Operations the deploy engine needs from the hosting service.
///
/// Implementations must be shareable across upload tasks.
#[async_trait]
pub trait DeployApi: Send + Sync {
    /// Create a deploy for `site_id` from a digest listing.
    async fn create_deploy(&self, site_id: &str, files: &DeployFiles) -> ApiResult<DeployRecord>;

    /// Fetch the current state of a deploy.
    async fn get_deploy(&self, site_id: &str, deploy_id: &str) -> ApiResult<DeployRecord>;

    /// Upload the content of one file of a deploy.
    async fn upload_file(&self, deploy: &DeployRecord, path: &str, content: Bytes) -> ApiResult<()>;
}
