//! Deploy executor - Orchestrates a site deploy.
//!
//! A deploy runs four phases in order:
//! - Manifest build: walk and hash the site directory
//! - Negotiation: send the digest listing, learn which files are required
//! - Readiness wait: only for listings above the synchronous file limit
//! - Upload: push the required files with bounded concurrency and retry

pub mod backoff;
pub mod manifest;
pub mod negotiate;
pub mod readiness;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

use crate::api::{DeployApi, DeployRecord};
use crate::config::Config;
use crate::utils::{DeployError, Result};
use backoff::RetryPolicy;
use manifest::Manifest;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use upload::UploadSummary;

/// Tunables for one deploy.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployOptions {
    /// Listings with more files than this are preprocessed asynchronously
    pub sync_file_limit: usize,

    /// Maximum uploads in flight at once
    pub upload_limit: usize,

    /// Deadline for the readiness wait
    pub preprocessing_timeout: Duration,

    /// Delay between two status polls
    pub poll_interval: Duration,

    /// Extra delay after a failed status poll
    pub poll_retry_delay: Duration,

    /// Per-file upload retry schedule
    pub retry: RetryPolicy,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for DeployOptions {
    fn from(config: &Config) -> Self {
        let deploy = &config.deploy;
        let defaults = crate::config::DeployConfig::default();

        Self {
            sync_file_limit: deploy.sync_file_limit,
            upload_limit: non_zero(deploy.upload_limit, defaults.upload_limit),
            preprocessing_timeout: Duration::from_secs(non_zero(
                deploy.preprocessing_timeout_secs,
                defaults.preprocessing_timeout_secs,
            )),
            poll_interval: Duration::from_millis(non_zero(
                deploy.poll_interval_ms,
                defaults.poll_interval_ms,
            )),
            poll_retry_delay: Duration::from_millis(non_zero(
                deploy.poll_retry_delay_ms,
                defaults.poll_retry_delay_ms,
            )),
            retry: RetryPolicy::from(&config.retry),
        }
    }
}

fn non_zero<T: Default + PartialEq>(value: T, fallback: T) -> T {
    if value == T::default() {
        fallback
    } else {
        value
    }
}

impl DeployOptions {
    pub fn with_sync_file_limit(mut self, limit: usize) -> Self {
        self.sync_file_limit = limit;
        self
    }

    /// Zero is ignored.
    pub fn with_upload_limit(mut self, limit: usize) -> Self {
        if limit > 0 {
            self.upload_limit = limit;
        }
        self
    }

    /// A zero duration is ignored.
    pub fn with_preprocessing_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.preprocessing_timeout = timeout;
        }
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration, retry_delay: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_retry_delay = retry_delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Main deploy executor
pub struct DeployExecutor<A: DeployApi + ?Sized + 'static> {
    api: Arc<A>,
    options: DeployOptions,
}

impl<A: DeployApi + ?Sized + 'static> DeployExecutor<A> {
    pub fn new(api: Arc<A>, options: DeployOptions) -> Self {
        Self { api, options }
    }

    pub fn options(&self) -> &DeployOptions {
        &self.options
    }

    /// Deploy the directory `dir` to `site_id`, uploading only the files the
    /// remote does not already have.
    ///
    /// # Errors
    /// Fails with the error of the first phase that failed: input validation,
    /// manifest build, negotiation, readiness wait or upload.
    pub async fn deploy_site(&self, site_id: &str, dir: &Path) -> Result<DeployRecord> {
        let start_time = Instant::now();

        let metadata = tokio::fs::metadata(dir).await?;
        if !metadata.is_dir() {
            return Err(DeployError::NotADirectory(dir.to_path_buf()));
        }

        info!("Starting deploy of {} to site {}", dir.display(), site_id);

        // Hashing reads every file, keep it off the async workers
        let root = dir.to_path_buf();
        let manifest = tokio::task::spawn_blocking(move || Manifest::build(&root)).await??;

        info!(
            "Built manifest: {} files, {} distinct, {} bytes",
            manifest.len(),
            manifest.distinct_digests(),
            manifest.total_bytes()
        );

        let deploy = self.create_deploy(site_id, &manifest).await?;
        let summary = self.upload_files(&deploy, &manifest).await?;

        info!(
            "Deploy {} completed: {} files uploaded ({} bytes), {} already present, {}s",
            deploy.id,
            summary.uploaded_files,
            summary.uploaded_bytes,
            manifest.len().saturating_sub(summary.uploaded_files),
            start_time.elapsed().as_secs()
        );

        Ok(deploy)
    }

    /// Negotiate a deploy for an already built manifest.
    pub async fn create_deploy(&self, site_id: &str, manifest: &Manifest) -> Result<DeployRecord> {
        negotiate::create_deploy(self.api.as_ref(), site_id, manifest, &self.options).await
    }

    /// Upload the files `deploy` requires from `manifest`.
    pub async fn upload_files(
        &self,
        deploy: &DeployRecord,
        manifest: &Manifest,
    ) -> Result<UploadSummary> {
        upload::upload_files(Arc::clone(&self.api), deploy, manifest, &self.options).await
    }
}
