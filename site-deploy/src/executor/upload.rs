//! Upload scheduling for required deploy files.
//!
//! Every required digest with local content becomes one upload task. Tasks
//! are admitted through a semaphore so no more than `upload_limit` uploads
//! are in flight, and each retries on its own exponential backoff schedule.
//!
//! The first task to run out of retry budget records its error in a
//! [`SharedFailure`]. Any task that checks the slot afterwards, before
//! starting an attempt, gives up without calling the remote. Attempts already
//! in flight are never interrupted.

use super::backoff::RetryPolicy;
use super::manifest::{FileRecord, Manifest};
use super::DeployOptions;
use crate::api::{DeployApi, DeployRecord};
use crate::utils::{ApiError, DeployError, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};

/// The error that ended an upload batch.
#[derive(Debug)]
pub struct UploadFailure {
    pub path: String,
    pub error: ApiError,
}

/// Single-slot, first-error-wins failure cell shared by the tasks of one
/// upload batch.
#[derive(Debug, Default)]
pub struct SharedFailure {
    slot: Mutex<Option<UploadFailure>>,
}

impl SharedFailure {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_set(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Store `error` unless a failure is already recorded. Returns whether
    /// this error was kept.
    pub async fn record(&self, path: &str, error: ApiError) -> bool {
        let mut slot = self.slot.lock().await;
        if slot.is_some() {
            return false;
        }

        *slot = Some(UploadFailure {
            path: path.to_string(),
            error,
        });
        true
    }

    pub async fn take(&self) -> Option<UploadFailure> {
        self.slot.lock().await.take()
    }
}

/// Counters for one upload batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded_files: usize,
    pub uploaded_bytes: u64,
    pub cancelled_files: usize,
    pub failed_files: usize,
    /// Required digests with no local content
    pub missing_digests: usize,
}

enum TaskOutcome {
    Uploaded(u64),
    Cancelled,
    Failed,
}

/// Upload the content of every digest `deploy` requires.
///
/// Returns once every spawned task has finished. Digests the manifest has no
/// content for are skipped.
///
/// # Errors
/// - [`DeployError::Upload`] carrying the first file whose retry budget was
///   exhausted
/// - [`DeployError::Task`] if an upload task panicked
pub async fn upload_files<A>(
    api: Arc<A>,
    deploy: &DeployRecord,
    manifest: &Manifest,
    options: &DeployOptions,
) -> Result<UploadSummary>
where
    A: DeployApi + ?Sized + 'static,
{
    let semaphore = Arc::new(Semaphore::new(options.upload_limit.max(1)));
    let failure = Arc::new(SharedFailure::new());
    let shared_deploy = Arc::new(deploy.clone());
    let mut summary = UploadSummary::default();
    let mut handles = Vec::with_capacity(deploy.required.len());

    info!(
        "Uploading {} required files for deploy {} (concurrency: {})",
        deploy.required.len(),
        deploy.id,
        options.upload_limit
    );

    for digest in &deploy.required {
        let Some(record) = manifest.by_digest(digest) else {
            debug!("Required digest {} has no local file, skipping", digest);
            summary.missing_digests += 1;
            continue;
        };

        // The semaphore is never closed, acquiring only waits for a slot.
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };

        let api = Arc::clone(&api);
        let deploy = Arc::clone(&shared_deploy);
        let failure = Arc::clone(&failure);
        let record = record.clone();
        let retry = options.retry.clone();

        handles.push(tokio::spawn(async move {
            let _permit = permit;
            upload_with_retry(api.as_ref(), &deploy, &record, &retry, &failure).await
        }));
    }

    let mut panicked = None;
    for handle in handles {
        match handle.await {
            Ok(TaskOutcome::Uploaded(bytes)) => {
                summary.uploaded_files += 1;
                summary.uploaded_bytes += bytes;
            }
            Ok(TaskOutcome::Cancelled) => summary.cancelled_files += 1,
            Ok(TaskOutcome::Failed) => summary.failed_files += 1,
            Err(e) => {
                error!("Upload task panicked: {}", e);
                panicked.get_or_insert(e);
            }
        }
    }

    if let Some(failure) = failure.take().await {
        error!(
            "Deploy {} upload failed: {} uploaded, {} cancelled, {} failed",
            deploy.id, summary.uploaded_files, summary.cancelled_files, summary.failed_files
        );
        return Err(DeployError::Upload {
            path: failure.path,
            source: failure.error,
        });
    }

    if let Some(e) = panicked {
        return Err(DeployError::Task(e));
    }

    Ok(summary)
}

async fn upload_with_retry<A>(
    api: &A,
    deploy: &DeployRecord,
    record: &FileRecord,
    retry: &RetryPolicy,
    failure: &SharedFailure,
) -> TaskOutcome
where
    A: DeployApi + ?Sized,
{
    let mut backoff = retry.start();

    loop {
        if failure.is_set().await {
            debug!("Upload cancelled: {}", record.path());
            return TaskOutcome::Cancelled;
        }

        let error = match api
            .upload_file(deploy, record.path(), record.content())
            .await
        {
            Ok(()) => {
                debug!("Uploaded {} ({} bytes)", record.path(), record.size());
                return TaskOutcome::Uploaded(record.size());
            }
            Err(e) => e,
        };

        match backoff.next_delay() {
            Some(delay) => {
                warn!(
                    "Upload of {} failed, retrying in {:?}: {}",
                    record.path(),
                    delay,
                    error
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                error!("Upload of {} failed permanently: {}", record.path(), error);
                failure.record(record.path(), error).await;
                return TaskOutcome::Failed;
            }
        }
    }
}
