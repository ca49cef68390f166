//! Scripted in-memory deploy API for executor tests.

use crate::api::{DeployApi, DeployFiles, DeployRecord, DeployState};
use crate::utils::{ApiError, ApiResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) fn deploy_record(id: &str, required: &[&str]) -> DeployRecord {
    DeployRecord {
        id: id.to_string(),
        site_id: "site-1".to_string(),
        state: DeployState::Pending,
        required: required.iter().map(|d| d.to_string()).collect(),
        deploy_url: None,
    }
}

/// Fake remote. Deploy creation answers with `created`; when its required
/// list is empty every distinct digest of the request is required. Status
/// polls pop `statuses` (an `Err` is the HTTP status of a failed poll) and
/// report `Pending` once the script runs out.
pub(crate) struct ScriptedApi {
    created: DeployRecord,
    reject_create: bool,
    requests: Mutex<Vec<DeployFiles>>,
    statuses: Mutex<VecDeque<Result<DeployState, u16>>>,
    status_calls: AtomicUsize,
    failing: HashSet<String>,
    flaky: Mutex<HashMap<String, usize>>,
    upload_latency: Duration,
    path_latency: HashMap<String, Duration>,
    attempts: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedApi {
    pub(crate) fn new(created: DeployRecord) -> Self {
        Self {
            created,
            reject_create: false,
            requests: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
            status_calls: AtomicUsize::new(0),
            failing: HashSet::new(),
            flaky: Mutex::new(HashMap::new()),
            upload_latency: Duration::from_millis(10),
            path_latency: HashMap::new(),
            attempts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn rejecting_create(mut self) -> Self {
        self.reject_create = true;
        self
    }

    pub(crate) fn with_statuses(self, statuses: Vec<Result<DeployState, u16>>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    /// Every upload of `path` fails.
    pub(crate) fn failing(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    /// The first `failures` uploads of `path` fail.
    pub(crate) fn flaky(self, path: &str, failures: usize) -> Self {
        self.flaky.lock().unwrap().insert(path.to_string(), failures);
        self
    }

    pub(crate) fn with_upload_latency(mut self, latency: Duration) -> Self {
        self.upload_latency = latency;
        self
    }

    /// Uploads of `path` take `latency` instead of the shared upload latency.
    pub(crate) fn with_latency_for(mut self, path: &str, latency: Duration) -> Self {
        self.path_latency.insert(path.to_string(), latency);
        self
    }

    pub(crate) fn requests(&self) -> Vec<DeployFiles> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Paths of every upload attempt, in call order.
    pub(crate) fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn attempts_for(&self, path: &str) -> usize {
        self.attempts().iter().filter(|p| p.as_str() == path).count()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeployApi for ScriptedApi {
    async fn create_deploy(&self, _site_id: &str, files: &DeployFiles) -> ApiResult<DeployRecord> {
        self.requests.lock().unwrap().push(files.clone());

        if self.reject_create {
            return Err(ApiError::Status {
                status: 422,
                message: "invalid deploy".to_string(),
            });
        }

        let mut record = self.created.clone();
        if record.required.is_empty() {
            let distinct: HashSet<&String> = files.files.values().collect();
            record.required = distinct.into_iter().cloned().collect();
            record.required.sort();
        }
        Ok(record)
    }

    async fn get_deploy(&self, _site_id: &str, deploy_id: &str) -> ApiResult<DeployRecord> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.statuses.lock().unwrap().pop_front();

        match next.unwrap_or(Ok(DeployState::Pending)) {
            Ok(state) => {
                let mut record = self.created.clone();
                record.id = deploy_id.to_string();
                record.state = state;
                Ok(record)
            }
            Err(status) => Err(ApiError::Status {
                status,
                message: "status unavailable".to_string(),
            }),
        }
    }

    async fn upload_file(&self, _deploy: &DeployRecord, path: &str, _content: Bytes) -> ApiResult<()> {
        self.attempts.lock().unwrap().push(path.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let latency = self.path_latency.get(path).copied().unwrap_or(self.upload_latency);
        tokio::time::sleep(latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let flaky_failure = {
            let mut flaky = self.flaky.lock().unwrap();
            match flaky.get_mut(path) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };

        if self.failing.contains(path) || flaky_failure {
            return Err(ApiError::Status {
                status: 500,
                message: format!("upload of {path} failed"),
            });
        }

        Ok(())
    }
}
