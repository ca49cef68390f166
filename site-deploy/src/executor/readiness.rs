//! Readiness polling for asynchronous deploys.
//!
//! A deploy created with a large file listing is preprocessed remotely before
//! the list of required digests is final. The poller reads the deploy status
//! on a fixed interval until it is `prepared` or `ready`, reports `error` as a
//! failure, and gives up once the preprocessing deadline has passed.

use super::DeployOptions;
use crate::api::{DeployApi, DeployRecord, DeployState};
use crate::utils::{DeployError, Result};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Poll `deploy` until the remote finished preprocessing it.
///
/// Failed status calls are not fatal: the poller waits an extra
/// `poll_retry_delay` and tries again. Only the deadline bounds the loop.
///
/// # Errors
/// - [`DeployError::PreprocessingFailed`] if the remote reports `error`
/// - [`DeployError::PreprocessingTimeout`] once `preprocessing_timeout` has
///   elapsed without a terminal state
pub async fn wait_until_ready<A>(
    api: &A,
    deploy: &DeployRecord,
    options: &DeployOptions,
) -> Result<DeployRecord>
where
    A: DeployApi + ?Sized,
{
    let start = Instant::now();
    let mut polls = 0usize;

    info!(
        "Waiting for deploy {} to finish preprocessing (timeout: {}s)",
        deploy.id,
        options.preprocessing_timeout.as_secs()
    );

    loop {
        sleep(options.poll_interval).await;
        polls += 1;

        match api.get_deploy(&deploy.site_id, &deploy.id).await {
            Ok(current) => match current.state {
                DeployState::Prepared | DeployState::Ready => {
                    info!(
                        "Deploy {} is {} after {} polls ({} files required)",
                        current.id,
                        current.state,
                        polls,
                        current.required.len()
                    );
                    return Ok(current);
                }
                DeployState::Error => {
                    return Err(DeployError::PreprocessingFailed {
                        deploy_id: deploy.id.clone(),
                    });
                }
                DeployState::Pending => {
                    debug!("Deploy {} still preprocessing (poll {})", deploy.id, polls);
                }
            },
            Err(e) => {
                warn!("Status check for deploy {} failed: {}", deploy.id, e);
                sleep(options.poll_retry_delay).await;
            }
        }

        if start.elapsed() > options.preprocessing_timeout {
            return Err(DeployError::PreprocessingTimeout {
                deploy_id: deploy.id.clone(),
                timeout: options.preprocessing_timeout,
            });
        }
    }
}
