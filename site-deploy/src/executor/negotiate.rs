//! Deploy negotiation.
//!
//! Sends the manifest's digest listing to the remote and gets back the deploy
//! together with the digests it still needs. Listings above the synchronous
//! file limit are created asynchronously and waited on before returning.

use super::manifest::Manifest;
use super::readiness::wait_until_ready;
use super::DeployOptions;
use crate::api::{DeployApi, DeployFiles, DeployRecord};
use crate::utils::{DeployError, Result};
use tracing::info;

/// Create a deploy for `site_id` from `manifest`.
///
/// Remote errors are returned as [`DeployError::Negotiate`] without retry.
pub async fn create_deploy<A>(
    api: &A,
    site_id: &str,
    manifest: &Manifest,
    options: &DeployOptions,
) -> Result<DeployRecord>
where
    A: DeployApi + ?Sized,
{
    let over_committed = manifest.is_over_committed(options.sync_file_limit);
    let files = DeployFiles {
        files: manifest.sums().clone(),
        is_async: over_committed,
    };

    info!(
        "Creating deploy for site {}: {} files, {} mode",
        site_id,
        manifest.len(),
        if over_committed { "async" } else { "sync" }
    );

    let deploy = api
        .create_deploy(site_id, &files)
        .await
        .map_err(DeployError::Negotiate)?;

    info!(
        "Created deploy {} ({} files required)",
        deploy.id,
        deploy.required.len()
    );

    if over_committed {
        return wait_until_ready(api, &deploy, options).await;
    }

    Ok(deploy)
}
