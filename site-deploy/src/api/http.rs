//! HTTP client for the remote deploy API.
//!
//! Every request carries the bearer token when one is configured. A
//! `429 Too Many Requests` answer is retried after the `Retry-After` delay,
//! up to the configured number of attempts.

use super::{DeployApi, DeployFiles, DeployRecord};
use crate::config::ApiConfig;
use crate::utils::{ApiError, ApiResult};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// reqwest-backed [`DeployApi`].
#[derive(Debug, Clone)]
pub struct HttpDeployApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
    rate_limit_attempts: u32,
}

impl HttpDeployApi {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        rate_limit_attempts: u32,
    ) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("site-deploy/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            rate_limit_attempts: rate_limit_attempts.max(1),
        })
    }

    pub fn from_config(config: &ApiConfig) -> ApiResult<Self> {
        Self::new(&config.url, &config.token, config.rate_limit_attempts)
    }

    /// Append percent-encoded path segments to the base URL.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> ApiResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;

        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }

    /// Send the request built by `build`, retrying while rate limited.
    async fn send<F>(&self, build: F) -> ApiResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let response = self.authorize(build()).send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= self.rate_limit_attempts {
                    return Err(ApiError::RateLimited { attempts: attempt });
                }

                let delay = retry_after(&response);
                warn!(
                    "Rate limited on {} (attempt {}/{}), retrying in {:?}",
                    response.url().path(),
                    attempt,
                    self.rate_limit_attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(ApiError::Status {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response);
        }
    }
}

fn retry_after(response: &Response) -> Duration {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl DeployApi for HttpDeployApi {
    async fn create_deploy(&self, site_id: &str, files: &DeployFiles) -> ApiResult<DeployRecord> {
        let url = self.endpoint(["sites", site_id, "deploys"])?;
        debug!("POST {} ({} files, async: {})", url, files.files.len(), files.is_async);

        let response = self
            .send(|| self.client.post(url.clone()).json(files))
            .await?;
        decode(response).await
    }

    async fn get_deploy(&self, site_id: &str, deploy_id: &str) -> ApiResult<DeployRecord> {
        let url = self.endpoint(["sites", site_id, "deploys", deploy_id])?;

        let response = self.send(|| self.client.get(url.clone())).await?;
        decode(response).await
    }

    async fn upload_file(&self, deploy: &DeployRecord, path: &str, content: Bytes) -> ApiResult<()> {
        let segments = ["deploys", deploy.id.as_str(), "files"]
            .into_iter()
            .chain(path.split('/'));
        let url = self.endpoint(segments)?;

        self.send(|| {
            self.client
                .put(url.clone())
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(content.clone())
        })
        .await?;

        Ok(())
    }
}
