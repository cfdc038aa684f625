use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::time::Duration;

use super::protocol::RegionOperationResponse;
use crate::config::BrowserSettings;

/// Administrative region calls against a remote server member.
///
/// Failures never surface as errors; they come back as a response with
/// `success: false` and a readable `error`. No call is retried.
#[async_trait]
pub trait ManagementClient: Send + Sync {
    async fn create_region(&self, name: &str, region_type: Option<&str>)
    -> RegionOperationResponse;

    async fn delete_region(&self, name: &str) -> RegionOperationResponse;
}

pub struct HttpManagementClient {
    base_url: String,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl HttpManagementClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn from_settings(settings: &BrowserSettings) -> Self {
        Self::new(&settings.data_server_url, settings.request_timeout())
    }

    fn region_url(&self, name: &str) -> Result<Url, String> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| format!("Invalid data server url {}: {}", self.base_url, e))?;
        url.path_segments_mut()
            .map_err(|_| format!("Invalid data server url {}", self.base_url))?
            .pop_if_empty()
            .extend(["management", "regions", name]);
        Ok(url)
    }

    async fn interpret(
        response: reqwest::Response,
        action: &str,
    ) -> RegionOperationResponse {
        let status = response.status();
        let body = response.json::<RegionOperationResponse>().await.ok();

        if status.is_success() {
            return match body {
                Some(body) if body.success => body,
                Some(body) => RegionOperationResponse::failed(
                    body.error
                        .unwrap_or_else(|| format!("Failed to {} region: {}", action, status)),
                ),
                None => RegionOperationResponse::failed(format!(
                    "Failed to {} region: unreadable response ({})",
                    action, status
                )),
            };
        }

        match body.and_then(|b| b.error) {
            Some(error) => RegionOperationResponse::failed(error),
            None => RegionOperationResponse::failed(format!(
                "Failed to {} region: {}",
                action,
                status_text(status)
            )),
        }
    }
}

fn status_text(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

#[async_trait]
impl ManagementClient for HttpManagementClient {
    async fn create_region(
        &self,
        name: &str,
        region_type: Option<&str>,
    ) -> RegionOperationResponse {
        let mut url = match self.region_url(name) {
            Ok(url) => url,
            Err(e) => return RegionOperationResponse::failed(e),
        };
        if let Some(region_type) = region_type {
            url.query_pairs_mut().append_pair("type", region_type);
        }

        tracing::info!("Requesting region {} from {}", name, self.base_url);
        match self
            .http_client
            .post(url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => Self::interpret(response, "create").await,
            Err(e) => {
                tracing::warn!("Management API at {} unreachable: {}", self.base_url, e);
                RegionOperationResponse::failed(format!("Failed to connect to data server: {}", e))
            }
        }
    }

    async fn delete_region(&self, name: &str) -> RegionOperationResponse {
        let url = match self.region_url(name) {
            Ok(url) => url,
            Err(e) => return RegionOperationResponse::failed(e),
        };

        match self
            .http_client
            .delete(url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => Self::interpret(response, "delete").await,
            Err(e) => {
                tracing::warn!("Management API at {} unreachable: {}", self.base_url, e);
                RegionOperationResponse::failed(format!("Failed to connect to data server: {}", e))
            }
        }
    }
}
