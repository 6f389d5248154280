//! HTTP control-plane client implementation.
//!
//! Speaks the JSON control-plane API over reqwest with bounded retries
//! for transient failures.

use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::Settings;
use crate::error::{CloudError, FoundryError, Result};

use super::client::CloudClient;
use super::types::{
    CreateChangeSetRequest, CreateStackRequest, KeyPairInfo, KeyPairMaterial, RemoteChangeSet,
    StackDescription, StackEvent,
};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for transient failures.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// HTTP client for the deployment control plane.
#[derive(Debug, Clone)]
pub struct HttpCloudClient {
    /// HTTP client.
    client: Client,
    /// Control-plane base URL, without trailing slash.
    endpoint: String,
    /// API token.
    api_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateStackResponse {
    stack_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateChangeSetResponse {
    change_set_id: String,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    events: Vec<StackEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyPairListResponse {
    key_pairs: Vec<KeyPairInfo>,
}

impl HttpCloudClient {
    /// Creates a client from process settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(settings: &Settings) -> Result<Self> {
        Self::with_timeout(settings, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(settings: &Settings, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CloudError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_token: settings.api_token.clone(),
        })
    }

    /// Sends a request with bounded retries for retryable failures.
    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        not_found_name: &str,
    ) -> Result<T> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES}");
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)))
                    .await;
            }

            match self
                .request_once::<T>(method.clone(), path, body, not_found_name)
                .await
            {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if e.is_retryable() {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            FoundryError::Cloud(CloudError::NetworkError {
                message: String::from("Max retries exceeded"),
            })
        }))
    }

    /// Sends a single request and maps status codes to the error taxonomy.
    async fn request_once<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        not_found_name: &str,
    ) -> Result<T> {
        let url = format!("{}{path}", self.endpoint);
        trace!(%method, %url, "control plane request");

        let mut request = self
            .client
            .request(method, &url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_token));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            FoundryError::Cloud(CloudError::NetworkError {
                message: format!("Request failed: {e}"),
            })
        })?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(FoundryError::Cloud(CloudError::NotFoundTransient {
                stack_name: not_found_name.to_string(),
            }));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();
            let retry_after = if retry_after == 0 { 60 } else { retry_after };

            return Err(FoundryError::Cloud(CloudError::RateLimited {
                retry_after_secs: retry_after,
            }));
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FoundryError::Cloud(CloudError::AuthenticationFailed {
                message: String::from("Invalid API token"),
            }));
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if message.contains("InsufficientCapabilities") {
                return Err(FoundryError::Cloud(CloudError::ConsentRequired));
            }
            return Err(FoundryError::Cloud(CloudError::api_error(
                status.as_u16(),
                message,
            )));
        }

        response.json().await.map_err(|e| {
            FoundryError::Cloud(CloudError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            })
        })
    }

    fn to_body<S: serde::Serialize>(value: &S) -> Result<serde_json::Value> {
        serde_json::to_value(value).map_err(|e| {
            FoundryError::Cloud(CloudError::InvalidResponse {
                message: format!("Failed to serialize request: {e}"),
            })
        })
    }
}

#[async_trait]
impl CloudClient for HttpCloudClient {
    async fn create_stack(&self, request: CreateStackRequest) -> Result<String> {
        let body = Self::to_body(&request)?;
        let response: CreateStackResponse = self
            .request(Method::POST, "/v1/stacks", Some(&body), &request.stack_name)
            .await?;
        Ok(response.stack_id)
    }

    async fn describe_stack(&self, stack_name: &str) -> Result<StackDescription> {
        self.request(
            Method::GET,
            &format!("/v1/stacks/{stack_name}"),
            None,
            stack_name,
        )
        .await
    }

    async fn describe_stack_events(&self, stack_name: &str) -> Result<Vec<StackEvent>> {
        let response: EventsResponse = self
            .request(
                Method::GET,
                &format!("/v1/stacks/{stack_name}/events"),
                None,
                stack_name,
            )
            .await?;
        Ok(response.events)
    }

    async fn delete_stack(&self, stack_name: &str) -> Result<()> {
        let _: serde_json::Value = self
            .request(
                Method::DELETE,
                &format!("/v1/stacks/{stack_name}"),
                None,
                stack_name,
            )
            .await?;
        Ok(())
    }

    async fn create_change_set(&self, request: CreateChangeSetRequest) -> Result<String> {
        let body = Self::to_body(&request)?;
        let response: CreateChangeSetResponse = self
            .request(
                Method::POST,
                &format!("/v1/stacks/{}/change-sets", request.stack_name),
                Some(&body),
                &request.stack_name,
            )
            .await?;
        Ok(response.change_set_id)
    }

    async fn describe_change_set(
        &self,
        stack_name: &str,
        change_set_id: &str,
    ) -> Result<RemoteChangeSet> {
        self.request(
            Method::GET,
            &format!("/v1/stacks/{stack_name}/change-sets/{change_set_id}"),
            None,
            stack_name,
        )
        .await
    }

    async fn execute_change_set(&self, stack_name: &str, change_set_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .request(
                Method::POST,
                &format!("/v1/stacks/{stack_name}/change-sets/{change_set_id}/execute"),
                None,
                stack_name,
            )
            .await?;
        Ok(())
    }

    async fn delete_change_set(&self, stack_name: &str, change_set_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .request(
                Method::DELETE,
                &format!("/v1/stacks/{stack_name}/change-sets/{change_set_id}"),
                None,
                stack_name,
            )
            .await?;
        Ok(())
    }

    async fn create_key_pair(&self, key_name: &str) -> Result<KeyPairMaterial> {
        let body = serde_json::json!({ "keyName": key_name });
        self.request(Method::POST, "/v1/key-pairs", Some(&body), key_name)
            .await
    }

    async fn delete_key_pair(&self, key_name: &str) -> Result<()> {
        let _: serde_json::Value = self
            .request(
                Method::DELETE,
                &format!("/v1/key-pairs/{key_name}"),
                None,
                key_name,
            )
            .await?;
        Ok(())
    }

    async fn list_key_pairs(&self, prefix: &str) -> Result<Vec<KeyPairInfo>> {
        let response: KeyPairListResponse = self
            .request(
                Method::GET,
                &format!("/v1/key-pairs?prefix={prefix}"),
                None,
                prefix,
            )
            .await?;
        Ok(response.key_pairs)
    }
}
