use super::types::{DispatchRequest, DispatchResponse};
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use std::time::Duration;

/// Sends user messages to the inference endpoint.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// One attempt; no retries.
    async fn dispatch(&self, request: &DispatchRequest) -> Result<()>;
}

#[derive(Clone)]
pub struct InferenceClient {
    client: reqwest::Client,
    endpoint: String,
}

impl InferenceClient {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ParleyError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Dispatch for InferenceClient {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(request_id = %request.request_id, error = %e, "Dispatch failed");
                ParleyError::DispatchFailed("Failed to send message".to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                request_id = %request.request_id,
                status = %response.status(),
                "Inference endpoint rejected message"
            );
            return Err(ParleyError::DispatchFailed(
                "Failed to send message".to_string(),
            ));
        }

        let body = response.json::<DispatchResponse>().await.map_err(|e| {
            tracing::error!(request_id = %request.request_id, error = %e, "Unreadable dispatch response");
            ParleyError::DispatchFailed("Request failed".to_string())
        })?;

        if !body.success {
            tracing::warn!(request_id = %request.request_id, "Inference endpoint reported failure");
            return Err(ParleyError::DispatchFailed("Request failed".to_string()));
        }

        tracing::debug!(
            request_id = %request.request_id,
            session_id = %request.session_id,
            "Message dispatched"
        );
        Ok(())
    }
}
