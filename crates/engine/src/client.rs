use async_trait::async_trait;
use eino_shared::wire::{ASK_PATH, AskRequest, HEALTH_PATH, extract_answer};

use crate::error::ClientError;

/// Something that can answer a question. The HTTP client is the real one;
/// tests substitute their own.
#[async_trait]
pub trait AnswerClient: Send + Sync {
    async fn ask(&self, request: &AskRequest) -> Result<String, ClientError>;
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Probes the service's health endpoint.
    pub async fn health(&self) -> Result<(), ClientError> {
        let url = format!("{}{}", self.base_url, HEALTH_PATH);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl AnswerClient for ApiClient {
    async fn ask(&self, request: &AskRequest) -> Result<String, ClientError> {
        let url = format!("{}{}", self.base_url, ASK_PATH);
        tracing::debug!(%url, "Sending question");

        let response = self.client
            .post(&url)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Answer service returned an error");
            return Err(ClientError::Status(response.status()));
        }

        let body = response.json::<serde_json::Value>().await?;
        Ok(extract_answer(&body))
    }
}
