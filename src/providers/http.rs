//! HTTP client for the hint endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ClientError, CompletionRequest, InferenceClient};

pub struct HttpClient {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    response: String,
}

impl HttpClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl InferenceClient for HttpClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ClientError> {
        tracing::debug!(
            url = %self.url,
            history_len = request.conversation_history.len(),
            "Posting completion request"
        );

        let response = self.client.post(&self.url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        let body = response.text().await?;
        let parsed: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        Ok(parsed.response)
    }
}
