//! Inference endpoint integration

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conversation::Message;

pub use http::HttpClient;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Endpoint returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Body posted to the endpoint.
///
/// `conversation_history` holds every turn before `user_input`, never the new turn itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub user_input: String,
    pub conversation_history: Vec<Message>,
}

/// Anything that can turn a [`CompletionRequest`] into the assistant's reply text.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ClientError>;
}
