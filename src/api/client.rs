//! HTTP client for the copilot backend
//!
//! Wraps reqwest::Client; the bearer token is supplied per call by the chat view.

use async_trait::async_trait;

use crate::models::{ChatReply, ChatRequest, HealthResponse};

/// Path of the chat endpoint, relative to the base URL.
pub const CHAT_PATH: &str = "/api/chat";

/// Backend call failures.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Chat backend capability consumed by the chat view.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// POST a chat message. `bearer` goes into the `Authorization` header.
    async fn post_chat(
        &self,
        request: &ChatRequest,
        bearer: Option<&str>,
    ) -> Result<ChatReply, ApiError>;
}

/// reqwest-backed [`ChatApi`].
pub struct HttpChatClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url, CHAT_PATH)
    }

    /// GET the backend root to verify the service is running.
    pub async fn health(&self) -> Result<HealthResponse, ApiError> {
        let url = format!("{}/", self.base_url);
        tracing::debug!("GET {}", url);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;

        let resp = check_response(resp, &url).await?;
        resp.json()
            .await
            .map_err(|source| ApiError::Decode { url, source })
    }
}

#[async_trait]
impl ChatApi for HttpChatClient {
    async fn post_chat(
        &self,
        request: &ChatRequest,
        bearer: Option<&str>,
    ) -> Result<ChatReply, ApiError> {
        let url = self.chat_url();
        tracing::debug!("POST {}", url);

        // .json() sets Content-Type: application/json
        let mut builder = self.http.post(&url).json(request);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }

        let resp = builder.send().await.map_err(|source| ApiError::Transport {
            url: url.clone(),
            source,
        })?;

        let resp = check_response(resp, &url).await?;
        resp.json()
            .await
            .map_err(|source| ApiError::Decode { url, source })
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp)
}
