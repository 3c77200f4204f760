//! GeminiClient -- concrete [`BackendClient`] implementation for the
//! Gemini `generateContent` REST API.
//!
//! Conversations are dispatched to `:streamGenerateContent?alt=sse`; the
//! answer is handed back as a byte stream when the server streams and as a
//! whole document when it replies with plain JSON. One-off requests (title
//! generation) use `:generateContent`.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};

use parley_core::backend::{BackendClient, BackendResponse};
use parley_types::backend::{GenerateContentRequest, GenerateContentResponse};
use parley_types::config::BackendConfig;
use parley_types::error::BackendError;

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini REST client.
///
/// The active model can be switched at runtime among the configured aliases;
/// requests already in flight keep the model they were built with.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    models: BTreeMap<String, String>,
    model: RwLock<String>,
}

// GeminiClient intentionally does NOT derive Debug to keep the key out of logs.

impl GeminiClient {
    /// Build a client from the `[backend]` config section.
    ///
    /// The startup model is resolved through the alias table; an alias that
    /// is not in the table is used as a raw model id.
    pub fn new(api_key: SecretString, config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to create HTTP client: {e}")))?;

        let model = config
            .resolve_model(&config.model)
            .unwrap_or(&config.model)
            .to_string();

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            models: config.models.clone(),
            model: RwLock::new(model),
        })
    }

    /// Backend model id currently in use.
    pub fn current_model(&self) -> String {
        self.model
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Switch the active model to a configured alias.
    ///
    /// Returns the new model id, or `None` when the alias is unknown (the
    /// active model is left untouched).
    pub fn switch_model(&self, alias: &str) -> Option<String> {
        let id = self.models.get(alias)?.clone();
        let mut model = self
            .model
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tracing::info!(from = %*model, to = %id, "switching backend model");
        *model = id.clone();
        Some(id)
    }

    /// Configured aliases, sorted.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    fn url(&self, action: &str) -> String {
        format!("{}/{}:{}", self.base_url, self.current_model(), action)
    }

    async fn post(
        &self,
        url: &str,
        request: &GenerateContentRequest,
    ) -> Result<reqwest::Response, BackendError> {
        tracing::debug!(url = %url, turns = request.contents.len(), "Gemini request");

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Transport(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Gemini API error response");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

/// Media type of a response without parameters, lowercased.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

impl BackendClient for GeminiClient {
    async fn send(&self, request: &GenerateContentRequest) -> Result<BackendResponse, BackendError> {
        let url = self.url("streamGenerateContent?alt=sse");
        let response = self.post(&url, request).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        match essence(&content_type).as_str() {
            "text/event-stream" => {
                let stream = response.bytes_stream().map(|chunk| {
                    chunk
                        .map(|bytes| bytes.to_vec())
                        .map_err(|e| BackendError::Transport(e.to_string()))
                });
                Ok(BackendResponse::Streaming(Box::pin(stream)))
            }
            "application/json" => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| BackendError::Transport(e.to_string()))?;
                Ok(BackendResponse::Complete(body.to_vec()))
            }
            _ => Err(BackendError::UnexpectedContentType(content_type)),
        }
    }

    async fn generate(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, BackendError> {
        let url = self.url("generateContent");
        let response = self.post(&url, request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        serde_json::from_slice(&body)
            .map_err(|e| BackendError::Decode(format!("failed to parse response: {e}")))
    }
}
