//! Model server trait
//!
//! This module defines the [ModelServer] trait the chat provider talks to.
//! The provider only ever holds an `Arc<dyn ModelServer>`, so tests and other
//! servers can stand in for the HTTP client.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use super::error::{ModelError, Result};
use super::types::{ChatChunk, ChatRequest, ModelShow, ServerModel};

/// Stream of chat chunks produced by [ModelServer::chat_stream]
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>;

/// Client connection to a local model-serving process
#[async_trait]
pub trait ModelServer: Send + Sync {
  /// Returns the display name for this server
  fn server_name(&self) -> &'static str;

  /// Base URL this connection talks to
  fn base_url(&self) -> &str;

  /// Enumerates the models available on the server
  async fn list_models(&self) -> Result<Vec<ServerModel>>;

  /// Fetches capabilities and limits for one model
  async fn show_model(&self, name: &str) -> Result<ModelShow>;

  /// Starts a streaming chat completion.
  ///
  /// Dropping the returned stream aborts the underlying request.
  async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream>;

  /// Counts the prompt tokens `text` occupies for `model`.
  ///
  /// Returns `None` when the server answered without a count.
  async fn count_tokens(&self, model: &str, text: &str) -> Result<Option<u32>>;
}

// =============================================================================
// Helper functions for server implementations
// =============================================================================

/// Standard error handling for HTTP responses
pub async fn handle_response(response: reqwest::Response) -> Result<String> {
  let status = response.status();
  if status.is_success() {
    return Ok(response.text().await?);
  }

  let body = response.text().await.unwrap_or_default();
  let message = serde_json::from_str::<serde_json::Value>(&body)
    .ok()
    .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(ToString::to_string))
    .unwrap_or(body);

  if status == reqwest::StatusCode::NOT_FOUND {
    return Err(ModelError::ModelNotFound(message));
  }
  Err(ModelError::ApiError(format!("HTTP {}: {}", status, message)))
}

/// Parse JSON from response
pub async fn parse_response<T: serde::de::DeserializeOwned>(
  response: reqwest::Response,
) -> Result<T> {
  let body = handle_response(response).await?;
  serde_json::from_str(&body)
    .map_err(|e| ModelError::InvalidResponse(format!("unexpected response body: {e}")))
}
