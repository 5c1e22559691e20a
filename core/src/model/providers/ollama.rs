//! Ollama Server
//!
//! Client for models served locally by Ollama over its native HTTP API

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::super::error::{ModelError, Result};
use super::super::provider::{ChatStream, ModelServer, handle_response, parse_response};
use super::super::types::{ChatRequest, ModelShow, ServerModel};
use super::{create_chunk_stream, create_client};

/// Ollama server connection (local models)
pub struct OllamaServer {
  client: Client,
  base_url: String,
}

impl OllamaServer {
  /// Create a new Ollama connection
  pub fn new(base_url: impl Into<String>, timeout_secs: Option<u64>) -> Self {
    // Generous default: the first request to a model waits for it to load
    let client = create_client(Some(timeout_secs.unwrap_or(600)));

    Self {
      client,
      base_url: base_url.into(),
    }
  }

  /// Get the API endpoint URL
  fn endpoint(&self, path: &str) -> String {
    format!("{}/api/{}", self.base_url.trim_end_matches('/'), path)
  }
}

#[derive(Deserialize)]
struct TagsResponse {
  #[serde(default)]
  models: Vec<ServerModel>,
}

#[derive(Serialize)]
struct ShowRequest<'a> {
  model: &'a str,
}

#[derive(Serialize)]
struct TokenizeRequest<'a> {
  model: &'a str,
  prompt: &'a str,
  raw: bool,
  stream: bool,
  options: TokenizeOptions,
}

#[derive(Serialize)]
struct TokenizeOptions {
  num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
  #[serde(default)]
  prompt_eval_count: Option<u32>,
}

#[async_trait]
impl ModelServer for OllamaServer {
  fn server_name(&self) -> &'static str {
    "Ollama"
  }

  fn base_url(&self) -> &str {
    &self.base_url
  }

  async fn list_models(&self) -> Result<Vec<ServerModel>> {
    let url = self.endpoint("tags");
    tracing::debug!("Listing models from {}", url);

    let response = self.client.get(&url).send().await?;
    let tags: TagsResponse = parse_response(response).await?;
    Ok(tags.models)
  }

  async fn show_model(&self, name: &str) -> Result<ModelShow> {
    let url = self.endpoint("show");

    let response = self
      .client
      .post(&url)
      .json(&ShowRequest { model: name })
      .send()
      .await?;

    parse_response(response).await
  }

  async fn chat_stream(&self, mut request: ChatRequest) -> Result<ChatStream> {
    let url = self.endpoint("chat");
    request.stream = true;

    tracing::debug!(
      "Starting chat with {} ({} messages, {} tools)",
      request.model,
      request.messages.len(),
      request.tools.len()
    );

    let response = self.client.post(&url).json(&request).send().await?;

    if !response.status().is_success() {
      // Surface the server's own error text instead of a stream error
      return Err(
        handle_response(response)
          .await
          .err()
          .unwrap_or_else(|| ModelError::ApiError("chat request failed".to_string())),
      );
    }

    Ok(create_chunk_stream(response))
  }

  async fn count_tokens(&self, model: &str, text: &str) -> Result<Option<u32>> {
    let url = self.endpoint("generate");

    // Evaluating the raw prompt and stopping after one token reports the
    // prompt's token count without a full generation
    let request = TokenizeRequest {
      model,
      prompt: text,
      raw: true,
      stream: false,
      options: TokenizeOptions { num_predict: 1 },
    };

    let response = self.client.post(&url).json(&request).send().await?;
    let generated: GenerateResponse = parse_response(response).await?;
    Ok(generated.prompt_eval_count)
  }
}
