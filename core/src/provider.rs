//! Local model chat provider
//!
//! Adapts a [ModelServer] connection to the host's [ChatProvider] contract:
//! keeps the discovered model list, converts chat history in both directions
//! and forwards streamed text and tool calls.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lmbridge_config::Config;

use crate::host::{
  ChatMessage, ChatModelInformation, ChatProvider, ChatRequestOptions, Host, ModelQueryOptions,
  ResponseProgress, TokenCountInput,
};
use crate::model::transform::{
  ModelDefaults, build_chat_request, to_model_information, to_response_parts,
};
use crate::model::types::{ChatRequest, ServerModel};
use crate::model::{ModelError, ModelServer, providers};

/// Chat provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
  /// Error from the model server client
  #[error(transparent)]
  Model(#[from] ModelError),

  /// The host cancelled the request
  #[error("Request cancelled")]
  Cancelled,
}

/// Alias for Result<T, ProviderError>
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Settings the provider derives from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
  /// Limits assumed for models that do not report them
  pub defaults: ModelDefaults,
  /// Keep-alive passed with each chat request
  pub keep_alive: Option<String>,
  /// HTTP read timeout in seconds
  pub timeout_secs: Option<u64>,
}

impl Default for ProviderSettings {
  fn default() -> Self {
    Self::from(&Config::default())
  }
}

impl From<&Config> for ProviderSettings {
  fn from(config: &Config) -> Self {
    Self {
      defaults: ModelDefaults {
        context_length: config.chat.default_context_length,
        max_output_tokens: config.chat.default_max_output_tokens,
      },
      keep_alive: config.server.keep_alive.clone(),
      timeout_secs: Some(config.server.request_timeout_secs),
    }
  }
}

/// Provider exposing local models to the host chat UI
pub struct LocalModelProvider {
  vendor: String,
  host: Weak<dyn Host>,
  settings: ProviderSettings,
  server: RwLock<Option<Arc<dyn ModelServer>>>,
  models: RwLock<Arc<Vec<ChatModelInformation>>>,
}

impl LocalModelProvider {
  /// Create a disconnected provider
  pub fn new(vendor: impl Into<String>, host: &Arc<dyn Host>, settings: ProviderSettings) -> Self {
    Self {
      vendor: vendor.into(),
      host: Arc::downgrade(host),
      settings,
      server: RwLock::new(None),
      models: RwLock::new(Arc::new(Vec::new())),
    }
  }

  /// Connect to the server at `url`, replacing any previous connection.
  ///
  /// On an invalid URL the provider is left disconnected with an empty
  /// model list.
  pub async fn connect(&self, url: &str) -> Result<()> {
    match providers::connect(url, self.settings.timeout_secs) {
      Ok(server) => {
        info!("Using {} at {}", server.server_name(), server.base_url());
        *self.server.write().await = Some(server);
        Ok(())
      }
      Err(err) => {
        warn!("Cannot connect to model server: {}", err);
        self.disconnect().await;
        Err(err.into())
      }
    }
  }

  /// Use an already constructed server connection
  pub async fn set_server(&self, server: Arc<dyn ModelServer>) {
    *self.server.write().await = Some(server);
  }

  /// Drop the connection and forget the discovered models
  pub async fn disconnect(&self) {
    *self.server.write().await = None;
    self.replace_models(Vec::new()).await;
  }

  /// Current connection, if any
  pub async fn server(&self) -> Option<Arc<dyn ModelServer>> {
    self.server.read().await.clone()
  }

  /// Models found by the last refresh
  pub async fn cached_models(&self) -> Arc<Vec<ChatModelInformation>> {
    self.models.read().await.clone()
  }

  /// Re-list the server's models and replace the cache.
  ///
  /// Never fails: an unreachable server yields an empty list plus an error
  /// notification (unless `silent`).
  pub async fn refresh_models(&self, silent: bool) -> Arc<Vec<ChatModelInformation>> {
    let Some(server) = self.server().await else {
      warn!("Model refresh skipped: no server connection");
      if !silent {
        self.notify_error(&ModelError::NotConnected.to_string());
      }
      return self.replace_models(Vec::new()).await;
    };

    match server.list_models().await {
      Ok(models) => {
        let described = self.describe_models(server.as_ref(), models).await;
        info!(
          "Found {} model(s) on {}",
          described.len(),
          server.base_url()
        );
        self.replace_models(described).await
      }
      Err(err) => {
        warn!("Listing models from {} failed: {}", server.base_url(), err);
        if !silent {
          self.notify_error(&format!(
            "Could not reach {} at {}: {}",
            server.server_name(),
            server.base_url(),
            err
          ));
        }
        self.replace_models(Vec::new()).await
      }
    }
  }

  async fn describe_models(
    &self,
    server: &dyn ModelServer,
    models: Vec<ServerModel>,
  ) -> Vec<ChatModelInformation> {
    let shows = futures::future::join_all(models.iter().map(|m| server.show_model(&m.name))).await;

    models
      .iter()
      .zip(shows)
      .map(|(model, show)| {
        let show = match show {
          Ok(show) => Some(show),
          Err(err) => {
            debug!("No details for {}: {}", model.name, err);
            None
          }
        };
        to_model_information(model, show.as_ref(), self.settings.defaults)
      })
      .collect()
  }

  /// Swap in a new model list, notifying the host when it changed
  async fn replace_models(
    &self,
    models: Vec<ChatModelInformation>,
  ) -> Arc<Vec<ChatModelInformation>> {
    let models = Arc::new(models);
    let previous = std::mem::replace(&mut *self.models.write().await, Arc::clone(&models));

    if previous.as_slice() != models.as_slice() {
      if let Some(host) = self.host.upgrade() {
        host.notify_model_information_changed(&self.vendor);
      }
    }
    models
  }

  fn notify_error(&self, message: &str) {
    if let Some(host) = self.host.upgrade() {
      host.show_error_message(message);
    }
  }

  async fn connected_server(&self) -> Result<Arc<dyn ModelServer>> {
    self
      .server()
      .await
      .ok_or(ProviderError::Model(ModelError::NotConnected))
  }

  async fn stream_response(
    &self,
    server: Arc<dyn ModelServer>,
    request: ChatRequest,
    progress: &dyn ResponseProgress,
    cancel: &CancellationToken,
  ) -> Result<()> {
    let mut stream = tokio::select! {
      biased;
      _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
      stream = server.chat_stream(request) => stream?,
    };

    loop {
      let item = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
        item = stream.next() => item,
      };
      let Some(item) = item else {
        break;
      };

      let chunk = item?;
      for part in to_response_parts(&chunk) {
        progress.report(part);
      }

      if chunk.done {
        if let Some(usage) = chunk.usage() {
          debug!(
            "Response finished ({:?}): {} prompt + {} completion tokens",
            chunk.done_reason, usage.input_tokens, usage.output_tokens
          );
        }
        break;
      }
    }

    Ok(())
  }
}

#[async_trait]
impl ChatProvider for LocalModelProvider {
  async fn provide_model_information(
    &self,
    options: ModelQueryOptions,
    cancel: CancellationToken,
  ) -> Result<Vec<ChatModelInformation>> {
    tokio::select! {
      biased;
      _ = cancel.cancelled() => Ok(self.cached_models().await.to_vec()),
      models = self.refresh_models(options.silent) => Ok(models.to_vec()),
    }
  }

  async fn provide_response(
    &self,
    model: &ChatModelInformation,
    messages: &[ChatMessage],
    options: &ChatRequestOptions,
    progress: &dyn ResponseProgress,
    cancel: CancellationToken,
  ) -> Result<()> {
    let server = self.connected_server().await?;

    let with_tools = model.capabilities.tool_calling && !options.tools.is_empty();
    if !options.tools.is_empty() && !with_tools {
      debug!(
        "{} does not support tools; not sending {} tool definition(s)",
        model.id,
        options.tools.len()
      );
    }

    let request = build_chat_request(
      &model.id,
      messages,
      options,
      with_tools,
      self.settings.keep_alive.clone(),
    );

    match self.stream_response(server, request, progress, &cancel).await {
      Ok(()) => Ok(()),
      Err(err) if cancel.is_cancelled() => {
        debug!("Response for {} cancelled: {}", model.id, err);
        Ok(())
      }
      Err(err) => {
        warn!("Response for {} failed: {}", model.id, err);
        Err(err)
      }
    }
  }

  async fn provide_token_count(
    &self,
    model: &ChatModelInformation,
    input: &TokenCountInput,
    cancel: CancellationToken,
  ) -> Result<u32> {
    let server = self.connected_server().await?;

    let text = input.text();
    if text.is_empty() {
      return Ok(0);
    }

    let counted = tokio::select! {
      biased;
      _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
      counted = server.count_tokens(&model.id, &text) => counted?,
    };

    Ok(counted.unwrap_or_else(|| estimate_tokens(&text)))
  }
}

/// Rough token estimate used when the server reports no count
pub fn estimate_tokens(text: &str) -> u32 {
  u32::try_from(text.chars().count().div_ceil(4)).unwrap_or(u32::MAX)
}
