//! Model layer error types

use thiserror::Error;

/// Model server errors
#[derive(Error, Debug)]
pub enum ModelError {
  /// No server connection has been established
  #[error("Not connected to a local model server")]
  NotConnected,

  /// The configured server URL cannot be used
  #[error("Invalid server URL: {0}")]
  InvalidUrl(String),

  /// Server API error
  #[error("Model server error: {0}")]
  ApiError(String),

  /// Invalid response from the server
  #[error("Invalid response: {0}")]
  InvalidResponse(String),

  /// Model is unknown to the server
  #[error("Model not found: {0}")]
  ModelNotFound(String),

  /// Network error
  #[error("Network error: {0}")]
  NetworkError(#[from] reqwest::Error),

  /// JSON parse error
  #[error("JSON parse error: {0}")]
  JsonError(#[from] serde_json::Error),

  /// Streaming error
  #[error("Streaming error: {0}")]
  StreamError(String),
}

/// Alias for Result<T, ModelError>
pub type Result<T> = std::result::Result<T, ModelError>;
