//! Model server implementations

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;

use super::error::{ModelError, Result};
use super::provider::{ChatStream, ModelServer};
use super::streaming::NdjsonProcessor;

pub mod ollama;

pub use ollama::OllamaServer;

/// Connect timeout; a local server that does not accept within this is down
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Validate `url` and build a connection to the model server behind it.
///
/// No request is made here; reachability shows up on the first call.
pub fn connect(url: &str, timeout_secs: Option<u64>) -> Result<Arc<dyn ModelServer>> {
  let base_url = validate_base_url(url)?;
  tracing::debug!("Connecting to model server at {}", base_url);
  Ok(Arc::new(OllamaServer::new(base_url, timeout_secs)))
}

/// Normalizes a server URL, accepting only http(s) with a host
pub fn validate_base_url(url: &str) -> Result<String> {
  let trimmed = url.trim();
  if trimmed.is_empty() {
    return Err(ModelError::InvalidUrl("server URL is empty".to_string()));
  }

  let parsed =
    url::Url::parse(trimmed).map_err(|e| ModelError::InvalidUrl(format!("{trimmed}: {e}")))?;
  if !matches!(parsed.scheme(), "http" | "https") {
    return Err(ModelError::InvalidUrl(format!(
      "{trimmed}: unsupported scheme '{}'",
      parsed.scheme()
    )));
  }
  if parsed.host_str().is_none() {
    return Err(ModelError::InvalidUrl(format!("{trimmed}: missing host")));
  }

  Ok(trimmed.trim_end_matches('/').to_string())
}

// =============================================================================
// Helper functions for servers
// =============================================================================

/// Create a default HTTP client for model servers
pub fn create_client(timeout: Option<u64>) -> Client {
  let timeout = Duration::from_secs(timeout.unwrap_or(120));

  Client::builder()
    .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
    .read_timeout(timeout)
    .build()
    .unwrap_or_else(|_| Client::new())
}

/// Turn a successful streaming HTTP response into a stream of parsed chunks.
///
/// Status handling is the caller's job; see `OllamaServer::chat_stream`.
pub fn create_chunk_stream(response: reqwest::Response) -> ChatStream {
  Box::pin(async_stream::stream! {
      let mut stream = response.bytes_stream();
      let mut processor = NdjsonProcessor::new();

      while let Some(item) = stream.next().await {
          match item {
              Ok(bytes) => {
                  for chunk in processor.push_bytes(&bytes) {
                      yield chunk;
                  }
              }
              Err(e) => {
                  yield Err(ModelError::StreamError(e.to_string()));
                  return;
              }
          }
      }

      for chunk in processor.finish() {
          yield chunk;
      }
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_validate_base_url_trims_trailing_slash() {
    assert_eq!(
      validate_base_url(" http://localhost:11434/ ").expect("valid"),
      "http://localhost:11434"
    );
  }

  #[test]
  fn test_validate_base_url_rejects_other_schemes() {
    assert!(matches!(
      validate_base_url("ws://localhost:1234"),
      Err(ModelError::InvalidUrl(_))
    ));
    assert!(matches!(validate_base_url(""), Err(ModelError::InvalidUrl(_))));
    assert!(matches!(
      validate_base_url("not a url"),
      Err(ModelError::InvalidUrl(_))
    ));
  }

  #[test]
  fn test_connect_returns_server_for_valid_url() {
    let server = connect("https://models.internal:8443", Some(30)).expect("server");
    assert_eq!(server.base_url(), "https://models.internal:8443");
    assert_eq!(server.server_name(), "Ollama");
  }
}
