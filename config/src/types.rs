// Configuration Types
// All configuration type definitions

use serde::{Deserialize, Serialize};

/// Default Ollama endpoint
pub const DEFAULT_SERVER_URL: &str = "http://localhost:11434";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Model server connection
  pub server: ServerConfig,
  /// Chat defaults applied to discovered models
  pub chat: ChatConfig,
}

// ============================================================================
// SERVER CONFIGURATION
// ============================================================================

/// Model server connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  /// Base URL of the local model server
  pub url: String,
  /// Request timeout in seconds; local models can be slow to load
  pub request_timeout_secs: u64,
  /// How long the server keeps a model loaded after a request (e.g. "5m")
  #[serde(skip_serializing_if = "Option::is_none")]
  pub keep_alive: Option<String>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      url: DEFAULT_SERVER_URL.to_string(),
      request_timeout_secs: 600,
      keep_alive: None,
    }
  }
}

// ============================================================================
// CHAT CONFIGURATION
// ============================================================================

/// Defaults used when the server does not report model limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
  /// Context window assumed when the server does not report one
  pub default_context_length: u32,
  /// Output budget reserved out of the context window
  pub default_max_output_tokens: u32,
}

impl Default for ChatConfig {
  fn default() -> Self {
    Self {
      default_context_length: 8192,
      default_max_output_tokens: 4096,
    }
  }
}
