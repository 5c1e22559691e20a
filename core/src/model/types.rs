//! Model layer types
//!
//! Wire types for the local model server: model listings, chat history
//! records, tool definitions and streamed chunks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Model returned by the server's listing endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerModel {
  /// Model name, including the tag (e.g. "llama3.2:latest")
  pub name: String,

  /// Model identifier; usually equal to `name`
  #[serde(default)]
  pub model: String,

  /// Last modification timestamp (RFC 3339)
  #[serde(default)]
  pub modified_at: Option<String>,

  /// Size on disk in bytes
  #[serde(default)]
  pub size: u64,

  /// Content digest
  #[serde(default)]
  pub digest: String,

  /// Model details
  #[serde(default)]
  pub details: ModelDetails,
}

/// Model details as reported in listings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
  #[serde(default)]
  pub format: String,
  #[serde(default)]
  pub family: String,
  #[serde(default)]
  pub families: Option<Vec<String>>,
  #[serde(default)]
  pub parameter_size: String,
  #[serde(default)]
  pub quantization_level: String,
}

/// Response of the model detail endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelShow {
  /// Capabilities such as "completion", "tools", "vision"
  #[serde(default)]
  pub capabilities: Vec<String>,

  /// Modelfile parameters, one `key value` pair per line
  #[serde(default)]
  pub parameters: String,

  /// Architecture metadata (GGUF keys)
  #[serde(default)]
  pub model_info: Map<String, Value>,

  #[serde(default)]
  pub details: ModelDetails,
}

impl ModelShow {
  /// Whether the server advertises the given capability
  pub fn supports(&self, capability: &str) -> bool {
    self.capabilities.iter().any(|c| c == capability)
  }

  /// Effective context window.
  ///
  /// A `num_ctx` parameter configured on the model wins over the trained
  /// context length from the architecture metadata.
  pub fn context_length(&self) -> Option<u32> {
    let configured = self.parameters.lines().find_map(|line| {
      let mut parts = line.split_whitespace();
      match (parts.next(), parts.next()) {
        (Some("num_ctx"), Some(value)) => value.parse::<u32>().ok(),
        _ => None,
      }
    });
    if configured.is_some() {
      return configured;
    }

    let architecture = self
      .model_info
      .get("general.architecture")
      .and_then(Value::as_str);
    if let Some(arch) = architecture {
      if let Some(len) = self
        .model_info
        .get(&format!("{arch}.context_length"))
        .and_then(Value::as_u64)
      {
        return u32::try_from(len).ok();
      }
    }

    self
      .model_info
      .iter()
      .find(|(key, _)| key.ends_with(".context_length"))
      .and_then(|(_, value)| value.as_u64())
      .and_then(|len| u32::try_from(len).ok())
  }
}

/// Role of a chat history record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
  System,
  User,
  Assistant,
  Tool,
}

/// Chat history record in the server's format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
  pub role: ServerRole,

  #[serde(default)]
  pub content: String,

  /// Base64-encoded images
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub images: Vec<String>,

  /// Tool calls made by the assistant
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tool_calls: Vec<ServerToolCall>,

  /// Name of the tool a tool-role record answers
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tool_name: Option<String>,
}

impl ServerMessage {
  /// Create a plain text record
  pub fn new(role: ServerRole, content: impl Into<String>) -> Self {
    Self {
      role,
      content: content.into(),
      images: Vec::new(),
      tool_calls: Vec::new(),
      tool_name: None,
    }
  }

  /// Create a system record
  pub fn system(content: impl Into<String>) -> Self {
    Self::new(ServerRole::System, content)
  }

  /// Create a tool result record
  pub fn tool(tool_name: Option<String>, content: impl Into<String>) -> Self {
    Self {
      tool_name,
      ..Self::new(ServerRole::Tool, content)
    }
  }
}

/// Tool call made by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerToolCall {
  /// Call id; older servers do not send one
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,

  pub function: ServerFunctionCall,
}

/// Function invocation inside a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFunctionCall {
  pub name: String,

  /// Arguments; normally an object, some models send a JSON string
  #[serde(default)]
  pub arguments: Value,
}

/// Tool definition passed to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerTool {
  /// Tool type (currently only "function")
  #[serde(rename = "type")]
  pub tool_type: String,

  pub function: ServerFunction,
}

impl ServerTool {
  /// Create a function tool
  pub fn function(function: ServerFunction) -> Self {
    Self {
      tool_type: "function".to_string(),
      function,
    }
  }
}

/// Function definition for a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFunction {
  pub name: String,

  #[serde(default)]
  pub description: String,

  /// JSON schema for the function parameters
  #[serde(default)]
  pub parameters: Value,
}

/// Chat request body
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatRequest {
  pub model: String,

  pub messages: Vec<ServerMessage>,

  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub tools: Vec<ServerTool>,

  pub stream: bool,

  /// Sampling options (temperature, num_predict, ...)
  #[serde(skip_serializing_if = "Map::is_empty")]
  pub options: Map<String, Value>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub keep_alive: Option<String>,
}

/// One streamed chat chunk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChunk {
  #[serde(default)]
  pub model: Option<String>,

  #[serde(default)]
  pub message: ChunkMessage,

  #[serde(default)]
  pub done: bool,

  #[serde(default)]
  pub done_reason: Option<String>,

  #[serde(default)]
  pub prompt_eval_count: Option<u32>,

  #[serde(default)]
  pub eval_count: Option<u32>,
}

/// Message delta carried by a chunk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkMessage {
  #[serde(default)]
  pub content: String,

  /// Reasoning text from thinking models
  #[serde(default)]
  pub thinking: Option<String>,

  #[serde(default)]
  pub tool_calls: Vec<ServerToolCall>,
}

impl ChatChunk {
  /// Text delta of this chunk
  pub fn content(&self) -> &str {
    &self.message.content
  }

  /// Tool calls carried by this chunk
  pub fn tool_calls(&self) -> &[ServerToolCall] {
    &self.message.tool_calls
  }

  /// Token usage, present on the final chunk
  pub fn usage(&self) -> Option<Usage> {
    if self.prompt_eval_count.is_none() && self.eval_count.is_none() {
      return None;
    }
    let input_tokens = self.prompt_eval_count.unwrap_or(0);
    let output_tokens = self.eval_count.unwrap_or(0);
    Some(Usage {
      input_tokens,
      output_tokens,
      total_tokens: input_tokens + output_tokens,
    })
  }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
  pub input_tokens: u32,
  pub output_tokens: u32,
  pub total_tokens: u32,
}
