//! Host chat types
//!
//! Messages, parts, tool definitions and model descriptions as the host
//! editor's chat-provider contract defines them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Author of a chat message. The host has no system role; instructions
/// arrive as user messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
  User,
  Assistant,
}

/// One message of the chat history the host hands to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub role: ChatRole,

  /// Optional participant name
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,

  pub content: Vec<MessagePart>,
}

impl ChatMessage {
  /// Create a message from parts
  pub fn new(role: ChatRole, content: Vec<MessagePart>) -> Self {
    Self {
      role,
      name: None,
      content,
    }
  }

  /// Create a user message with a single text part
  pub fn user(text: impl Into<String>) -> Self {
    Self::new(ChatRole::User, vec![MessagePart::text(text)])
  }

  /// Create an assistant message with a single text part
  pub fn assistant(text: impl Into<String>) -> Self {
    Self::new(ChatRole::Assistant, vec![MessagePart::text(text)])
  }

  /// All text carried by the message, including tool call inputs and tool
  /// results, joined in order
  pub fn flattened_text(&self) -> String {
    let mut out = String::new();
    for part in &self.content {
      match part {
        MessagePart::Text { value } => out.push_str(value),
        MessagePart::ToolCall(call) => {
          out.push_str(&call.name);
          out.push_str(&call.input.to_string());
        }
        MessagePart::ToolResult(result) => out.push_str(&result.text()),
        MessagePart::Data { .. } | MessagePart::Unknown(_) => {}
      }
    }
    out
  }
}

/// Content part of a host chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
  /// Plain text
  Text { value: String },

  /// A tool invocation previously emitted by the model
  ToolCall(ToolCallPart),

  /// The outcome of running a tool
  ToolResult(ToolResultPart),

  /// Binary payload such as an image
  Data {
    mime_type: String,
    #[serde(default)]
    data: Vec<u8>,
  },

  /// Anything this adapter does not understand
  #[serde(untagged)]
  Unknown(Value),
}

impl MessagePart {
  /// Create a text part
  pub fn text(value: impl Into<String>) -> Self {
    MessagePart::Text {
      value: value.into(),
    }
  }
}

/// Tool call part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPart {
  pub call_id: String,
  pub name: String,
  #[serde(default)]
  pub input: Value,
}

/// Tool result part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultPart {
  pub call_id: String,
  #[serde(default)]
  pub content: Vec<ToolResultContent>,
}

impl ToolResultPart {
  /// Concatenated text of the result
  pub fn text(&self) -> String {
    self
      .content
      .iter()
      .filter_map(|item| match item {
        ToolResultContent::Text { value } => Some(value.as_str()),
        ToolResultContent::Unknown(_) => None,
      })
      .collect()
  }
}

/// Content item inside a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultContent {
  Text {
    value: String,
  },
  #[serde(untagged)]
  Unknown(Value),
}

/// Part streamed back to the host while a response is produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePart {
  Text { value: String },
  ToolCall(ToolCallPart),
}

/// Tool the host offers the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatToolDefinition {
  pub name: String,
  #[serde(default)]
  pub description: String,
  /// JSON schema of the tool input
  #[serde(default)]
  pub input_schema: Option<Value>,
}

/// Whether the model may or must call a tool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMode {
  #[default]
  Auto,
  Required,
}

/// Options the host attaches to a chat request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequestOptions {
  #[serde(default)]
  pub tools: Vec<ChatToolDefinition>,
  #[serde(default)]
  pub tool_mode: ToolMode,
  /// Free-form model options (temperature, max tokens, ...)
  #[serde(default)]
  pub model_options: Map<String, Value>,
}

/// Options for model discovery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelQueryOptions {
  /// Suppress user-facing notifications
  pub silent: bool,
}

/// What a model can do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
  pub tool_calling: bool,
  pub image_input: bool,
}

/// Model description shown in the host's model picker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatModelInformation {
  pub id: String,
  pub name: String,
  pub family: String,
  pub version: String,
  #[serde(default)]
  pub tooltip: Option<String>,
  #[serde(default)]
  pub detail: Option<String>,
  pub max_input_tokens: u32,
  pub max_output_tokens: u32,
  pub capabilities: ModelCapabilities,
}

/// Input of a token count request
#[derive(Debug, Clone, PartialEq)]
pub enum TokenCountInput {
  Text(String),
  Message(ChatMessage),
}

impl TokenCountInput {
  /// Text whose tokens are counted
  pub fn text(&self) -> String {
    match self {
      TokenCountInput::Text(text) => text.clone(),
      TokenCountInput::Message(message) => message.flattened_text(),
    }
  }
}

impl From<&str> for TokenCountInput {
  fn from(text: &str) -> Self {
    TokenCountInput::Text(text.to_string())
  }
}

impl From<ChatMessage> for TokenCountInput {
  fn from(message: ChatMessage) -> Self {
    TokenCountInput::Message(message)
  }
}
