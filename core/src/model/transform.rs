//! Host/server message transformation layer.
//!
//! - Request mapping from host chat messages and tool definitions to the
//!   server's chat history records
//! - Streamed chunk mapping back to host response parts
//! - Model listing mapping to host model descriptions

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use super::types::{
  ChatChunk, ChatRequest, ModelShow, ServerFunction, ServerFunctionCall, ServerMessage,
  ServerModel, ServerRole, ServerTool, ServerToolCall,
};
use crate::host::{
  ChatMessage, ChatModelInformation, ChatRequestOptions, ChatRole, ChatToolDefinition,
  MessagePart, ModelCapabilities, ResponsePart, ToolCallPart, ToolMode,
};

/// Limits assumed when the server does not report them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDefaults {
  pub context_length: u32,
  pub max_output_tokens: u32,
}

impl Default for ModelDefaults {
  fn default() -> Self {
    Self {
      context_length: 8192,
      max_output_tokens: 4096,
    }
  }
}

// =============================================================================
// Host -> server
// =============================================================================

/// Build a streaming chat request for `model`.
///
/// Tools are only attached when `with_tools` is set; servers reject tool
/// definitions for models without tool support.
pub fn build_chat_request(
  model: &str,
  messages: &[ChatMessage],
  options: &ChatRequestOptions,
  with_tools: bool,
  keep_alive: Option<String>,
) -> ChatRequest {
  let mut server_messages = to_server_messages(messages);
  let tools = if with_tools {
    to_server_tools(&options.tools)
  } else {
    Vec::new()
  };

  if let Some(instruction) = tool_mode_instruction(options.tool_mode, &tools) {
    server_messages.push(instruction);
  }

  ChatRequest {
    model: model.to_string(),
    messages: server_messages,
    tools,
    stream: true,
    options: to_server_options(&options.model_options),
    keep_alive,
  }
}

/// Convert host chat history into server records.
///
/// Tool results become their own tool-role records, emitted ahead of the
/// remaining content of the message that carried them. A message that maps
/// to nothing becomes an empty text record so the turn structure survives.
pub fn to_server_messages(messages: &[ChatMessage]) -> Vec<ServerMessage> {
  let mut out = Vec::with_capacity(messages.len());
  let mut call_names: HashMap<String, String> = HashMap::new();

  for message in messages {
    let role = match message.role {
      ChatRole::User => ServerRole::User,
      ChatRole::Assistant => ServerRole::Assistant,
    };

    let mut record = ServerMessage::new(role, String::new());
    let mut tool_results = Vec::new();

    for part in &message.content {
      match part {
        MessagePart::Text { value } => record.content.push_str(value),
        MessagePart::ToolCall(call) => {
          call_names.insert(call.call_id.clone(), call.name.clone());
          record.tool_calls.push(ServerToolCall {
            id: Some(call.call_id.clone()),
            function: ServerFunctionCall {
              name: call.name.clone(),
              arguments: call.input.clone(),
            },
          });
        }
        MessagePart::ToolResult(result) => {
          let tool_name = call_names.get(&result.call_id).cloned();
          tool_results.push(ServerMessage::tool(tool_name, result.text()));
        }
        MessagePart::Data { mime_type, data } => {
          if mime_type.starts_with("image/") {
            record.images.push(BASE64.encode(data));
          } else {
            tracing::debug!("Skipping unsupported data part ({})", mime_type);
          }
        }
        MessagePart::Unknown(_) => {}
      }
    }

    let has_content =
      !record.content.is_empty() || !record.images.is_empty() || !record.tool_calls.is_empty();
    let has_results = !tool_results.is_empty();

    out.extend(tool_results);
    if has_content || !has_results {
      out.push(record);
    }
  }

  out
}

/// Convert host tool definitions into server function tools
pub fn to_server_tools(tools: &[ChatToolDefinition]) -> Vec<ServerTool> {
  tools
    .iter()
    .map(|tool| {
      ServerTool::function(ServerFunction {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: tool
          .input_schema
          .clone()
          .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
      })
    })
    .collect()
}

/// System instruction forcing a tool call, for servers without a tool-choice
/// parameter
pub fn tool_mode_instruction(mode: ToolMode, tools: &[ServerTool]) -> Option<ServerMessage> {
  if mode != ToolMode::Required || tools.is_empty() {
    return None;
  }

  let instruction = match tools {
    [only] => format!(
      "You must respond by calling the `{}` tool.",
      only.function.name
    ),
    _ => {
      let names: Vec<String> = tools
        .iter()
        .map(|t| format!("`{}`", t.function.name))
        .collect();
      format!(
        "You must respond by calling one of these tools: {}.",
        names.join(", ")
      )
    }
  };
  Some(ServerMessage::system(instruction))
}

/// Map host model options onto server sampling options.
///
/// Output length aliases become `num_predict`; everything else passes through.
pub fn to_server_options(model_options: &Map<String, Value>) -> Map<String, Value> {
  let mut options = Map::new();
  for (key, value) in model_options {
    let mapped = match key.as_str() {
      "max_tokens" | "maxTokens" | "max_output_tokens" | "maxOutputTokens" => "num_predict",
      "topP" => "top_p",
      "topK" => "top_k",
      other => other,
    };
    options.insert(mapped.to_string(), value.clone());
  }
  options
}

// =============================================================================
// Server -> host
// =============================================================================

/// Convert one streamed chunk into response parts
pub fn to_response_parts(chunk: &ChatChunk) -> Vec<ResponsePart> {
  let mut parts = Vec::new();

  if !chunk.content().is_empty() {
    parts.push(ResponsePart::Text {
      value: chunk.content().to_string(),
    });
  }

  for call in chunk.tool_calls() {
    let call_id = call
      .id
      .clone()
      .filter(|id| !id.is_empty())
      .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
    parts.push(ResponsePart::ToolCall(ToolCallPart {
      call_id,
      name: call.function.name.clone(),
      input: normalize_arguments(&call.function.arguments),
    }));
  }

  parts
}

/// Tool arguments as a JSON value; string-encoded arguments are parsed
fn normalize_arguments(arguments: &Value) -> Value {
  match arguments {
    Value::Null => json!({}),
    Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|_| json!({ "raw": raw })),
    other => other.clone(),
  }
}

/// Describe a server model for the host's model picker
pub fn to_model_information(
  model: &ServerModel,
  show: Option<&ModelShow>,
  defaults: ModelDefaults,
) -> ChatModelInformation {
  let details = &model.details;

  let family = if details.family.is_empty() {
    model
      .name
      .split(':')
      .next()
      .unwrap_or(&model.name)
      .to_string()
  } else {
    details.family.clone()
  };

  let version = [
    details.parameter_size.as_str(),
    details.quantization_level.as_str(),
  ]
  .iter()
  .filter(|s| !s.is_empty())
  .copied()
  .collect::<Vec<_>>()
  .join(" ");
  let version = if !version.is_empty() {
    version
  } else if !model.digest.is_empty() {
    model.digest.chars().take(12).collect()
  } else {
    "latest".to_string()
  };

  let context_length = show
    .and_then(ModelShow::context_length)
    .unwrap_or(defaults.context_length);
  let max_output_tokens = defaults.max_output_tokens.min(context_length / 2);
  let max_input_tokens = context_length - max_output_tokens;

  let capabilities = ModelCapabilities {
    tool_calling: show.is_some_and(|s| s.supports("tools")),
    image_input: show.is_some_and(|s| s.supports("vision")),
  };

  let mut tooltip = format!("{} ({})", model.name, version);
  if model.size > 0 {
    tooltip.push_str(&format!(", {}", format_size(model.size)));
  }

  let detail = model
    .modified_at
    .as_deref()
    .and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
    .map(|dt| format!("Updated {}", dt.format("%Y-%m-%d")));

  ChatModelInformation {
    id: model.name.clone(),
    name: model.name.clone(),
    family,
    version,
    tooltip: Some(tooltip),
    detail,
    max_input_tokens,
    max_output_tokens,
    capabilities,
  }
}

fn format_size(bytes: u64) -> String {
  const GB: f64 = 1_000_000_000.0;
  const MB: f64 = 1_000_000.0;
  let bytes = bytes as f64;
  if bytes >= GB {
    format!("{:.1} GB", bytes / GB)
  } else {
    format!("{:.0} MB", bytes / MB)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::host::{ToolResultContent, ToolResultPart};
  use crate::model::types::{ChunkMessage, ModelDetails};
  use pretty_assertions::assert_eq;

  fn tool_call(call_id: &str, name: &str, input: Value) -> MessagePart {
    MessagePart::ToolCall(ToolCallPart {
      call_id: call_id.to_string(),
      name: name.to_string(),
      input,
    })
  }

  fn tool_result(call_id: &str, texts: &[&str]) -> MessagePart {
    MessagePart::ToolResult(ToolResultPart {
      call_id: call_id.to_string(),
      content: texts
        .iter()
        .map(|t| ToolResultContent::Text {
          value: t.to_string(),
        })
        .collect(),
    })
  }

  #[test]
  fn test_text_parts_are_concatenated() {
    let messages = vec![ChatMessage::new(
      ChatRole::User,
      vec![MessagePart::text("Hello, "), MessagePart::text("world")],
    )];
    let records = to_server_messages(&messages);
    assert_eq!(records, vec![ServerMessage::new(ServerRole::User, "Hello, world")]);
  }

  #[test]
  fn test_tool_result_becomes_tool_record_with_concatenated_text() {
    let messages = vec![
      ChatMessage::new(
        ChatRole::Assistant,
        vec![tool_call("call_1", "get_weather", json!({ "city": "Oslo" }))],
      ),
      ChatMessage::new(
        ChatRole::User,
        vec![tool_result("call_1", &["Sunny, ", "21C"])],
      ),
    ];

    let records = to_server_messages(&messages);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].role, ServerRole::Assistant);
    assert_eq!(records[0].tool_calls[0].id.as_deref(), Some("call_1"));
    assert_eq!(
      records[0].tool_calls[0].function.arguments,
      json!({ "city": "Oslo" })
    );
    assert_eq!(
      records[1],
      ServerMessage::tool(Some("get_weather".to_string()), "Sunny, 21C")
    );
  }

  #[test]
  fn test_tool_results_precede_remaining_text() {
    let messages = vec![ChatMessage::new(
      ChatRole::User,
      vec![
        MessagePart::text("Now summarize."),
        tool_result("unknown_call", &["42"]),
      ],
    )];
    let records = to_server_messages(&messages);
    assert_eq!(
      records,
      vec![
        ServerMessage::tool(None, "42"),
        ServerMessage::new(ServerRole::User, "Now summarize."),
      ]
    );
  }

  #[test]
  fn test_unrecognized_message_falls_back_to_empty_text() {
    let messages = vec![ChatMessage::new(
      ChatRole::Assistant,
      vec![MessagePart::Unknown(json!({ "type": "thinking" }))],
    )];
    let records = to_server_messages(&messages);
    assert_eq!(records, vec![ServerMessage::new(ServerRole::Assistant, "")]);
  }

  #[test]
  fn test_image_data_is_base64_encoded() {
    let messages = vec![ChatMessage::new(
      ChatRole::User,
      vec![
        MessagePart::text("What is this?"),
        MessagePart::Data {
          mime_type: "image/png".to_string(),
          data: vec![1, 2, 3],
        },
        MessagePart::Data {
          mime_type: "application/pdf".to_string(),
          data: vec![9],
        },
      ],
    )];
    let records = to_server_messages(&messages);
    assert_eq!(records[0].images, vec!["AQID".to_string()]);
  }

  #[test]
  fn test_tool_definitions_get_default_schema() {
    let tools = to_server_tools(&[ChatToolDefinition {
      name: "now".to_string(),
      description: "Current time".to_string(),
      input_schema: None,
    }]);
    assert_eq!(
      serde_json::to_value(&tools).expect("json"),
      json!([{
        "type": "function",
        "function": {
          "name": "now",
          "description": "Current time",
          "parameters": { "type": "object", "properties": {} }
        }
      }])
    );
  }

  #[test]
  fn test_required_tool_mode_adds_instruction() {
    let options = ChatRequestOptions {
      tools: vec![ChatToolDefinition {
        name: "search".to_string(),
        description: String::new(),
        input_schema: Some(json!({ "type": "object" })),
      }],
      tool_mode: ToolMode::Required,
      model_options: Map::new(),
    };
    let request = build_chat_request(
      "llama3.2",
      &[ChatMessage::user("find rust crates")],
      &options,
      true,
      None,
    );
    let last = request.messages.last().expect("instruction");
    assert_eq!(last.role, ServerRole::System);
    assert!(last.content.contains("`search`"));

    let without_tools = build_chat_request(
      "llama3.2",
      &[ChatMessage::user("find rust crates")],
      &options,
      false,
      None,
    );
    assert!(without_tools.tools.is_empty());
    assert_eq!(without_tools.messages.len(), 1);
  }

  #[test]
  fn test_required_tool_mode_lists_every_tool() {
    let tools = to_server_tools(&[
      ChatToolDefinition {
        name: "search".to_string(),
        description: String::new(),
        input_schema: None,
      },
      ChatToolDefinition {
        name: "read_file".to_string(),
        description: String::new(),
        input_schema: None,
      },
    ]);

    let instruction = tool_mode_instruction(ToolMode::Required, &tools).expect("instruction");
    assert_eq!(instruction.role, ServerRole::System);
    assert_eq!(
      instruction.content,
      "You must respond by calling one of these tools: `search`, `read_file`."
    );

    assert!(tool_mode_instruction(ToolMode::Auto, &tools).is_none());
    assert!(tool_mode_instruction(ToolMode::Required, &[]).is_none());
  }

  #[test]
  fn test_model_options_mapping() {
    let mut model_options = Map::new();
    model_options.insert("temperature".to_string(), json!(0.2));
    model_options.insert("maxTokens".to_string(), json!(256));
    model_options.insert("mirostat".to_string(), json!(1));
    let options = to_server_options(&model_options);
    assert_eq!(options.get("num_predict"), Some(&json!(256)));
    assert_eq!(options.get("temperature"), Some(&json!(0.2)));
    assert_eq!(options.get("mirostat"), Some(&json!(1)));
    assert!(!options.contains_key("maxTokens"));
  }

  #[test]
  fn test_chunk_to_response_parts() {
    let chunk = ChatChunk {
      message: ChunkMessage {
        content: "Let me check.".to_string(),
        thinking: None,
        tool_calls: vec![
          ServerToolCall {
            id: Some("srv_1".to_string()),
            function: ServerFunctionCall {
              name: "lookup".to_string(),
              arguments: json!({ "id": 7 }),
            },
          },
          ServerToolCall {
            id: None,
            function: ServerFunctionCall {
              name: "lookup".to_string(),
              arguments: json!("{\"id\": 8}"),
            },
          },
        ],
      },
      ..Default::default()
    };

    let parts = to_response_parts(&chunk);
    assert_eq!(parts.len(), 3);
    assert_eq!(
      parts[0],
      ResponsePart::Text {
        value: "Let me check.".to_string()
      }
    );
    match (&parts[1], &parts[2]) {
      (ResponsePart::ToolCall(first), ResponsePart::ToolCall(second)) => {
        assert_eq!(first.call_id, "srv_1");
        assert_eq!(first.input, json!({ "id": 7 }));
        assert!(second.call_id.starts_with("call_"));
        assert_eq!(second.input, json!({ "id": 8 }));
      }
      other => panic!("unexpected parts: {other:?}"),
    }
  }

  #[test]
  fn test_unparseable_string_arguments_are_wrapped() {
    assert_eq!(
      normalize_arguments(&json!("not json")),
      json!({ "raw": "not json" })
    );
    assert_eq!(normalize_arguments(&Value::Null), json!({}));
  }

  #[test]
  fn test_model_information_from_listing_and_show() {
    let model = ServerModel {
      name: "qwen2.5-coder:7b".to_string(),
      model: "qwen2.5-coder:7b".to_string(),
      modified_at: Some("2024-11-12T09:30:00.123456789Z".to_string()),
      size: 4_683_087_332,
      digest: "2b0496514337a3d5".to_string(),
      details: ModelDetails {
        family: "qwen2".to_string(),
        parameter_size: "7.6B".to_string(),
        quantization_level: "Q4_K_M".to_string(),
        ..Default::default()
      },
    };
    let show: ModelShow = serde_json::from_value(json!({
      "capabilities": ["completion", "tools"],
      "model_info": { "general.architecture": "qwen2", "qwen2.context_length": 32768 }
    }))
    .expect("show");

    let info = to_model_information(&model, Some(&show), ModelDefaults::default());
    assert_eq!(info.id, "qwen2.5-coder:7b");
    assert_eq!(info.family, "qwen2");
    assert_eq!(info.version, "7.6B Q4_K_M");
    assert_eq!(info.max_output_tokens, 4096);
    assert_eq!(info.max_input_tokens, 32768 - 4096);
    assert_eq!(
      info.capabilities,
      ModelCapabilities {
        tool_calling: true,
        image_input: false
      }
    );
    assert_eq!(info.detail.as_deref(), Some("Updated 2024-11-12"));
    assert_eq!(info.tooltip.as_deref(), Some("qwen2.5-coder:7b (7.6B Q4_K_M), 4.7 GB"));
  }

  #[test]
  fn test_model_information_without_show_uses_defaults() {
    let model = ServerModel {
      name: "tinyllama:latest".to_string(),
      digest: "abcdef0123456789".to_string(),
      ..Default::default()
    };
    let defaults = ModelDefaults {
      context_length: 2048,
      max_output_tokens: 4096,
    };
    let info = to_model_information(&model, None, defaults);
    assert_eq!(info.family, "tinyllama");
    assert_eq!(info.version, "abcdef012345");
    assert_eq!(info.max_output_tokens, 1024);
    assert_eq!(info.max_input_tokens, 1024);
    assert!(!info.capabilities.tool_calling);
    assert_eq!(info.detail, None);
  }
}
