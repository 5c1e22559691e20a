//! Streaming helpers for newline-delimited JSON responses.

use serde_json::Value;

use super::error::{ModelError, Result};
use super::types::ChatChunk;

/// Stateful NDJSON streaming parser.
///
/// Byte chunks from the transport line up neither with record boundaries nor
/// with UTF-8 character boundaries, so bytes are buffered until a newline
/// completes a record.
#[derive(Debug, Default)]
pub struct NdjsonProcessor {
  buffer: Vec<u8>,
}

impl NdjsonProcessor {
  pub fn new() -> Self {
    Self::default()
  }

  /// Feeds one text segment and returns the chunks completed by it.
  pub fn push_text(&mut self, text: &str) -> Vec<Result<ChatChunk>> {
    self.push_bytes(text.as_bytes())
  }

  /// Feeds raw bytes and returns the chunks completed by them.
  pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<Result<ChatChunk>> {
    self.buffer.extend_from_slice(bytes);
    self.drain_lines()
  }

  /// Flushes the remaining buffer.
  pub fn finish(&mut self) -> Vec<Result<ChatChunk>> {
    let remaining = std::mem::take(&mut self.buffer);
    parse_line(&remaining).into_iter().collect()
  }

  fn drain_lines(&mut self) -> Vec<Result<ChatChunk>> {
    let mut chunks = Vec::new();
    while let Some(idx) = self.buffer.iter().position(|b| *b == b'\n') {
      let line: Vec<u8> = self.buffer.drain(..=idx).collect();
      if let Some(chunk) = parse_line(&line) {
        chunks.push(chunk);
      }
    }
    chunks
  }
}

fn parse_line(raw: &[u8]) -> Option<Result<ChatChunk>> {
  let text = String::from_utf8_lossy(raw);
  let line = text.trim();
  if line.is_empty() {
    return None;
  }

  let value = match serde_json::from_str::<Value>(line) {
    Ok(value) => value,
    Err(e) => {
      return Some(Err(ModelError::StreamError(format!(
        "malformed stream record: {e}"
      ))));
    }
  };

  if let Some(error) = value.get("error") {
    let message = error
      .as_str()
      .map(ToString::to_string)
      .unwrap_or_else(|| error.to_string());
    return Some(Err(ModelError::ApiError(message)));
  }

  Some(serde_json::from_value(value).map_err(ModelError::from))
}
