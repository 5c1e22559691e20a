//! Model server layer
//!
//! Talks to a local model server over its native HTTP API.
//!
//! Architecture:
//! - [ModelServer] trait: listing, describing, chatting and token counting
//! - [OllamaServer]: the Ollama implementation in [providers]
//! - [NdjsonProcessor]: incremental decoding of streamed chat records
//! - [transform]: conversion between host shapes and server wire shapes

pub mod error;
pub mod provider;
pub mod streaming;
pub mod transform;
pub mod types;

pub mod providers;

// Re-exports
pub use error::{ModelError, Result};
pub use provider::{ChatStream, ModelServer};
pub use providers::{OllamaServer, connect};
pub use streaming::NdjsonProcessor;
pub use transform::ModelDefaults;
pub use types::*;
