//! Host editor contract
//!
//! Everything the bridge needs from, and offers to, the editor that embeds
//! it:
//! - [ChatProvider]: what the editor calls to use local models
//! - [Host]: registration, notifications and configuration the editor provides
//! - [types]: the editor's chat message and model shapes

pub mod provider;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;

pub use provider::{ChatProvider, ResponseProgress};
pub use types::*;

/// Action run when the user invokes a registered command
#[async_trait]
pub trait CommandHandler: Send + Sync {
  async fn execute(&self) -> crate::provider::Result<()>;
}

/// Editor services available to the extension
pub trait Host: Send + Sync {
  /// Makes `provider` available in the chat UI under `vendor`
  fn register_chat_provider(&self, vendor: &str, provider: Arc<dyn ChatProvider>);

  /// Binds a user-invokable command
  fn register_command(&self, id: &str, handler: Arc<dyn CommandHandler>);

  /// Shows an informational notification
  fn show_information_message(&self, message: &str);

  /// Shows an error notification
  fn show_error_message(&self, message: &str);

  /// Reads a string setting
  fn configuration_value(&self, key: &str) -> Option<String>;

  /// Tells the chat UI to re-query the models offered by `vendor`
  fn notify_model_information_changed(&self, vendor: &str);
}
