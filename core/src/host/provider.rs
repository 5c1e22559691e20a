//! Chat provider contract
//!
//! The interface the host editor calls to discover models, stream
//! responses and count tokens.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::types::{
  ChatMessage, ChatModelInformation, ChatRequestOptions, ModelQueryOptions, ResponsePart,
  TokenCountInput,
};
use crate::provider::Result;

/// Sink for response parts as they are produced
pub trait ResponseProgress: Send + Sync {
  fn report(&self, part: ResponsePart);
}

impl ResponseProgress for mpsc::UnboundedSender<ResponsePart> {
  fn report(&self, part: ResponsePart) {
    // A closed receiver means the host stopped listening
    if self.send(part).is_err() {
      tracing::debug!("Dropping response part: receiver closed");
    }
  }
}

/// Chat provider registered with the host
#[async_trait]
pub trait ChatProvider: Send + Sync {
  /// Lists the models this provider offers
  async fn provide_model_information(
    &self,
    options: ModelQueryOptions,
    cancel: CancellationToken,
  ) -> Result<Vec<ChatModelInformation>>;

  /// Produces a response for `messages`, reporting parts through `progress`
  async fn provide_response(
    &self,
    model: &ChatModelInformation,
    messages: &[ChatMessage],
    options: &ChatRequestOptions,
    progress: &dyn ResponseProgress,
    cancel: CancellationToken,
  ) -> Result<()>;

  /// Counts the tokens of a string or message for `model`
  async fn provide_token_count(
    &self,
    model: &ChatModelInformation,
    input: &TokenCountInput,
    cancel: CancellationToken,
  ) -> Result<u32>;
}
