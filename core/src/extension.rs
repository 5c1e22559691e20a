//! Extension activation
//!
//! Wires the local model provider into a [Host]: one chat provider, one
//! refresh command and one configuration key for the server URL.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::{info, warn};

use lmbridge_config::Config;

use crate::host::{CommandHandler, Host};
use crate::provider::{LocalModelProvider, ProviderSettings, Result};

/// Vendor id the provider is registered under
pub const VENDOR: &str = "ollama";

/// Configuration key holding the model server URL
pub const SERVER_URL_KEY: &str = "lmbridge.serverUrl";

/// Command that re-lists the server's models
pub const REFRESH_COMMAND: &str = "lmbridge.refreshModels";

/// Active extension instance
pub struct Extension {
  host: Weak<dyn Host>,
  provider: Arc<LocalModelProvider>,
  fallback_url: String,
}

impl Extension {
  /// Provider registered with the host
  pub fn provider(&self) -> &Arc<LocalModelProvider> {
    &self.provider
  }

  /// Re-read the server URL when its setting changed
  pub async fn on_configuration_changed(&self, key: &str) {
    if key != SERVER_URL_KEY {
      return;
    }
    let Some(host) = self.host.upgrade() else {
      return;
    };

    let url = resolve_server_url(host.as_ref(), &self.fallback_url);
    info!("Server URL changed to {}", url);
    if let Err(err) = self.provider.connect(&url).await {
      host.show_error_message(&format!("Invalid model server URL: {err}"));
      return;
    }
    self.provider.refresh_models(false).await;
  }

  /// Release the server connection
  pub async fn deactivate(&self) {
    info!("Deactivating local model provider");
    self.provider.disconnect().await;
  }
}

/// Activate the extension against `host`.
///
/// A bad URL or an unreachable server does not fail activation; the user is
/// notified and the provider offers no models until the next refresh.
pub async fn activate(host: Arc<dyn Host>, config: &Config) -> Result<Extension> {
  let url = resolve_server_url(host.as_ref(), &config.server.url);
  let provider = Arc::new(LocalModelProvider::new(
    VENDOR,
    &host,
    ProviderSettings::from(config),
  ));

  if let Err(err) = provider.connect(&url).await {
    warn!("Activation without a server connection: {}", err);
    host.show_error_message(&format!("Invalid model server URL: {err}"));
  }

  host.register_chat_provider(VENDOR, provider.clone());
  host.register_command(
    REFRESH_COMMAND,
    Arc::new(RefreshModelsCommand {
      host: Arc::downgrade(&host),
      provider: Arc::clone(&provider),
    }),
  );

  provider.refresh_models(true).await;

  Ok(Extension {
    host: Arc::downgrade(&host),
    provider,
    fallback_url: config.server.url.clone(),
  })
}

/// The host setting wins over the loaded configuration
fn resolve_server_url(host: &dyn Host, fallback: &str) -> String {
  host
    .configuration_value(SERVER_URL_KEY)
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
    .unwrap_or_else(|| fallback.to_string())
}

/// Handler behind [REFRESH_COMMAND]
struct RefreshModelsCommand {
  host: Weak<dyn Host>,
  provider: Arc<LocalModelProvider>,
}

#[async_trait]
impl CommandHandler for RefreshModelsCommand {
  async fn execute(&self) -> Result<()> {
    let models = self.provider.refresh_models(false).await;
    if let Some(host) = self.host.upgrade() {
      host.show_information_message(&format!("Found {} local model(s)", models.len()));
    }
    Ok(())
  }
}
