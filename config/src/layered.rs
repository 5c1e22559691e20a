// Layered Configuration
// Support for layered configuration with precedence

use serde::{Deserialize, Serialize};

/// Layered configuration wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayeredConfig {
  /// Configuration layers, lowest precedence first
  layers: Vec<ConfigLayer>,
}

/// Configuration layer with source tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigLayer {
  /// Layer source
  pub source: ConfigLayerSource,
  /// Configuration values
  pub values: toml::Value,
}

/// Configuration layer source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigLayerSource {
  /// Built-in defaults
  Default,
  /// Global user config
  GlobalConfig,
  /// Project-specific config
  ProjectConfig,
}

impl LayeredConfig {
  /// Create a new layered configuration
  pub fn new() -> Self {
    Self { layers: Vec::new() }
  }

  /// Add a layer on top of the existing ones
  pub fn add_layer(&mut self, layer: ConfigLayer) {
    self.layers.push(layer);
  }

  /// Sources of the layers in precedence order
  pub fn sources(&self) -> Vec<ConfigLayerSource> {
    self.layers.iter().map(|layer| layer.source).collect()
  }

  /// Get merged configuration.
  ///
  /// Tables are merged key by key so a later layer only replaces the keys it
  /// actually sets; any other value replaces the earlier one wholesale.
  pub fn merge(&self) -> toml::Value {
    let mut merged = toml::Value::Table(toml::map::Map::new());
    for layer in &self.layers {
      Self::merge_into(&mut merged, &layer.values);
    }
    merged
  }

  fn merge_into(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
      (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
        for (key, value) in overlay_table {
          match base_table.get_mut(key) {
            Some(existing) => Self::merge_into(existing, value),
            None => {
              base_table.insert(key.clone(), value.clone());
            }
          }
        }
      }
      (base, overlay) => *base = overlay.clone(),
    }
  }
}

impl Default for LayeredConfig {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn layer(source: ConfigLayerSource, raw: &str) -> ConfigLayer {
    ConfigLayer {
      source,
      values: toml::from_str(raw).expect("valid toml"),
    }
  }

  #[test]
  fn later_layer_overrides_only_its_keys() {
    let mut layered = LayeredConfig::new();
    layered.add_layer(layer(
      ConfigLayerSource::Default,
      "[server]\nurl = \"http://a\"\nrequest_timeout_secs = 10\n",
    ));
    layered.add_layer(layer(
      ConfigLayerSource::ProjectConfig,
      "[server]\nurl = \"http://b\"\n",
    ));

    let merged = layered.merge();
    assert_eq!(merged["server"]["url"].as_str(), Some("http://b"));
    assert_eq!(merged["server"]["request_timeout_secs"].as_integer(), Some(10));
    assert_eq!(
      layered.sources(),
      vec![ConfigLayerSource::Default, ConfigLayerSource::ProjectConfig]
    );
  }

  #[test]
  fn empty_layers_merge_to_empty_table() {
    let merged = LayeredConfig::default().merge();
    assert!(merged.as_table().is_some_and(|t| t.is_empty()));
  }
}
