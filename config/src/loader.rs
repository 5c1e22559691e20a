// Configuration Loader
// Layered configuration loading system

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::layered::{ConfigLayer, ConfigLayerSource, LayeredConfig};
use crate::types::Config;

/// Directory name used for both the global and the project config
const CONFIG_DIR_NAME: &str = ".lmbridge";

/// Configuration file name inside the config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration loader with layered support
pub struct ConfigLoader {
    /// Global config directory
    global_dir: PathBuf,
    /// Project config directory
    project_dir: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        let global_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME);

        Self {
            global_dir,
            project_dir: None,
        }
    }

    /// Use a different global config directory
    pub fn with_global_dir(mut self, dir: PathBuf) -> Self {
        self.global_dir = dir;
        self
    }

    /// Set project directory
    pub fn with_project_dir(mut self, dir: PathBuf) -> Self {
        self.project_dir = Some(dir);
        self
    }

    /// Load configuration without overrides
    pub fn load(&self) -> Result<Config> {
        self.load_with_cli_overrides(Vec::new())
    }

    /// Load configuration with CLI overrides
    pub fn load_with_cli_overrides(&self, cli_overrides: Vec<(String, String)>) -> Result<Config> {
        // Load layers in order:
        // 1. Built-in defaults
        // 2. Global config (~/.lmbridge/config.toml)
        // 3. Project config (.lmbridge/config.toml)
        // 4. CLI overrides

        let mut layered = LayeredConfig::new();
        layered.add_layer(ConfigLayer {
            source: ConfigLayerSource::Default,
            values: toml::Value::try_from(Config::default())
                .context("failed to serialize default config")?,
        });

        let global_path = self.global_dir.join(CONFIG_FILE_NAME);
        if let Some(values) = read_layer(&global_path)? {
            layered.add_layer(ConfigLayer {
                source: ConfigLayerSource::GlobalConfig,
                values,
            });
        }

        if let Some(project_dir) = &self.project_dir {
            let project_path = project_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
            if let Some(values) = read_layer(&project_path)? {
                layered.add_layer(ConfigLayer {
                    source: ConfigLayerSource::ProjectConfig,
                    values,
                });
            }
        }

        tracing::debug!("Loaded config layers: {:?}", layered.sources());

        let mut config: Config = layered
            .merge()
            .try_into()
            .context("invalid configuration")?;

        for (key, value) in cli_overrides {
            config = apply_override(config, &key, &value)?;
        }

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `KEY=VALUE` override strings as given on the command line
pub fn parse_overrides(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|entry| {
            let (key, value) = entry
                .split_once('=')
                .with_context(|| format!("Invalid override (expected KEY=VALUE): {entry}"))?;
            Ok((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Read a config file as a raw layer, or `None` if it does not exist
fn read_layer(path: &Path) -> Result<Option<toml::Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let values = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(values))
}

/// Apply a single CLI override
fn apply_override(mut config: Config, key: &str, value: &str) -> Result<Config> {
    match key {
        "server.url" => {
            config.server.url = value.to_string();
        }
        "server.request_timeout_secs" => {
            config.server.request_timeout_secs = value
                .parse()
                .with_context(|| format!("Invalid timeout: {value}"))?;
        }
        "server.keep_alive" => {
            config.server.keep_alive = if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            };
        }
        "chat.default_context_length" => {
            config.chat.default_context_length = value
                .parse()
                .with_context(|| format!("Invalid context length: {value}"))?;
        }
        "chat.default_max_output_tokens" => {
            config.chat.default_max_output_tokens = value
                .parse()
                .with_context(|| format!("Invalid max output tokens: {value}"))?;
        }
        _ => {
            anyhow::bail!("Unknown config key: {}", key);
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_SERVER_URL;
    use pretty_assertions::assert_eq;

    fn loader_in(global: &Path, project: Option<&Path>) -> ConfigLoader {
        let loader = ConfigLoader::new().with_global_dir(global.to_path_buf());
        match project {
            Some(dir) => loader.with_project_dir(dir.to_path_buf()),
            None => loader,
        }
    }

    #[test]
    fn defaults_without_files() {
        let global = tempfile::tempdir().expect("tempdir");
        let config = loader_in(global.path(), None).load().expect("config");
        assert_eq!(config, Config::default());
        assert_eq!(config.server.url, DEFAULT_SERVER_URL);
    }

    #[test]
    fn project_layer_wins_over_global() {
        let global = tempfile::tempdir().expect("tempdir");
        let project = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            global.path().join(CONFIG_FILE_NAME),
            "[server]\nurl = \"http://global:11434\"\nrequest_timeout_secs = 30\n",
        )
        .expect("write global");
        let project_cfg = project.path().join(CONFIG_DIR_NAME);
        std::fs::create_dir_all(&project_cfg).expect("mkdir");
        std::fs::write(
            project_cfg.join(CONFIG_FILE_NAME),
            "[server]\nurl = \"http://project:11434\"\n",
        )
        .expect("write project");

        let config = loader_in(global.path(), Some(project.path()))
            .load()
            .expect("config");
        assert_eq!(config.server.url, "http://project:11434");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.chat.default_context_length, 8192);
    }

    #[test]
    fn cli_overrides_apply_last() {
        let global = tempfile::tempdir().expect("tempdir");
        let overrides = parse_overrides(&[
            "server.url=http://remote:1234".to_string(),
            "chat.default_context_length = 32768".to_string(),
        ])
        .expect("overrides");

        let config = loader_in(global.path(), None)
            .load_with_cli_overrides(overrides)
            .expect("config");
        assert_eq!(config.server.url, "http://remote:1234");
        assert_eq!(config.chat.default_context_length, 32768);
    }

    #[test]
    fn unknown_override_key_is_rejected() {
        let global = tempfile::tempdir().expect("tempdir");
        let err = loader_in(global.path(), None)
            .load_with_cli_overrides(vec![("server.port".to_string(), "1".to_string())])
            .unwrap_err();
        assert!(err.to_string().contains("Unknown config key"));
    }

    #[test]
    fn malformed_override_is_rejected() {
        assert!(parse_overrides(&["server.url".to_string()]).is_err());
    }

    #[test]
    fn broken_file_is_an_error() {
        let global = tempfile::tempdir().expect("tempdir");
        std::fs::write(global.path().join(CONFIG_FILE_NAME), "[server\n").expect("write");
        assert!(loader_in(global.path(), None).load().is_err());
    }
}
