// lmbridge CLI - terminal host for the local model chat provider

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use lmbridge_config::{Config, ConfigLoader, parse_overrides};
use lmbridge_core::host::{
    ChatMessage, ChatModelInformation, ChatProvider, ChatRequestOptions, ChatToolDefinition,
    CommandHandler, Host, ModelQueryOptions, ResponsePart, TokenCountInput,
};
use lmbridge_core::{REFRESH_COMMAND, SERVER_URL_KEY, VENDOR, activate};

/// lmbridge - use local models through the chat provider interface
#[derive(Parser, Debug)]
#[command(name = "lmbridge")]
#[command(version, about, long_about = None)]
struct TopCli {
    #[clap(flatten)]
    config_overrides: CliConfigOverrides,

    /// Model server URL (overrides server.url)
    #[arg(long = "url", global = true)]
    url: Option<String>,

    #[clap(subcommand)]
    command: Commands,
}

/// CLI configuration overrides
#[derive(Debug, clap::Args)]
struct CliConfigOverrides {
    /// Configuration override in key=value format
    #[arg(short = 'c', long = "config", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,
}

/// Available commands
#[derive(Debug, Subcommand)]
enum Commands {
    /// List the models offered by the server
    Models,

    /// Run the refresh-models command
    Refresh,

    /// Send one prompt and stream the reply
    Chat {
        /// Model id as listed by `models`
        model: String,

        /// User prompt
        prompt: String,

        /// JSON file holding an array of tool definitions
        #[arg(long = "tools", value_name = "FILE")]
        tools: Option<PathBuf>,
    },

    /// Count the tokens of a text
    CountTokens {
        /// Model id as listed by `models`
        model: String,

        /// Text to count
        text: String,
    },
}

/// Host backed by the terminal: notifications go to stderr
struct TerminalHost {
    config: Config,
    providers: Mutex<HashMap<String, Arc<dyn ChatProvider>>>,
    commands: Mutex<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl TerminalHost {
    fn new(config: Config) -> Self {
        Self {
            config,
            providers: Mutex::new(HashMap::new()),
            commands: Mutex::new(HashMap::new()),
        }
    }

    fn provider(&self, vendor: &str) -> Result<Arc<dyn ChatProvider>> {
        self.providers
            .lock()
            .map_err(|_| anyhow!("provider registry poisoned"))?
            .get(vendor)
            .cloned()
            .ok_or_else(|| anyhow!("No chat provider registered for {vendor}"))
    }

    fn command(&self, id: &str) -> Result<Arc<dyn CommandHandler>> {
        self.commands
            .lock()
            .map_err(|_| anyhow!("command registry poisoned"))?
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown command: {id}"))
    }
}

impl Host for TerminalHost {
    fn register_chat_provider(&self, vendor: &str, provider: Arc<dyn ChatProvider>) {
        debug!("Registered chat provider {}", vendor);
        if let Ok(mut providers) = self.providers.lock() {
            providers.insert(vendor.to_string(), provider);
        }
    }

    fn register_command(&self, id: &str, handler: Arc<dyn CommandHandler>) {
        debug!("Registered command {}", id);
        if let Ok(mut commands) = self.commands.lock() {
            commands.insert(id.to_string(), handler);
        }
    }

    fn show_information_message(&self, message: &str) {
        eprintln!("{message}");
    }

    fn show_error_message(&self, message: &str) {
        eprintln!("error: {message}");
    }

    fn configuration_value(&self, key: &str) -> Option<String> {
        match key {
            SERVER_URL_KEY => Some(self.config.server.url.clone()),
            _ => None,
        }
    }

    fn notify_model_information_changed(&self, vendor: &str) {
        debug!("Model information changed for {}", vendor);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries model output only
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info".to_string())
                .as_str(),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = TopCli::parse();
    let loader = ConfigLoader::new().with_project_dir(
        std::env::current_dir().context("Failed to resolve the working directory")?,
    );
    let config = load_config(&cli, &loader)?;

    let host = Arc::new(TerminalHost::new(config.clone()));
    let dyn_host: Arc<dyn Host> = host.clone();
    let extension = activate(dyn_host, &config).await?;

    let result = match cli.command {
        Commands::Models => list_models(&host).await,
        Commands::Refresh => host.command(REFRESH_COMMAND)?.execute().await.map_err(Into::into),
        Commands::Chat {
            model,
            prompt,
            tools,
        } => run_chat(&host, &model, prompt, tools).await,
        Commands::CountTokens { model, text } => count_tokens(&host, &model, text).await,
    };

    extension.deactivate().await;
    result
}

fn load_config(cli: &TopCli, loader: &ConfigLoader) -> Result<Config> {
    let mut overrides = parse_overrides(&cli.config_overrides.overrides)?;
    if let Some(url) = &cli.url {
        overrides.push(("server.url".to_string(), url.clone()));
    }

    let config = loader.load_with_cli_overrides(overrides)?;
    info!("Model server: {}", config.server.url);
    Ok(config)
}

async fn fetch_models(host: &TerminalHost, silent: bool) -> Result<Vec<ChatModelInformation>> {
    let models = host
        .provider(VENDOR)?
        .provide_model_information(ModelQueryOptions { silent }, CancellationToken::new())
        .await?;
    Ok(models)
}

async fn find_model(host: &TerminalHost, id: &str) -> Result<ChatModelInformation> {
    let models = fetch_models(host, false).await?;
    match models.into_iter().find(|m| m.id == id) {
        Some(model) => Ok(model),
        None => bail!("Model not found: {id} (run `lmbridge models` to list models)"),
    }
}

/// List available models
async fn list_models(host: &TerminalHost) -> Result<()> {
    let models = fetch_models(host, false).await?;
    if models.is_empty() {
        println!("No local models found.");
        return Ok(());
    }

    for model in models {
        let mut capabilities = Vec::new();
        if model.capabilities.tool_calling {
            capabilities.push("tools");
        }
        if model.capabilities.image_input {
            capabilities.push("vision");
        }

        println!(
            "{:<32} {:<12} {:>7} ctx  {}",
            model.id,
            model.family,
            model.max_input_tokens + model.max_output_tokens,
            capabilities.join(",")
        );
    }

    Ok(())
}

async fn run_chat(
    host: &TerminalHost,
    model_id: &str,
    prompt: String,
    tools: Option<PathBuf>,
) -> Result<()> {
    let model = find_model(host, model_id).await?;
    let options = ChatRequestOptions {
        tools: match tools {
            Some(path) => read_tools(&path)?,
            None => Vec::new(),
        },
        ..Default::default()
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<ResponsePart>();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(part) = rx.recv().await {
            match part {
                ResponsePart::Text { value } => print!("{value}"),
                ResponsePart::ToolCall(call) => match serde_json::to_string(&call) {
                    Ok(line) => println!("\n{line}"),
                    Err(err) => debug!("Unprintable tool call: {}", err),
                },
            }
            let _ = stdout.flush();
        }
        println!();
    });

    let result = host
        .provider(VENDOR)?
        .provide_response(
            &model,
            &[ChatMessage::user(prompt)],
            &options,
            &tx,
            cancel.clone(),
        )
        .await;
    drop(tx);
    printer.await?;

    if cancel.is_cancelled() {
        eprintln!("(cancelled)");
    }
    result.map_err(Into::into)
}

fn read_tools(path: &Path) -> Result<Vec<ChatToolDefinition>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tools file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid tool definitions in {}", path.display()))
}

async fn count_tokens(host: &TerminalHost, model_id: &str, text: String) -> Result<()> {
    let model = find_model(host, model_id).await?;
    let count = host
        .provider(VENDOR)?
        .provide_token_count(&model, &TokenCountInput::Text(text), CancellationToken::new())
        .await?;
    println!("{count}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_with_overrides() {
        let cli = TopCli::try_parse_from([
            "lmbridge",
            "-c",
            "server.keep_alive=10m",
            "chat",
            "llama3.2:latest",
            "hello",
            "--url",
            "http://gpu-box:11434",
        ])
        .expect("parse");

        assert_eq!(cli.config_overrides.overrides, vec!["server.keep_alive=10m"]);
        assert_eq!(cli.url.as_deref(), Some("http://gpu-box:11434"));
        match cli.command {
            Commands::Chat {
                model,
                prompt,
                tools,
            } => {
                assert_eq!(model, "llama3.2:latest");
                assert_eq!(prompt, "hello");
                assert!(tools.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_project_config_is_loaded() {
        let global = tempfile::tempdir().expect("tempdir");
        let project = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(project.path().join(".lmbridge")).expect("mkdir");
        std::fs::write(
            project.path().join(".lmbridge").join("config.toml"),
            "[server]\nurl = \"http://project-box:11434\"\nkeep_alive = \"1m\"\n",
        )
        .expect("write");
        let loader = ConfigLoader::new()
            .with_global_dir(global.path().to_path_buf())
            .with_project_dir(project.path().to_path_buf());

        let cli = TopCli::try_parse_from(["lmbridge", "models"]).expect("parse");
        let config = load_config(&cli, &loader).expect("config");
        assert_eq!(config.server.url, "http://project-box:11434");
        assert_eq!(config.server.keep_alive.as_deref(), Some("1m"));

        let cli = TopCli::try_parse_from(["lmbridge", "--url", "http://cli-box:11434", "models"])
            .expect("parse");
        let config = load_config(&cli, &loader).expect("config");
        assert_eq!(config.server.url, "http://cli-box:11434");
        assert_eq!(config.server.keep_alive.as_deref(), Some("1m"));
    }

    #[test]
    fn test_terminal_host_serves_server_url() {
        let mut config = Config::default();
        config.server.url = "http://gpu-box:11434".to_string();
        let host = TerminalHost::new(config);

        assert_eq!(
            host.configuration_value(SERVER_URL_KEY).as_deref(),
            Some("http://gpu-box:11434")
        );
        assert_eq!(host.configuration_value("other.key"), None);
        assert!(host.provider(VENDOR).is_err());
    }

    #[test]
    fn test_read_tools_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tools.json");
        std::fs::write(
            &path,
            r#"[{"name":"get_weather","description":"Weather","input_schema":{"type":"object"}}]"#,
        )
        .expect("write");

        let tools = read_tools(&path).expect("tools");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "get_weather");

        std::fs::write(&path, "not json").expect("write");
        assert!(read_tools(&path).is_err());
    }
}
