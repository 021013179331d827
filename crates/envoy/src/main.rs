mod config;
mod logging;
mod ui;

use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use config::Config;
use eino_engine::client::ApiClient;
use eino_engine::pipeline::SendPipeline;
use eino_engine::storage::JsonFileStorage;
use eino_engine::store::ConversationStore;
use eino_engine::view;

#[derive(Parser, Debug)]
#[command(name = "envoy", version, about = "Terminal chat client for the Eino answer service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the interactive chat (default)
    Chat,
    /// Send one message to the active conversation and print the answer
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        message: Vec<String>,
    },
    /// List conversations, newest first
    List {
        #[arg(short, long, default_value = "")]
        filter: String,
    },
    /// Check that the answer service is reachable
    Health,
    /// Show or change the configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Set { key: ConfigKey, value: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ConfigKey {
    Server,
    Markdown,
    ConversationId,
}

fn parse_switch(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => bail!("Expected on or off, got '{}'", other),
    }
}

fn print_config(config: &Config) -> Result<()> {
    println!("Current config:");
    println!("  Server URL: {}", config.server_url);
    println!("  Effective API base: {}", config.api_base());
    println!("  Markdown: {}", if config.markdown { "on" } else { "off" });
    println!(
        "  Send conversation id: {}",
        if config.send_conversation_id { "on" } else { "off" }
    );
    println!("  Data dir: {}", config.data_dir()?.display());
    Ok(())
}

fn update_config(mut config: Config, key: ConfigKey, value: String) -> Result<()> {
    match key {
        ConfigKey::Server => {
            config.server_url = value.trim().trim_end_matches('/').to_string();
            println!("Server URL updated to: {}", config.server_url);
        }
        ConfigKey::Markdown => {
            config.markdown = parse_switch(&value)?;
            println!("Markdown rendering {}", if config.markdown { "enabled" } else { "disabled" });
        }
        ConfigKey::ConversationId => {
            config.send_conversation_id = parse_switch(&value)?;
            println!(
                "Conversation id {}",
                if config.send_conversation_id { "will be sent" } else { "will not be sent" }
            );
        }
    }
    config.save()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return Err(e);
        }
    };

    let data_dir = config.data_dir()?;
    logging::init(&data_dir)?;

    let base = config.api_base();
    tracing::info!(api_base = %base, data_dir = %data_dir.display(), "envoy starting");

    let client = Arc::new(ApiClient::new(base.clone()));
    let open = |client: Arc<ApiClient>| {
        let store = ConversationStore::new(JsonFileStorage::new(&data_dir));
        let pipeline =
            SendPipeline::new(client).with_conversation_id(config.send_conversation_id);
        (store, pipeline)
    };

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => {
            let (store, pipeline) = open(client);
            ui::interactive_chat(store, pipeline, config.markdown).await?;
        }
        Command::Ask { message } => {
            let (store, pipeline) = open(client);
            ui::single_message(store, pipeline, message.join(" ")).await?;
        }
        Command::List { filter } => {
            let (store, _) = open(client);
            let entries = view::sidebar(&store, &filter);
            if entries.is_empty() {
                println!("{}", view::EMPTY_SUBTITLE);
            }
            for entry in entries {
                let marker = if entry.active { "*" } else { " " };
                println!("{} {}  {}  {}", marker, entry.created, entry.id, entry.title);
            }
        }
        Command::Health => match client.health().await {
            Ok(()) => println!("ok"),
            Err(e) => {
                eprintln!("Failed to reach Eino at {}: {}", base, e);
                return Err(e.into());
            }
        },
        Command::Config { action: None } => print_config(&config)?,
        Command::Config { action: Some(ConfigAction::Set { key, value }) } => {
            update_config(config.clone(), key, value)?
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_chat() {
        let cli = Cli::try_parse_from(["envoy"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn ask_joins_words() {
        let cli = Cli::try_parse_from(["envoy", "ask", "plan", "a", "trip"]).unwrap();
        match cli.command {
            Some(Command::Ask { message }) => assert_eq!(message.join(" "), "plan a trip"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn config_set_parses_keys() {
        let cli =
            Cli::try_parse_from(["envoy", "config", "set", "conversation-id", "on"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Config {
                action: Some(ConfigAction::Set { key: ConfigKey::ConversationId, .. })
            })
        ));
    }

    #[test]
    fn switches() {
        assert!(parse_switch("ON").unwrap());
        assert!(!parse_switch("off").unwrap());
        assert!(parse_switch("maybe").is_err());
    }
}
