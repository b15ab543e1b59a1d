//! CLI entry point for accueil

use accueil_core::config::{Config, ConfigLoader};
use accueil_core::logging::init_logging;
use accueil_core::session::{Message, SessionStore};
use accueil_core::{Entities, EntityValue};
use accueil_dialog::{DialogOrchestrator, TurnRequest};
use accueil_manager::Manager;
use accueil_providers::build_backend;
use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_PROBE_TEXT: &str = "Bonjour, je veux m'inscrire au yoga à 18:00";

#[derive(Parser)]
#[command(name = "accueil")]
#[command(about = "Dialog engine for a sports-centre reception robot")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP dialog server
    Serve {
        /// Bind address (overrides server.host)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Answer one classified utterance and print the reply as JSON
    Turn {
        /// Classified intent
        #[arg(short, long)]
        intent: String,
        /// Raw user text
        #[arg(short, long, default_value = "")]
        text: String,
        /// Entity as name=value; repeat a name to pass a list
        #[arg(short, long = "entity", value_parser = parse_entity)]
        entities: Vec<(String, String)>,
        /// Classifier confidence
        #[arg(long, default_value_t = 1.0)]
        confidence: f32,
        /// Session id (a new one is created when omitted)
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Call the configured backend once and print the result
    Probe {
        /// System prompt (defaults to the configured one)
        #[arg(long)]
        prompt: Option<String>,
        /// User message
        #[arg(short, long, default_value = DEFAULT_PROBE_TEXT)]
        text: String,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };

    match cli.command {
        Commands::Serve { host, port } => run_serve(&config_loader, host, port).await?,
        Commands::Turn {
            intent,
            text,
            entities,
            confidence,
            session,
        } => {
            init_console_logging();
            run_turn(&config_loader, intent, text, entities, confidence, session).await?
        }
        Commands::Probe { prompt, text } => {
            init_console_logging();
            run_probe(&config_loader, prompt, text).await?
        }
        Commands::Config => run_config(&config_loader)?,
    }

    Ok(())
}

/// Stderr-only logging for one-shot commands, quiet unless `RUST_LOG` says otherwise
fn init_console_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn parse_entity(raw: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty entity name in '{}'", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Repeated names become list values, in command-line order
fn collect_entities(pairs: Vec<(String, String)>) -> Entities {
    let mut entities = Entities::new();
    for (name, value) in pairs {
        let merged = match entities.remove(&name) {
            None => EntityValue::Text(value),
            Some(EntityValue::Text(first)) => EntityValue::List(vec![first, value]),
            Some(EntityValue::List(mut items)) => {
                items.push(value);
                EntityValue::List(items)
            }
        };
        entities.insert(name, merged);
    }
    entities
}

async fn run_serve(loader: &ConfigLoader, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = loader.load()?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let _log_guard = init_logging(&config.logging);
    info!("Loaded configuration from {}", loader.config_dir().display());

    println!(
        "{} on {}:{}",
        style("Starting accueil dialog server").bold().cyan(),
        config.server.host,
        config.server.port
    );

    Manager::from_config(config)?.run().await
}

async fn run_turn(
    loader: &ConfigLoader,
    intent: String,
    text: String,
    entities: Vec<(String, String)>,
    confidence: f32,
    session: Option<String>,
) -> Result<()> {
    let config = loader.load()?;
    let backend = build_backend(&config.backend)?;
    let sessions = Arc::new(SessionStore::new(&config.sessions));
    let orchestrator = DialogOrchestrator::new(Arc::clone(&sessions), backend, &config.dialog);

    let session_id = session.unwrap_or_else(|| sessions.create());
    let request = TurnRequest {
        session_id: session_id.clone(),
        intent,
        confidence,
        entities: collect_entities(entities),
        raw_text: text,
    };

    let reply = orchestrator.handle(request).await?;
    let output = serde_json::json!({
        "text": reply.text,
        "actions": reply.actions,
        "session_id": session_id,
        "outcome": reply.outcome,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_probe(loader: &ConfigLoader, prompt: Option<String>, text: String) -> Result<()> {
    let config = loader.load()?;
    let backend = build_backend(&config.backend)?;
    let system_prompt = prompt.unwrap_or_else(|| config.dialog.system_prompt.clone());

    println!("{} {}", style("Backend:").bold(), backend.describe());
    println!("{} {}", style("Message:").bold(), text);

    match backend.generate(&system_prompt, &[Message::user(text)]).await {
        Ok(reply) => {
            println!("{}", style("Reply:").bold().green());
            println!("{}", reply);
            Ok(())
        }
        Err(e) => {
            println!("{} {}", style("Backend error:").bold().red(), e);
            anyhow::bail!("backend probe failed")
        }
    }
}

fn run_config(loader: &ConfigLoader) -> Result<()> {
    let config = loader.load()?;
    println!(
        "{} {}",
        style("Config directory:").bold(),
        loader.config_dir().display()
    );
    println!("{}", serde_json::to_string_pretty(&masked_config(&config)?)?);
    Ok(())
}

/// Configuration as JSON with header values hidden
fn masked_config(config: &Config) -> Result<Value> {
    let mut value = serde_json::to_value(config)?;
    if let Some(headers) = value
        .get_mut("backend")
        .and_then(|backend| backend.get_mut("headers"))
        .and_then(Value::as_object_mut)
    {
        for header in headers.values_mut() {
            *header = Value::String("***".to_string());
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entity() {
        assert_eq!(
            parse_entity("activity=yoga").unwrap(),
            ("activity".to_string(), "yoga".to_string())
        );
        assert_eq!(
            parse_entity("time = 18:00").unwrap(),
            ("time".to_string(), "18:00".to_string())
        );
        assert!(parse_entity("activity").is_err());
        assert!(parse_entity("=yoga").is_err());
    }

    #[test]
    fn test_collect_entities_groups_repeats() {
        let entities = collect_entities(vec![
            ("activity".to_string(), "yoga".to_string()),
            ("time".to_string(), "18:00".to_string()),
            ("activity".to_string(), "tennis".to_string()),
            ("activity".to_string(), "basket".to_string()),
        ]);
        assert_eq!(entities["time"], EntityValue::Text("18:00".to_string()));
        assert_eq!(
            entities["activity"],
            EntityValue::List(vec![
                "yoga".to_string(),
                "tennis".to_string(),
                "basket".to_string()
            ])
        );
    }

    #[test]
    fn test_masked_config_hides_headers() {
        let mut config = Config::default();
        if let accueil_core::config::BackendConfig::ChatProtocol(chat) = &mut config.backend {
            chat.headers
                .insert("Authorization".to_string(), "Bearer secret".to_string());
        }
        let value = masked_config(&config).unwrap();
        assert_eq!(value["backend"]["headers"]["Authorization"], "***");
        assert_eq!(value["backend"]["kind"], "chat-protocol");
    }

    #[test]
    fn test_cli_parses_turn() {
        let cli = Cli::try_parse_from([
            "accueil",
            "--config-dir",
            "/tmp/accueil",
            "turn",
            "--intent",
            "book_activity",
            "-e",
            "activity=yoga",
            "-e",
            "time=18:00",
        ])
        .unwrap();
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/accueil")));
        match cli.command {
            Commands::Turn {
                intent, entities, ..
            } => {
                assert_eq!(intent, "book_activity");
                assert_eq!(entities.len(), 2);
            }
            _ => panic!("expected turn command"),
        }
    }
}
