//! Rahl CLI — run the Rahl AI gateway or talk to it from the terminal.

mod ui;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

use rahl_core::bus::EventBus;
use rahl_core::config::RahlConfig;
use rahl_core::error::RahlError;
use rahl_core::gateway::{ChatGateway, GatewayConfig};
use rahl_core::message::ChatInput;
use rahl_core::provider::LlmProvider;
use rahl_core::session::SessionStore;
use rahl_hub::api::{start_server, ApiState};
use rahl_hub::github::GitHubClient;
use rahl_hub::metrics::new_metrics;
use rahl_hub::providers;

// ─── CLI Definition ────────────────────────────────────────

/// Rahl AI — chat with an assistant that switches to building code when asked
#[derive(Parser)]
#[command(name = "rahl", version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, global = true, env = "RAHL_CONFIG")]
    config: Option<PathBuf>,

    /// Write logs to daily-rotated files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(flatten)]
    provider: ProviderArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ProviderArgs {
    /// Provider (openai, ollama, openrouter, groq, gemini)
    #[arg(short, long, global = true)]
    provider: Option<String>,

    /// Model to use (overrides config)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// API key (overrides config and OPENAI_API_KEY)
    #[arg(short = 'k', long, global = true)]
    api_key: Option<String>,

    /// API base URL override
    #[arg(long, global = true)]
    api_base: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 🌐 Start the REST API server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Directory of frontend files to serve
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// ❓ Send a single message and print the reply
    Ask {
        /// The message to send
        message: String,
    },

    /// 💬 Interactive chat in the terminal
    Chat,

    /// ⚙️  Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write a config file with default values
    Init,
}

// ─── Main ──────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = match cli.command {
        Commands::Serve { .. } => "info,rahl_core=debug,rahl_hub=debug",
        _ => "warn",
    };
    let _guard = init_logging(cli.log_dir.as_ref(), default_filter)?;

    let config_path = cli.config.clone().unwrap_or_else(RahlConfig::default_path);
    let mut config = RahlConfig::load(&config_path)?;
    config.apply_env()?;
    apply_provider_args(&mut config, &cli.provider);

    match cli.command {
        Commands::Serve {
            host,
            port,
            static_dir,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if static_dir.is_some() {
                config.server.static_dir = static_dir;
            }
            run_serve(config).await?;
        }

        Commands::Ask { message } => run_ask(&config, &message).await?,

        Commands::Chat => run_chat(&config).await?,

        Commands::Config { action } => match action {
            ConfigAction::Show => run_config_show(&config)?,
            ConfigAction::Path => println!("{}", config_path.display()),
            ConfigAction::Init => {
                if config_path.exists() {
                    ui::print_error(&format!("{} already exists", config_path.display()));
                } else {
                    RahlConfig::default().save(&config_path)?;
                    println!("{} {}", "✓ Wrote".green(), config_path.display());
                }
            }
        },
    }

    Ok(())
}

/// Install the tracing subscriber. The returned guard flushes file logs on drop.
fn init_logging(
    log_dir: Option<&PathBuf>,
    default_filter: &str,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "rahl.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
            Ok(None)
        }
    }
}

fn apply_provider_args(config: &mut RahlConfig, args: &ProviderArgs) {
    if let Some(provider) = &args.provider {
        config.provider.provider = provider.clone();
    }
    if let Some(model) = &args.model {
        config.provider.model = model.clone();
    }
    if let Some(key) = &args.api_key {
        config.provider.api_key = Some(key.clone());
    }
    if let Some(base) = &args.api_base {
        config.provider.api_base = Some(base.clone());
    }
}

fn build_gateway(config: &RahlConfig) -> ChatGateway {
    let sessions = SessionStore::new(&config.sessions, EventBus::default());
    ChatGateway::new(GatewayConfig::from_config(config), sessions)
}

fn require_api_key(config: &RahlConfig) -> anyhow::Result<()> {
    if config.provider.api_key.is_none() && config.provider.provider != "ollama" {
        anyhow::bail!(
            "No API key for provider '{}'. Set OPENAI_API_KEY, pass --api-key, or add it to {}",
            config.provider.provider,
            RahlConfig::default_path().display()
        );
    }
    Ok(())
}

// ─── Serve ─────────────────────────────────────────────────

async fn run_serve(config: RahlConfig) -> anyhow::Result<()> {
    require_api_key(&config)?;

    ui::print_banner();
    ui::print_server_card(&config);

    let state = ApiState {
        gateway: build_gateway(&config),
        provider: providers::from_config(&config.provider),
        github: GitHubClient::new(config.github.clone()),
        metrics: new_metrics(),
    };

    start_server(state, &config.server).await
}

// ─── Ask / Chat ────────────────────────────────────────────

async fn run_ask(config: &RahlConfig, message: &str) -> anyhow::Result<()> {
    require_api_key(config)?;

    let gateway = build_gateway(config);
    let provider = providers::from_config(&config.provider);
    let session_id = uuid::Uuid::new_v4().to_string();

    send(&gateway, provider.as_ref(), &session_id, message).await;
    Ok(())
}

async fn run_chat(config: &RahlConfig) -> anyhow::Result<()> {
    require_api_key(config)?;

    let gateway = build_gateway(config);
    let provider = providers::from_config(&config.provider);
    let session_id = uuid::Uuid::new_v4().to_string();

    ui::print_banner();
    println!(
        "  {} {}  {} {}",
        "Provider:".dimmed(),
        provider.name().cyan(),
        "Model:".dimmed(),
        provider.default_model().cyan()
    );
    println!(
        "  {}\n",
        "Ask anything. Say \"build ...\" to start coding, \"back to chat\" to stop, /quit to leave."
            .dimmed()
    );

    let stdin = io::stdin();
    loop {
        print!("{} ", "You ›".bold());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        match message {
            "" => continue,
            "/quit" | "/exit" => break,
            _ => send(&gateway, provider.as_ref(), &session_id, message).await,
        }
    }

    Ok(())
}

async fn send(gateway: &ChatGateway, provider: &dyn LlmProvider, session_id: &str, message: &str) {
    match gateway
        .process(provider, &ChatInput::new(session_id, message))
        .await
    {
        Ok(result) => ui::print_reply(&result.reply),
        Err(RahlError::InvalidInput(reason)) => ui::print_error(&reason),
        Err(e) => ui::print_error(&format!("Request failed: {}", e)),
    }
}

// ─── Config ────────────────────────────────────────────────

fn run_config_show(config: &RahlConfig) -> anyhow::Result<()> {
    let mut shown = config.clone();
    if let Some(key) = shown.provider.api_key.as_mut() {
        *key = mask(key);
    }
    if let Some(secret) = shown.github.client_secret.as_mut() {
        *secret = mask(secret);
    }
    println!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{}…", visible)
}
