//! relaybus CLI
//!
//! Single binary for relaybus operations:
//! - Echo server (answers invokes, fans out publishes)
//! - One-shot client commands (call, send, publish, get)
//! - Event listener

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relaybus::commands::{self, parse_code};
use relaybus::output::print_error;

#[derive(Parser)]
#[command(name = "relaybus")]
#[command(author, version, about = "Named-endpoint message bus")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "RELAYBUS_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an echo server that answers invokes and relays publishes
    Serve {
        /// Address to bind, e.g. tcp://127.0.0.1:7400
        #[arg(short, long)]
        bind: String,
        /// Cache the last value of every event
        #[arg(long)]
        cache: bool,
    },

    /// Invoke an event code and print the reply
    Call {
        /// Server address
        url: String,
        /// Event code (decimal or 0x hex)
        #[arg(value_parser = parse_code)]
        code: u32,
        /// Payload text
        #[arg(default_value = "")]
        payload: String,
        /// Reply timeout in milliseconds (0 waits forever)
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Send a one-way message
    Send {
        /// Server address
        url: String,
        /// Event code (decimal or 0x hex)
        #[arg(value_parser = parse_code)]
        code: u32,
        /// Payload text
        #[arg(default_value = "")]
        payload: String,
    },

    /// Publish an event to every subscriber
    Publish {
        /// Server address
        url: String,
        /// Event code (decimal or 0x hex)
        #[arg(value_parser = parse_code)]
        code: u32,
        /// Payload text
        #[arg(default_value = "")]
        payload: String,
        /// Topic to publish under
        #[arg(short, long)]
        topic: Option<String>,
        /// Broadcast even when the cached value is unchanged
        #[arg(long)]
        always_update: bool,
    },

    /// Read the cached value of an event
    Get {
        /// Server address
        url: String,
        /// Event code (decimal or 0x hex)
        #[arg(value_parser = parse_code)]
        code: u32,
        /// Topic of the event
        #[arg(short, long)]
        topic: Option<String>,
    },

    /// Subscribe and print events as they arrive
    Listen {
        /// Server address
        url: String,
        /// Event codes, or group numbers with --group
        #[arg(required = true, value_parser = parse_code)]
        codes: Vec<u32>,
        /// Treat the codes as group numbers
        #[arg(short, long)]
        group: bool,
        /// Only events published under this topic
        #[arg(short, long)]
        topic: Option<String>,
        /// Exit after this many events
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Serve { bind, cache } => {
            let config = commands::load_endpoint_config(config_path)?;
            commands::serve_command(&bind, cache, &config).await?;
        }

        Commands::Call {
            url,
            code,
            payload,
            timeout,
        } => {
            let config = commands::load_endpoint_config(config_path)?;
            let timeout = timeout.map(Duration::from_millis);
            commands::call_command(&url, code, &payload, timeout, &config).await?;
        }

        Commands::Send { url, code, payload } => {
            let config = commands::load_endpoint_config(config_path)?;
            commands::send_command(&url, code, &payload, &config).await?;
        }

        Commands::Publish {
            url,
            code,
            payload,
            topic,
            always_update,
        } => {
            let config = commands::load_endpoint_config(config_path)?;
            commands::publish_command(
                &url,
                code,
                &payload,
                topic.as_deref(),
                always_update,
                &config,
            )
            .await?;
        }

        Commands::Get { url, code, topic } => {
            let config = commands::load_endpoint_config(config_path)?;
            commands::get_command(&url, code, topic.as_deref(), &config).await?;
        }

        Commands::Listen {
            url,
            codes,
            group,
            topic,
            count,
        } => {
            let config = commands::load_endpoint_config(config_path)?;
            let items = commands::subscription_items(&codes, group, topic.as_deref())?;
            commands::listen_command(&url, items, count, &config).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(config_path)?,
            ConfigAction::Init { force } => commands::config_init(config_path, force)?,
            ConfigAction::Path => {
                println!("{}", commands::resolve_config_path(config_path).display());
            }
        },
    }

    Ok(())
}
