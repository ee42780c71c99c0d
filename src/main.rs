//! fs-copilot - terminal client for the Field Service Copilot
//!
//! Sign in with Entra ID, ask a question, read the reply.

mod api;
mod auth;
mod chat;
mod config;
mod models;
mod tui;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use tui::console::LogBuffer;

#[derive(Parser)]
#[command(name = "fs-copilot")]
#[command(about = "Terminal client for the Field Service Copilot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config.toml (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Skip sign-in and send unauthenticated requests
    #[arg(long, global = true)]
    anonymous: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the terminal user interface (default)
    Tui,

    /// Ask one question and print the reply
    Ask {
        /// Message to send
        message: String,
    },

    /// Sign in with the device code flow
    Login {
        /// Sign in again even if a session is cached
        #[arg(short, long)]
        force: bool,
    },

    /// Sign out and clear cached tokens
    Logout,

    /// Show current authentication status
    Status,

    /// Show the signed-in account
    Whoami,

    /// Check that the chat backend is reachable
    Ping,

    /// Print the effective configuration
    Config {
        /// Write it to the config file if none exists yet
        #[arg(long)]
        init: bool,
    },
}

fn init_logging(verbose: bool, console: Option<LogBuffer>) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());
    let registry = tracing_subscriber::registry().with(filter);

    match console {
        // The alternate screen owns stdout/stderr while the TUI runs.
        Some(buffer) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(buffer)
                    .with_ansi(false)
                    .with_target(false),
            )
            .init(),
        None => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Tui);

    let console = matches!(command, Commands::Tui).then(LogBuffer::new);
    init_logging(cli.verbose, console.clone());

    let config = Config::load(cli.config.as_deref())?;

    match command {
        Commands::Tui => {
            tui::run(&config, cli.anonymous, console.unwrap_or_default()).await?;
        }
        Commands::Ask { message } => {
            chat::ask(&config, cli.anonymous, &message).await?;
        }
        Commands::Login { force } => {
            tracing::info!("Starting authentication flow...");
            auth::login(&config, force).await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout(&config).await?;
        }
        Commands::Status => {
            auth::status(&config).await?;
        }
        Commands::Whoami => {
            auth::whoami(&config).await?;
        }
        Commands::Ping => {
            api::ping(&config).await?;
        }
        Commands::Config { init } => {
            if init {
                let path = match cli.config {
                    Some(path) => path,
                    None => Config::default_path()?,
                };
                if path.exists() {
                    println!("Config already exists at {}", path.display());
                } else {
                    config.save(&path)?;
                    println!("Wrote {}", path.display());
                }
            } else {
                print!("{}", config.to_toml()?);
            }
        }
    }

    Ok(())
}
