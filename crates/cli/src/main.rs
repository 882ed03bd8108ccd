//! Mimir CLI: the main entry point.
//!
//! Commands:
//! - `onboard`  - Write a default config and data directory
//! - `gateway`  - Start the HTTP gateway
//! - `status`   - Show configuration and store counts
//! - `register` - Register a face identity from a photo file
//! - `ingest`   - Ingest a UTF-8 text file into a knowledge collection

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "mimir",
    about = "Mimir: face-authenticated, role-scoped retrieval assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration and create the data directory
    Onboard,

    /// Start the HTTP gateway server
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show configuration summary and store counts
    Status,

    /// Register (or re-register) a user from a photo
    Register {
        /// User identifier
        #[arg(long)]
        email: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// One of the configured roles
        #[arg(long)]
        role: String,

        /// Path to the photo
        #[arg(long)]
        photo: PathBuf,
    },

    /// Ingest a UTF-8 text file
    Ingest {
        /// common, data-mart, role or personal
        #[arg(long)]
        scope: String,

        /// Role name for `role`, user id for `personal`
        #[arg(long)]
        owner: Option<String>,

        /// The text file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Gateway { port } => commands::gateway::run(port).await?,
        Commands::Status => commands::status::run().await?,
        Commands::Register {
            email,
            name,
            role,
            photo,
        } => commands::register::run(&email, &name, &role, &photo).await?,
        Commands::Ingest { scope, owner, file } => commands::ingest::run(&scope, owner.as_deref(), &file).await?,
    }

    Ok(())
}
