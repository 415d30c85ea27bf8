//! Orderbox CLI - Database migrations and payload tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! orderbox-cli migrate
//!
//! # Check a stream payload without ingesting it
//! orderbox-cli validate order.json
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `validate` - Decode and validate an order payload

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "orderbox-cli")]
#[command(author, version, about = "Orderbox CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Decode and validate an order payload file
    Validate {
        /// Path to a JSON order payload
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Validate { file } => commands::validate::run(&file)?,
    }
    Ok(())
}
