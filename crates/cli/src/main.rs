//! TSH CLI - Stock sync and cache maintenance tools.
//!
//! Uses the same environment as the portal server (`.env` is loaded), so
//! it shares the key-value store, the sync lock and the Zoho token.
//!
//! # Usage
//!
//! ```bash
//! # Run a full stock sync now (skipped if one is already running)
//! tsh-cli sync stock
//!
//! # Show the last sync report and the lock holder
//! tsh-cli sync status
//!
//! # Drop cached entries by tag
//! tsh-cli cache invalidate products customer:460000000026049
//!
//! # Verify Zoho credentials and organization access
//! tsh-cli zoho check
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "tsh-cli")]
#[command(author, version, about = "TSH portal CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stock synchronization
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },
    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Zoho connectivity
    Zoho {
        #[command(subcommand)]
        action: ZohoAction,
    },
}

#[derive(Subcommand)]
enum SyncAction {
    /// Pull the whole catalog and rewrite the stock snapshot
    Stock,
    /// Print the last sync report
    Status,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete every entry registered under the given tags
    Invalidate {
        /// Tags such as `products`, `item:<id>` or `customer:<id>`
        #[arg(required = true)]
        tags: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ZohoAction {
    /// Refresh an access token and read one page of items
    Check,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tsh_storefront=info,tsh_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let state = commands::load_state()?;

    match cli.command {
        Commands::Sync { action } => match action {
            SyncAction::Stock => commands::sync::stock(&state).await?,
            SyncAction::Status => commands::sync::status(&state).await?,
        },
        Commands::Cache { action } => match action {
            CacheAction::Invalidate { tags } => commands::cache::invalidate(&state, &tags).await?,
        },
        Commands::Zoho { action } => match action {
            ZohoAction::Check => commands::zoho::check(&state).await?,
        },
    }
    Ok(())
}
