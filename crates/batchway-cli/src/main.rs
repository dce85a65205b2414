//! Batchway CLI - send coalesced bulk requests and manage the response cache.

use batchway_client::observability::{init_logging, LogFormat};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// Batchway - coalescing client for bulk API endpoints
#[derive(Parser, Debug)]
#[command(name = "batchway")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a JSON array of requests through a connector
    Send {
        /// File holding the request array
        file: PathBuf,
        /// Bulk endpoint URL (overrides configuration)
        #[arg(short, long)]
        endpoint: Option<String>,
        /// Send the array as one all-or-nothing batch
        #[arg(long)]
        transactional: bool,
        /// Bearer token for requests that need authentication
        #[arg(long)]
        auth_token: Option<String>,
    },

    /// Inspect or purge the response cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug)]
enum CacheCommands {
    /// List cache partitions and their record counts
    List,

    /// Remove partitions of other versions
    Purge {
        /// Remove the current version's partition too
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging(log_level, format);

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Send {
            file,
            endpoint,
            transactional,
            auth_token,
        } => {
            let options = commands::SendOptions {
                endpoint,
                transactional,
                auth_token,
            };
            commands::send(config, &file, options).await
        }
        Commands::Cache { command } => match command {
            CacheCommands::List => commands::cache_list(config),
            CacheCommands::Purge { all } => commands::cache_purge(config, all),
        },
        Commands::Version => {
            println!("batchway {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
