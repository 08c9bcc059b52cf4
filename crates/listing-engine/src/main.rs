// Copyright 2026 Listing Engine Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(
    name = "listing",
    about = "Extract normalized records from marketplace listing pages",
    version,
    after_help = "Run 'listing <command> --help' for details on each command."
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Upper bound on browser navigation, in milliseconds
    #[arg(long, global = true)]
    navigation_timeout_ms: Option<u64>,

    /// Upper bound on a static page fetch, in milliseconds
    #[arg(long, global = true)]
    http_timeout_ms: Option<u64>,

    /// Chromium binary to use instead of discovery
    #[arg(long, global = true)]
    chromium_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract one listing and print the record
    Extract {
        /// Listing URL
        url: String,
        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Exit 0 when the URL belongs to a supported marketplace, 1 otherwise
    Supported {
        /// Listing URL
        url: String,
    },
    /// Normalize a cached field set read from a file or stdin
    Normalize {
        /// JSON file, or `-` for stdin
        input: String,
    },
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli::init_logging(cli.verbose, cli.quiet, cli.log_json);

    let overrides = cli::ConfigOverrides {
        navigation_timeout_ms: cli.navigation_timeout_ms,
        http_timeout_ms: cli.http_timeout_ms,
        chromium_path: cli.chromium_path,
    };

    let result = match cli.command {
        Commands::Extract { url, json } => {
            cli::extract_cmd::run(overrides.apply(listing_engine::EngineConfig::from_env()), &url, json)
                .await
        }
        Commands::Supported { url } => {
            let supported = cli::supported(&url);
            if !supported {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Normalize { input } => cli::normalize_cmd::run(&input),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "listing", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = &result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    result
}
