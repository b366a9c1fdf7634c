// SPDX-License-Identifier: MIT OR Apache-2.0

//! semsearch - Local semantic document search tool
//!
//! Embeds a folder of text documents with a local model, caches vectors by
//! content hash in SQLite, and ranks documents by cosine similarity.

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use commands::Overrides;
use semsearch::config::Config;
use semsearch::{ErrorKind, SearchError};
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize tracing with SEMSEARCH_LOG env var (e.g., SEMSEARCH_LOG=debug semsearch index)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("SEMSEARCH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("Error: {:#}", err);
        std::process::exit(exit_code(&err));
    }
}

fn run(cli: Cli) -> Result<()> {
    let format = cli.format.unwrap_or_default();
    let mut config = Config::load();

    match cli.command {
        Commands::Index {
            path,
            workers,
            backend,
        } => {
            Overrides {
                path,
                workers,
                backend,
            }
            .apply(&mut config);
            commands::index::run(&config, format)?;
        }
        Commands::Search {
            query,
            path,
            top_k,
            workers,
            backend,
        } => {
            Overrides {
                path,
                workers,
                backend,
            }
            .apply(&mut config);
            let top_k = config.merge_top_k(top_k);
            commands::search::run(&config, &query, top_k, format)?;
        }
        Commands::CacheStats => {
            commands::stats::run(&config, format)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "semsearch", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// 3 = not ready, 2 = invalid input, 1 = anything else.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SearchError>().map(SearchError::kind) {
        Some(ErrorKind::NotReady) => 3,
        Some(ErrorKind::InvalidInput) => 2,
        _ => 1,
    }
}
