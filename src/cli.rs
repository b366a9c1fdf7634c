// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// semsearch - Local semantic document search
///
/// Embeds a folder of text documents, caches the vectors by content hash,
/// and answers natural-language queries with explained results.
#[derive(Parser, Debug)]
#[command(name = "semsearch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Index backend override
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliBackend {
    Auto,
    Parallel,
    BruteForce,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed the document folder and rebuild the vector index
    #[command(visible_alias = "i")]
    Index {
        /// Document folder (defaults to config or data/docs)
        #[arg(short, long)]
        path: Option<String>,

        /// Embedding worker threads (0 = all cores but one)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Similarity backend
        #[arg(long, value_enum)]
        backend: Option<CliBackend>,
    },

    /// Search the document folder
    #[command(visible_alias = "s")]
    Search {
        /// Natural-language query
        query: String,

        /// Document folder (defaults to config or data/docs)
        #[arg(short, long)]
        path: Option<String>,

        /// Number of results to return
        #[arg(short = 'k', long = "top-k")]
        top_k: Option<usize>,

        /// Embedding worker threads (0 = all cores but one)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Similarity backend
        #[arg(long, value_enum)]
        backend: Option<CliBackend>,
    },

    /// Show embedding cache and vector index statistics
    CacheStats,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
