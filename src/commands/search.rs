// SPDX-License-Identifier: MIT OR Apache-2.0

//! `semsearch search`: index the folder, then answer one query

use anyhow::Result;

use semsearch::config::Config;
use semsearch::output::{format_response, use_colors};

use super::open_and_index;
use crate::cli::OutputFormat;

pub fn run(config: &Config, query: &str, top_k: usize, format: OutputFormat) -> Result<()> {
    let (engine, report) = open_and_index(config)?;
    tracing::debug!(
        cache_hits = report.cache_hits,
        embedded = report.embedded,
        "index ready for search"
    );

    let response = engine.search(query, top_k)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            print!("{}", format_response(&response, use_colors()));
        }
    }
    Ok(())
}
