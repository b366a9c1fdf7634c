// SPDX-License-Identifier: MIT OR Apache-2.0

//! `semsearch cache-stats`: report what is stored on disk

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use semsearch::config::Config;
use semsearch::embedding::EmbeddingCache;
use semsearch::index::{FileIndexStore, IndexStore};
use semsearch::output::use_colors;

use crate::cli::OutputFormat;

#[derive(Serialize)]
struct StatsOutput {
    cache_path: String,
    cached_embeddings: u64,
    index_path: String,
    indexed_vectors: usize,
    index_dimension: Option<usize>,
}

pub fn run(config: &Config, format: OutputFormat) -> Result<()> {
    let cache_path = config.cache.db_path();
    let cache = EmbeddingCache::open(&cache_path)?;
    let cached = cache.count()?;

    let index_path = config.index.path();
    let snapshot = match FileIndexStore::new(&index_path).load() {
        Ok(snapshot) => snapshot,
        Err(err) => {
            tracing::warn!(error = %err, "vector index unreadable");
            None
        }
    };

    let stats = StatsOutput {
        cache_path: cache_path.display().to_string(),
        cached_embeddings: cached,
        index_path: index_path.display().to_string(),
        indexed_vectors: snapshot.as_ref().map(|s| s.len()).unwrap_or(0),
        index_dimension: snapshot.as_ref().map(|s| s.dimension),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => {
            let use_color = use_colors();
            let label = |text: &str| {
                if use_color {
                    text.bold().to_string()
                } else {
                    text.to_string()
                }
            };
            println!("{} {}", label("Cache:"), stats.cache_path);
            println!("  embeddings: {}", stats.cached_embeddings);
            println!("{} {}", label("Index:"), stats.index_path);
            println!("  vectors: {}", stats.indexed_vectors);
            match stats.index_dimension {
                Some(dim) => println!("  dimension: {}", dim),
                None => println!("  dimension: -"),
            }
        }
    }
    Ok(())
}
