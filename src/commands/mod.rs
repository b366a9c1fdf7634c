// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command implementations for the semsearch binary

pub mod index;
pub mod search;
pub mod stats;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

use semsearch::config::Config;
use semsearch::index::BackendKind;
use semsearch::{load_documents, IndexReport, SearchEngine};

use crate::cli::CliBackend;

/// Per-invocation settings that win over config and environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub path: Option<String>,
    pub workers: Option<usize>,
    pub backend: Option<CliBackend>,
}

impl Overrides {
    pub fn apply(self, config: &mut Config) {
        if let Some(path) = self.path {
            config.data.folder = Some(PathBuf::from(path));
        }
        if let Some(workers) = self.workers {
            config.embeddings.workers = Some(workers);
        }
        if let Some(backend) = self.backend {
            config.index.backend = Some(match backend {
                CliBackend::Auto => BackendKind::Auto,
                CliBackend::Parallel => BackendKind::Parallel,
                CliBackend::BruteForce => BackendKind::BruteForce,
            });
        }
    }
}

/// Opens the engine and indexes the configured folder behind a spinner.
pub(crate) fn open_and_index(config: &Config) -> Result<(SearchEngine, IndexReport)> {
    let folder = config.data.folder();
    let docs = load_documents(&folder)
        .with_context(|| format!("Failed to load documents from {}", folder.display()))?;

    let pb = spinner(&format!("Indexing {} documents", docs.len()));
    let outcome = SearchEngine::from_config(config).and_then(|mut engine| {
        let report = engine.index_documents(&docs)?;
        Ok((engine, report))
    });
    pb.finish_and_clear();

    Ok(outcome?)
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
