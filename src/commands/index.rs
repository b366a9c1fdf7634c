// SPDX-License-Identifier: MIT OR Apache-2.0

//! `semsearch index`: embed the folder and rebuild the vector index

use anyhow::Result;
use serde::Serialize;

use semsearch::config::Config;
use semsearch::output::{format_report, use_colors};
use semsearch::IndexReport;

use super::open_and_index;
use crate::cli::OutputFormat;

#[derive(Serialize)]
struct IndexOutput<'a> {
    folder: String,
    index_path: String,
    backend: &'a str,
    dimension: usize,
    #[serde(flatten)]
    report: IndexReport,
}

pub fn run(config: &Config, format: OutputFormat) -> Result<()> {
    let (engine, report) = open_and_index(config)?;

    match format {
        OutputFormat::Json => {
            let output = IndexOutput {
                folder: config.data.folder().display().to_string(),
                index_path: config.index.path().display().to_string(),
                backend: engine.index().backend_name(),
                dimension: engine.index().dimension(),
                report,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("{}", format_report(&report, use_colors()));
        }
    }
    Ok(())
}
