// SPDX-License-Identifier: MIT OR Apache-2.0

//! Documents handed to the engine, plus the folder loader used by the CLI.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use walkdir::WalkDir;

static HTML_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid html tag regex"));
static MULTI_SPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// A normalized document ready for indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    /// Unique identifier (file stem for loaded documents)
    pub id: String,
    /// Cleaned text used for embedding and explanations
    pub normalized_text: String,
    /// Fingerprint of `normalized_text`
    pub content_hash: String,
    /// Length of `normalized_text` in characters
    pub length: usize,
    /// Where the document came from
    pub source_path: String,
}

impl Document {
    /// Builds a document from already-normalized text, computing hash and length.
    pub fn new(
        id: impl Into<String>,
        normalized_text: impl Into<String>,
        source_path: impl Into<String>,
    ) -> Self {
        let normalized_text = normalized_text.into();
        Self {
            id: id.into(),
            content_hash: hash_text(&normalized_text),
            length: normalized_text.chars().count(),
            normalized_text,
            source_path: source_path.into(),
        }
    }
}

/// Content fingerprint: BLAKE3 digest as 64 lowercase hex characters.
pub fn hash_text(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Strips markup, lowercases and collapses whitespace.
pub fn clean_text(raw: &str) -> String {
    let without_tags = HTML_TAG_RE.replace_all(raw, " ");
    let lowered = without_tags.to_lowercase();
    MULTI_SPACE_RE.replace_all(&lowered, " ").trim().to_string()
}

/// Loads every `.txt` file under `folder`, sorted by file name within each directory.
pub fn load_documents(folder: impl AsRef<Path>) -> Result<Vec<Document>> {
    let folder = folder.as_ref();
    if !folder.is_dir() {
        bail!("Document folder not found: {}", folder.display());
    }

    let mut docs = Vec::new();
    for entry in WalkDir::new(folder).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("Failed to walk folder: {}", folder.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_text_file(path) {
            continue;
        }

        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let text = clean_text(&String::from_utf8_lossy(&bytes));
        docs.push(Document::new(doc_id(folder, path), text, path.to_string_lossy()));
    }

    tracing::debug!(count = docs.len(), folder = %folder.display(), "loaded documents");
    Ok(docs)
}

/// Path relative to `folder`, without extension, `/`-separated.
/// Same-named files in different subfolders get distinct ids.
fn doc_id(folder: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(folder).unwrap_or(path).with_extension("");
    relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("txt"))
        .unwrap_or(false)
}
