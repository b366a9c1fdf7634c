// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the indexing and retrieval pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the durable embedding cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to create cache directory {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("corrupt embedding blob for document '{doc_id}' ({len} bytes)")]
    CorruptBlob { doc_id: String, len: usize },
}

/// Failures of the persisted vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector index I/O failure at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid vector index file: {0}")]
    Format(String),

    #[error("vector index checksum mismatch ({section})")]
    Checksum { section: &'static str },
}

/// Top-level error returned by the search engine.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Caller violated a precondition.
    #[error("invalid request: {0}")]
    Contract(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("embedding backend failed: {0:#}")]
    EmbeddingBackend(anyhow::Error),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("search engine is not ready: index documents before searching")]
    NotReady,
}

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retry once indexing has completed.
    NotReady,
    /// Fix the request.
    InvalidInput,
    /// Backend or storage problem.
    Operational,
}

impl SearchError {
    pub fn contract(message: impl Into<String>) -> Self {
        SearchError::Contract(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchError::NotReady => ErrorKind::NotReady,
            SearchError::Contract(_) => ErrorKind::InvalidInput,
            SearchError::Cache(_) | SearchError::EmbeddingBackend(_) | SearchError::Index(_) => {
                ErrorKind::Operational
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
