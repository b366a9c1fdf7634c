// SPDX-License-Identifier: MIT OR Apache-2.0

//! semsearch - Local semantic document search library
//!
//! Shared modules for the semsearch CLI: content hashing, the embedding
//! cache, parallel batch embedding, the persistent vector index and the
//! search engine that ties them together.

pub mod config;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod errors;
pub mod index;
pub mod output;
pub mod vector;

pub use document::{clean_text, hash_text, load_documents, Document};
pub use engine::{
    EngineState, Explanation, IndexReport, ResultMetadata, SearchEngine, SearchResponse,
    SearchResult,
};
pub use errors::{ErrorKind, Result, SearchError};
