// SPDX-License-Identifier: MIT OR Apache-2.0

//! Search engine: cache-aware indexing and explained retrieval.
//!
//! `index_documents` reuses cached embeddings whose content hash still
//! matches, embeds the rest in one batch, writes them back to the cache and
//! rebuilds the vector index from the full set. `search` ranks by raw vector
//! similarity and attaches a keyword-overlap explanation plus a combined
//! score that blends similarity with a mild preference for short documents.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::Config;
use crate::document::Document;
use crate::embedding::{BatchEmbedder, EmbeddingCache, ProviderFactory};
use crate::errors::{Result, SearchError};
use crate::index::{BackendKind, FileIndexStore, IndexStore, VectorIndex};
use crate::vector::l2_normalize;

const VECTOR_WEIGHT: f32 = 0.8;
const LENGTH_WEIGHT: f32 = 0.2;
const LENGTH_SCALE: f32 = 10_000.0;
const PREVIEW_CHARS: usize = 300;
const MAX_OVERLAP_KEYWORDS: usize = 10;

/// Whether the engine can answer queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotReady,
    /// `generation` counts completed `index_documents` calls.
    Ready { generation: u64 },
}

/// Stored per-document data used to explain results.
#[derive(Debug, Clone)]
struct DocumentMeta {
    text: String,
    length: usize,
    source_path: String,
}

/// Outcome of one `index_documents` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub total: usize,
    pub cache_hits: usize,
    pub embedded: usize,
}

/// Why a document matched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub overlap_keywords: Vec<String>,
    pub overlap_count: usize,
    pub overlap_ratio: f32,
    pub length_norm: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultMetadata {
    pub length: usize,
    pub source_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub doc_id: String,
    /// Combined score (informational; ranking uses `raw_score`)
    pub score: f32,
    /// Cosine similarity between query and document
    pub raw_score: f32,
    pub preview: String,
    pub explanation: Explanation,
    pub metadata: ResultMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
}

/// Keyword overlap between a query and a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlap {
    pub keywords: Vec<String>,
    pub count: usize,
    pub ratio: f32,
}

/// Lowercased whitespace-token overlap. Keywords follow their first
/// appearance in the document, deduplicated, at most ten.
pub fn explain_overlap(query: &str, doc_text: &str) -> Overlap {
    let query_lower = query.to_lowercase();
    let doc_lower = doc_text.to_lowercase();

    let query_tokens: HashSet<&str> = query_lower.split_whitespace().collect();
    let doc_tokens: HashSet<&str> = doc_lower.split_whitespace().collect();
    let shared: HashSet<&str> = query_tokens.intersection(&doc_tokens).copied().collect();

    let count = shared.len();
    let ratio = count as f32 / query_tokens.len().max(1) as f32;

    let mut keywords = Vec::new();
    if count > 0 {
        let mut seen = HashSet::new();
        for token in doc_lower.split_whitespace() {
            if keywords.len() >= MAX_OVERLAP_KEYWORDS {
                break;
            }
            if shared.contains(token) && seen.insert(token) {
                keywords.push(token.to_string());
            }
        }
    }

    Overlap {
        keywords,
        count,
        ratio,
    }
}

/// `1 / (1 + length / 10000)`: in (0, 1], decreasing with length.
pub fn length_norm(length: usize) -> f32 {
    1.0 / (1.0 + length as f32 / LENGTH_SCALE)
}

/// Fixed blend of similarity and length preference.
pub fn combined_score(raw_score: f32, length_norm: f32) -> f32 {
    VECTOR_WEIGHT * raw_score + LENGTH_WEIGHT * length_norm
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// Orchestrates cache, embedder and vector index.
pub struct SearchEngine {
    embedder: BatchEmbedder,
    cache: EmbeddingCache,
    index: VectorIndex,
    metadata: HashMap<String, DocumentMeta>,
    state: EngineState,
}

impl SearchEngine {
    /// Builds an engine, asking the model for its dimension and resuming a
    /// persisted index from `store` when one is available.
    pub fn new(
        embedder: BatchEmbedder,
        cache: EmbeddingCache,
        store: Box<dyn IndexStore>,
        backend: BackendKind,
    ) -> Result<Self> {
        let dimension = embedder.dimension()?;
        let index = VectorIndex::open(dimension, store, backend);
        tracing::debug!(
            dimension,
            resumed = index.len(),
            backend = index.backend_name(),
            workers = embedder.workers(),
            "search engine created"
        );

        Ok(Self {
            embedder,
            cache,
            index,
            metadata: HashMap::new(),
            state: EngineState::NotReady,
        })
    }

    /// Builds the on-disk engine described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let factory: Arc<dyn ProviderFactory> = Arc::new(config.embeddings.provider_spec());
        let embedder = BatchEmbedder::new(factory, config.embeddings.workers())?;
        let cache = EmbeddingCache::open(config.cache.db_path())?;
        let store = FileIndexStore::new(config.index.path());
        Self::new(embedder, cache, Box::new(store), config.index.backend())
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, EngineState::Ready { .. })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Indexes `docs`, replacing the document set from any earlier call.
    ///
    /// Any cache, embedding or index failure fails the whole call and leaves
    /// the previous document set searchable.
    pub fn index_documents(&mut self, docs: &[Document]) -> Result<IndexReport> {
        let mut seen = HashSet::with_capacity(docs.len());
        if let Some(dup) = docs.iter().find(|doc| !seen.insert(doc.id.as_str())) {
            return Err(SearchError::contract(format!(
                "duplicate document id '{}'",
                dup.id
            )));
        }

        if docs.is_empty() {
            // Nothing to rebuild; the current corpus stays searchable.
            tracing::info!("no documents to index");
            if self.state == EngineState::NotReady {
                self.state = EngineState::Ready { generation: 1 };
            }
            return Ok(IndexReport::default());
        }

        let metadata: HashMap<String, DocumentMeta> = docs
            .iter()
            .map(|doc| {
                (
                    doc.id.clone(),
                    DocumentMeta {
                        text: doc.normalized_text.clone(),
                        length: doc.length,
                        source_path: doc.source_path.clone(),
                    },
                )
            })
            .collect();

        let mut doc_ids = Vec::with_capacity(docs.len());
        let mut vectors = Vec::with_capacity(docs.len());
        let mut misses: Vec<&Document> = Vec::new();

        let dimension = self.index.dimension();
        for doc in docs {
            match self.cache.get(&doc.id, &doc.content_hash)? {
                Some(embedding) if embedding.len() == dimension => {
                    doc_ids.push(doc.id.clone());
                    vectors.push(embedding);
                }
                Some(embedding) => {
                    // Written by a model with another dimension.
                    tracing::debug!(
                        doc_id = %doc.id,
                        cached = embedding.len(),
                        dimension,
                        "ignoring cached embedding"
                    );
                    misses.push(doc);
                }
                None => misses.push(doc),
            }
        }
        let cache_hits = doc_ids.len();

        if !misses.is_empty() {
            let texts: Vec<String> = misses
                .iter()
                .map(|doc| doc.normalized_text.clone())
                .collect();
            let embedded = self.embedder.embed(&texts)?;

            for (doc, embedding) in misses.iter().zip(embedded) {
                self.cache.put(&doc.id, &doc.content_hash, &embedding)?;
                doc_ids.push(doc.id.clone());
                vectors.push(embedding);
            }
        }

        for vector in vectors.iter_mut() {
            l2_normalize(vector);
        }
        self.index.build(&vectors, &doc_ids)?;
        self.commit(metadata);

        let report = IndexReport {
            total: docs.len(),
            cache_hits,
            embedded: misses.len(),
        };
        tracing::info!(
            total = report.total,
            cache_hits = report.cache_hits,
            embedded = report.embedded,
            "indexed documents"
        );
        Ok(report)
    }

    fn commit(&mut self, metadata: HashMap<String, DocumentMeta>) {
        self.metadata = metadata;
        let generation = match self.state {
            EngineState::NotReady => 1,
            EngineState::Ready { generation } => generation + 1,
        };
        self.state = EngineState::Ready { generation };
    }

    /// Returns up to `top_k` documents ordered by vector similarity.
    pub fn search(&self, query: &str, top_k: usize) -> Result<SearchResponse> {
        if !self.is_ready() {
            return Err(SearchError::NotReady);
        }
        if top_k == 0 {
            return Err(SearchError::contract("top_k must be at least 1"));
        }

        let mut query_vector = self.embedder.embed_one(query)?;
        l2_normalize(&mut query_vector);
        let hits = self.index.search(&query_vector, top_k)?;

        let results = hits
            .into_iter()
            .filter_map(|(doc_id, raw_score)| {
                let Some(meta) = self.metadata.get(&doc_id) else {
                    tracing::debug!(doc_id = %doc_id, "index hit has no metadata; skipping");
                    return None;
                };
                let overlap = explain_overlap(query, &meta.text);
                let length_norm = length_norm(meta.length);

                Some(SearchResult {
                    score: combined_score(raw_score, length_norm),
                    raw_score,
                    preview: preview(&meta.text),
                    explanation: Explanation {
                        overlap_keywords: overlap.keywords,
                        overlap_count: overlap.count,
                        overlap_ratio: overlap.ratio,
                        length_norm,
                    },
                    metadata: ResultMetadata {
                        length: meta.length,
                        source_path: meta.source_path.clone(),
                    },
                    doc_id,
                })
            })
            .collect();

        Ok(SearchResponse {
            query: query.to_string(),
            results,
        })
    }
}
