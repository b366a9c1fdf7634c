// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch embedding across a pool of worker threads.
//!
//! Large batches are split into contiguous chunks, one per worker. Each
//! worker builds its own provider through the [`ProviderFactory`], embeds its
//! chunk, and the results are concatenated in chunk order so output `i`
//! always belongs to input `i`. Small batches run inline on a single provider
//! that is created lazily and kept for later calls.

use anyhow::anyhow;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::ops::Range;
use std::sync::Arc;

use crate::embedding::provider::{EmbeddingProvider, ProviderFactory};
use crate::errors::{Result, SearchError};

/// Default worker count: all cores but one, at least one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Splits `len` items into at most `parts` contiguous ranges whose sizes
/// differ by at most one. Empty ranges are dropped.
pub fn partition(len: usize, parts: usize) -> Vec<Range<usize>> {
    if parts == 0 {
        return if len == 0 { Vec::new() } else { vec![0..len] };
    }

    let base = len / parts;
    let remainder = len % parts;
    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let end = start + base + usize::from(i < remainder);
        if end > start {
            ranges.push(start..end);
        }
        start = end;
    }
    ranges
}

/// Order-preserving, optionally parallel embedder.
pub struct BatchEmbedder {
    factory: Arc<dyn ProviderFactory>,
    workers: usize,
    pool: Option<rayon::ThreadPool>,
    inline: Mutex<Option<Box<dyn EmbeddingProvider>>>,
}

impl BatchEmbedder {
    /// Creates an embedder dispatching to `workers` threads (0 means default).
    pub fn new(factory: Arc<dyn ProviderFactory>, workers: usize) -> Result<Self> {
        let workers = if workers == 0 {
            default_workers()
        } else {
            workers
        };

        let pool = if workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("semsearch-embed-{}", i))
                .build()
                .map_err(|err| {
                    SearchError::EmbeddingBackend(
                        anyhow::Error::new(err).context("Failed to start embedding workers"),
                    )
                })?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            factory,
            workers,
            pool,
            inline: Mutex::new(None),
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Batches below this size are embedded inline.
    pub fn parallel_threshold(&self) -> usize {
        2 * self.workers
    }

    /// Embeds every text, returning vectors in input order. Fails as a whole
    /// if any text cannot be embedded.
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = match &self.pool {
            Some(pool) if texts.len() >= self.parallel_threshold() => {
                self.embed_parallel(pool, texts)?
            }
            _ => {
                tracing::debug!(count = texts.len(), "embedding batch inline");
                self.embed_inline(texts)?
            }
        };

        check_dimensions(&vectors)?;
        Ok(vectors)
    }

    /// Embeds one text on the inline provider (used for queries).
    pub fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_inline(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| SearchError::EmbeddingBackend(anyhow!("No embedding returned")))
    }

    /// Output dimension of the configured model.
    pub fn dimension(&self) -> Result<usize> {
        self.with_inline(|provider| provider.dimension())
    }

    fn embed_inline(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.with_inline(|provider| provider.embed_texts(texts))?;
        check_count(texts.len(), vectors.len())?;
        Ok(vectors)
    }

    fn with_inline<T>(
        &self,
        f: impl FnOnce(&mut dyn EmbeddingProvider) -> anyhow::Result<T>,
    ) -> Result<T> {
        let mut guard = self.inline.lock();
        if guard.is_none() {
            let provider = self
                .factory
                .create()
                .map_err(SearchError::EmbeddingBackend)?;
            tracing::debug!(model = provider.model_id(), "loaded inline embedding provider");
            *guard = Some(provider);
        }
        match guard.as_mut() {
            Some(provider) => f(provider.as_mut()).map_err(SearchError::EmbeddingBackend),
            None => Err(SearchError::EmbeddingBackend(anyhow!(
                "Embedding provider unavailable"
            ))),
        }
    }

    fn embed_parallel(&self, pool: &rayon::ThreadPool, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let chunks = partition(texts.len(), self.workers);
        tracing::debug!(
            count = texts.len(),
            chunks = chunks.len(),
            "embedding batch in parallel"
        );

        let factory = &self.factory;
        let results: Vec<Vec<Vec<f32>>> = pool.install(|| {
            chunks
                .into_par_iter()
                .map(|range| {
                    let chunk = &texts[range];
                    let mut provider = factory.create().map_err(SearchError::EmbeddingBackend)?;
                    let vectors = provider
                        .embed_texts(chunk)
                        .map_err(SearchError::EmbeddingBackend)?;
                    check_count(chunk.len(), vectors.len())?;
                    Ok(vectors)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        Ok(results.into_iter().flatten().collect())
    }
}

fn check_count(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(SearchError::EmbeddingBackend(anyhow!(
            "Embedding backend returned {} vectors for {} texts",
            actual,
            expected
        )));
    }
    Ok(())
}

fn check_dimensions(vectors: &[Vec<f32>]) -> Result<()> {
    let Some(first) = vectors.first() else {
        return Ok(());
    };
    let dim = first.len();
    if dim == 0 {
        return Err(SearchError::EmbeddingBackend(anyhow!(
            "Embedding backend returned empty vectors"
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(SearchError::EmbeddingBackend(anyhow!(
            "Embedding backend returned mixed dimensions ({} and {})",
            dim,
            bad.len()
        )));
    }
    Ok(())
}
