// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - computes and caches document vectors
//!
//! Providers turn text into vectors, the batch embedder spreads large batches
//! over worker threads, and the cache keeps vectors keyed by content hash.

pub mod batch;
pub mod cache;
pub mod provider;

pub use batch::{default_workers, partition, BatchEmbedder};
pub use cache::{CacheEntry, EmbeddingCache};
pub use provider::{
    CommandProvider, EmbeddingProvider, EmbeddingProviderConfig, HashingProvider,
    ProviderFactory, ProviderSpec, DEFAULT_HASHING_DIM,
};
