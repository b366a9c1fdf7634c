// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector index module - persistent exact nearest-neighbor search
//!
//! The index keeps every document vector in memory, persists snapshots through
//! an [`IndexStore`], and answers queries with a [`SimilarityBackend`].

pub mod backend;
pub mod store;
pub mod vector_index;

pub use backend::{BackendKind, BruteForce, ParallelScan, SimilarityBackend};
pub use store::{FileIndexStore, IndexSnapshot, IndexStore, MemoryIndexStore};
pub use vector_index::VectorIndex;
