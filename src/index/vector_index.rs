// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent nearest-neighbor index over L2-normalized vectors.

use std::sync::Arc;

use crate::errors::{Result, SearchError};
use crate::index::backend::{BackendKind, SimilarityBackend};
use crate::index::store::{IndexSnapshot, IndexStore};

/// Vector index with wholesale rebuilds and exact inner-product search.
///
/// Positions in the vector slab and in `doc_ids` always refer to the same
/// document; both are replaced together on every [`VectorIndex::build`].
pub struct VectorIndex {
    dimension: usize,
    snapshot: Arc<IndexSnapshot>,
    store: Box<dyn IndexStore>,
    backend: Box<dyn SimilarityBackend>,
}

impl VectorIndex {
    /// Creates an index and tries to resume from the store. A snapshot that
    /// fails to load or has a different dimension is ignored.
    pub fn open(dimension: usize, store: Box<dyn IndexStore>, backend: BackendKind) -> Self {
        let backend = backend.create();
        tracing::debug!(backend = backend.name(), dimension, "opening vector index");

        let snapshot = match store.load() {
            Ok(Some(snapshot)) if snapshot.dimension == dimension => snapshot,
            Ok(Some(snapshot)) => {
                tracing::warn!(
                    stored = snapshot.dimension,
                    expected = dimension,
                    "persisted vector index has a different dimension; starting empty"
                );
                IndexSnapshot::empty(dimension)
            }
            Ok(None) => IndexSnapshot::empty(dimension),
            Err(err) => {
                tracing::warn!(error = %err, "failed to load vector index; starting empty");
                IndexSnapshot::empty(dimension)
            }
        };

        Self {
            dimension,
            snapshot: Arc::new(snapshot),
            store,
            backend,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn doc_ids(&self) -> &[String] {
        &self.snapshot.doc_ids
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Replaces the whole index with `vectors`/`doc_ids` and persists it.
    ///
    /// The new contents become visible only after the snapshot was saved; on
    /// error the previous contents stay in place.
    pub fn build(&mut self, vectors: &[Vec<f32>], doc_ids: &[String]) -> Result<()> {
        if vectors.len() != doc_ids.len() {
            return Err(SearchError::contract(format!(
                "index build got {} vectors but {} document ids",
                vectors.len(),
                doc_ids.len()
            )));
        }
        if let Some((pos, bad)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != self.dimension)
        {
            return Err(SearchError::contract(format!(
                "vector for '{}' has dimension {}, index expects {}",
                doc_ids[pos],
                bad.len(),
                self.dimension
            )));
        }

        let mut flat = Vec::with_capacity(vectors.len() * self.dimension);
        for vector in vectors {
            flat.extend_from_slice(vector);
        }
        let snapshot = IndexSnapshot {
            dimension: self.dimension,
            doc_ids: doc_ids.to_vec(),
            vectors: flat,
        };

        self.store.save(&snapshot)?;
        self.snapshot = Arc::new(snapshot);
        tracing::debug!(count = self.len(), "vector index rebuilt");
        Ok(())
    }

    /// Returns up to `top_k` `(doc_id, similarity)` pairs, best first.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(String, f32)>> {
        if top_k == 0 {
            return Err(SearchError::contract("top_k must be at least 1"));
        }
        if self.snapshot.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(SearchError::contract(format!(
                "query vector has dimension {}, index expects {}",
                query.len(),
                self.dimension
            )));
        }

        let snapshot = &self.snapshot;
        let top_k = top_k.min(snapshot.len());
        Ok(self
            .backend
            .top_k(snapshot, query, top_k)
            .into_iter()
            .filter_map(|(pos, score)| snapshot.doc_ids.get(pos).map(|id| (id.clone(), score)))
            .collect())
    }
}
