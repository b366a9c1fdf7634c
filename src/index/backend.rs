// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exact inner-product search backends.
//!
//! Both backends rank by descending score and break ties by ascending
//! position, so they return identical results for the same snapshot.

use rayon::prelude::*;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::index::store::IndexSnapshot;
use crate::vector::dot_product;

/// Below this many vectors the parallel backend scans sequentially.
const PARALLEL_THRESHOLD: usize = 4096;
const PARALLEL_CHUNK_ROWS: usize = 1024;

/// Backend selection from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Auto,
    Parallel,
    BruteForce,
}

impl BackendKind {
    /// Resolves `Auto` against the current rayon pool.
    pub fn create(self) -> Box<dyn SimilarityBackend> {
        match self {
            BackendKind::Parallel => Box::new(ParallelScan),
            BackendKind::BruteForce => Box::new(BruteForce),
            BackendKind::Auto => {
                if rayon::current_num_threads() > 1 {
                    Box::new(ParallelScan)
                } else {
                    tracing::info!("parallel scan unavailable, using brute-force search");
                    Box::new(BruteForce)
                }
            }
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(BackendKind::Auto),
            "parallel" => Ok(BackendKind::Parallel),
            "brute_force" | "brute-force" | "flat" => Ok(BackendKind::BruteForce),
            _ => Err(format!("Unknown index backend: {}", s)),
        }
    }
}

/// Top-k search over a snapshot. Returns `(position, score)` pairs.
pub trait SimilarityBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn top_k(&self, snapshot: &IndexSnapshot, query: &[f32], k: usize) -> Vec<(usize, f32)>;
}

fn rank(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.0.cmp(&b.0))
}

/// Scores every vector, sorts, truncates.
pub struct BruteForce;

impl SimilarityBackend for BruteForce {
    fn name(&self) -> &'static str {
        "brute_force"
    }

    fn top_k(&self, snapshot: &IndexSnapshot, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = (0..snapshot.len())
            .map(|pos| (pos, dot_product(snapshot.row(pos), query)))
            .collect();
        scored.sort_by(rank);
        scored.truncate(k);
        scored
    }
}

/// Heap entry ordered so the worst candidate sits at the top.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    position: usize,
    score: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        rank(
            &(self.position, self.score),
            &(other.position, other.score),
        )
    }
}

fn push_bounded(heap: &mut BinaryHeap<Candidate>, candidate: Candidate, k: usize) {
    if heap.len() < k {
        heap.push(candidate);
    } else if let Some(worst) = heap.peek() {
        if candidate < *worst {
            heap.pop();
            heap.push(candidate);
        }
    }
}

/// Rayon-parallel exact scan keeping a bounded heap per chunk.
pub struct ParallelScan;

impl ParallelScan {
    fn scan_rows(
        snapshot: &IndexSnapshot,
        query: &[f32],
        rows: std::ops::Range<usize>,
        k: usize,
    ) -> BinaryHeap<Candidate> {
        let mut heap = BinaryHeap::with_capacity(k + 1);
        for position in rows {
            let score = dot_product(snapshot.row(position), query);
            push_bounded(&mut heap, Candidate { position, score }, k);
        }
        heap
    }
}

impl SimilarityBackend for ParallelScan {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn top_k(&self, snapshot: &IndexSnapshot, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let count = snapshot.len();
        let k = k.min(count);
        if k == 0 {
            return Vec::new();
        }

        let heap = if count < PARALLEL_THRESHOLD {
            Self::scan_rows(snapshot, query, 0..count, k)
        } else {
            let chunk_starts: Vec<usize> = (0..count).step_by(PARALLEL_CHUNK_ROWS).collect();
            chunk_starts
                .into_par_iter()
                .map(|start| {
                    let end = (start + PARALLEL_CHUNK_ROWS).min(count);
                    Self::scan_rows(snapshot, query, start..end, k)
                })
                .reduce(BinaryHeap::new, |mut acc, heap| {
                    for candidate in heap {
                        push_bounded(&mut acc, candidate, k);
                    }
                    acc
                })
        };

        // Ascending by `Ord` is best-first.
        heap.into_sorted_vec()
            .into_iter()
            .map(|c| (c.position, c.score))
            .collect()
    }
}
