// SPDX-License-Identifier: MIT OR Apache-2.0

use semsearch::embedding::{
    BatchEmbedder, EmbeddingCache, EmbeddingProvider, HashingProvider, ProviderFactory,
};
use semsearch::index::{BackendKind, FileIndexStore, MemoryIndexStore};
use semsearch::{Document, EngineState, ErrorKind, SearchEngine, SearchError};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Wraps the hashing provider and counts every text it embeds.
struct CountingProvider {
    inner: HashingProvider,
    embedded: Arc<AtomicUsize>,
}

impl EmbeddingProvider for CountingProvider {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn batch_size(&self) -> usize {
        self.inner.batch_size()
    }

    fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_texts(texts)
    }

    fn dimension(&mut self) -> anyhow::Result<usize> {
        self.inner.dimension()
    }
}

fn counting_factory(dimension: usize, embedded: Arc<AtomicUsize>) -> Arc<dyn ProviderFactory> {
    Arc::new(move || -> anyhow::Result<Box<dyn EmbeddingProvider>> {
        Ok(Box::new(CountingProvider {
            inner: HashingProvider::new(dimension)?,
            embedded: embedded.clone(),
        }))
    })
}

fn disk_engine(dir: &Path, workers: usize, embedded: Arc<AtomicUsize>) -> SearchEngine {
    SearchEngine::new(
        BatchEmbedder::new(counting_factory(256, embedded), workers).expect("embedder"),
        EmbeddingCache::open(dir.join("cache").join("embeddings.sqlite")).expect("cache"),
        Box::new(FileIndexStore::new(dir.join("index").join("vectors.ssvi"))),
        BackendKind::Auto,
    )
    .expect("engine")
}

fn corpus() -> Vec<Document> {
    vec![
        Document::new("d1", "machine learning basics", "docs/d1.txt"),
        Document::new("d2", "cooking pasta recipe", "docs/d2.txt"),
        Document::new("d3", "gradient descent for neural networks", "docs/d3.txt"),
    ]
}

fn ids(response: &semsearch::SearchResponse) -> Vec<String> {
    response.results.iter().map(|r| r.doc_id.clone()).collect()
}

#[test]
fn example_query_ranks_matching_document_first() {
    let dir = TempDir::new().expect("tempdir");
    let mut engine = disk_engine(dir.path(), 1, Arc::new(AtomicUsize::new(0)));
    engine.index_documents(&corpus()[..2]).expect("index");

    let response = engine.search("machine learning", 1).expect("search");
    assert_eq!(response.results.len(), 1);
    let top = &response.results[0];
    assert_eq!(top.doc_id, "d1");
    assert_eq!(top.preview, "machine learning basics");
    assert!(top.explanation.overlap_keywords.contains(&"machine".to_string()));
    assert!(top.explanation.overlap_keywords.contains(&"learning".to_string()));
}

#[test]
fn reindexing_unchanged_documents_uses_cache_only() {
    let dir = TempDir::new().expect("tempdir");
    let embedded = Arc::new(AtomicUsize::new(0));
    let mut engine = disk_engine(dir.path(), 1, embedded.clone());

    let first = engine.index_documents(&corpus()).expect("first index");
    assert_eq!(first.embedded, 3);
    assert_eq!(first.cache_hits, 0);
    let before = embedded.load(Ordering::SeqCst);
    let expected = engine.search("neural networks", 3).expect("search");

    let second = engine.index_documents(&corpus()).expect("second index");
    assert_eq!(second.embedded, 0);
    assert_eq!(second.cache_hits, 3);
    assert_eq!(embedded.load(Ordering::SeqCst), before);
    assert_eq!(engine.state(), EngineState::Ready { generation: 2 });
    assert_eq!(engine.cache().count().expect("count"), 3);
    assert_eq!(engine.search("neural networks", 3).expect("search"), expected);
}

#[test]
fn corrupt_cache_entry_fails_indexing_and_keeps_previous_index() {
    let dir = TempDir::new().expect("tempdir");
    let mut engine = disk_engine(dir.path(), 1, Arc::new(AtomicUsize::new(0)));
    engine.index_documents(&corpus()).expect("first index");
    let expected = engine.search("cooking pasta", 3).expect("search");

    let conn = rusqlite::Connection::open(dir.path().join("cache").join("embeddings.sqlite"))
        .expect("open cache db");
    conn.execute(
        "UPDATE embeddings SET embedding = x'010203' WHERE doc_id = 'd2'",
        [],
    )
    .expect("corrupt blob");
    drop(conn);

    let err = engine.index_documents(&corpus()).unwrap_err();
    assert!(matches!(err, SearchError::Cache(_)));
    assert_eq!(err.kind(), ErrorKind::Operational);

    assert_eq!(engine.state(), EngineState::Ready { generation: 1 });
    assert_eq!(engine.index().len(), 3);
    assert_eq!(engine.search("cooking pasta", 3).expect("search"), expected);
}

#[test]
fn changed_text_is_reembedded() {
    let dir = TempDir::new().expect("tempdir");
    let embedded = Arc::new(AtomicUsize::new(0));
    let mut engine = disk_engine(dir.path(), 1, embedded.clone());
    engine.index_documents(&corpus()).expect("first index");

    let mut docs = corpus();
    docs[1] = Document::new("d2", "baking sourdough bread", "docs/d2.txt");
    let before = embedded.load(Ordering::SeqCst);
    let report = engine.index_documents(&docs).expect("second index");

    assert_eq!(report.embedded, 1);
    assert_eq!(report.cache_hits, 2);
    assert_eq!(embedded.load(Ordering::SeqCst), before + 1);

    let response = engine.search("sourdough bread", 1).expect("search");
    assert_eq!(ids(&response), vec!["d2"]);
    assert_eq!(response.results[0].preview, "baking sourdough bread");
}

#[test]
fn parallel_and_inline_embedding_agree() {
    let docs: Vec<Document> = (0..40)
        .map(|i| {
            Document::new(
                format!("doc{:02}", i),
                format!("topic{} shared words plus token{}", i % 7, i),
                format!("docs/doc{:02}.txt", i),
            )
        })
        .collect();

    let inline_dir = TempDir::new().expect("tempdir");
    let parallel_dir = TempDir::new().expect("tempdir");
    let mut inline = disk_engine(inline_dir.path(), 1, Arc::new(AtomicUsize::new(0)));
    let mut parallel = disk_engine(parallel_dir.path(), 4, Arc::new(AtomicUsize::new(0)));
    inline.index_documents(&docs).expect("inline index");
    parallel.index_documents(&docs).expect("parallel index");

    assert_eq!(inline.index().doc_ids(), parallel.index().doc_ids());
    for query in ["topic3 shared", "token17", "words plus"] {
        let a = inline.search(query, 5).expect("inline search");
        let b = parallel.search(query, 5).expect("parallel search");
        assert_eq!(a, b);
    }
}

#[test]
fn persisted_index_resumes_but_requires_indexing() {
    let dir = TempDir::new().expect("tempdir");
    let embedded = Arc::new(AtomicUsize::new(0));
    let expected = {
        let mut engine = disk_engine(dir.path(), 1, embedded.clone());
        engine.index_documents(&corpus()).expect("index");
        engine.search("neural networks", 3).expect("search")
    };

    let mut restarted = disk_engine(dir.path(), 1, embedded.clone());
    assert_eq!(restarted.index().len(), 3);
    assert_eq!(restarted.state(), EngineState::NotReady);
    let err = restarted.search("neural networks", 3).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotReady);

    let before = embedded.load(Ordering::SeqCst);
    let report = restarted.index_documents(&corpus()).expect("reindex");
    assert_eq!(report.cache_hits, 3);
    assert_eq!(embedded.load(Ordering::SeqCst), before);
    assert_eq!(restarted.search("neural networks", 3).expect("search"), expected);
}

#[test]
fn ranking_follows_similarity_not_combined_score() {
    let dir = TempDir::new().expect("tempdir");
    let factory: Arc<dyn ProviderFactory> =
        Arc::new(|| -> anyhow::Result<Box<dyn EmbeddingProvider>> {
            Ok(Box::new(HashingProvider::new(4096)?))
        });
    let mut engine = SearchEngine::new(
        BatchEmbedder::new(factory, 1).expect("embedder"),
        EmbeddingCache::open(dir.path().join("cache.sqlite")).expect("cache"),
        Box::new(MemoryIndexStore::new()),
        BackendKind::BruteForce,
    )
    .expect("engine");

    // A long document that is closer to the query than a short one.
    let mut long = Document::new("long", "alpha beta", "long.txt");
    long.length = 100_000;
    let short = Document::new("short", "alpha beta gamma", "short.txt");
    let other = Document::new("other", "delta epsilon", "other.txt");
    engine.index_documents(&[long, short, other]).expect("index");

    let response = engine.search("alpha", 3).expect("search");
    let results = &response.results;
    assert_eq!(results[0].doc_id, "long");
    assert_eq!(results[1].doc_id, "short");
    assert!(results[0].raw_score > results[1].raw_score);
    assert!(results[0].score < results[1].score);
    assert!(results
        .windows(2)
        .all(|pair| pair[0].raw_score >= pair[1].raw_score));
}

#[test]
fn failed_embedding_leaves_previous_documents_searchable() {
    let dir = TempDir::new().expect("tempdir");
    let fail = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = fail.clone();
    let factory: Arc<dyn ProviderFactory> =
        Arc::new(move || -> anyhow::Result<Box<dyn EmbeddingProvider>> {
            Ok(Box::new(FlakyProvider {
                inner: HashingProvider::new(64)?,
                fail: flag.clone(),
            }))
        });
    let mut engine = SearchEngine::new(
        BatchEmbedder::new(factory, 1).expect("embedder"),
        EmbeddingCache::open(dir.path().join("cache.sqlite")).expect("cache"),
        Box::new(MemoryIndexStore::new()),
        BackendKind::BruteForce,
    )
    .expect("engine");
    engine.index_documents(&corpus()).expect("index");

    fail.store(true, Ordering::SeqCst);
    let mut docs = corpus();
    docs.push(Document::new("d4", "brand new document", "docs/d4.txt"));
    let err = engine.index_documents(&docs).unwrap_err();
    assert!(matches!(err, SearchError::EmbeddingBackend(_)));
    assert_eq!(err.kind(), ErrorKind::Operational);

    fail.store(false, Ordering::SeqCst);
    let response = engine.search("brand new document", 5).expect("search");
    assert!(!ids(&response).contains(&"d4".to_string()));
    assert_eq!(engine.index().len(), 3);
}

struct FlakyProvider {
    inner: HashingProvider,
    fail: Arc<std::sync::atomic::AtomicBool>,
}

impl EmbeddingProvider for FlakyProvider {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn batch_size(&self) -> usize {
        self.inner.batch_size()
    }

    fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("model crashed");
        }
        self.inner.embed_texts(texts)
    }

    fn dimension(&mut self) -> anyhow::Result<usize> {
        self.inner.dimension()
    }
}
