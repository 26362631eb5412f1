//! End-to-end behavior of the retrieval core through the public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use examprep::error::{EmbeddingError, IndexError, RetrievalError};
use examprep::services::{Embedder, RetrievalStore, TextChunker, VectorIndex, chunk_text};

const DIM: usize = 16;

/// Bag-of-words hashed into a fixed number of buckets.
///
/// Deterministic, and texts sharing words land near each other.
struct HashEmbedder {
    fail: AtomicBool,
    delay: Duration,
}

impl HashEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            delay: Duration::ZERO,
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            delay,
        })
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIM];
        for word in text.split_whitespace() {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
                % DIM;
            v[bucket] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::ConnectionError("refused".to_string()));
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn name(&self) -> &str {
        "hash"
    }
}

const LECTURE: &str = "
Photosynthesis converts light energy into chemical energy stored in glucose.
1
Chlorophyll absorbs red and blue light and reflects green light.
Mitochondria release energy from glucose through cellular respiration.
2
Newton's first law states that an object in motion stays in motion.
Supply and demand determine the market price of goods and services.
";

#[test]
fn repeated_word_document_yields_thirteen_chunks() {
    let text = vec!["revision"; 1000].join(" ");
    let chunks = chunk_text(&text, 100, 20).unwrap();

    assert_eq!(chunks.len(), 13);
    assert!(chunks.last().unwrap().word_count() < 100);
}

#[test]
fn exact_vector_query_finds_its_chunk() {
    let vectors: Vec<Vec<f32>> = vec![
        vec![0.9, 0.1, 0.0, 0.0],
        vec![0.0, 0.8, 0.2, 0.0],
        vec![0.1, 0.0, 0.7, 0.2],
        vec![0.0, 0.0, 0.1, 0.9],
    ];
    let index = VectorIndex::build(&vectors).unwrap();

    let hits = index.query(&vectors[2], 1).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].position, 2);
    assert_eq!(hits[0].distance, 0.0);
}

#[test]
fn wrong_dimension_query_is_rejected() {
    let index = VectorIndex::build(&[[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
    assert_eq!(
        index.query(&[1.0, 2.0], 1),
        Err(IndexError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    );
}

#[tokio::test]
async fn uploaded_text_is_retrievable_verbatim() {
    let chunker = TextChunker::new(13, 2).unwrap();
    let chunks = chunker.chunk_document(LECTURE);
    let originals: Vec<String> = chunks.iter().map(|c| c.text().to_string()).collect();
    assert_eq!(chunks.len(), 5);
    assert!(originals.iter().all(|t| !t.split_whitespace().any(|w| w == "1" || w == "2")));

    let store = RetrievalStore::new(HashEmbedder::new());
    assert_eq!(store.index_document(chunks).await.unwrap(), 5);

    let hits = store.retrieve("energy stored in glucose", 10).await.unwrap();
    assert_eq!(hits.len(), 5);
    for hit in &hits {
        assert!(originals.contains(hit));
    }
}

#[tokio::test]
async fn failed_replacement_leaves_results_unchanged() {
    let embedder = HashEmbedder::new();
    let store = RetrievalStore::new(embedder.clone());
    store
        .index_document(TextChunker::new(8, 2).unwrap().chunk_document(LECTURE))
        .await
        .unwrap();
    let before = store.retrieve("market price", 3).await.unwrap();

    embedder.fail.store(true, Ordering::SeqCst);
    let err = store
        .index_document(chunk_text("an entirely different lecture", 3, 1).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::CorpusReplaceFailure(_)));
    embedder.fail.store(false, Ordering::SeqCst);

    assert_eq!(store.retrieve("market price", 3).await.unwrap(), before);
}

#[tokio::test]
async fn readers_never_see_a_mixed_corpus() {
    let store = Arc::new(RetrievalStore::new(HashEmbedder::slow(
        Duration::from_millis(20),
    )));
    let old: Vec<_> = (0..6)
        .map(|i| examprep::Chunk::new(format!("old lecture part {i}"), i * 4))
        .collect();
    let new: Vec<_> = (0..6)
        .map(|i| examprep::Chunk::new(format!("new lecture part {i}"), i * 4))
        .collect();
    store.index_document(old).await.unwrap();

    let writer = {
        let store = store.clone();
        tokio::spawn(async move { store.index_document(new).await })
    };
    let readers: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.retrieve("lecture part", 6).await })
        })
        .collect();

    for reader in readers {
        let hits = reader.await.unwrap().unwrap();
        assert_eq!(hits.len(), 6);
        let all_old = hits.iter().all(|h| h.starts_with("old"));
        let all_new = hits.iter().all(|h| h.starts_with("new"));
        assert!(all_old || all_new, "mixed corpus: {hits:?}");
    }
    assert_eq!(writer.await.unwrap().unwrap(), 6);
    assert!(
        store
            .retrieve("lecture part", 1)
            .await
            .unwrap()[0]
            .starts_with("new")
    );
}

#[tokio::test]
async fn concurrent_replacements_commit_one_whole_document() {
    let store = Arc::new(RetrievalStore::new(HashEmbedder::slow(
        Duration::from_millis(20),
    )));
    let biology: Vec<_> = (0..4)
        .map(|i| examprep::Chunk::new(format!("biology lecture part {i}"), i * 4))
        .collect();
    let physics: Vec<_> = (0..7)
        .map(|i| examprep::Chunk::new(format!("physics lecture part {i}"), i * 4))
        .collect();

    let writers: Vec<_> = [biology, physics]
        .into_iter()
        .map(|chunks| {
            let store = store.clone();
            tokio::spawn(async move { store.index_document(chunks).await })
        })
        .collect();
    let mut counts = Vec::new();
    for writer in writers {
        counts.push(writer.await.unwrap().unwrap());
    }
    assert_eq!(counts, vec![4, 7]);

    let stats = store.stats().unwrap();
    let hits = store.retrieve("lecture part", 20).await.unwrap();
    assert_eq!(hits.len(), stats.chunk_count);
    let all_biology = hits.iter().all(|h| h.starts_with("biology"));
    let all_physics = hits.iter().all(|h| h.starts_with("physics"));
    match stats.chunk_count {
        4 => assert!(all_biology, "mixed corpus: {hits:?}"),
        7 => assert!(all_physics, "mixed corpus: {hits:?}"),
        n => panic!("unexpected chunk count {n}"),
    }
}

#[tokio::test]
async fn persisted_corpus_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("corpus.json");

    let store = RetrievalStore::new(HashEmbedder::new());
    store
        .index_document(TextChunker::new(8, 2).unwrap().chunk_document(LECTURE))
        .await
        .unwrap();
    store.save(&snapshot).unwrap();
    let expected = store.retrieve("chlorophyll light", 2).await.unwrap();

    let restarted = RetrievalStore::new(HashEmbedder::new());
    restarted.load(&snapshot).await.unwrap();
    assert_eq!(
        restarted.retrieve("chlorophyll light", 2).await.unwrap(),
        expected
    );
}
