//! Retrieval store: one corpus of chunks paired with its vector index.
//!
//! The committed corpus is an immutable [`Corpus`] behind a read/write slot.
//! `index_document` serializes writers on a separate mutex, embeds and builds
//! outside the slot, then swaps the new corpus in with a single assignment, so
//! readers always see either the previous corpus or the new one.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::embedding::{SharedEmbedder, check_embeddings};
use super::snapshot;
use super::vector_index::VectorIndex;
use crate::error::{IndexError, RetrievalError};
use crate::models::{Chunk, RetrievedChunk};

/// Chunks of one document and the index built from their embeddings.
///
/// Position `i` in the index is chunk `i`.
#[derive(Debug, Clone)]
pub struct Corpus {
    index: VectorIndex,
    chunks: Vec<Chunk>,
    committed_at: DateTime<Utc>,
}

impl Corpus {
    /// Pair an index with its chunks. Lengths must agree.
    pub fn new(index: VectorIndex, chunks: Vec<Chunk>) -> Result<Self, RetrievalError> {
        Self::with_timestamp(index, chunks, Utc::now())
    }

    pub(crate) fn with_timestamp(
        index: VectorIndex,
        chunks: Vec<Chunk>,
        committed_at: DateTime<Utc>,
    ) -> Result<Self, RetrievalError> {
        if index.len() != chunks.len() {
            return Err(RetrievalError::CorruptSnapshot(format!(
                "index holds {} vectors but {} chunks were given",
                index.len(),
                chunks.len()
            )));
        }
        Ok(Self {
            index,
            chunks,
            committed_at,
        })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn committed_at(&self) -> DateTime<Utc> {
        self.committed_at
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        Ok(self
            .index
            .query(query, k)?
            .into_iter()
            .map(|hit| {
                let chunk = &self.chunks[hit.position];
                RetrievedChunk {
                    position: hit.position,
                    distance: hit.distance,
                    source_offset: chunk.source_offset(),
                    text: chunk.text().to_string(),
                }
            })
            .collect())
    }
}

/// Summary of the committed corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusStats {
    pub chunk_count: usize,
    pub dimension: Option<usize>,
    pub committed_at: DateTime<Utc>,
}

/// Holds at most one corpus and answers similarity queries against it.
pub struct RetrievalStore {
    embedder: SharedEmbedder,
    current: RwLock<Option<Arc<Corpus>>>,
    writer: Mutex<()>,
}

impl std::fmt::Debug for RetrievalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalStore")
            .field("embedder", &self.embedder.name())
            .field("stats", &self.stats())
            .finish()
    }
}

impl RetrievalStore {
    pub fn new(embedder: SharedEmbedder) -> Self {
        Self {
            embedder,
            current: RwLock::new(None),
            writer: Mutex::new(()),
        }
    }

    pub fn embedder(&self) -> &SharedEmbedder {
        &self.embedder
    }

    /// Embed `chunks`, build a fresh index and replace the current corpus.
    ///
    /// An empty `chunks` leaves the current corpus untouched and returns 0.
    /// On any embedding failure nothing is replaced.
    pub async fn index_document(&self, chunks: Vec<Chunk>) -> Result<usize, RetrievalError> {
        self.replace(chunks, None).await
    }

    /// [`index_document`](Self::index_document), then write the new corpus to
    /// `snapshot` before the next writer may start.
    ///
    /// The corpus is already committed when the write happens, so a failed
    /// write is logged and does not fail the call.
    pub async fn index_document_and_save(
        &self,
        chunks: Vec<Chunk>,
        snapshot: &Path,
    ) -> Result<usize, RetrievalError> {
        self.replace(chunks, Some(snapshot)).await
    }

    async fn replace(
        &self,
        chunks: Vec<Chunk>,
        snapshot: Option<&Path>,
    ) -> Result<usize, RetrievalError> {
        if chunks.is_empty() {
            warn!("no chunks to index, keeping the current corpus");
            return Ok(0);
        }

        let _writer = self.writer.lock().await;

        let texts: Vec<String> = chunks.iter().map(|c| c.text().to_string()).collect();
        info!(chunks = texts.len(), embedder = self.embedder.name(), "generating embeddings");

        let vectors = self
            .embedder
            .embed_many(&texts)
            .await
            .and_then(|vectors| {
                check_embeddings(&vectors, chunks.len(), self.embedder.dimension())?;
                Ok(vectors)
            })
            .map_err(RetrievalError::CorpusReplaceFailure)?;

        let index = VectorIndex::build(&vectors)?;
        let corpus = Corpus::new(index, chunks)?;
        let count = corpus.len();
        self.commit(corpus);
        info!(chunks = count, "index created");

        if let Some(path) = snapshot
            && let Err(e) = self.save(path)
        {
            warn!(path = %path.display(), error = %e, "corpus indexed but not saved");
        }
        Ok(count)
    }

    /// Texts of the `k` chunks nearest to `query_text`, nearest first.
    pub async fn retrieve(&self, query_text: &str, k: usize) -> Result<Vec<String>, RetrievalError> {
        Ok(self
            .retrieve_scored(query_text, k)
            .await?
            .into_iter()
            .map(|hit| hit.text)
            .collect())
    }

    /// Like [`retrieve`](Self::retrieve) but keeps positions and distances.
    pub async fn retrieve_scored(
        &self,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let corpus = self.current().ok_or(RetrievalError::NotIndexed)?;
        let query = self
            .embedder
            .embed(query_text)
            .await
            .and_then(|query| {
                check_embeddings(std::slice::from_ref(&query), 1, self.embedder.dimension())?;
                Ok(query)
            })
            .map_err(RetrievalError::EmbeddingFailure)?;

        let hits = corpus.search(&query, k)?;
        debug!(k, hits = hits.len(), "retrieved chunks");
        Ok(hits)
    }

    /// First `n` chunk texts in document order.
    pub fn leading_chunks(&self, n: usize) -> Result<Vec<String>, RetrievalError> {
        let corpus = self.current().ok_or(RetrievalError::NotIndexed)?;
        Ok(corpus
            .chunks()
            .iter()
            .take(n)
            .map(|c| c.text().to_string())
            .collect())
    }

    /// Drop the current corpus.
    pub async fn reset(&self) {
        let _writer = self.writer.lock().await;
        self.clear();
        info!("corpus cleared");
    }

    /// [`reset`](Self::reset) and delete the snapshot at `path`, if any.
    pub async fn reset_and_delete(&self, path: &Path) -> Result<(), RetrievalError> {
        let _writer = self.writer.lock().await;
        self.clear();
        match std::fs::remove_file(path) {
            Ok(()) => info!(path = %path.display(), "corpus cleared and snapshot deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => info!("corpus cleared"),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    pub fn is_indexed(&self) -> bool {
        self.current().is_some()
    }

    pub fn stats(&self) -> Option<CorpusStats> {
        self.current().map(|corpus| CorpusStats {
            chunk_count: corpus.len(),
            dimension: corpus.index().dimension(),
            committed_at: corpus.committed_at(),
        })
    }

    /// The committed corpus, if any. Cheap: clones an `Arc`.
    pub fn current(&self) -> Option<Arc<Corpus>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Write the committed corpus to `path`. Returns false when there is nothing to save.
    pub fn save(&self, path: &Path) -> Result<bool, RetrievalError> {
        match self.current() {
            Some(corpus) => {
                snapshot::write(path, &corpus, self.embedder.name())?;
                info!(path = %path.display(), chunks = corpus.len(), "corpus saved");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replace the current corpus with the one stored at `path`.
    ///
    /// Fails without touching the current corpus if the snapshot is
    /// inconsistent or was built with a different vector dimension.
    pub async fn load(&self, path: &Path) -> Result<usize, RetrievalError> {
        let corpus = snapshot::read(path)?;
        if let Some(dimension) = corpus.index().dimension()
            && dimension != self.embedder.dimension()
        {
            return Err(IndexError::DimensionMismatch {
                expected: self.embedder.dimension(),
                actual: dimension,
            }
            .into());
        }

        let _writer = self.writer.lock().await;
        let count = corpus.len();
        self.commit(corpus);
        info!(path = %path.display(), chunks = count, "corpus restored");
        Ok(count)
    }

    fn commit(&self, corpus: Corpus) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(corpus));
    }

    fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbeddingError;
    use crate::services::embedding::Embedder;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Embeds known texts to hand-picked vectors and can be told to fail.
    struct TableEmbedder {
        table: HashMap<String, Vec<f32>>,
        fail: AtomicBool,
    }

    impl TableEmbedder {
        fn new(entries: &[(&str, [f32; 3])]) -> Arc<Self> {
            Arc::new(Self {
                table: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_vec()))
                    .collect(),
                fail: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl Embedder for TableEmbedder {
        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(EmbeddingError::ServerError("model offline".to_string()));
            }
            texts
                .iter()
                .map(|t| {
                    self.table
                        .get(t)
                        .cloned()
                        .ok_or_else(|| EmbeddingError::InvalidResponse(format!("unknown text: {t}")))
                })
                .collect()
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "table"
        }
    }

    fn lecture() -> Arc<TableEmbedder> {
        TableEmbedder::new(&[
            ("plants make food from light", [1.0, 0.0, 0.0]),
            ("mitochondria power the cell", [0.0, 1.0, 0.0]),
            ("objects in motion stay in motion", [0.0, 0.0, 1.0]),
            ("how do plants eat", [0.9, 0.1, 0.0]),
            ("energy in cells", [0.1, 0.9, 0.0]),
        ])
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new(*t, i * 10))
            .collect()
    }

    #[tokio::test]
    async fn test_retrieve_before_index_is_not_indexed() {
        let store = RetrievalStore::new(lecture());
        assert!(matches!(
            store.retrieve("how do plants eat", 1).await,
            Err(RetrievalError::NotIndexed)
        ));
        assert!(matches!(
            store.leading_chunks(3),
            Err(RetrievalError::NotIndexed)
        ));
    }

    #[tokio::test]
    async fn test_index_then_retrieve() {
        let store = RetrievalStore::new(lecture());
        let count = store
            .index_document(chunks(&[
                "plants make food from light",
                "mitochondria power the cell",
                "objects in motion stay in motion",
            ]))
            .await
            .unwrap();
        assert_eq!(count, 3);

        let hits = store.retrieve("how do plants eat", 1).await.unwrap();
        assert_eq!(hits, vec!["plants make food from light"]);

        let scored = store.retrieve_scored("energy in cells", 3).await.unwrap();
        assert_eq!(scored[0].position, 1);
        assert_eq!(scored[0].source_offset, 10);
        assert_eq!(scored.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_document_keeps_previous_corpus() {
        let store = RetrievalStore::new(lecture());
        store
            .index_document(chunks(&["plants make food from light"]))
            .await
            .unwrap();

        assert_eq!(store.index_document(Vec::new()).await.unwrap(), 0);
        assert_eq!(store.stats().unwrap().chunk_count, 1);
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_corpus() {
        let embedder = lecture();
        let store = RetrievalStore::new(embedder.clone());
        store
            .index_document(chunks(&[
                "plants make food from light",
                "mitochondria power the cell",
            ]))
            .await
            .unwrap();
        let before = store.retrieve("energy in cells", 2).await.unwrap();

        let err = store
            .index_document(chunks(&["a sentence the table does not know"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::CorpusReplaceFailure(_)));

        embedder.fail.store(true, Ordering::SeqCst);
        assert!(matches!(
            store
                .index_document(chunks(&["objects in motion stay in motion"]))
                .await,
            Err(RetrievalError::CorpusReplaceFailure(_))
        ));
        embedder.fail.store(false, Ordering::SeqCst);

        assert_eq!(store.retrieve("energy in cells", 2).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_query_embedding_failure_is_reported() {
        let embedder = lecture();
        let store = RetrievalStore::new(embedder.clone());
        store
            .index_document(chunks(&["plants make food from light"]))
            .await
            .unwrap();
        embedder.fail.store(true, Ordering::SeqCst);
        assert!(matches!(
            store.retrieve("how do plants eat", 1).await,
            Err(RetrievalError::EmbeddingFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_new_document_replaces_old() {
        let store = RetrievalStore::new(lecture());
        store
            .index_document(chunks(&[
                "plants make food from light",
                "mitochondria power the cell",
            ]))
            .await
            .unwrap();
        store
            .index_document(chunks(&["objects in motion stay in motion"]))
            .await
            .unwrap();

        let hits = store.retrieve("how do plants eat", 5).await.unwrap();
        assert_eq!(hits, vec!["objects in motion stay in motion"]);
    }

    #[tokio::test]
    async fn test_leading_chunks_follow_insertion_order() {
        let store = RetrievalStore::new(lecture());
        store
            .index_document(chunks(&[
                "objects in motion stay in motion",
                "plants make food from light",
                "mitochondria power the cell",
            ]))
            .await
            .unwrap();
        assert_eq!(
            store.leading_chunks(2).unwrap(),
            vec![
                "objects in motion stay in motion",
                "plants make food from light"
            ]
        );
    }

    #[tokio::test]
    async fn test_reset_forgets_corpus() {
        let store = RetrievalStore::new(lecture());
        store
            .index_document(chunks(&["plants make food from light"]))
            .await
            .unwrap();
        assert!(store.is_indexed());
        store.reset().await;
        assert!(!store.is_indexed());
        assert!(matches!(
            store.retrieve("how do plants eat", 1).await,
            Err(RetrievalError::NotIndexed)
        ));
    }

    #[tokio::test]
    async fn test_save_and_load_restores_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");

        let store = RetrievalStore::new(lecture());
        assert!(!store.save(&path).unwrap());
        store
            .index_document(chunks(&[
                "plants make food from light",
                "mitochondria power the cell",
            ]))
            .await
            .unwrap();
        assert!(store.save(&path).unwrap());

        let restored = RetrievalStore::new(lecture());
        assert_eq!(restored.load(&path).await.unwrap(), 2);
        assert_eq!(
            restored.retrieve("energy in cells", 2).await.unwrap(),
            store.retrieve("energy in cells", 2).await.unwrap()
        );
    }

    /// Claims 3-d vectors but returns whatever length it is set to.
    struct DriftingEmbedder {
        returned: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for DriftingEmbedder {
        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let len = self.returned.load(Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; len];
                    v[0] = t.len() as f32;
                    v
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "drifting"
        }
    }

    #[tokio::test]
    async fn test_vectors_must_match_embedder_dimension() {
        let embedder = Arc::new(DriftingEmbedder {
            returned: AtomicUsize::new(2),
        });
        let store = RetrievalStore::new(embedder.clone());

        let err = store
            .index_document(chunks(&["short", "a longer line"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::CorpusReplaceFailure(_)));
        assert!(!store.is_indexed());

        embedder.returned.store(3, Ordering::SeqCst);
        store
            .index_document(chunks(&["short", "a longer line"]))
            .await
            .unwrap();
        assert_eq!(store.stats().unwrap().dimension, Some(3));

        embedder.returned.store(2, Ordering::SeqCst);
        assert!(matches!(
            store.retrieve("short", 1).await,
            Err(RetrievalError::EmbeddingFailure(_))
        ));
        assert!(matches!(
            store.index_document(chunks(&["other"])).await,
            Err(RetrievalError::CorpusReplaceFailure(_))
        ));
        assert_eq!(store.stats().unwrap().chunk_count, 2);
    }

    /// Sleeps before embedding so concurrent writers overlap.
    struct SlowEmbedder;

    #[async_trait]
    impl Embedder for SlowEmbedder {
        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_concurrent_saves_leave_a_loadable_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        let store = Arc::new(RetrievalStore::new(Arc::new(SlowEmbedder)));

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                let path = path.clone();
                let texts: Vec<String> = (0..=i).map(|j| format!("doc {i} part {j}")).collect();
                tokio::spawn(async move {
                    let chunks = texts.iter().map(|t| Chunk::new(t.as_str(), 0)).collect();
                    store.index_document_and_save(chunks, &path).await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let committed = store.current().unwrap();
        let restored = RetrievalStore::new(Arc::new(SlowEmbedder));
        restored.load(&path).await.unwrap();
        assert_eq!(restored.current().unwrap().chunks(), committed.chunks());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec!["corpus.json"]);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_committed_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let store = RetrievalStore::new(lecture());
        let count = store
            .index_document_and_save(
                chunks(&["plants make food from light"]),
                &blocker.join("corpus.json"),
            )
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert!(store.is_indexed());
    }

    #[tokio::test]
    async fn test_reset_and_delete_removes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        let store = RetrievalStore::new(lecture());
        store
            .index_document_and_save(chunks(&["plants make food from light"]), &path)
            .await
            .unwrap();
        assert!(path.exists());

        store.reset_and_delete(&path).await.unwrap();
        assert!(!store.is_indexed());
        assert!(!path.exists());
        store.reset_and_delete(&path).await.unwrap();
    }

    #[test]
    fn test_corpus_rejects_length_mismatch() {
        let index = VectorIndex::build(&[vec![1.0f32, 0.0]]).unwrap();
        let err = Corpus::new(index, chunks(&["a", "b"])).unwrap_err();
        assert!(matches!(err, RetrievalError::CorruptSnapshot(_)));
    }
}
