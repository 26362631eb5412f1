//! On-disk form of a committed corpus.
//!
//! Index vectors and chunks are written as one JSON document so they can
//! never be restored out of step. Writes go to a sibling temp file that is
//! renamed over the target.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::retrieval_store::Corpus;
use super::vector_index::VectorIndex;
use crate::error::RetrievalError;
use crate::models::Chunk;

const SNAPSHOT_VERSION: u32 = 1;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct CorpusSnapshot {
    version: u32,
    embedder: String,
    dimension: usize,
    committed_at: DateTime<Utc>,
    chunks: Vec<Chunk>,
    vectors: Vec<f32>,
}

pub fn write(path: &Path, corpus: &Corpus, embedder: &str) -> Result<(), RetrievalError> {
    let snapshot = CorpusSnapshot {
        version: SNAPSHOT_VERSION,
        embedder: embedder.to_string(),
        dimension: corpus.index().dimension().unwrap_or(0),
        committed_at: corpus.committed_at(),
        chunks: corpus.chunks().to_vec(),
        vectors: corpus.index().as_flat().to_vec(),
    };
    let json = serde_json::to_vec(&snapshot)
        .map_err(|e| RetrievalError::CorruptSnapshot(e.to_string()))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    let written = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(&json)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Sibling of `path` unique to this process and call.
fn temp_path(path: &Path) -> PathBuf {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.{n}.tmp", std::process::id()));
    path.with_file_name(name)
}

pub fn read(path: &Path) -> Result<Corpus, RetrievalError> {
    let bytes = fs::read(path)?;
    let snapshot: CorpusSnapshot = serde_json::from_slice(&bytes)
        .map_err(|e| RetrievalError::CorruptSnapshot(e.to_string()))?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(RetrievalError::CorruptSnapshot(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }

    debug!(
        embedder = %snapshot.embedder,
        chunks = snapshot.chunks.len(),
        "read corpus snapshot"
    );
    let index = VectorIndex::from_flat(snapshot.dimension, snapshot.vectors)
        .map_err(|e| RetrievalError::CorruptSnapshot(e.to_string()))?;

    Corpus::with_timestamp(index, snapshot.chunks, snapshot.committed_at)
}
