//! Wire format between the CLI and the daemon: length-prefixed JSON frames.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::{ContextPolicy, ExamKind, GeneratedExam, SearchResults};
use crate::services::CorpusStats;

/// Frames larger than this are rejected.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ping,
    Shutdown,
    Status,
    Upload(UploadRequest),
    Retrieve(RetrieveRequest),
    Generate(GenerateRequest),
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Absolute path of the file to index.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    pub k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub kind: ExamKind,
    pub policy: ContextPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    ShutdownAck,
    Status(StatusResponse),
    Uploaded(UploadResponse),
    Retrieved(SearchResults),
    Generated(GeneratedExam),
    ResetAck,
    Error(ErrorResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub embedding_model: String,
    pub dimension: usize,
    pub generation_model: String,
    pub api_key_present: bool,
    pub idle_secs: u64,
    pub requests_served: u64,
    pub corpus: Option<CorpusStats>,
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub file_name: String,
    pub stored_path: PathBuf,
    pub chunks: usize,
    pub checksum: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error(ErrorResponse {
            message: message.into(),
        })
    }
}

pub fn encode_message(msg: &impl Serialize) -> Result<Vec<u8>, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    let len = (json.len() as u32).to_be_bytes();
    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&len);
    buf.extend_from_slice(&json);
    Ok(buf)
}

pub fn decode_length(buf: &[u8; 4]) -> usize {
    u32::from_be_bytes(*buf) as usize
}
