mod chunk;
mod config;
mod exam;
mod search;

pub use chunk::Chunk;
pub use config::{
    API_KEY_ENV, ChunkingConfig, Config, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_GENERATION_MODEL, DEFAULT_IDLE_TIMEOUT_SECS, DaemonConfig, EmbeddingConfig,
    EmbeddingProvider, GenerationConfig, OutputConfig, ResolvedConfig, RetrievalConfig,
    StorageConfig,
};
pub use exam::{
    ChatMessage, ContextPolicy, ContextPolicyKind, ExamKind, GeneratedExam, Role, join_context,
};
pub use search::{OutputFormat, RetrievedChunk, SearchResults};
