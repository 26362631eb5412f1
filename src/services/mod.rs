mod chunker;
pub mod embedding;
mod exam;
pub mod generation;
mod loader;
mod retrieval_store;
mod snapshot;
mod vector_index;

pub use chunker::{TextChunker, chunk_text, normalize_text};
pub use embedding::{Embedder, HttpEmbedder, OnnxEmbedder, SharedEmbedder, create_embedder};
pub use exam::ExamService;
pub use generation::{
    Generator, HuggingFaceGenerator, SharedGenerator, clean_exam_output, quiz_messages,
    summary_messages,
};
pub use loader::{DocumentLoader, FileLoader, LoadedDocument};
pub use retrieval_store::{Corpus, CorpusStats, RetrievalStore};
pub use vector_index::{Neighbor, VectorIndex, squared_euclidean};
