//! Exam preparation toolkit: chunk lecture notes, embed them into an exact
//! nearest-neighbor index and ground generated quizzes and summaries in the
//! retrieved text.

pub mod cli;
pub mod client;
pub mod error;
pub mod models;
pub mod server;
pub mod services;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::AppError;
pub use models::{Chunk, Config, OutputFormat};
pub use services::{Embedder, RetrievalStore, TextChunker, VectorIndex};
