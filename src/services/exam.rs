//! Grounds generation requests in the indexed document.

use std::sync::Arc;

use tracing::info;

use super::generation::{SharedGenerator, clean_exam_output, quiz_messages, summary_messages};
use super::retrieval_store::RetrievalStore;
use crate::error::{AppError, RetrievalError};
use crate::models::{ContextPolicy, ExamKind, GeneratedExam, GenerationConfig, join_context};

pub struct ExamService {
    store: Arc<RetrievalStore>,
    generator: SharedGenerator,
    config: GenerationConfig,
}

impl ExamService {
    pub fn new(store: Arc<RetrievalStore>, generator: SharedGenerator, config: GenerationConfig) -> Self {
        Self {
            store,
            generator,
            config,
        }
    }

    /// Chunk texts selected by `policy`, in the order they will be shown to the model.
    ///
    /// `NotIndexed` when nothing was uploaded, `EmptyContext` when the
    /// committed corpus selects no chunks.
    pub async fn context(&self, policy: &ContextPolicy) -> Result<Vec<String>, RetrievalError> {
        let chunks = match policy {
            ContextPolicy::Leading { n } => self.store.leading_chunks(*n)?,
            ContextPolicy::Retrieved { query, k } => self.store.retrieve(query, *k).await?,
        };
        if chunks.is_empty() {
            return Err(RetrievalError::EmptyContext);
        }
        Ok(chunks)
    }

    pub async fn generate(
        &self,
        kind: ExamKind,
        policy: ContextPolicy,
    ) -> Result<GeneratedExam, AppError> {
        let chunks = self.context(&policy).await?;
        let context = join_context(&chunks);
        info!(%kind, chunks = chunks.len(), "generating study material");

        let (messages, max_tokens) = match kind {
            ExamKind::Quiz => (
                quiz_messages(&context, self.config.quiz_context_chars),
                self.config.quiz_max_tokens,
            ),
            ExamKind::Summary => (
                summary_messages(&context, self.config.summary_context_chars),
                self.config.summary_max_tokens,
            ),
        };

        let raw = self.generator.generate(&messages, max_tokens).await?;
        let text = if kind == ExamKind::Quiz && self.config.clean_output {
            clean_exam_output(&raw)
        } else {
            raw
        };

        Ok(GeneratedExam {
            kind,
            policy,
            context_chunks: chunks.len(),
            model: self.generator.name().to_string(),
            text,
        })
    }
}
