//! Text generation client and the exam prompts sent to it.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GenerationError;
use crate::models::{API_KEY_ENV, ChatMessage, GenerationConfig};
use crate::utils::{retry, truncate_chars};

/// Turns a role-tagged conversation into generated text.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, GenerationError>;

    fn name(&self) -> &str;
}

pub type SharedGenerator = Arc<dyn Generator>;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Hugging Face inference router speaking the OpenAI chat completions API.
#[derive(Clone)]
pub struct HuggingFaceGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    top_p: f32,
}

impl std::fmt::Debug for HuggingFaceGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceGenerator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

impl HuggingFaceGenerator {
    /// Build from config, reading the API key from the environment.
    ///
    /// A missing key is not an error here; it is reported on the first request
    /// so retrieval keeps working without one.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::new(config, api_key)
    }

    pub fn new(config: &GenerationConfig, api_key: Option<String>) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            top_p: config.top_p,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key.trim())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(GenerationError::ServerError(format!("status {status}: {text}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| GenerationError::InvalidResponse("response has no content".to_string()))
    }
}

#[async_trait]
impl Generator for HuggingFaceGenerator {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GenerationError::MissingApiKey(API_KEY_ENV))?;

        info!(model = %self.model, messages = messages.len(), max_tokens, "requesting generation");
        let text = retry(|| self.complete(api_key, messages, max_tokens)).await?;
        debug!(chars = text.len(), "generation finished");
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

const EXAMINER_PROMPT: &str = "You are a strict academic examiner. \
Your goal is to test application of knowledge. \
Output ONLY the requested exam content. \
Do not repeat questions. \
Do not output filler text like 'Here are the questions'. \
STOP writing immediately after Question 6.";

const EXAM_FORMAT: &str = "---

TASK 1: CASE STUDY A
Write a realistic workplace scenario (Case Study A) applying the concepts.
Then, write 3 Multiple Choice Questions (numbered 1-3) based on Case Study A.

TASK 2: CASE STUDY B
Write a DIFFERENT scenario (Case Study B) applying the concepts.
Then, write 3 Multiple Choice Questions (numbered 4-6) based on Case Study B.

FORMAT:

### CASE STUDY A: [Title]
[Scenario Paragraph]

1. [Question]
   a) [Option]
   b) [Option]
   c) [Option]
   d) [Option]
   Answer: [Correct Option]
   Explanation: [Reason]

2. [Question]...
3. [Question]...

### CASE STUDY B: [Title]
[Scenario Paragraph]

4. [Question]...
5. [Question]...
6. [Question]...

### END";

/// Messages asking for a two-case-study, six-question multiple choice exam.
pub fn quiz_messages(context: &str, max_chars: usize) -> Vec<ChatMessage> {
    let material = truncate_chars(context, max_chars);
    vec![
        ChatMessage::system(EXAMINER_PROMPT),
        ChatMessage::user(format!(
            "Based on the text below, generate a Scenario-Based Exam.\n\n\
             TEXT MATERIAL:\n\"{material}\"\n\n{EXAM_FORMAT}"
        )),
    ]
}

/// Messages asking for a plain-English bullet point summary.
pub fn summary_messages(context: &str, max_chars: usize) -> Vec<ChatMessage> {
    let material = truncate_chars(context, max_chars);
    vec![
        ChatMessage::system("You are a helpful tutor."),
        ChatMessage::user(format!(
            "Summarize the key concepts from this text in simple bullet points:\n\n{material}"
        )),
    ]
}

const STOP_MARKERS: [&str; 4] = ["[/USER]", "[/ASSISTANT]", "User:", "### END"];

/// Start of a seventh numbered question.
static SEVENTH_QUESTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*7\.").expect("valid regex"));

/// Trim a generated exam at the first stop marker or seventh question.
pub fn clean_exam_output(text: &str) -> String {
    let mut cut = text;
    for marker in STOP_MARKERS {
        if let Some(idx) = cut.find(marker) {
            cut = &cut[..idx];
        }
    }
    if let Some(m) = SEVENTH_QUESTION.find(cut) {
        cut = &cut[..m.start()];
    }
    cut.trim().to_string()
}
