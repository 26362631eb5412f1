//! Exam generation models: what to generate and which context to ground it in.

use serde::{Deserialize, Serialize};

/// Kind of study material to generate from the indexed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExamKind {
    /// Scenario-based multiple choice exam
    Quiz,
    /// Plain-English bullet point summary
    Summary,
}

impl std::str::FromStr for ExamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quiz" => Ok(ExamKind::Quiz),
            "summary" => Ok(ExamKind::Summary),
            _ => Err(format!(
                "invalid request type: {s}. Use 'quiz' or 'summary'."
            )),
        }
    }
}

impl std::fmt::Display for ExamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExamKind::Quiz => write!(f, "quiz"),
            ExamKind::Summary => write!(f, "summary"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message sent to the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Configured default for picking generation context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextPolicyKind {
    /// First chunks of the document in reading order
    #[default]
    Leading,
    /// Nearest chunks to a query
    Retrieved,
}

/// How the chunks that ground a generation request are chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ContextPolicy {
    /// The first `n` chunks in insertion order.
    Leading { n: usize },
    /// The `k` chunks nearest to `query`.
    Retrieved { query: String, k: usize },
}

impl ContextPolicy {
    /// Resolve the policy for a request. An explicit query always means retrieval.
    pub fn resolve(
        kind: ContextPolicyKind,
        query: Option<String>,
        exam: ExamKind,
        n: usize,
    ) -> Self {
        match (query, kind) {
            (Some(query), _) => ContextPolicy::Retrieved { query, k: n },
            (None, ContextPolicyKind::Retrieved) => ContextPolicy::Retrieved {
                query: default_query(exam).to_string(),
                k: n,
            },
            (None, ContextPolicyKind::Leading) => ContextPolicy::Leading { n },
        }
    }
}

fn default_query(kind: ExamKind) -> &'static str {
    match kind {
        ExamKind::Quiz => "key concepts, definitions and applied examples",
        ExamKind::Summary => "main ideas and key concepts",
    }
}

/// Generated study material and the context it was grounded in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedExam {
    pub kind: ExamKind,
    pub policy: ContextPolicy,
    pub context_chunks: usize,
    pub model: String,
    pub text: String,
}

/// Joins context chunks into a single prompt component.
pub fn join_context(chunks: &[String]) -> String {
    chunks.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exam_kind_parse() {
        assert_eq!("quiz".parse::<ExamKind>().unwrap(), ExamKind::Quiz);
        assert_eq!("Summary".parse::<ExamKind>().unwrap(), ExamKind::Summary);
        let err = "essay".parse::<ExamKind>().unwrap_err();
        assert!(err.contains("'quiz' or 'summary'"));
    }

    #[test]
    fn test_policy_resolution() {
        assert_eq!(
            ContextPolicy::resolve(ContextPolicyKind::Leading, None, ExamKind::Quiz, 3),
            ContextPolicy::Leading { n: 3 }
        );
        assert_eq!(
            ContextPolicy::resolve(
                ContextPolicyKind::Leading,
                Some("osmosis".to_string()),
                ExamKind::Quiz,
                4
            ),
            ContextPolicy::Retrieved {
                query: "osmosis".to_string(),
                k: 4
            }
        );
        assert!(matches!(
            ContextPolicy::resolve(ContextPolicyKind::Retrieved, None, ExamKind::Summary, 2),
            ContextPolicy::Retrieved { k: 2, .. }
        ));
    }

    #[test]
    fn test_chat_message_serializes_lowercase_role() {
        let json = serde_json::to_string(&ChatMessage::system("be strict")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"be strict"}"#);
    }

    #[test]
    fn test_join_context() {
        let chunks = vec!["a b".to_string(), "c d".to_string()];
        assert_eq!(join_context(&chunks), "a b\n\nc d");
    }
}
