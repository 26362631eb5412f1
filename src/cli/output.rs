use std::fmt::Write as FmtWrite;
use std::path::PathBuf;

use console::style;

use crate::models::{ContextPolicy, GeneratedExam, OutputFormat, SearchResults};
use crate::server::protocol::UploadResponse;
use crate::services::CorpusStats;
use crate::utils::preview;

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_upload(&self, upload: &UploadResponse) -> String;
    fn format_exam(&self, exam: &GeneratedExam) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Default)]
pub struct StatusInfo {
    pub daemon_running: bool,
    pub daemon_idle_secs: Option<u64>,
    pub requests_served: Option<u64>,
    pub embedding_model: String,
    pub dimension: Option<usize>,
    pub generation_model: String,
    pub api_key_present: bool,
    pub corpus: Option<CorpusStats>,
    pub snapshot_path: Option<PathBuf>,
}

fn describe_policy(policy: &ContextPolicy) -> String {
    match policy {
        ContextPolicy::Leading { n } => format!("first {n} chunks"),
        ContextPolicy::Retrieved { query, k } => format!("{k} chunks nearest to \"{query}\""),
    }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "Search results for: \"{}\"", results.query).unwrap();
        writeln!(
            output,
            "Found {} chunks in {}ms\n",
            results.len(),
            results.duration_ms
        )
        .unwrap();

        for (i, result) in results.results.iter().enumerate() {
            writeln!(
                output,
                "{}. [Distance: {:.4}] chunk #{} (word {})",
                i + 1,
                result.distance,
                result.position,
                result.source_offset
            )
            .unwrap();
            writeln!(output, "   ---").unwrap();
            writeln!(output, "   {}", preview(&result.text, 200)).unwrap();
            writeln!(output).unwrap();
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let daemon_status = if status.daemon_running {
            style("[RUNNING]").green()
        } else {
            style("[STOPPED]").red()
        };
        writeln!(output, "Daemon:        {}", daemon_status).unwrap();
        if let Some(idle) = status.daemon_idle_secs {
            writeln!(output, "  Idle:        {}s", idle).unwrap();
        }
        if let Some(requests) = status.requests_served {
            writeln!(output, "  Requests:    {}", requests).unwrap();
        }
        writeln!(output).unwrap();

        writeln!(output, "Embedding:     {}", status.embedding_model).unwrap();
        if let Some(dim) = status.dimension {
            writeln!(output, "  Dimension:   {}", dim).unwrap();
        }
        writeln!(output, "Generation:    {}", status.generation_model).unwrap();
        let key = if status.api_key_present {
            style("[SET]").green()
        } else {
            style("[MISSING]").yellow()
        };
        writeln!(output, "  API key:     {}", key).unwrap();
        writeln!(output).unwrap();

        match status.corpus {
            Some(ref corpus) => {
                writeln!(output, "Document:      {}", style("[INDEXED]").green()).unwrap();
                writeln!(output, "  Chunks:      {}", corpus.chunk_count).unwrap();
                writeln!(
                    output,
                    "  Indexed at:  {}",
                    corpus.committed_at.format("%Y-%m-%d %H:%M:%S UTC")
                )
                .unwrap();
            }
            None => {
                writeln!(output, "Document:      {}", style("[NONE]").yellow()).unwrap();
            }
        }
        if let Some(ref path) = status.snapshot_path {
            writeln!(output, "  Snapshot:    {}", path.display()).unwrap();
        }

        output
    }

    fn format_upload(&self, upload: &UploadResponse) -> String {
        let mut output = String::new();
        writeln!(output, "Indexing Complete").unwrap();
        writeln!(output, "-----------------").unwrap();
        writeln!(output, "File: {}", upload.file_name).unwrap();
        writeln!(output, "Stored at: {}", upload.stored_path.display()).unwrap();
        writeln!(output, "Chunks created: {}", upload.chunks).unwrap();
        writeln!(output, "Duration: {}ms", upload.duration_ms).unwrap();
        output
    }

    fn format_exam(&self, exam: &GeneratedExam) -> String {
        let mut output = String::new();
        let title = match exam.kind {
            crate::models::ExamKind::Quiz => "Exam",
            crate::models::ExamKind::Summary => "Summary",
        };
        writeln!(output, "{}", style(title).bold()).unwrap();
        writeln!(
            output,
            "Context: {} ({} used) | Model: {}",
            describe_policy(&exam.policy),
            exam.context_chunks,
            exam.model
        )
        .unwrap();
        writeln!(output).unwrap();
        writeln!(output, "{}", exam.text).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render(&self, value: &impl serde::Serialize) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        self.render(results)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let json = serde_json::json!({
            "daemon": {
                "running": status.daemon_running,
                "idle_secs": status.daemon_idle_secs,
                "requests_served": status.requests_served,
            },
            "embedding": {
                "model": status.embedding_model,
                "dimension": status.dimension,
            },
            "generation": {
                "model": status.generation_model,
                "api_key_present": status.api_key_present,
            },
            "corpus": status.corpus,
            "snapshot_path": status.snapshot_path,
        });
        self.render(&json)
    }

    fn format_upload(&self, upload: &UploadResponse) -> String {
        self.render(upload)
    }

    fn format_exam(&self, exam: &GeneratedExam) -> String {
        self.render(exam)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("## No results found\n\nQuery: `{}`\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "## Search Results\n").unwrap();
        writeln!(output, "**Query:** `{}`\n", results.query).unwrap();
        writeln!(
            output,
            "Found {} chunks in {}ms\n",
            results.len(),
            results.duration_ms
        )
        .unwrap();

        for (i, result) in results.results.iter().enumerate() {
            writeln!(
                output,
                "### {}. Distance: {:.4}\n",
                i + 1,
                result.distance
            )
            .unwrap();
            writeln!(
                output,
                "**Chunk:** #{} (word {})\n",
                result.position, result.source_offset
            )
            .unwrap();
            writeln!(output, "> {}\n", result.text).unwrap();
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "## Status\n").unwrap();

        let daemon_status = if status.daemon_running { "✅" } else { "❌" };
        writeln!(output, "### Daemon {}\n", daemon_status).unwrap();
        if let Some(idle) = status.daemon_idle_secs {
            writeln!(output, "- **Idle:** {}s", idle).unwrap();
        }
        if let Some(requests) = status.requests_served {
            writeln!(output, "- **Requests:** {}", requests).unwrap();
        }
        writeln!(output, "- **Embedding:** {}", status.embedding_model).unwrap();
        if let Some(dim) = status.dimension {
            writeln!(output, "- **Dimension:** {}", dim).unwrap();
        }
        writeln!(output, "- **Generation:** {}", status.generation_model).unwrap();
        let key = if status.api_key_present { "✅" } else { "❌" };
        writeln!(output, "- **API key:** {}", key).unwrap();
        writeln!(output).unwrap();

        match status.corpus {
            Some(ref corpus) => {
                writeln!(output, "### Document ✅\n").unwrap();
                writeln!(output, "| Metric | Value |").unwrap();
                writeln!(output, "|--------|-------|").unwrap();
                writeln!(output, "| Chunks | {} |", corpus.chunk_count).unwrap();
                writeln!(output, "| Indexed at | {} |", corpus.committed_at.to_rfc3339()).unwrap();
            }
            None => writeln!(output, "### Document ❌\n\n*No document indexed.*").unwrap(),
        }

        output
    }

    fn format_upload(&self, upload: &UploadResponse) -> String {
        let mut output = String::new();
        writeln!(output, "## Indexing Complete\n").unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| File | `{}` |", upload.file_name).unwrap();
        writeln!(output, "| Chunks created | {} |", upload.chunks).unwrap();
        writeln!(output, "| Duration | {}ms |", upload.duration_ms).unwrap();
        output
    }

    fn format_exam(&self, exam: &GeneratedExam) -> String {
        let mut output = String::new();
        let title = match exam.kind {
            crate::models::ExamKind::Quiz => "Scenario-Based Exam",
            crate::models::ExamKind::Summary => "Summary",
        };
        writeln!(output, "## {}\n", title).unwrap();
        writeln!(
            output,
            "*Context: {}. Model: `{}`.*\n",
            describe_policy(&exam.policy),
            exam.model
        )
        .unwrap();
        writeln!(output, "{}", exam.text).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExamKind, RetrievedChunk};

    fn results() -> SearchResults {
        SearchResults::new(
            "osmosis".to_string(),
            vec![RetrievedChunk {
                position: 4,
                distance: 0.25,
                source_offset: 1000,
                text: "Water moves across membranes.".to_string(),
            }],
            3,
        )
    }

    #[test]
    fn test_text_search_results() {
        let out = TextFormatter.format_search_results(&results());
        assert!(out.contains("Search results for: \"osmosis\""));
        assert!(out.contains("[Distance: 0.2500] chunk #4 (word 1000)"));
        assert!(out.contains("Water moves across membranes."));
    }

    #[test]
    fn test_empty_search_results() {
        let empty = SearchResults::new("nothing".to_string(), Vec::new(), 0);
        assert_eq!(
            TextFormatter.format_search_results(&empty),
            "No results found for: nothing\n"
        );
    }

    #[test]
    fn test_json_search_results_parse() {
        let out = JsonFormatter::new(false).format_search_results(&results());
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["results"][0]["position"], 4);
    }

    #[test]
    fn test_status_without_document() {
        let status = StatusInfo {
            embedding_model: "mini".to_string(),
            generation_model: "zephyr".to_string(),
            ..Default::default()
        };
        let out = TextFormatter.format_status(&status);
        assert!(out.contains("STOPPED"));
        assert!(out.contains("NONE"));
        assert!(MarkdownFormatter.format_status(&status).contains("No document indexed"));
    }

    #[test]
    fn test_exam_output_describes_context() {
        let exam = GeneratedExam {
            kind: ExamKind::Quiz,
            policy: ContextPolicy::Leading { n: 3 },
            context_chunks: 3,
            model: "zephyr".to_string(),
            text: "### CASE STUDY A".to_string(),
        };
        let out = MarkdownFormatter.format_exam(&exam);
        assert!(out.starts_with("## Scenario-Based Exam"));
        assert!(out.contains("first 3 chunks"));
        assert!(out.contains("### CASE STUDY A"));
    }
}
