//! Reading uploaded lecture material into raw text.

mod pdf;
mod pptx;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::LoaderError;
use crate::utils::{calculate_checksum, check_file_size, extension, read_file_content};

/// Extensions read as plain text.
const TEXT_EXTENSIONS: &[&str] = &["txt", "text", "md", "markdown", "rst"];

/// Extensions with a text extractor.
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "pptx"];

/// Office and slide formats without an extractor.
const UNSUPPORTED_EXTENSIONS: &[&str] = &["ppt", "doc", "docx", "odp", "key"];

/// Raw text extracted from one uploaded file.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedDocument {
    pub path: PathBuf,
    pub file_name: String,
    pub checksum: String,
    pub text: String,
}

/// Turns a file on disk into document text.
pub trait DocumentLoader: Send + Sync {
    fn supports(&self, path: &Path) -> bool;

    fn load(&self, path: &Path) -> Result<LoadedDocument, LoaderError>;
}

/// Loader for lecture notes, PDF handouts and PPTX decks.
///
/// PDF pages and slides are emitted under `--- Page N ---` and
/// `--- Slide N ---` headers.
#[derive(Debug, Clone)]
pub struct FileLoader {
    max_file_size: u64,
}

impl FileLoader {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }
}

impl DocumentLoader for FileLoader {
    fn supports(&self, path: &Path) -> bool {
        extension(path).is_some_and(|ext| {
            TEXT_EXTENSIONS.contains(&ext.as_str()) || DOCUMENT_EXTENSIONS.contains(&ext.as_str())
        })
    }

    fn load(&self, path: &Path) -> Result<LoadedDocument, LoaderError> {
        let ext = extension(path).unwrap_or_default();
        if UNSUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(LoaderError::Unsupported(format!(
                ".{ext} files must be exported to PDF or PPTX before upload"
            )));
        }
        if !ext.is_empty() && !self.supports(path) {
            return Err(LoaderError::Unsupported(format!(".{ext}")));
        }

        let text = match ext.as_str() {
            "pdf" => {
                check_file_size(path, self.max_file_size)?;
                pdf::extract_text(path)?
            }
            "pptx" => {
                check_file_size(path, self.max_file_size)?;
                pptx::extract_text(path)?
            }
            _ => read_file_content(path, self.max_file_size)?,
        };
        if text.trim().is_empty() {
            return Err(LoaderError::Empty);
        }
        debug!(path = %path.display(), chars = text.len(), "document loaded");

        Ok(LoadedDocument {
            path: path.to_path_buf(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            checksum: calculate_checksum(&text),
            text,
        })
    }
}
