//! Page text from PDF handouts and exported slides.

use std::path::Path;

use lopdf::Document;
use tracing::{debug, warn};

use crate::error::LoaderError;

/// Text of every page that has any, each under a `--- Page N ---` header.
///
/// A page whose text cannot be decoded is skipped rather than failing the
/// whole document.
pub fn extract_text(path: &Path) -> Result<String, LoaderError> {
    let document =
        Document::load(path).map_err(|e| LoaderError::Malformed(format!("pdf: {e}")))?;

    let pages = document.get_pages();
    debug!(pages = pages.len(), path = %path.display(), "extracting pdf text");

    let mut sections = Vec::new();
    for &number in pages.keys() {
        match document.extract_text(&[number]) {
            Ok(text) if !text.trim().is_empty() => {
                sections.push(format!("--- Page {number} ---\n{text}"));
            }
            Ok(_) => {}
            Err(e) => warn!(page = number, error = %e, "skipping unreadable pdf page"),
        }
    }
    Ok(sections.join("\n"))
}
