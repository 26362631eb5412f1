//! Slide text from PowerPoint (`.pptx`) decks.
//!
//! A deck is a zip archive with one DrawingML part per slide at
//! `ppt/slides/slideN.xml`. Text lives in `<a:t>` runs grouped into `<a:p>`
//! paragraphs.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;
use zip::ZipArchive;

use crate::error::LoaderError;

/// Text of every slide that has any, each under a `--- Slide N ---` header,
/// one line per paragraph.
pub fn extract_text(path: &Path) -> Result<String, LoaderError> {
    let mut archive = ZipArchive::new(File::open(path)?).map_err(malformed)?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
        .collect();
    slides.sort_unstable();
    debug!(slides = slides.len(), path = %path.display(), "extracting slide text");

    let mut sections = Vec::new();
    for (number, name) in slides {
        let mut xml = String::new();
        archive
            .by_name(&name)
            .map_err(malformed)?
            .read_to_string(&mut xml)?;

        let paragraphs = slide_paragraphs(&xml)?;
        if !paragraphs.is_empty() {
            sections.push(format!("--- Slide {number} ---\n{}", paragraphs.join("\n")));
        }
    }
    Ok(sections.join("\n"))
}

fn slide_number(name: &str) -> Option<u32> {
    name.strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

fn slide_paragraphs(xml: &str) -> Result<Vec<String>, LoaderError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_run = false;

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_run = true,
            Event::Text(t) if in_run => current.push_str(&t.unescape().map_err(malformed)?),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_run = false,
                b"p" => {
                    let paragraph = std::mem::take(&mut current);
                    if !paragraph.trim().is_empty() {
                        paragraphs.push(paragraph);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs)
}

fn malformed(e: impl std::fmt::Display) -> LoaderError {
    LoaderError::Malformed(format!("pptx: {e}"))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slides_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lecture.pptx");
        let filler: &[&str] = &["filler"];
        let mut slides = vec![filler; 10];
        slides[0] = &["Photosynthesis", "Light &amp; chlorophyll"][..];
        slides[1] = &[][..];
        slides[9] = &["Summary"][..];
        fixture::write_pptx(&path, &slides);

        let text = extract_text(&path).unwrap();
        assert!(text.starts_with("--- Slide 1 ---\nPhotosynthesis\nLight & chlorophyll\n"));
        assert!(!text.contains("--- Slide 2 ---"));
        assert!(text.ends_with("--- Slide 10 ---\nSummary"));
        let third = text.find("--- Slide 3 ---").unwrap();
        assert!(third < text.find("--- Slide 10 ---").unwrap());
    }

    #[test]
    fn test_slide_number_ignores_other_parts() {
        assert_eq!(slide_number("ppt/slides/slide12.xml"), Some(12));
        assert_eq!(slide_number("ppt/slides/_rels/slide1.xml.rels"), None);
        assert_eq!(slide_number("ppt/slideLayouts/slideLayout1.xml"), None);
    }

    #[test]
    fn test_not_a_zip_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slides.pptx");
        std::fs::write(&path, b"PK\x03\x04").unwrap();
        assert!(matches!(
            extract_text(&path),
            Err(LoaderError::Malformed(_))
        ));
    }
}
