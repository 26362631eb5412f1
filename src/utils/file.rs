//! File utilities for document uploads.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Calculate SHA-256 checksum of content.
pub fn calculate_checksum(content: &str) -> String {
    let hash = Sha256::digest(content.as_bytes());
    hex::encode(hash)
}

/// Fail with `InvalidData` when the file at `path` is larger than `max_size` bytes.
pub fn check_file_size(path: &Path, max_size: u64) -> std::io::Result<()> {
    let metadata = fs::metadata(path)?;

    if metadata.len() > max_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "file exceeds maximum size: {} > {}",
                metadata.len(),
                max_size
            ),
        ));
    }
    Ok(())
}

/// Read file content with size limit.
pub fn read_file_content(path: &Path, max_size: u64) -> std::io::Result<String> {
    check_file_size(path, max_size)?;
    fs::read_to_string(path)
}

/// Copy an uploaded file into `dir`, keeping its file name.
pub fn store_upload(source: &Path, dir: &Path) -> std::io::Result<PathBuf> {
    let file_name = source.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("not a file path: {}", source.display()),
        )
    })?;

    fs::create_dir_all(dir)?;
    let target = dir.join(file_name);
    if source.canonicalize()? != target.canonicalize().unwrap_or_default() {
        fs::copy(source, &target)?;
    }
    Ok(target)
}

/// Lowercased file extension, if any.
pub fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}
