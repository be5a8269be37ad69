use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::feed::{Document, DocumentError};

/// Errors from the on-disk feed store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named feed file does not exist under the source folder.
    #[error("Feed file not found: {0}")]
    NotFound(PathBuf),

    /// The feed file exists but is not a usable XML document.
    #[error("Invalid feed xml: {0}")]
    Xml(#[from] DocumentError),

    /// The feeds folder itself is missing.
    #[error("Feeds folder not found: {0}")]
    MissingDir(PathBuf),

    /// The feeds folder exists but holds no files.
    #[error("No feed files in {0}")]
    NoFeeds(PathBuf),

    /// Underlying filesystem failure.
    #[error("File store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Loads and parses the named feed file from the given folder.
pub fn load_document(filename: &str, dir: &Path) -> Result<Document, StoreError> {
    let path = dir.join(filename);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound(path));
        }
        Err(e) => return Err(StoreError::Io(e)),
    };
    let document = Document::parse(&content)?;
    tracing::debug!(file = %path.display(), "feed document loaded");
    Ok(document)
}

/// Writes a document to `dir/filename` atomically.
///
/// Serializes first, then writes to a randomized temp file in the same
/// directory, syncs, and renames over the destination, so the output file
/// is never observable in a partial state.
pub fn write_document(document: &Document, dir: &Path, filename: &str) -> Result<(), StoreError> {
    use std::time::{SystemTime, UNIX_EPOCH};

    let content = document.to_xml()?;
    let path = dir.join(filename);

    // Randomized temp filename to prevent TOCTOU race conditions
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)?;

    if let Err(e) = file.write_all(content.as_bytes()) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(StoreError::Io(e));
    }
    if let Err(e) = file.sync_all() {
        let _ = std::fs::remove_file(&temp_path);
        return Err(StoreError::Io(e));
    }
    drop(file);

    if let Err(e) = std::fs::rename(&temp_path, &path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(StoreError::Io(e));
    }

    tracing::debug!(file = %path.display(), bytes = content.len(), "feed document written");
    Ok(())
}

/// Lists the feed filenames in the source folder, sorted.
///
/// The folder must exist and contain at least one regular file; the two
/// failure modes are distinct errors so the caller can tell "nothing was
/// downloaded" from "wrong folder".
pub fn list_feed_files(dir: &Path) -> Result<Vec<String>, StoreError> {
    if !dir.is_dir() {
        tracing::error!(dir = %dir.display(), "feeds folder does not exist");
        return Err(StoreError::MissingDir(dir.to_path_buf()));
    }

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }

    if names.is_empty() {
        tracing::error!(dir = %dir.display(), "no feed files found");
        return Err(StoreError::NoFeeds(dir.to_path_buf()));
    }

    names.sort();
    tracing::debug!(dir = %dir.display(), count = names.len(), "found feed files");
    Ok(names)
}
