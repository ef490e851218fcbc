//! Locating the file an external downloader produced.
//!
//! Each process strategy writes into its own empty directory, so every
//! recognized video file in it is a candidate. Tools driven by a title template
//! may also leave per-format fragments (`<title>.f137.mp4`) behind; those are
//! never the final file. More than one candidate is rejected as ambiguous
//! instead of guessing.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::classify::is_video_extension;

use super::StrategyError;

/// How a tool names its output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputNaming {
    /// The tool was given a `%(title)s.%(ext)s` template; format fragments are skipped.
    Titled,
    /// Naming is decided by the tool; only the extension scan applies.
    Unpredictable,
}

/// Resolves the single video file produced in `dir`.
///
/// # Errors
///
/// - [`StrategyError::NoOutput`] when no recognized video file exists
/// - [`StrategyError::AmbiguousOutput`] when several candidates remain
/// - [`StrategyError::Io`] when the directory cannot be read
pub async fn resolve_output(dir: &Path, naming: OutputNaming) -> Result<PathBuf, StrategyError> {
    let mut candidates = video_files_in(dir).await?;
    candidates.sort();
    debug!(dir = %dir.display(), count = candidates.len(), "scanned strategy output");

    if naming == OutputNaming::Titled {
        candidates.retain(|path| !is_format_fragment(path));
    }

    match candidates.len() {
        0 => Err(StrategyError::NoOutput {
            dir: dir.to_path_buf(),
        }),
        1 => Ok(candidates.remove(0)),
        _ => Err(StrategyError::AmbiguousOutput {
            dir: dir.to_path_buf(),
            candidates,
        }),
    }
}

/// `<title>.f<format id>.<ext>`: one stream of a download that was never merged.
fn is_format_fragment(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.rsplit_once('.'))
        .and_then(|(_, tag)| tag.strip_prefix('f'))
        .is_some_and(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
}

async fn video_files_in(dir: &Path) -> Result<Vec<PathBuf>, StrategyError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| StrategyError::io(dir, e))?;
    let mut found = Vec::new();

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StrategyError::io(dir, e))?
    {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        let is_video = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(is_video_extension);
        if is_file && is_video {
            found.push(path);
        }
    }

    Ok(found)
}
