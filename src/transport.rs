//! Delivery seam: where status texts and file parts go.
//!
//! The relay never talks to a chat service directly. It hands each part to a
//! [`Transport`], which may reject it; a rejection stops the delivery.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indicatif::ProgressBar;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// Numbered alternatives tried before a delivery name counts as taken.
const MAX_NAME_SUFFIX: u32 = 999;

/// One part ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPart {
    /// 1-based position.
    pub index: usize,
    /// Number of parts in this delivery.
    pub total: usize,
    /// File holding the bytes.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Name the receiver should see.
    pub file_name: String,
    /// Text sent alongside the file.
    pub caption: String,
}

/// Why a part was not delivered.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The receiving side refused the part.
    #[error("part {part} rejected: {reason}")]
    Rejected {
        /// Index of the refused part.
        part: usize,
        /// Reason given by the receiver.
        reason: String,
    },

    /// Local IO failed while handing the part over.
    #[error("IO error delivering {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Status and file sink for one relay run.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Replaces the requester-visible status text. Best effort.
    async fn update_status(&self, text: &str);

    /// Sends one part. Parts arrive strictly in index order.
    async fn send_part(&self, part: &OutgoingPart) -> Result<(), TransportError>;
}

/// Copies every part into a directory, with its caption in `<name>.txt`.
///
/// Runs share the directory, so a name already present is never overwritten:
/// the part lands as `<stem>_1.<ext>`, `<stem>_2.<ext>` and so on instead.
#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    dir: PathBuf,
    progress: Option<ProgressBar>,
}

impl DirectoryTransport {
    /// Delivers into `dir`, which must already exist.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            progress: None,
        }
    }

    /// Mirrors status updates onto a spinner.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Destination directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Atomically creates the first free destination for `file_name`.
    async fn claim_destination(
        &self,
        file_name: &str,
    ) -> Result<(PathBuf, File), TransportError> {
        for n in 0..=MAX_NAME_SUFFIX {
            let candidate = self.dir.join(numbered_name(file_name, n));
            if tokio::fs::try_exists(caption_path(&candidate))
                .await
                .unwrap_or(false)
            {
                continue;
            }
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = %candidate.display(), "delivery name taken");
                }
                Err(e) => return Err(TransportError::io(candidate, e)),
            }
        }
        Err(TransportError::io(
            self.dir.join(file_name),
            std::io::Error::new(ErrorKind::AlreadyExists, "no free delivery name"),
        ))
    }
}

/// `clip.mp4` with `n = 2` becomes `clip_2.mp4`; `n = 0` keeps the name.
fn numbered_name(file_name: &str, n: u32) -> String {
    if n == 0 {
        return file_name.to_string();
    }
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{n}.{ext}"),
        _ => format!("{file_name}_{n}"),
    }
}

fn caption_path(dest: &Path) -> PathBuf {
    let mut path = dest.as_os_str().to_os_string();
    path.push(".txt");
    PathBuf::from(path)
}

async fn copy_into(source: &Path, dest: &mut File) -> std::io::Result<()> {
    let mut reader = File::open(source).await?;
    tokio::io::copy(&mut reader, dest).await?;
    dest.flush().await
}

#[async_trait]
impl Transport for DirectoryTransport {
    async fn update_status(&self, text: &str) {
        match &self.progress {
            Some(bar) => bar.set_message(text.replace('\n', " | ")),
            None => debug!(status = %text, "status update"),
        }
    }

    #[instrument(skip(self, part), fields(part = part.index, total = part.total))]
    async fn send_part(&self, part: &OutgoingPart) -> Result<(), TransportError> {
        if part.file_name.is_empty() || part.file_name.contains(['/', '\\']) {
            return Err(TransportError::Rejected {
                part: part.index,
                reason: format!("unusable file name {:?}", part.file_name),
            });
        }

        let (dest, mut file) = self.claim_destination(&part.file_name).await?;
        if let Err(e) = copy_into(&part.path, &mut file).await {
            drop(file);
            if let Err(cleanup) = tokio::fs::remove_file(&dest).await {
                warn!(
                    path = %dest.display(),
                    error = %cleanup,
                    "could not remove partial delivery"
                );
            }
            return Err(TransportError::io(&part.path, e));
        }

        let caption = caption_path(&dest);
        tokio::fs::write(&caption, &part.caption)
            .await
            .map_err(|e| TransportError::io(&caption, e))?;

        info!(dest = %dest.display(), bytes = part.size, "part delivered");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn part(source: &Path, name: &str) -> OutgoingPart {
        OutgoingPart {
            index: 1,
            total: 1,
            path: source.to_path_buf(),
            size: 4,
            file_name: name.to_string(),
            caption: "✅ clip.mp4".to_string(),
        }
    }

    #[tokio::test]
    async fn test_part_and_caption_are_written() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let source = src.path().join("clip.mp4");
        tokio::fs::write(&source, b"data").await.unwrap();

        let transport = DirectoryTransport::new(out.path());
        transport.send_part(&part(&source, "clip.mp4")).await.unwrap();

        assert_eq!(std::fs::read(out.path().join("clip.mp4")).unwrap(), b"data");
        assert_eq!(
            std::fs::read_to_string(out.path().join("clip.mp4.txt")).unwrap(),
            "✅ clip.mp4"
        );
    }

    #[tokio::test]
    async fn test_path_like_names_are_rejected() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let source = src.path().join("clip.mp4");
        tokio::fs::write(&source, b"data").await.unwrap();

        let err = DirectoryTransport::new(out.path())
            .send_part(&part(&source, "../escape.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected { part: 1, .. }));
    }

    #[tokio::test]
    async fn test_missing_source_is_io_error_and_leaves_nothing() {
        let out = TempDir::new().unwrap();
        let err = DirectoryTransport::new(out.path())
            .send_part(&part(Path::new("/no/such/file.mp4"), "file.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Io { .. }));
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_existing_name_gets_numbered_instead_of_overwritten() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let first = src.path().join("first.mp4");
        let second = src.path().join("second.mp4");
        tokio::fs::write(&first, b"first").await.unwrap();
        tokio::fs::write(&second, b"second").await.unwrap();

        let transport = DirectoryTransport::new(out.path());
        transport.send_part(&part(&first, "clip.mp4")).await.unwrap();
        transport.send_part(&part(&second, "clip.mp4")).await.unwrap();

        assert_eq!(std::fs::read(out.path().join("clip.mp4")).unwrap(), b"first");
        assert_eq!(std::fs::read(out.path().join("clip_1.mp4")).unwrap(), b"second");
        assert!(out.path().join("clip_1.mp4.txt").exists());
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("clip.mp4", 0), "clip.mp4");
        assert_eq!(numbered_name("clip.mp4", 2), "clip_2.mp4");
        assert_eq!(numbered_name("a.b.webm", 1), "a.b_1.webm");
        assert_eq!(numbered_name("noext", 3), "noext_3");
        assert_eq!(numbered_name(".hidden", 1), ".hidden_1");
    }
}
