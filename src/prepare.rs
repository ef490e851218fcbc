//! Transfer preparation: fitting an acquired file under the delivery ceiling.
//!
//! Files at or under the ceiling are delivered untouched as a single part.
//! Larger files are cut into fixed-size byte ranges, each written to its own
//! file next to the source as `<stem>_partNNN<.ext>` (1-based). Concatenating
//! the parts in order reproduces the source exactly.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use crate::acquire::AcquiredFile;
use crate::config::RelayConfig;

/// One deliverable slice of an acquired file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Position in the delivery order, starting at 1.
    pub index: usize,
    /// Size in bytes.
    pub size: u64,
    /// Location of the part file.
    pub path: PathBuf,
}

/// Failure while splitting. The caller falls back to the unsplit file.
#[derive(Debug, Error)]
pub enum SplitError {
    /// Reading the source or writing a part failed.
    #[error("IO error splitting at {path}: {source}")]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The chunk size cannot be used as a buffer length.
    #[error("invalid split chunk size {0}")]
    InvalidChunkSize(u64),
}

impl SplitError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Decides whether a file needs splitting and performs the split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPreparer {
    max_file_size: u64,
    chunk_size: u64,
}

impl TransferPreparer {
    /// Creates a preparer with an explicit ceiling and chunk size.
    #[must_use]
    pub fn new(max_file_size: u64, chunk_size: u64) -> Self {
        Self {
            max_file_size,
            chunk_size,
        }
    }

    /// Creates a preparer from the relay configuration.
    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.max_file_size(), config.split_chunk_size())
    }

    /// True when `size` exceeds the delivery ceiling.
    #[must_use]
    pub fn needs_split(&self, size: u64) -> bool {
        size > self.max_file_size
    }

    /// Number of parts a file of `size` bytes becomes.
    #[must_use]
    pub fn part_count(&self, size: u64) -> u64 {
        if !self.needs_split(size) || self.chunk_size == 0 {
            return 1;
        }
        size.div_ceil(self.chunk_size)
    }

    /// Returns the ordered parts to deliver for `file`.
    ///
    /// Never fails: when splitting errors out, the partial parts are removed
    /// and the original file is returned as the sole part.
    #[instrument(skip(self, file), fields(path = %file.path.display(), bytes = file.size))]
    pub async fn prepare(&self, file: &AcquiredFile) -> Vec<FilePart> {
        if !self.needs_split(file.size) {
            debug!("file within delivery limit, sending as-is");
            return vec![whole(file)];
        }

        match self.split(&file.path).await {
            Ok(parts) => parts,
            Err(error) => {
                warn!(error = %error, "split failed, falling back to unsplit delivery");
                vec![whole(file)]
            }
        }
    }

    /// Splits `source` into chunk-sized part files.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError`] on any read or write failure; parts written so
    /// far are deleted first.
    pub async fn split(&self, source: &Path) -> Result<Vec<FilePart>, SplitError> {
        let chunk_len = usize::try_from(self.chunk_size)
            .ok()
            .filter(|len| *len > 0)
            .ok_or(SplitError::InvalidChunkSize(self.chunk_size))?;

        let mut parts = Vec::new();
        let result = self.write_parts(source, chunk_len, &mut parts).await;
        if let Err(error) = result {
            for part in &parts {
                let _ = tokio::fs::remove_file(&part.path).await;
            }
            return Err(error);
        }

        info!(parts = parts.len(), "file split into parts");
        Ok(parts)
    }

    async fn write_parts(
        &self,
        source: &Path,
        chunk_len: usize,
        parts: &mut Vec<FilePart>,
    ) -> Result<(), SplitError> {
        let mut reader = File::open(source)
            .await
            .map_err(|e| SplitError::io(source, e))?;
        let mut buffer = vec![0u8; chunk_len];

        loop {
            let filled = fill_block(&mut reader, &mut buffer)
                .await
                .map_err(|e| SplitError::io(source, e))?;
            if filled == 0 {
                break;
            }

            let index = parts.len() + 1;
            let path = part_path(source, index);
            let mut writer = File::create(&path)
                .await
                .map_err(|e| SplitError::io(&path, e))?;
            parts.push(FilePart {
                index,
                size: filled as u64,
                path: path.clone(),
            });
            writer
                .write_all(&buffer[..filled])
                .await
                .map_err(|e| SplitError::io(&path, e))?;
            writer.flush().await.map_err(|e| SplitError::io(&path, e))?;

            if filled < chunk_len {
                break;
            }
        }
        Ok(())
    }
}

/// Reads until `buffer` is full or the source is exhausted.
async fn fill_block(reader: &mut File, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = reader.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

fn whole(file: &AcquiredFile) -> FilePart {
    FilePart {
        index: 1,
        size: file.size,
        path: file.path.clone(),
    }
}

/// `dir/clip.mp4` + 3 → `dir/clip_part003.mp4`.
#[must_use]
pub fn part_path(source: &Path, index: usize) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match source.extension() {
        Some(ext) => format!("{stem}_part{index:03}.{}", ext.to_string_lossy()),
        None => format!("{stem}_part{index:03}"),
    };
    source.with_file_name(name)
}
