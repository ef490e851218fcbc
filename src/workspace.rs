//! Per-request session workspaces.
//!
//! Every relay run owns one [`Workspace`]: a uniquely named directory under the
//! configured temp root holding everything the run writes. The orchestrator calls
//! [`Workspace::destroy`] on every exit path; `Drop` removes the tree as well if a
//! run is cancelled or panics before reaching its finalizer.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

const DOWNLOADS_DIR: &str = "downloads";
const MAX_NAME_ATTEMPTS: u32 = 8;

/// Failure to create a session workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The directory could not be created.
    #[error("IO error creating workspace at {path}: {source}")]
    Io {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Every generated name was already taken.
    #[error("could not find a free workspace name under {root}")]
    NameExhausted {
        /// Temp root that was searched.
        root: PathBuf,
    },
}

impl WorkspaceError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Isolated directory tree for one relay run.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    destroyed: bool,
}

impl Workspace {
    /// Creates a fresh workspace under `temp_root`.
    ///
    /// The directory name combines the creation time in milliseconds with a
    /// random suffix, and is claimed with an exclusive `create_dir` so two
    /// concurrent runs can never share it.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError`] when the temp root or the session directory
    /// cannot be created.
    #[instrument(level = "debug", fields(temp_root = %temp_root.display()))]
    pub async fn open(temp_root: &Path) -> Result<Self, WorkspaceError> {
        tokio::fs::create_dir_all(temp_root)
            .await
            .map_err(|e| WorkspaceError::io(temp_root, e))?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let candidate = temp_root.join(session_dir_name());
            match tokio::fs::create_dir(&candidate).await {
                Ok(()) => {
                    let downloads = candidate.join(DOWNLOADS_DIR);
                    let workspace = Self {
                        root: candidate,
                        destroyed: false,
                    };
                    tokio::fs::create_dir(&downloads)
                        .await
                        .map_err(|e| WorkspaceError::io(&downloads, e))?;
                    info!(path = %workspace.root.display(), "workspace opened");
                    return Ok(workspace);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = %candidate.display(), "workspace name taken, retrying");
                }
                Err(e) => return Err(WorkspaceError::io(candidate, e)),
            }
        }

        Err(WorkspaceError::NameExhausted {
            root: temp_root.to_path_buf(),
        })
    }

    /// Root of the workspace tree.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Directory holding acquired files.
    #[must_use]
    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join(DOWNLOADS_DIR)
    }

    /// Creates (if needed) and returns a private output directory for one strategy.
    ///
    /// # Errors
    ///
    /// Returns the IO error when the directory cannot be created.
    pub async fn strategy_dir(&self, strategy: &str) -> std::io::Result<PathBuf> {
        let dir = self.downloads_dir().join(strategy);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// True once [`destroy`](Self::destroy) has run.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Recursively removes the workspace.
    ///
    /// Idempotent: later calls, or a tree that is already gone, are no-ops.
    /// Never fails; removal errors are logged.
    #[instrument(level = "debug", skip(self), fields(path = %self.root.display()))]
    pub async fn destroy(&mut self) {
        if self.destroyed {
            debug!("workspace already destroyed");
            return;
        }
        self.destroyed = true;

        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => info!(path = %self.root.display(), "workspace removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.root.display(), "workspace already gone");
            }
            Err(e) => warn!(
                path = %self.root.display(),
                error = %e,
                "failed to remove workspace"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => debug!(path = %self.root.display(), "workspace removed on drop"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.root.display(),
                error = %e,
                "failed to remove workspace on drop"
            ),
        }
    }
}

fn session_dir_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix: u32 = rand::thread_rng().r#gen();
    format!("session_{millis}_{suffix:08x}")
}
