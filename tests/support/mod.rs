//! Shared helpers for relay integration tests: a recording transport, test
//! configurations, and fake downloader scripts.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use video_relay::{OutgoingPart, RelayConfig, ToolPaths, Transport, TransportError};

/// A part as seen by the transport at send time.
#[derive(Debug, Clone)]
pub struct SentPart {
    pub index: usize,
    pub total: usize,
    pub file_name: String,
    pub caption: String,
    pub bytes: Vec<u8>,
}

/// Records every status update and part; optionally rejects one part.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub statuses: Mutex<Vec<String>>,
    pub parts: Mutex<Vec<SentPart>>,
    reject_part: Option<usize>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(part: usize) -> Self {
        Self {
            reject_part: Some(part),
            ..Self::default()
        }
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().expect("statuses lock").clone()
    }

    pub fn parts(&self) -> Vec<SentPart> {
        self.parts.lock().expect("parts lock").clone()
    }

    pub fn reassembled(&self) -> Vec<u8> {
        self.parts().into_iter().flat_map(|p| p.bytes).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn update_status(&self, text: &str) {
        self.statuses
            .lock()
            .expect("statuses lock")
            .push(text.to_string());
    }

    async fn send_part(&self, part: &OutgoingPart) -> Result<(), TransportError> {
        if self.reject_part == Some(part.index) {
            return Err(TransportError::Rejected {
                part: part.index,
                reason: "file too large for chat".to_string(),
            });
        }
        let bytes = tokio::fs::read(&part.path).await.map_err(|e| TransportError::Io {
            path: part.path.clone(),
            source: e,
        })?;
        self.parts.lock().expect("parts lock").push(SentPart {
            index: part.index,
            total: part.total,
            file_name: part.file_name.clone(),
            caption: part.caption.clone(),
            bytes,
        });
        Ok(())
    }
}

/// Tools that are guaranteed not to exist.
pub fn missing_tools(dir: &Path) -> ToolPaths {
    ToolPaths {
        ytdlp: dir.join("missing-yt-dlp"),
        youtube_dl: dir.join("missing-youtube-dl"),
        instaloader: dir.join("missing-instaloader"),
    }
}

/// Config rooted in `temp_root`, without pacing and with short fetch timeouts.
pub fn test_config(temp_root: &Path, tools: ToolPaths) -> RelayConfig {
    RelayConfig::builder()
        .temp_root(temp_root)
        .part_send_delay(Duration::ZERO)
        .direct_fetch_timeout(Duration::from_secs(5))
        .enhanced_fetch_timeout(Duration::from_secs(5))
        .process_timeout(Duration::from_secs(5))
        .tools(tools)
        .build()
        .expect("test config is valid")
}

/// Entries left under a temp root (workspaces that were not cleaned up).
pub fn leftover_entries(temp_root: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(temp_root) {
        Ok(entries) => entries.filter_map(Result::ok).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Writes an executable shell script into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = std::fs::metadata(&path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod script");
    path
}

/// Title the fake extractor reports for every video.
pub const FAKE_TITLE: &str = "Never Gonna Give You Up";

/// Answers `--version`, then writes a fixed payload to the `--output`/`-o` template
/// with `%(title)s` replaced by [`FAKE_TITLE`] and `%(ext)s` by `mp4`.
pub const FAKE_YTDLP: &str = r#"
if [ "$1" = "--version" ]; then echo "2024.08.06"; exit 0; fi
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output|-o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
target=$(printf '%s' "$out" | sed -e 's/%(title)s/Never Gonna Give You Up/' -e 's/%(ext)s/mp4/')
printf 'fake video payload' > "$target"
"#;

/// Answers `--version`, then fails like an extractor hitting a blocked video.
pub const FAILING_TOOL: &str = r#"
if [ "$1" = "--version" ]; then echo "1.0"; exit 0; fi
echo "ERROR: [youtube] abc: Sign in to confirm you're not a bot" >&2
exit 1
"#;

/// Answers `--version`, then hangs.
pub const HANGING_TOOL: &str = r#"
if [ "$1" = "--version" ]; then echo "1.0"; exit 0; fi
exec sleep 30
"#;

/// Fails even the version probe.
pub const BROKEN_TOOL: &str = r#"
echo "Traceback (most recent call last):" >&2
exit 3
"#;
