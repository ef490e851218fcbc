//! External downloader strategies (yt-dlp, youtube-dl, instaloader).
//!
//! Every run first probes the tool with `--version`; a tool that does not answer
//! is skipped rather than counted as a failure. The real invocation gets its
//! own output directory inside the workspace, a single-item flag and a hard
//! execution budget. On timeout the child is killed when its future is dropped.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::classify::Platform;

use super::output::{OutputNaming, resolve_output};
use super::{AcquireRequest, Strategy, StrategyError, StrategyOutcome};

/// Budget for the `--version` probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Characters of stderr kept in a failure record.
const STDERR_TAIL_CHARS: usize = 800;

/// Output template given to tools that accept one; the file keeps the video title.
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Which external downloader a [`ProcessStrategy`] drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Generic extractor, handles most platforms.
    YtDlp,
    /// Legacy generic extractor.
    YoutubeDl,
    /// Instagram-only extractor.
    Instaloader,
}

impl ToolKind {
    /// Tool name used as the strategy name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::YtDlp => "yt-dlp",
            Self::YoutubeDl => "youtube-dl",
            Self::Instaloader => "instaloader",
        }
    }

    fn naming(self) -> OutputNaming {
        match self {
            Self::YtDlp | Self::YoutubeDl => OutputNaming::Titled,
            Self::Instaloader => OutputNaming::Unpredictable,
        }
    }

    fn applies_to(self, platform: Platform) -> bool {
        match self {
            Self::YtDlp | Self::YoutubeDl => platform != Platform::Other,
            Self::Instaloader => platform == Platform::Instagram,
        }
    }
}

/// Result of a `--version` probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolProbe {
    /// Executable that was probed.
    pub program: PathBuf,
    /// First line of the version output, when the probe succeeded.
    pub version: Option<String>,
    /// Why the probe failed.
    pub error: Option<String>,
}

impl ToolProbe {
    /// True when the tool answered the probe.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.version.is_some()
    }
}

/// Runs `<program> --version` with a short budget.
#[instrument(level = "debug", fields(program = %program.display()))]
pub async fn probe_tool(program: &Path) -> ToolProbe {
    let mut command = Command::new(program);
    command
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let (version, error) = match tokio::time::timeout(PROBE_TIMEOUT, command.output()).await {
        Err(_) => (None, Some(format!("no answer within {}s", PROBE_TIMEOUT.as_secs()))),
        Ok(Err(e)) if e.kind() == ErrorKind::NotFound => (None, Some("not installed".to_string())),
        Ok(Err(e)) => (None, Some(e.to_string())),
        Ok(Ok(output)) if !output.status.success() => {
            (None, Some(format!("version probe exited with {}", output.status)))
        }
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let version = stdout.lines().next().unwrap_or("").trim().to_string();
            (Some(version), None)
        }
    };

    debug!(?version, ?error, "tool probe finished");
    ToolProbe {
        program: program.to_path_buf(),
        version,
        error,
    }
}

/// Acquires a video by running an external downloader.
#[derive(Debug, Clone)]
pub struct ProcessStrategy {
    kind: ToolKind,
    program: PathBuf,
    timeout: Duration,
    max_height: u32,
}

impl ProcessStrategy {
    /// Creates a strategy for `kind` running `program`.
    #[must_use]
    pub fn new(kind: ToolKind, program: PathBuf, timeout: Duration, max_height: u32) -> Self {
        Self {
            kind,
            program,
            timeout,
            max_height,
        }
    }

    /// Tool this strategy drives.
    #[must_use]
    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    /// Command-line arguments for one invocation writing into `out_dir`.
    #[must_use]
    pub fn build_args(&self, url: &str, out_dir: &Path) -> Vec<OsString> {
        let format = format!("best[height<={}]", self.max_height);
        let template = out_dir.join(OUTPUT_TEMPLATE);
        match self.kind {
            ToolKind::YtDlp => vec![
                "--format".into(),
                format.into(),
                "--output".into(),
                template.into_os_string(),
                "--no-playlist".into(),
                url.into(),
            ],
            ToolKind::YoutubeDl => vec![
                "-f".into(),
                format.into(),
                "-o".into(),
                template.into_os_string(),
                "--no-playlist".into(),
                url.into(),
            ],
            ToolKind::Instaloader => {
                let mut args: Vec<OsString> = vec![
                    "--no-pictures".into(),
                    "--no-captions".into(),
                    "--no-metadata-json".into(),
                    "--dirname-pattern".into(),
                    out_dir.as_os_str().to_os_string(),
                    "--".into(),
                ];
                args.push(instagram_target(url).into());
                args
            }
        }
    }

    async fn run(&self, url: &str, out_dir: &Path) -> Result<PathBuf, StrategyError> {
        let tool = self.kind.name();
        let args = self.build_args(url, out_dir);
        debug!(tool, ?args, "running downloader");

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => return Err(StrategyError::timeout(tool, self.timeout.as_secs())),
            Ok(Err(e)) => return Err(StrategyError::unavailable(tool, e.to_string())),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StrategyError::process_exit(
                tool,
                output.status.code(),
                tail(stderr.trim(), STDERR_TAIL_CHARS),
            ));
        }

        resolve_output(out_dir, self.kind.naming()).await
    }
}

#[async_trait]
impl Strategy for ProcessStrategy {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn applies_to(&self, platform: Platform) -> bool {
        self.kind.applies_to(platform)
    }

    async fn attempt(&self, request: &AcquireRequest<'_>) -> StrategyOutcome {
        let probe = probe_tool(&self.program).await;
        if !probe.is_available() {
            let reason = probe.error.unwrap_or_else(|| "probe failed".to_string());
            warn!(tool = self.name(), reason = %reason, "tool not working, skipping");
            return StrategyOutcome::Skipped(reason);
        }

        let out_dir = match request.workspace.strategy_dir(self.name()).await {
            Ok(dir) => dir,
            Err(e) => {
                return StrategyOutcome::Failed(StrategyError::io(
                    request.workspace.downloads_dir(),
                    e,
                ));
            }
        };

        info!(
            tool = self.name(),
            version = probe.version.as_deref().unwrap_or(""),
            timeout_secs = self.timeout.as_secs(),
            "invoking downloader"
        );
        match self.run(request.url, &out_dir).await {
            Ok(path) => StrategyOutcome::Success(path),
            Err(error) => StrategyOutcome::Failed(error),
        }
    }
}

/// instaloader takes `-<shortcode>` for a single post; anything else is passed through.
fn instagram_target(url: &str) -> String {
    let shortcode = Url::parse(url).ok().and_then(|parsed| {
        let segments: Vec<String> = parsed.path_segments()?.map(str::to_string).collect();
        segments
            .windows(2)
            .find(|pair| matches!(pair[0].as_str(), "p" | "reel" | "reels" | "tv"))
            .map(|pair| pair[1].clone())
            .filter(|code| !code.is_empty())
    });
    shortcode.map_or_else(|| url.to_string(), |code| format!("-{code}"))
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}
