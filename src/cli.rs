//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Default number of requests relayed at once.
pub const DEFAULT_CONCURRENCY: u8 = 2;

/// Default delivery directory.
pub const DEFAULT_OUTPUT_DIR: &str = "relayed";

/// Relay videos from URLs into a delivery directory.
///
/// Each URL (or each line of stdin) is one request: the video is fetched with
/// yt-dlp, youtube-dl, instaloader or a direct download, split into parts when
/// it exceeds the size ceiling, and written to the output directory with a
/// caption file per part.
#[derive(Parser, Debug)]
#[command(name = "video-relay")]
#[command(author, version, about)]
pub struct Args {
    /// URLs or message texts containing a URL (reads stdin when omitted)
    pub urls: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Directory receiving delivered parts and their captions [default: relayed]
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Root under which per-request workspaces are created
    #[arg(long)]
    pub temp_root: Option<PathBuf>,

    /// Config file (default: $XDG_CONFIG_HOME/video-relay/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Requests relayed at once (1-16)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: Option<u8>,

    /// Delivery size ceiling in MiB; larger files are split
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=4096))]
    pub max_file_size_mb: Option<u64>,

    /// Part size in KiB for split files
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub chunk_size_kb: Option<u64>,

    /// Pause between parts in milliseconds (0 to disable, max 60000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub part_delay_ms: Option<u64>,

    /// Requester name written into captions
    #[arg(long, default_value = "cli")]
    pub requested_by: String,

    /// Print one JSON run report per request to stdout
    #[arg(long)]
    pub json: bool,

    /// Probe the external downloaders and exit
    #[arg(long)]
    pub check_tools: bool,
}
