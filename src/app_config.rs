//! Config file loading and layering onto the relay configuration.
//!
//! Precedence: built-in defaults < config file < command line.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use video_relay::{RelayConfig, ToolPaths};

use crate::cli::Args;

const MIB: u64 = 1024 * 1024;
const KIB: u64 = 1024;

/// Values read from the config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub output_dir: Option<PathBuf>,
    pub concurrency: Option<u8>,
    pub max_file_size_mb: Option<u64>,
    pub split_chunk_kb: Option<u64>,
    pub process_timeout_secs: Option<u64>,
    pub direct_fetch_timeout_secs: Option<u64>,
    pub enhanced_fetch_timeout_secs: Option<u64>,
    pub max_video_height: Option<u32>,
    pub part_send_delay_ms: Option<u64>,
    pub temp_root: Option<PathBuf>,
    pub ytdlp_bin: Option<PathBuf>,
    pub youtubedl_bin: Option<PathBuf>,
    pub instaloader_bin: Option<PathBuf>,
}

impl FileConfig {
    /// Range checks that do not depend on other keys; cross-field rules are
    /// left to [`RelayConfig`] validation.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=16).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=16");
        }
        if let Some(delay) = self.part_send_delay_ms
            && delay > 60_000
        {
            bail!("Invalid config value for `part_send_delay_ms`: {delay}. Expected range: 0..=60000");
        }
        if self.max_file_size_mb == Some(0) {
            bail!("Invalid config value for `max_file_size_mb`: 0. Expected a positive size");
        }
        validate_timeout_secs("process_timeout_secs", self.process_timeout_secs)?;
        validate_timeout_secs("direct_fetch_timeout_secs", self.direct_fetch_timeout_secs)?;
        validate_timeout_secs(
            "enhanced_fetch_timeout_secs",
            self.enhanced_fetch_timeout_secs,
        )?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/video-relay/config.toml`
/// 2. `$HOME/.config/video-relay/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("video-relay")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("video-relay")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the file named by `--config`, or the default file when it exists.
///
/// An explicit path that does not exist is an error; a missing default file
/// is not.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<(PathBuf, FileConfig)>> {
    if let Some(path) = explicit {
        return read_file_config(path).map(|cfg| Some((path.to_path_buf(), cfg)));
    }
    let Some(path) = resolve_default_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    let cfg = read_file_config(&path)?;
    Ok(Some((path, cfg)))
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

/// Layers the file config and command line onto the defaults.
pub fn build_relay_config(file: &FileConfig, args: &Args) -> Result<RelayConfig> {
    let mut builder = RelayConfig::builder();

    let max_mb = args.max_file_size_mb.or(file.max_file_size_mb);
    if let Some(mb) = max_mb {
        builder = builder.max_file_size(mb.saturating_mul(MIB));
    }
    if let Some(kb) = args.chunk_size_kb.or(file.split_chunk_kb) {
        builder = builder.split_chunk_size(kb.saturating_mul(KIB));
    }
    if let Some(secs) = file.process_timeout_secs {
        builder = builder.process_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = file.direct_fetch_timeout_secs {
        builder = builder.direct_fetch_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = file.enhanced_fetch_timeout_secs {
        builder = builder.enhanced_fetch_timeout(Duration::from_secs(secs));
    }
    if let Some(height) = file.max_video_height {
        builder = builder.max_video_height(height);
    }
    if let Some(ms) = args.part_delay_ms.or(file.part_send_delay_ms) {
        builder = builder.part_send_delay(Duration::from_millis(ms));
    }
    if let Some(root) = args.temp_root.clone().or_else(|| file.temp_root.clone()) {
        builder = builder.temp_root(root);
    }

    let defaults = ToolPaths::default();
    builder = builder.tools(ToolPaths {
        ytdlp: file.ytdlp_bin.clone().unwrap_or(defaults.ytdlp),
        youtube_dl: file.youtubedl_bin.clone().unwrap_or(defaults.youtube_dl),
        instaloader: file.instaloader_bin.clone().unwrap_or(defaults.instaloader),
    });

    builder.build().context("Invalid relay configuration")
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let line_no = line_index + 1;
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "output_dir" => cfg.output_dir = Some(parse_path(value).with_context(invalid)?),
            "temp_root" => cfg.temp_root = Some(parse_path(value).with_context(invalid)?),
            "ytdlp_bin" => cfg.ytdlp_bin = Some(parse_path(value).with_context(invalid)?),
            "youtubedl_bin" => cfg.youtubedl_bin = Some(parse_path(value).with_context(invalid)?),
            "instaloader_bin" => {
                cfg.instaloader_bin = Some(parse_path(value).with_context(invalid)?);
            }
            "concurrency" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = u8::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
                    .with_context(invalid)?;
                cfg.concurrency = Some(n);
            }
            "max_video_height" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("Integer value out of range for u32"))
                    .with_context(invalid)?;
                cfg.max_video_height = Some(n);
            }
            "max_file_size_mb" => {
                cfg.max_file_size_mb = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "split_chunk_kb" => {
                cfg.split_chunk_kb = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "process_timeout_secs" => {
                cfg.process_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "direct_fetch_timeout_secs" => {
                cfg.direct_fetch_timeout_secs =
                    Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "enhanced_fetch_timeout_secs" => {
                cfg.enhanced_fetch_timeout_secs =
                    Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "part_send_delay_ms" => {
                cfg.part_send_delay_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_path(raw_value: &str) -> Result<PathBuf> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    let inner = &raw_value[1..raw_value.len() - 1];
    if inner.is_empty() {
        bail!("Expected a non-empty path");
    }
    Ok(PathBuf::from(inner))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}
