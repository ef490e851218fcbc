//! CLI entry point for the video relay.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use video_relay::{DirectoryTransport, Relay, RelayConfig, RunReport, ToolProbe, probe_tool};

mod app_config;
mod cli;

use cli::{Args, DEFAULT_CONCURRENCY, DEFAULT_OUTPUT_DIR};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr so --json output on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = app_config::load_file_config(args.config.as_deref())?;
    let file_config = match loaded {
        Some((path, cfg)) => {
            info!(path = %path.display(), "loaded config file");
            cfg
        }
        None => app_config::FileConfig::default(),
    };
    let config = Arc::new(app_config::build_relay_config(&file_config, &args)?);

    let probes = probe_tools(&config).await;
    if args.check_tools {
        for probe in &probes {
            match (&probe.version, &probe.error) {
                (Some(version), _) => println!("{}: {version}", probe.program.display()),
                (None, Some(error)) => println!("{}: unavailable ({error})", probe.program.display()),
                (None, None) => println!("{}: unavailable", probe.program.display()),
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    // Read input: from positional args or stdin
    let inputs: Vec<String> = if !args.urls.is_empty() {
        args.urls.clone()
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        buffer
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        info!("No input provided. Pipe URLs via stdin or pass as arguments.");
        info!("Example: echo 'https://example.com/clip.mp4' | video-relay");
        return Ok(ExitCode::SUCCESS);
    };

    if inputs.is_empty() {
        info!("No input provided");
        return Ok(ExitCode::SUCCESS);
    }

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| file_config.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("Failed to create output directory '{}'", output_dir.display()))?;

    let concurrency = args
        .concurrency
        .or(file_config.concurrency)
        .unwrap_or(DEFAULT_CONCURRENCY);

    let spinner = (io::stderr().is_terminal() && !args.quiet && !args.json).then(new_spinner);
    let mut transport = DirectoryTransport::new(&output_dir);
    if let Some(bar) = &spinner {
        transport = transport.with_progress(bar.clone());
    }

    let relay = Relay::new(Arc::clone(&config));
    info!(
        requests = inputs.len(),
        concurrency,
        output_dir = %output_dir.display(),
        "relay starting"
    );

    let relay = &relay;
    let transport = &transport;
    let requested_by = args.requested_by.as_str();
    let reports: Vec<RunReport> = stream::iter(inputs)
        .map(|text| async move { relay.handle_message(&text, requested_by, transport).await })
        .buffer_unordered(usize::from(concurrency))
        .collect()
        .await;

    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    let mut failed = 0usize;
    for report in &reports {
        if args.json {
            println!("{}", serde_json::to_string(report)?);
        }
        if report.is_success() {
            info!(
                url = %report.url,
                file = report.file_name.as_deref().unwrap_or(""),
                parts = report.parts_sent,
                "relayed"
            );
        } else {
            failed += 1;
            let category = report.failure.map_or("Other", |c| c.label());
            warn!(url = %report.url, category, "not relayed");
        }
    }

    info!(
        completed = reports.len() - failed,
        failed,
        total = reports.len(),
        "Relay complete"
    );

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn probe_tools(config: &RelayConfig) -> Vec<ToolProbe> {
    let tools = config.tools();
    let probes = futures_util::future::join_all([
        probe_tool(&tools.ytdlp),
        probe_tool(&tools.youtube_dl),
        probe_tool(&tools.instaloader),
    ])
    .await;

    let available: Vec<String> = probes
        .iter()
        .filter(|p| p.is_available())
        .map(|p| p.program.display().to_string())
        .collect();
    if available.is_empty() {
        warn!("no external downloaders available; only direct downloads will work");
    } else {
        info!(tools = %available.join(", "), "available downloaders");
    }
    probes
}

fn new_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
