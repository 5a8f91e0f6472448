use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

use iptv_harvest::{
    config::{Config, FilterConfig, PathsConfig, ReprocessConfig, TimingConfig, WorkerConfig},
    pipeline::Pipeline,
    probe::FfprobeBackend,
    progress::ProgressStore,
    sources::SqlDumpScanner,
};

#[derive(Parser)]
#[command(name = "iptv-harvest")]
#[command(version)]
#[command(about = "Extract and validate IPTV streams from playlists found in a SQL dump")]
#[command(long_about = None)]
struct Cli {
    /// Input SQL database file
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output M3U8 file
    #[arg(short, long, default_value = "IPTV.m3u8", value_name = "FILE")]
    output: PathBuf,

    /// Log file path
    #[arg(long, default_value = "LOG.log", value_name = "FILE")]
    log: PathBuf,

    /// Re-download and re-check all playlists (ignores playlist progress)
    #[arg(long)]
    reprocess_playlists: bool,

    /// Re-check all streams (ignores stream progress)
    #[arg(long)]
    reprocess_streams: bool,

    /// Clear all progress files and start fresh
    #[arg(long)]
    clear_progress: bool,

    /// Worker pool sizes: playlist_workers stream_workers
    #[arg(
        short,
        long,
        num_args = 2,
        value_names = ["PLAYLIST", "STREAM"],
        default_values_t = [10, 30]
    )]
    workers: Vec<usize>,

    /// Stream check timeout in seconds
    #[arg(long, default_value_t = 10, value_name = "SECONDS")]
    timeout: u64,

    /// Auto-save interval in seconds during stream checking
    #[arg(long, default_value_t = 30, value_name = "SECONDS")]
    save_interval: u64,

    /// Disable all content filters (include movies, series, VOD, etc.)
    #[arg(long)]
    no_filters: bool,

    /// Include radio streams (excluded by default)
    #[arg(long)]
    include_radio: bool,

    /// Include adult content (excluded by default)
    #[arg(long)]
    include_adult: bool,

    /// Minimal output (only warnings and the final summary)
    #[arg(long)]
    quiet: bool,

    /// Disable colored output
    #[arg(long)]
    no_colors: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        let defaults = Config::default();
        Config {
            paths: PathsConfig {
                input: self.input.unwrap_or_else(default_input),
                output: self.output,
                log: self.log,
                ..defaults.paths
            },
            workers: WorkerConfig {
                playlist: self.workers.first().copied().unwrap_or(10),
                stream: self.workers.get(1).copied().unwrap_or(30),
            },
            timing: TimingConfig {
                stream_timeout: Duration::from_secs(self.timeout),
                save_interval: Duration::from_secs(self.save_interval),
                ..defaults.timing
            },
            filters: FilterConfig {
                enabled: !self.no_filters,
                include_radio: self.include_radio,
                include_adult: self.include_adult,
            },
            reprocess: ReprocessConfig {
                playlists: self.reprocess_playlists,
                streams: self.reprocess_streams,
            },
        }
    }
}

/// The dump conventionally sits one directory up when running from a
/// checkout; fall back to the working directory.
fn default_input() -> PathBuf {
    let parent = PathBuf::from("../middleware.sql");
    if parent.exists() {
        parent
    } else {
        PathBuf::from("middleware.sql")
    }
}

fn init_logging(log_path: &std::path::Path, quiet: bool, no_colors: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let console_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_level.to_string().into());
    let console_layer = tracing_subscriber::fmt::layer()
        .with_ansi(!no_colors)
        .with_target(false)
        .with_filter(console_filter);

    // The log file gets everything regardless of --quiet, without colors.
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
    {
        Ok(file) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Arc::new(file))
                .with_filter(LevelFilter::INFO);
            tracing_subscriber::registry()
                .with(console_layer)
                .with(file_layer)
                .init();
        }
        Err(e) => {
            tracing_subscriber::registry().with(console_layer).init();
            warn!("Could not open log file {}: {}", log_path.display(), e);
        }
    }
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let quiet = cli.quiet;
    let no_colors = cli.no_colors;
    let clear_progress = cli.clear_progress;
    let config = cli.into_config();

    init_logging(&config.paths.log, quiet, no_colors);
    info!("Starting iptv-harvest v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Input: {}  Output: {}  Workers: {} playlist / {} stream  Timeout: {}s",
        config.paths.input.display(),
        config.paths.output.display(),
        config.workers.playlist,
        config.workers.stream,
        config.timing.stream_timeout.as_secs()
    );

    if clear_progress {
        for path in [&config.paths.stream_progress, &config.paths.playlist_progress] {
            if path.exists() {
                std::fs::remove_file(path)
                    .with_context(|| format!("could not clear {}", path.display()))?;
                info!("Cleared {}", path.display());
            }
        }
    }

    if !config.paths.input.exists() {
        bail!("SQL database file not found: {}", config.paths.input.display());
    }

    // One pooled client shared by playlist fetches and probe liveness
    // checks; saturation opens a fresh connection rather than blocking.
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(100)
        .build()
        .context("could not build HTTP client")?;

    let backend = FfprobeBackend::detect(client.clone(), config.timing.extended_timeout())
        .await
        .context("probe backend unavailable (is ffprobe installed?)")?;

    let scanner = SqlDumpScanner::new().context("invalid URL pattern")?;
    let extraction = scanner
        .scan(&config.paths.input)
        .with_context(|| format!("could not read {}", config.paths.input.display()))?;
    if extraction.urls.is_empty() {
        bail!("No M3U URLs found in {}", config.paths.input.display());
    }
    info!("Found {} unique M3U URLs", extraction.urls.len());

    let store = ProgressStore::load(
        &config.paths.stream_progress,
        &config.paths.playlist_progress,
        &config.reprocess,
    );

    let mut remaining = 0usize;
    for url in &extraction.urls {
        if config.reprocess.playlists || !store.has_playlist(url).await {
            remaining += 1;
        }
    }
    if remaining == 0 {
        info!("All playlists already processed; use --reprocess-playlists to re-check them");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let pipeline = Pipeline::new(
        &config,
        client,
        Arc::new(backend),
        store.clone(),
        cancel.clone(),
    )?;

    let seeded = store.rebuild_working_streams().await;
    if !seeded.is_empty() {
        info!("Rebuilt {} working streams from previous progress", seeded.len());
        pipeline.seed_working_streams(seeded).await;
    }

    // Signal-triggered checkpoint: flush synchronously, then exit at once.
    // In-flight probes are abandoned; whatever they did not memoize is
    // simply probed again next run.
    {
        let cancel = cancel.clone();
        let checkpointer = pipeline.checkpointer().clone();
        tokio::spawn(async move {
            termination_signal().await;
            warn!("Interrupted - saving progress");
            cancel.cancel();
            checkpointer.flush().await;
            info!("Progress saved; exiting");
            std::process::exit(0);
        });
    }

    let ticker = pipeline
        .checkpointer()
        .spawn_ticker(config.timing.save_interval, cancel.clone());

    let summary = pipeline.run(&extraction.urls).await;

    cancel.cancel();
    let _ = ticker.await;

    info!("All playlists processed and streams checked");
    info!(
        "Playlists: {} processed, {} valid, {} invalid",
        summary.processed_playlists, summary.valid_playlists, summary.invalid_playlists
    );
    info!(
        "Streams: {} found, {} checked, {} working, {} failed, {} filtered",
        summary.total_streams, summary.checked, summary.working, summary.failed, summary.filtered
    );

    if pipeline.working_stream_count().await == 0 {
        bail!("No working streams found");
    }
    let counts = pipeline
        .checkpointer()
        .finalize()
        .await
        .context("could not write output playlist")?;

    let total: usize = counts.values().sum();
    info!(
        "Output written to {} ({} streams across {} countries)",
        config.paths.output.display(),
        total,
        counts.len()
    );
    for (country, count) in &counts {
        info!("  {}: {} streams", country, count);
    }

    Ok(())
}
