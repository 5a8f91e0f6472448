use std::path::PathBuf;
use std::time::Duration;

/// Resolved run settings. Assembled from CLI arguments in `main`; every
/// component receives the slice of this it needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    pub workers: WorkerConfig,
    pub timing: TimingConfig,
    pub filters: FilterConfig,
    pub reprocess: ReprocessConfig,
}

#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub log: PathBuf,
    pub stream_progress: PathBuf,
    pub playlist_progress: PathBuf,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub playlist: usize,
    pub stream: usize,
}

impl WorkerConfig {
    /// Fetches are submitted in chunks of twice the fetcher pool size, so a
    /// slow straggler never starves the pool.
    pub fn chunk_size(&self) -> usize {
        self.playlist.max(1) * 2
    }
}

#[derive(Debug, Clone)]
pub struct TimingConfig {
    pub stream_timeout: Duration,
    pub playlist_timeout: Duration,
    pub save_interval: Duration,
}

impl TimingConfig {
    /// Deadline handed to the probe backend for deeper inspection once the
    /// endpoint has answered.
    pub fn extended_timeout(&self) -> Duration {
        self.stream_timeout + Duration::from_secs(5)
    }
}

#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub enabled: bool,
    pub include_radio: bool,
    pub include_adult: bool,
}

#[derive(Debug, Clone)]
pub struct ReprocessConfig {
    pub playlists: bool,
    pub streams: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig {
                input: PathBuf::from("middleware.sql"),
                output: PathBuf::from("IPTV.m3u8"),
                log: PathBuf::from("LOG.log"),
                stream_progress: PathBuf::from("stream_check_progress.json"),
                playlist_progress: PathBuf::from("playlist_progress.json"),
            },
            workers: WorkerConfig {
                playlist: 10,
                stream: 30,
            },
            timing: TimingConfig {
                stream_timeout: Duration::from_secs(10),
                playlist_timeout: Duration::from_secs(10),
                save_interval: Duration::from_secs(30),
            },
            filters: FilterConfig {
                enabled: true,
                include_radio: false,
                include_adult: false,
            },
            reprocess: ReprocessConfig {
                playlists: false,
                streams: false,
            },
        }
    }
}
