//! Durable checkpointing.
//!
//! Three triggers share one code path: after every playlist's probe wave,
//! on a timer while long waves drain, and once more when a termination
//! signal arrives. Every file goes through the same tmp-then-rename
//! protocol, so a reader observes either the old file or the new one,
//! never a torn write. A single mutex serializes checkpoints; a save that
//! fails is only logged, the next trigger retries it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PathsConfig;
use crate::errors::HarvestError;
use crate::models::WorkingStream;
use crate::organizer::StreamOrganizer;
use crate::output;
use crate::progress::{PlaylistProgressEnvelope, ProgressStore};

/// Accumulator of working streams, appended by probe tasks and drained into
/// the output playlist at each checkpoint.
pub type WorkingAccumulator = Arc<Mutex<Vec<WorkingStream>>>;

#[derive(Clone)]
pub struct Checkpointer {
    store: ProgressStore,
    working: WorkingAccumulator,
    organizer: StreamOrganizer,
    paths: PathsConfig,
    guard: Arc<Mutex<()>>,
}

impl Checkpointer {
    pub fn new(
        store: ProgressStore,
        working: WorkingAccumulator,
        organizer: StreamOrganizer,
        paths: PathsConfig,
    ) -> Self {
        Self {
            store,
            working,
            organizer,
            paths,
            guard: Arc::new(Mutex::new(())),
        }
    }

    /// Persist the full progress state and re-materialize the output
    /// playlist. Failures are logged and retried on the next trigger; a
    /// checkpoint never aborts the run.
    pub async fn flush(&self) {
        let _guard = self.guard.lock().await;
        let (streams, playlists) = self.store.snapshot().await;

        match serde_json::to_vec_pretty(&streams) {
            Ok(bytes) => {
                if let Err(e) = write_atomic(&self.paths.stream_progress, &bytes).await {
                    warn!("Could not save stream progress: {}", e);
                }
            }
            Err(e) => warn!("Could not serialize stream progress: {}", e),
        }

        match serde_json::to_vec_pretty(&PlaylistProgressEnvelope::new(playlists)) {
            Ok(bytes) => {
                if let Err(e) = write_atomic(&self.paths.playlist_progress, &bytes).await {
                    warn!("Could not save playlist progress: {}", e);
                }
            }
            Err(e) => warn!("Could not serialize playlist progress: {}", e),
        }

        let working = self.working.lock().await.clone();
        if !working.is_empty() {
            let organized = self.organizer.organize(&working);
            let content = output::render(&organized);
            if let Err(e) = write_atomic(&self.paths.output, content.as_bytes()).await {
                warn!("Could not write incremental output: {}", e);
            } else {
                debug!(
                    "Checkpoint: {} working streams materialized to {}",
                    working.len(),
                    self.paths.output.display()
                );
            }
        }
    }

    /// Final write at end of run. Unlike the incremental path, an output
    /// failure here surfaces to the caller. Returns per-country stream
    /// counts for the closing summary.
    pub async fn finalize(&self) -> Result<BTreeMap<String, usize>, HarvestError> {
        self.flush().await;

        let _guard = self.guard.lock().await;
        let working = self.working.lock().await.clone();
        let organized = self.organizer.organize(&working);
        let content = output::render(&organized);
        write_atomic(&self.paths.output, content.as_bytes()).await?;

        Ok(organized
            .iter()
            .map(|(country, streams)| (country.clone(), streams.len()))
            .collect())
    }

    /// Periodic trigger: keeps very large probe waves from holding hours of
    /// work in memory only. Stops when the token is cancelled.
    pub fn spawn_ticker(
        &self,
        every: Duration,
        token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let checkpointer = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; nothing to save yet.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => checkpointer.flush().await,
                }
            }
        })
    }
}

/// Write to `<path>.tmp`, then atomically rename over `<path>`. The temp
/// file is removed when either step fails.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), HarvestError> {
    let tmp = tmp_path(path);
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(HarvestError::persistence(tmp, e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(HarvestError::persistence(path, e));
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.tmp", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelInfo, PlaylistRecord, StreamResult};

    fn paths_in(dir: &Path) -> PathsConfig {
        PathsConfig {
            input: dir.join("in.sql"),
            output: dir.join("IPTV.m3u8"),
            log: dir.join("LOG.log"),
            stream_progress: dir.join("streams.json"),
            playlist_progress: dir.join("playlists.json"),
        }
    }

    fn working_stream(name: &str) -> WorkingStream {
        WorkingStream {
            extinf: format!("#EXTINF:-1,{name}"),
            url: format!("http://host/{name}"),
            info: ChannelInfo {
                channel_name: name.to_string(),
                ..Default::default()
            },
            codec: "h264".to_string(),
            video_bitrate: "3000 kb/s".to_string(),
            resolution: "1280x720".to_string(),
            fps: "25".to_string(),
            audio_info: "aac 128 kb/s".to_string(),
            country: "US".to_string(),
            channel_name: name.to_string(),
            group_title: String::new(),
            checked_at: "2025-01-01 00:00:00".to_string(),
        }
    }

    #[tokio::test]
    async fn write_atomic_replaces_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("file.json");

        write_atomic(&target, b"first").await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"first");
        write_atomic(&target, b"second").await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        assert!(!tmp_path(&target).exists());
    }

    #[tokio::test]
    async fn flush_persists_progress_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new();
        store
            .put_playlist(
                "http://host/a.m3u8".to_string(),
                PlaylistRecord::completed("http://host/a.m3u8", 1, 0, 1, 1),
            )
            .await;
        let ws = working_stream("ESPN");
        store
            .put_stream(ws.channel_name.clone() + "_" + &ws.url, StreamResult::Working(ws.clone()))
            .await;

        let working: WorkingAccumulator = Arc::new(Mutex::new(vec![ws]));
        let checkpointer = Checkpointer::new(
            store,
            working,
            StreamOrganizer::new().unwrap(),
            paths_in(dir.path()),
        );
        checkpointer.flush().await;

        let streams_json = std::fs::read_to_string(dir.path().join("streams.json")).unwrap();
        assert!(streams_json.contains("\"status\": \"working\""));
        let playlists_json = std::fs::read_to_string(dir.path().join("playlists.json")).unwrap();
        assert!(playlists_json.contains("\"version\": \"2.0\""));
        let output = std::fs::read_to_string(dir.path().join("IPTV.m3u8")).unwrap();
        assert!(output.starts_with("#EXTM3U"));
        assert!(output.contains("ESPN"));
    }

    #[tokio::test]
    async fn flush_without_working_streams_skips_output() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(
            ProgressStore::new(),
            Arc::new(Mutex::new(Vec::new())),
            StreamOrganizer::new().unwrap(),
            paths_in(dir.path()),
        );
        checkpointer.flush().await;
        assert!(dir.path().join("streams.json").exists());
        assert!(!dir.path().join("IPTV.m3u8").exists());
    }

    #[tokio::test]
    async fn finalize_reports_per_country_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut brazil = working_stream("Globo");
        brazil.country = "BR".to_string();
        let working: WorkingAccumulator =
            Arc::new(Mutex::new(vec![working_stream("ESPN"), brazil]));
        let checkpointer = Checkpointer::new(
            ProgressStore::new(),
            working,
            StreamOrganizer::new().unwrap(),
            paths_in(dir.path()),
        );
        let counts = checkpointer.finalize().await.unwrap();
        assert_eq!(counts["US"], 1);
        assert_eq!(counts["BR"], 1);
    }
}
