//! Durable memoization state: probe results per stream key and terminal
//! records per playlist URL.
//!
//! The store is the single source of truth for "have we seen this before".
//! All access goes through the store locks; the checkpointer serializes a
//! point-in-time snapshot rather than holding writers out for the duration
//! of a file write.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::country;
use crate::models::{PlaylistRecord, StreamResult};

pub type StreamMap = HashMap<String, StreamResult>;
pub type PlaylistMap = HashMap<String, PlaylistRecord>;

/// On-disk envelope of the playlist progress file (current shape).
#[derive(Debug, Serialize, Deserialize)]
pub struct PlaylistProgressEnvelope {
    pub version: String,
    pub last_updated: String,
    pub total_processed: usize,
    pub playlists: PlaylistMap,
}

impl PlaylistProgressEnvelope {
    pub fn new(playlists: PlaylistMap) -> Self {
        Self {
            version: "2.0".to_string(),
            last_updated: crate::models::timestamp_now(),
            total_processed: playlists.len(),
            playlists,
        }
    }
}

/// Both accepted shapes of the playlist progress file. The legacy form only
/// recorded a flat URL list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlaylistProgressFile {
    Current {
        playlists: PlaylistMap,
    },
    Legacy {
        processed_playlists: Vec<String>,
        #[serde(default)]
        last_updated: String,
    },
}

#[derive(Clone, Default)]
pub struct ProgressStore {
    streams: Arc<RwLock<StreamMap>>,
    playlists: Arc<RwLock<PlaylistMap>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load both progress files. A missing or unreadable file is never
    /// fatal; the affected map simply starts empty. Reprocess flags skip a
    /// file entirely, so its keys are seen again this run.
    pub fn load(
        stream_path: &Path,
        playlist_path: &Path,
        reprocess: &crate::config::ReprocessConfig,
    ) -> Self {
        if reprocess.streams {
            info!("Reprocessing streams: ignoring {}", stream_path.display());
        }
        if reprocess.playlists {
            info!(
                "Reprocessing playlists: ignoring {}",
                playlist_path.display()
            );
        }

        let streams = match (!reprocess.streams)
            .then(|| load_stream_file(stream_path))
            .unwrap_or_else(|| Ok(StreamMap::new()))
        {
            Ok(map) => {
                info!("Loaded {} previously checked streams", map.len());
                map
            }
            Err(e) => {
                warn!(
                    "Could not load stream progress from {}: {}",
                    stream_path.display(),
                    e
                );
                StreamMap::new()
            }
        };

        let playlists = match (!reprocess.playlists)
            .then(|| load_playlist_file(playlist_path))
            .unwrap_or_else(|| Ok(PlaylistMap::new()))
        {
            Ok(map) => {
                info!("Loaded {} previously processed playlists", map.len());
                map
            }
            Err(e) => {
                warn!(
                    "Could not load playlist progress from {}: {}",
                    playlist_path.display(),
                    e
                );
                PlaylistMap::new()
            }
        };

        Self {
            streams: Arc::new(RwLock::new(streams)),
            playlists: Arc::new(RwLock::new(playlists)),
        }
    }

    pub async fn has_stream(&self, key: &str) -> bool {
        self.streams.read().await.contains_key(key)
    }

    pub async fn get_stream(&self, key: &str) -> Option<StreamResult> {
        self.streams.read().await.get(key).cloned()
    }

    pub async fn put_stream(&self, key: String, result: StreamResult) {
        self.streams.write().await.insert(key, result);
    }

    pub async fn has_playlist(&self, url: &str) -> bool {
        self.playlists.read().await.contains_key(url)
    }

    pub async fn put_playlist(&self, url: String, record: PlaylistRecord) {
        self.playlists.write().await.insert(url, record);
    }

    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    pub async fn playlist_count(&self) -> usize {
        self.playlists.read().await.len()
    }

    /// Point-in-time copy of both maps for serialization. Readers drop the
    /// locks as soon as the clones are taken.
    pub async fn snapshot(&self) -> (StreamMap, PlaylistMap) {
        let streams = self.streams.read().await.clone();
        let playlists = self.playlists.read().await.clone();
        (streams, playlists)
    }

    /// Rebuild the working-stream accumulator from memoized results, fixing
    /// up country codes that a tvg-id can now resolve better than a past
    /// run's keyword scan did.
    pub async fn rebuild_working_streams(&self) -> Vec<crate::models::WorkingStream> {
        let mut updated = 0usize;
        let mut working = Vec::new();

        let mut streams = self.streams.write().await;
        for result in streams.values_mut() {
            if let StreamResult::Working(stream) = result {
                if let Some(code) = country::from_tvg_id(&stream.info.tvg_id) {
                    if stream.country != code {
                        stream.country = code.to_string();
                        updated += 1;
                    }
                }
                working.push(stream.clone());
            }
        }
        drop(streams);

        if updated > 0 {
            info!("Updated country codes for {} memoized streams", updated);
        }
        working
    }
}

fn load_stream_file(path: &Path) -> Result<StreamMap, crate::errors::HarvestError> {
    if !path.exists() {
        return Ok(StreamMap::new());
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn load_playlist_file(path: &Path) -> Result<PlaylistMap, crate::errors::HarvestError> {
    if !path.exists() {
        return Ok(PlaylistMap::new());
    }
    let contents = std::fs::read_to_string(path)?;
    let file: PlaylistProgressFile = serde_json::from_str(&contents)?;
    Ok(match file {
        PlaylistProgressFile::Current { playlists } => playlists,
        PlaylistProgressFile::Legacy {
            processed_playlists,
            last_updated,
        } => processed_playlists
            .into_iter()
            .map(|url| {
                (
                    url,
                    PlaylistRecord::processed_legacy(last_updated.clone()),
                )
            })
            .collect(),
    })
}
