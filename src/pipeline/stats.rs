//! Shared run counters with a broadcast feed for external renderers.
//!
//! The pipeline updates counters at its transition points; anything that
//! wants to draw progress subscribes and receives a full snapshot per
//! update. Lagging subscribers lose intermediate snapshots, never counters.

use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    // Playlist counters
    pub total_playlists: usize,
    pub processed_playlists: usize,
    pub valid_playlists: usize,
    pub invalid_playlists: usize,
    // Stream counters
    pub total_streams: usize,
    pub checked: usize,
    pub working: usize,
    pub failed: usize,
    pub filtered: usize,
    // Labels for display
    pub current_playlist: String,
    pub current_stream: String,
}

pub type StatsSender = broadcast::Sender<PipelineStats>;
pub type StatsReceiver = broadcast::Receiver<PipelineStats>;

#[derive(Clone)]
pub struct StatsTracker {
    stats: Arc<RwLock<PipelineStats>>,
    tx: StatsSender,
}

impl StatsTracker {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self {
            stats: Arc::new(RwLock::new(PipelineStats::default())),
            tx,
        }
    }

    pub fn subscribe(&self) -> StatsReceiver {
        self.tx.subscribe()
    }

    /// Apply one mutation under the lock and broadcast the new snapshot.
    pub async fn update<F>(&self, apply: F)
    where
        F: FnOnce(&mut PipelineStats),
    {
        let snapshot = {
            let mut stats = self.stats.write().await;
            apply(&mut stats);
            stats.clone()
        };
        let _ = self.tx.send(snapshot);
    }

    pub async fn snapshot(&self) -> PipelineStats {
        self.stats.read().await.clone()
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}
