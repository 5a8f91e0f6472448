//! Stream probing: liveness plus codec/bitrate/resolution/fps/audio
//! metadata, memoized per stream key.
//!
//! The backend itself is a black box behind [`ProbeBackend`]; the prober
//! owns the memoization contract: the backend is consulted at most once per
//! stream key across every run sharing a progress file, and whatever the
//! backend says (including an error) is recorded before the result is
//! returned.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::country;
use crate::errors::ProbeError;
use crate::models::{timestamp_now, FailedStream, StreamRef, StreamResult, WorkingStream};
use crate::progress::ProgressStore;

pub mod ffprobe;

pub use ffprobe::FfprobeBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Alive,
    Dead,
}

/// Video attributes reported by the backend. Anything the backend cannot
/// determine stays `"Unknown"`.
#[derive(Debug, Clone)]
pub struct VideoDetails {
    pub codec: String,
    pub video_bitrate: String,
    pub resolution: String,
    pub fps: String,
}

impl Default for VideoDetails {
    fn default() -> Self {
        Self {
            codec: "Unknown".to_string(),
            video_bitrate: "Unknown".to_string(),
            resolution: "Unknown".to_string(),
            fps: "Unknown".to_string(),
        }
    }
}

/// The external probing backend, exactly the three operations the pipeline
/// consumes. Implementations must be safe to call concurrently.
#[async_trait]
pub trait ProbeBackend: Send + Sync {
    async fn check_channel_status(
        &self,
        url: &str,
        timeout: Duration,
        extended_timeout: Duration,
    ) -> Result<ChannelStatus, ProbeError>;

    async fn get_detailed_stream_info(&self, url: &str) -> Result<VideoDetails, ProbeError>;

    async fn get_audio_bitrate(&self, url: &str) -> Result<String, ProbeError>;
}

pub struct StreamProber {
    backend: Arc<dyn ProbeBackend>,
    store: ProgressStore,
    timeout: Duration,
    extended_timeout: Duration,
}

impl StreamProber {
    pub fn new(
        backend: Arc<dyn ProbeBackend>,
        store: ProgressStore,
        timeout: Duration,
        extended_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            store,
            timeout,
            extended_timeout,
        }
    }

    /// Probe one candidate. A memoized key returns the stored result without
    /// touching the backend; a fresh probe is stored before it is returned.
    pub async fn probe(&self, stream: &StreamRef) -> StreamResult {
        let key = stream.key();
        if let Some(result) = self.store.get_stream(&key).await {
            debug!("Memoized result for {}", key);
            return result;
        }

        let result = self.probe_fresh(stream).await;
        self.store.put_stream(key, result.clone()).await;
        result
    }

    async fn probe_fresh(&self, stream: &StreamRef) -> StreamResult {
        let status = self
            .backend
            .check_channel_status(&stream.url, self.timeout, self.extended_timeout)
            .await;

        match status {
            Ok(ChannelStatus::Alive) => self.describe_working(stream).await,
            Ok(ChannelStatus::Dead) => failed(stream, "Stream not working"),
            // Backend faults count as dead streams and are memoized all the
            // same, so the key is not re-probed within this progress
            // generation.
            Err(e) => {
                debug!("Probe backend error for {}: {}", stream.url, e);
                failed(stream, "Stream not working")
            }
        }
    }

    async fn describe_working(&self, stream: &StreamRef) -> StreamResult {
        let video = self
            .backend
            .get_detailed_stream_info(&stream.url)
            .await
            .unwrap_or_default();
        let audio_info = self
            .backend
            .get_audio_bitrate(&stream.url)
            .await
            .unwrap_or_else(|_| "Unknown".to_string());
        let country = country::resolve(&stream.info);

        StreamResult::Working(WorkingStream {
            extinf: stream.extinf.clone(),
            url: stream.url.clone(),
            info: stream.info.clone(),
            codec: video.codec,
            video_bitrate: video.video_bitrate,
            resolution: video.resolution,
            fps: video.fps,
            audio_info,
            country,
            channel_name: stream.info.channel_name.clone(),
            group_title: stream.info.group_title.clone(),
            checked_at: timestamp_now(),
        })
    }
}

fn failed(stream: &StreamRef, reason: &str) -> StreamResult {
    StreamResult::Failed(FailedStream {
        reason: reason.to_string(),
        channel_name: stream.info.channel_name.clone(),
        url: stream.url.clone(),
        checked_at: timestamp_now(),
    })
}
