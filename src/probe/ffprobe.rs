//! FFprobe-backed probing
//!
//! Liveness is a two-step check: a cheap HTTP round-trip inside the short
//! timeout weeds out dead endpoints, then `ffprobe` gets the extended
//! deadline to confirm the endpoint actually serves decodable media.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ChannelStatus, ProbeBackend, VideoDetails};
use crate::errors::ProbeError;

/// Same player identity the playlist fetcher presents.
const USER_AGENT: &str = "VLC/3.0.14 LibVLC/3.0.14";

/// Information about one stream reported by ffprobe
#[derive(Debug, Clone)]
struct StreamInfo {
    codec_name: String,
    bit_rate: Option<u64>,
    width: Option<u64>,
    height: Option<u64>,
    r_frame_rate: Option<String>,
}

/// Complete probe result for an input URL
#[derive(Debug, Clone, Default)]
struct ProbeResult {
    video_streams: Vec<StreamInfo>,
    audio_streams: Vec<StreamInfo>,
    format_bit_rate: Option<u64>,
}

impl ProbeResult {
    fn has_media(&self) -> bool {
        !self.video_streams.is_empty() || !self.audio_streams.is_empty()
    }
}

pub struct FfprobeBackend {
    ffprobe_command: String,
    client: reqwest::Client,
    metadata_timeout: Duration,
}

impl FfprobeBackend {
    /// Verify the ffprobe binary is runnable. Its absence is a startup
    /// precondition failure, not a per-stream error.
    pub async fn detect(
        client: reqwest::Client,
        metadata_timeout: Duration,
    ) -> Result<Self, ProbeError> {
        let backend = Self {
            ffprobe_command: "ffprobe".to_string(),
            client,
            metadata_timeout,
        };

        let output = Command::new(&backend.ffprobe_command)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| ProbeError::unavailable(format!("ffprobe not found: {e}")))?;
        if !output.success() {
            return Err(ProbeError::unavailable("ffprobe -version failed"));
        }

        Ok(backend)
    }

    /// Probe an input URL to determine stream characteristics
    async fn probe_input(&self, url: &str, deadline: Duration) -> Result<ProbeResult, ProbeError> {
        debug!("Probing input stream: {}", url);

        let mut cmd = Command::new(&self.ffprobe_command);
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
            "-analyzeduration",
            "5000000",
            "-probesize",
            "5000000",
            "-user_agent",
            USER_AGENT,
            url,
        ]);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(deadline, cmd.output())
            .await
            .map_err(|_| ProbeError::Timeout {
                seconds: deadline.as_secs(),
                url: url.to_string(),
            })?
            .map_err(|e| ProbeError::unavailable(format!("failed to execute ffprobe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("ffprobe failed for {}: {}", url, stderr.trim());
            return Err(ProbeError::output(format!("ffprobe failed: {}", stderr.trim())));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let data: serde_json::Value = serde_json::from_str(&stdout)
            .map_err(|e| ProbeError::output(format!("unparseable ffprobe output: {e}")))?;

        Ok(parse_probe_result(&data))
    }
}

#[async_trait]
impl ProbeBackend for FfprobeBackend {
    async fn check_channel_status(
        &self,
        url: &str,
        timeout: Duration,
        extended_timeout: Duration,
    ) -> Result<ChannelStatus, ProbeError> {
        // Quick endpoint check first; most dead streams never answer and
        // this avoids paying the ffprobe startup for them.
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(timeout)
            .send()
            .await;
        match response {
            Ok(r) if r.status().is_success() || r.status().is_redirection() => {}
            Ok(r) => {
                debug!("Endpoint {} answered {}", url, r.status());
                return Ok(ChannelStatus::Dead);
            }
            Err(e) => {
                debug!("Endpoint {} unreachable: {}", url, e);
                return Ok(ChannelStatus::Dead);
            }
        }

        match self.probe_input(url, extended_timeout).await {
            Ok(result) if result.has_media() => Ok(ChannelStatus::Alive),
            Ok(_) => Ok(ChannelStatus::Dead),
            Err(e @ ProbeError::Unavailable { .. }) => Err(e),
            Err(_) => Ok(ChannelStatus::Dead),
        }
    }

    async fn get_detailed_stream_info(&self, url: &str) -> Result<VideoDetails, ProbeError> {
        let result = self.probe_input(url, self.metadata_timeout).await?;
        let mut details = VideoDetails::default();

        if let Some(video) = result.video_streams.first() {
            if !video.codec_name.is_empty() {
                details.codec = video.codec_name.clone();
            }
            if let Some(bps) = video.bit_rate.or(result.format_bit_rate) {
                details.video_bitrate = format_bitrate(bps);
            }
            if let (Some(width), Some(height)) = (video.width, video.height) {
                details.resolution = format!("{width}x{height}");
            }
            if let Some(rate) = video.r_frame_rate.as_deref().and_then(format_frame_rate) {
                details.fps = rate;
            }
        } else {
            warn!("No video stream reported for {}", url);
        }

        Ok(details)
    }

    async fn get_audio_bitrate(&self, url: &str) -> Result<String, ProbeError> {
        let result = self.probe_input(url, self.metadata_timeout).await?;
        Ok(match result.audio_streams.first() {
            Some(audio) => match audio.bit_rate {
                Some(bps) => format!("{} {}", audio.codec_name, format_bitrate(bps)),
                None => audio.codec_name.clone(),
            },
            None => "No audio".to_string(),
        })
    }
}

/// Parse ffprobe JSON output, splitting streams by codec type.
fn parse_probe_result(data: &serde_json::Value) -> ProbeResult {
    let mut result = ProbeResult::default();

    if let Some(streams) = data["streams"].as_array() {
        for stream in streams {
            let info = StreamInfo {
                codec_name: stream["codec_name"].as_str().unwrap_or("unknown").to_string(),
                bit_rate: stream["bit_rate"].as_str().and_then(|s| s.parse().ok()),
                width: stream["width"].as_u64(),
                height: stream["height"].as_u64(),
                r_frame_rate: stream["r_frame_rate"].as_str().map(|s| s.to_string()),
            };
            match stream["codec_type"].as_str() {
                Some("video") => result.video_streams.push(info),
                Some("audio") => result.audio_streams.push(info),
                _ => {}
            }
        }
    }

    result.format_bit_rate = data["format"]["bit_rate"]
        .as_str()
        .and_then(|s| s.parse().ok());

    result
}

/// bits/s to the "5000 kb/s" form the playlist carries.
fn format_bitrate(bps: u64) -> String {
    format!("{} kb/s", bps / 1000)
}

/// ffprobe reports frame rate as a ratio such as "30000/1001".
fn format_frame_rate(ratio: &str) -> Option<String> {
    let (num, den) = match ratio.split_once('/') {
        Some((num, den)) => (num.parse::<f64>().ok()?, den.parse::<f64>().ok()?),
        None => (ratio.parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    let fps = num / den;
    if (fps - fps.round()).abs() < 0.01 {
        Some(format!("{}", fps.round() as u64))
    } else {
        Some(format!("{fps:.2}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ffprobe_json() {
        let data: serde_json::Value = serde_json::from_str(
            r#"{
                "streams": [
                    {"codec_type": "video", "codec_name": "h264", "width": 1920,
                     "height": 1080, "bit_rate": "5000000", "r_frame_rate": "25/1"},
                    {"codec_type": "audio", "codec_name": "aac", "bit_rate": "128000"}
                ],
                "format": {"bit_rate": "5200000"}
            }"#,
        )
        .unwrap();
        let result = parse_probe_result(&data);
        assert!(result.has_media());
        assert_eq!(result.video_streams.len(), 1);
        assert_eq!(result.audio_streams.len(), 1);
        assert_eq!(result.video_streams[0].bit_rate, Some(5_000_000));
        assert_eq!(result.format_bit_rate, Some(5_200_000));
    }

    #[test]
    fn empty_output_reports_no_media() {
        let data: serde_json::Value = serde_json::from_str("{}").unwrap();
        assert!(!parse_probe_result(&data).has_media());
    }

    #[test]
    fn bitrate_formats_as_kbps() {
        assert_eq!(format_bitrate(5_000_000), "5000 kb/s");
        assert_eq!(format_bitrate(999), "0 kb/s");
    }

    #[test]
    fn frame_rates_render_plain_or_fractional() {
        assert_eq!(format_frame_rate("25/1"), Some("25".to_string()));
        assert_eq!(format_frame_rate("30000/1001"), Some("29.97".to_string()));
        assert_eq!(format_frame_rate("50"), Some("50".to_string()));
        assert_eq!(format_frame_rate("0/0"), None);
        assert_eq!(format_frame_rate("garbage"), None);
    }
}
