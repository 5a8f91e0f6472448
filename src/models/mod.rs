use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Timestamp format shared by both progress files and the output header.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn timestamp_now() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Attributes parsed from a single `#EXTINF` metadata line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    #[serde(default)]
    pub tvg_id: String,
    #[serde(default)]
    pub tvg_name: String,
    #[serde(default)]
    pub tvg_logo: String,
    #[serde(default)]
    pub group_title: String,
    #[serde(default)]
    pub channel_name: String,
}

/// One candidate playlist entry: the verbatim metadata line, the stream URL
/// and the parsed attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRef {
    pub extinf: String,
    pub url: String,
    pub info: ChannelInfo,
}

impl StreamRef {
    /// Memoization identity: channel name joined with the stream URL.
    /// Identical names pointing at different URLs stay distinct keys.
    pub fn key(&self) -> String {
        format!("{}_{}", self.info.channel_name, self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingStream {
    pub extinf: String,
    pub url: String,
    pub info: ChannelInfo,
    pub codec: String,
    pub video_bitrate: String,
    pub resolution: String,
    pub fps: String,
    pub audio_info: String,
    pub country: String,
    pub channel_name: String,
    pub group_title: String,
    pub checked_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStream {
    pub reason: String,
    pub channel_name: String,
    pub url: String,
    pub checked_at: String,
}

/// Outcome of probing one stream, persisted in the stream progress file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StreamResult {
    Working(WorkingStream),
    Failed(FailedStream),
}

impl StreamResult {
    pub fn is_working(&self) -> bool {
        matches!(self, StreamResult::Working(_))
    }

    pub fn as_working(&self) -> Option<&WorkingStream> {
        match self {
            StreamResult::Working(w) => Some(w),
            StreamResult::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistStatus {
    Completed,
    AllFiltered,
    Invalid,
    Error,
    /// Legacy entries upgraded from the v1 progress file, which only stored
    /// a flat URL list.
    Processed,
}

/// Terminal record for one playlist URL. Once persisted, the URL is not
/// fetched again unless reprocessing is requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRecord {
    pub status: PlaylistStatus,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streams_found: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streams_filtered: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streams_checked: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_streams: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl PlaylistRecord {
    pub fn invalid(reason: &str) -> Self {
        Self {
            status: PlaylistStatus::Invalid,
            timestamp: timestamp_now(),
            streams_found: Some(0),
            streams_filtered: None,
            streams_checked: None,
            working_streams: None,
            reason: Some(reason.to_string()),
            error: None,
            url: None,
        }
    }

    pub fn all_filtered(streams_found: usize) -> Self {
        Self {
            status: PlaylistStatus::AllFiltered,
            timestamp: timestamp_now(),
            streams_found: Some(streams_found),
            streams_filtered: Some(streams_found),
            streams_checked: None,
            working_streams: None,
            reason: None,
            error: None,
            url: None,
        }
    }

    pub fn completed(
        url: &str,
        streams_found: usize,
        streams_filtered: usize,
        streams_checked: usize,
        working_streams: usize,
    ) -> Self {
        Self {
            status: PlaylistStatus::Completed,
            timestamp: timestamp_now(),
            streams_found: Some(streams_found),
            streams_filtered: Some(streams_filtered),
            streams_checked: Some(streams_checked),
            working_streams: Some(working_streams),
            reason: None,
            error: None,
            url: Some(url.to_string()),
        }
    }

    pub fn errored(message: &str) -> Self {
        Self {
            status: PlaylistStatus::Error,
            timestamp: timestamp_now(),
            streams_found: None,
            streams_filtered: None,
            streams_checked: None,
            working_streams: None,
            reason: None,
            error: Some(message.to_string()),
            url: None,
        }
    }

    pub fn processed_legacy(timestamp: String) -> Self {
        Self {
            status: PlaylistStatus::Processed,
            timestamp,
            streams_found: None,
            streams_filtered: None,
            streams_checked: None,
            working_streams: None,
            reason: None,
            error: None,
            url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_key_disambiguates_by_url() {
        let mut a = StreamRef {
            extinf: "#EXTINF:-1,CNN".to_string(),
            url: "http://x/cnn".to_string(),
            info: ChannelInfo {
                channel_name: "CNN".to_string(),
                ..Default::default()
            },
        };
        let b = StreamRef {
            url: "http://y/cnn".to_string(),
            ..a.clone()
        };
        assert_eq!(a.key(), "CNN_http://x/cnn");
        assert_ne!(a.key(), b.key());
        a.url = b.url.clone();
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn stream_result_round_trips_with_status_tag() {
        let result = StreamResult::Failed(FailedStream {
            reason: "Stream not working".to_string(),
            channel_name: "CNN".to_string(),
            url: "http://x/cnn".to_string(),
            checked_at: "2025-01-01 00:00:00".to_string(),
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        let back: StreamResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn playlist_record_omits_absent_counts() {
        let record = PlaylistRecord::invalid("empty_or_timeout");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "invalid");
        assert_eq!(json["streams_found"], 0);
        assert!(json.get("streams_checked").is_none());
        assert!(json.get("error").is_none());
    }
}
