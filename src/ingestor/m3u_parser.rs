//! Playlist download and extended-M3U parsing.
//!
//! Fetching is deliberately forgiving: a playlist that times out, answers
//! non-200 or serves garbage yields an empty stream list, never an error.
//! Timeouts are the common case at this corpus size and retries would only
//! amplify tail latency, so there are none.

use std::time::{Duration, Instant};

use futures::StreamExt;
use tracing::debug;

use crate::models::{ChannelInfo, StreamRef};

/// Fixed media-player user agent; several providers reject unknown clients.
const USER_AGENT: &str = "VLC/3.0.14 LibVLC/3.0.14";

pub struct PlaylistFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl PlaylistFetcher {
    /// The client is shared process-wide; its pool is sized by the caller.
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Download and parse one playlist. Returns the parsed stream records
    /// and the wall-clock time the download took.
    pub async fn fetch(&self, url: &str) -> (Vec<StreamRef>, Duration) {
        let started = Instant::now();
        let streams = match self.download(url).await {
            Ok(content) => parse_m3u(&content),
            Err(e) => {
                debug!("Playlist fetch failed for {}: {}", url, e);
                Vec::new()
            }
        };
        (streams, started.elapsed())
    }

    async fn download(&self, url: &str) -> Result<String, reqwest::Error> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            debug!("Playlist {} answered {}", url, response.status());
            return Ok(String::new());
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }

        // Invalid bytes are dropped rather than failing the playlist.
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Scan extended-M3U content line by line. Each `#EXTINF` metadata line is
/// paired with the next non-comment non-empty line as its stream URL;
/// comments and blank lines in between are tolerated. Metadata followed by
/// another `#EXTINF` before any URL, or by end of input, is silently
/// skipped.
pub fn parse_m3u(content: &str) -> Vec<StreamRef> {
    let lines: Vec<&str> = content.lines().collect();
    let mut streams = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].trim();
        if !line.starts_with("#EXTINF") {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < lines.len() {
            let next = lines[j].trim();
            if next.is_empty() || (next.starts_with('#') && !next.starts_with("#EXTINF")) {
                j += 1;
            } else {
                break;
            }
        }
        match lines.get(j).map(|l| l.trim()) {
            Some(url) if !url.starts_with('#') => {
                streams.push(StreamRef {
                    extinf: line.to_string(),
                    url: url.to_string(),
                    info: parse_channel_info(line),
                });
                i = j + 1;
            }
            // Another #EXTINF claimed before any URL appeared; the current
            // metadata is orphaned. Resume scanning at the new entry.
            Some(_) => i = j,
            None => break,
        }
    }

    streams
}

/// Extract the tvg-* / group-title attributes and the display name from an
/// `#EXTINF` line.
pub fn parse_channel_info(extinf_line: &str) -> ChannelInfo {
    let mut info = ChannelInfo::default();

    let (attributes_part, channel_name) = match extinf_line.rfind(',') {
        Some(comma_pos) => (
            &extinf_line[..comma_pos],
            extinf_line[comma_pos + 1..].trim().to_string(),
        ),
        None => (extinf_line, String::new()),
    };
    info.channel_name = channel_name;

    for (key, value) in parse_attributes(attributes_part) {
        match key.as_str() {
            "tvg-id" => info.tvg_id = value,
            "tvg-name" => info.tvg_name = value,
            "tvg-logo" => info.tvg_logo = value,
            "group-title" => info.group_title = value,
            _ => {}
        }
    }

    info
}

/// Quote-aware `key="value"` scanner for the attribute section of an EXTINF
/// line. Values may contain spaces and commas; escaped characters pass
/// through.
fn parse_attributes(attributes: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut current_key = String::new();
    let mut current_value = String::new();
    let mut in_quotes = false;
    let mut in_value = false;
    let mut escape_next = false;

    for ch in attributes.chars() {
        if escape_next {
            if in_value {
                current_value.push(ch);
            } else {
                current_key.push(ch);
            }
            escape_next = false;
            continue;
        }

        match ch {
            '\\' => escape_next = true,
            '"' if in_value => {
                if in_quotes {
                    // Closing quote ends the value; anything up to the next
                    // attribute key is ignored.
                    attrs.push((current_key.trim().to_string(), current_value.clone()));
                    current_key.clear();
                    current_value.clear();
                    in_value = false;
                    in_quotes = false;
                } else {
                    in_quotes = true;
                }
            }
            '=' if !in_quotes && !in_value => {
                in_value = true;
            }
            ' ' | '\t' if !in_quotes => {
                if in_value && !current_value.is_empty() {
                    attrs.push((
                        current_key.trim().to_string(),
                        current_value.trim_matches('"').to_string(),
                    ));
                    current_key.clear();
                    current_value.clear();
                    in_value = false;
                } else if !in_value {
                    // Whitespace between attributes; drop any stray token
                    // such as the `#EXTINF:-1` prefix.
                    current_key.clear();
                }
            }
            _ => {
                if in_value {
                    current_value.push(ch);
                } else {
                    current_key.push(ch);
                }
            }
        }
    }

    if in_value && !current_value.is_empty() {
        attrs.push((
            current_key.trim().to_string(),
            current_value.trim_matches('"').to_string(),
        ));
    }

    attrs
}
