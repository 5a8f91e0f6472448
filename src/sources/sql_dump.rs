//! Playlist URL extraction from a SQL dump.
//!
//! The dump is scanned line by line; anything resembling an IPTV playlist
//! URL (a `type=<playlist-type>` query or a `.m3u`/`.m3u8` path) is
//! collected. Duplicates collapse to the first occurrence so downstream
//! progress keys stay stable across runs.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use regex::Regex;
use tracing::{debug, info};

/// URL pattern covering the playlist-type zoo seen in middleware dumps plus
/// direct `.m3u`/`.m3u8` paths.
const URL_PATTERN: &str = concat!(
    r"(?i)(https?://[^\s',\)]+(?:",
    r"type=(?:m3u[_\-]?(?:plus?|plu[ts]?|pl[a-z]*)?|ss(?:iptv)?|smart(?:_iptv)?|enigma|dreambox|ottplayer|webtvlist|gigablue|simple|ts|hls|xml|tvg_plus|adv_[a-z_]+|[a-z0-9_\-]*m3u[a-z0-9_\-]*)",
    r"|\.m3u8?",
    r")[^\s',\)]*)"
);

const TYPE_PATTERN: &str = r#"(?i)type=([^&\s'"]+)"#;

#[derive(Debug, Default)]
pub struct UrlExtraction {
    /// Unique URLs in first-seen order.
    pub urls: Vec<String>,
    /// Total matches before deduplication.
    pub total_matches: usize,
    /// Match counts per playlist type; direct file URLs tally under
    /// `direct_m3u`.
    pub by_type: HashMap<String, usize>,
}

pub struct SqlDumpScanner {
    url_pattern: Regex,
    type_pattern: Regex,
}

impl SqlDumpScanner {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            url_pattern: Regex::new(URL_PATTERN)?,
            type_pattern: Regex::new(TYPE_PATTERN)?,
        })
    }

    /// Scan a dump file. Invalid UTF-8 is decoded lossily, never fatal.
    pub fn scan(&self, path: &Path) -> std::io::Result<UrlExtraction> {
        info!("Extracting playlist URLs from {}", path.display());
        let mut reader = BufReader::new(File::open(path)?);

        let mut extraction = UrlExtraction::default();
        let mut seen = HashSet::new();
        let mut buffer = Vec::new();
        let mut line_count = 0u64;

        loop {
            buffer.clear();
            if reader.read_until(b'\n', &mut buffer)? == 0 {
                break;
            }
            line_count += 1;
            let line = String::from_utf8_lossy(&buffer);
            self.scan_line(&line, &mut extraction, &mut seen);
        }

        info!(
            "Scanned {} lines: {} matches, {} unique URLs",
            line_count,
            extraction.total_matches,
            extraction.urls.len()
        );
        let mut types: Vec<(&String, &usize)> = extraction.by_type.iter().collect();
        types.sort_by(|a, b| b.1.cmp(a.1));
        for (playlist_type, count) in types.into_iter().take(10) {
            debug!("  playlist type {}: {}", playlist_type, count);
        }

        Ok(extraction)
    }

    fn scan_line(&self, line: &str, extraction: &mut UrlExtraction, seen: &mut HashSet<String>) {
        for capture in self.url_pattern.find_iter(line) {
            let url = capture.as_str();
            extraction.total_matches += 1;

            if let Some(type_capture) = self.type_pattern.captures(url) {
                let playlist_type = type_capture[1].to_lowercase();
                *extraction.by_type.entry(playlist_type).or_insert(0) += 1;
            } else if url.to_lowercase().contains(".m3u") {
                *extraction.by_type.entry("direct_m3u".to_string()).or_insert(0) += 1;
            }

            if seen.insert(url.to_string()) {
                extraction.urls.push(url.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scan_text(text: &str) -> UrlExtraction {
        let scanner = SqlDumpScanner::new().unwrap();
        let mut extraction = UrlExtraction::default();
        let mut seen = HashSet::new();
        for line in text.lines() {
            scanner.scan_line(line, &mut extraction, &mut seen);
        }
        extraction
    }

    #[test]
    fn matches_type_queries_and_direct_files() {
        let extraction = scan_text(
            "INSERT INTO t VALUES ('http://host/get.php?username=a&type=m3u_plus&output=ts'),\n\
             ('https://cdn.example.com/lists/all.m3u8'),\n\
             ('http://not-a-playlist.example.com/index.html')",
        );
        assert_eq!(extraction.urls.len(), 2);
        assert_eq!(extraction.by_type["m3u_plus"], 1);
        assert_eq!(extraction.by_type["direct_m3u"], 1);
    }

    #[test]
    fn duplicates_collapse_to_first_seen_order() {
        let extraction = scan_text(
            "'http://a/x.m3u8' 'http://b/y.m3u8' 'http://a/x.m3u8'\n'http://b/y.m3u8'",
        );
        assert_eq!(extraction.total_matches, 4);
        assert_eq!(extraction.urls, ["http://a/x.m3u8", "http://b/y.m3u8"]);
    }

    #[test]
    fn url_stops_at_sql_delimiters() {
        let extraction = scan_text("('http://host/list.m3u8','other')");
        assert_eq!(extraction.urls, ["http://host/list.m3u8"]);
    }

    #[test]
    fn scan_tolerates_invalid_utf8() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"'http://host/a.m3u8'\n\xff\xfe garbage \xff\n'http://host/b.m3u8'\n")
            .unwrap();
        let scanner = SqlDumpScanner::new().unwrap();
        let extraction = scanner.scan(file.path()).unwrap();
        assert_eq!(extraction.urls.len(), 2);
    }
}
