//! Groups working streams by country, canonicalizes channel names and ranks
//! duplicate channels by measured bitrate.

use std::collections::BTreeMap;

use regex::Regex;

use crate::models::WorkingStream;

/// A working stream with the label it will carry in the output playlist.
/// The best variant of a channel keeps the bare name; the rest are numbered
/// backups.
#[derive(Debug, Clone)]
pub struct OrganizedStream {
    pub final_name: String,
    pub stream: WorkingStream,
}

/// Country code to ordered streams. `BTreeMap` keeps country buckets in
/// alphabetical order, `Unknown` included.
pub type OrganizedOutput = BTreeMap<String, Vec<OrganizedStream>>;

#[derive(Clone)]
pub struct StreamOrganizer {
    parenthetical: Regex,
    quality_tag: Regex,
    leading_digits: Regex,
}

impl StreamOrganizer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            parenthetical: Regex::new(r"\s*\([^)]*\)\s*")?,
            quality_tag: Regex::new(r"(?i)\s*(HD|FHD|4K|UHD|SD)\s*")?,
            leading_digits: Regex::new(r"\d+")?,
        })
    }

    /// Strip parenthetical segments and quality tags so variants of the same
    /// channel collapse onto one base name.
    pub fn base_name(&self, channel_name: &str) -> String {
        let stripped = self.parenthetical.replace_all(channel_name, "");
        let stripped = self.quality_tag.replace_all(&stripped, "");
        stripped.trim().to_string()
    }

    /// Numeric prefix of a bitrate string such as "5000 kb/s"; absent or
    /// unparseable values rank last.
    pub fn bitrate_value(&self, bitrate: &str) -> u64 {
        if bitrate.is_empty() || bitrate == "Unknown" || bitrate == "N/A" {
            return 0;
        }
        self.leading_digits
            .find(bitrate)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    }

    pub fn organize(&self, working: &[WorkingStream]) -> OrganizedOutput {
        let mut by_country: BTreeMap<String, Vec<&WorkingStream>> = BTreeMap::new();
        for stream in working {
            by_country
                .entry(stream.country.clone())
                .or_default()
                .push(stream);
        }

        let mut organized = OrganizedOutput::new();
        for (country, streams) in by_country {
            let mut by_name: BTreeMap<String, Vec<&WorkingStream>> = BTreeMap::new();
            for stream in streams {
                by_name
                    .entry(self.base_name(&stream.info.channel_name))
                    .or_default()
                    .push(stream);
            }

            let mut bucket = Vec::new();
            for (base_name, mut variants) in by_name {
                variants.sort_by_key(|s| std::cmp::Reverse(self.bitrate_value(&s.video_bitrate)));
                for (idx, stream) in variants.into_iter().enumerate() {
                    let final_name = if idx == 0 {
                        base_name.clone()
                    } else {
                        format!("{base_name} backup {idx}")
                    };
                    bucket.push(OrganizedStream {
                        final_name,
                        stream: stream.clone(),
                    });
                }
            }
            organized.insert(country, bucket);
        }

        organized
    }
}
