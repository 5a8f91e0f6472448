//! Content filtering for stream candidates.
//!
//! A pure predicate over `(channel_name, group_title)`: the two fields are
//! concatenated, lowercased and matched against pre-compiled keyword-family
//! patterns. Word-boundary anchoring keeps short tokens from firing inside
//! longer names ("fm" inside "FMovies", "cine" inside "Cinemax").

use regex::Regex;

use crate::config::FilterConfig;

/// Keyword families excluded from live-TV output. Singular and plural
/// forms both count; anchoring stays on word boundaries.
const MOVIE_PATTERN: &str = r"(?i)\b(movies?|films?|cinemas?|peliculas?|filmes?|cines?)\b";
const SERIES_PATTERN: &str =
    r"(?i)\b(series|tv\s*shows?|seasons?|episodes?|episodios?|temporadas?|capitulos?)\b";
const ALL_DAY_PATTERN: &str =
    r"(?i)\b(24/?7|24h|24hs|24\s*h|24\s*hs|24\s*hours?|non-stop|nonstop)\b";
const VOD_PATTERN: &str = r"(?i)\b(vod|on\s*demand|catch\s*up|replays?)\b";
const ADULT_PATTERN: &str = r"(?i)\b(xxx|adult|porn|sexy|\+18|18\+|erotic|playboy|hustler)\b";
const RADIO_PATTERN: &str = r"(?i)\b(radio|fm)\b";

pub struct ContentFilter {
    patterns: Vec<Regex>,
}

impl ContentFilter {
    /// Compile the exclusion patterns selected by the configuration.
    /// Disabled filtering compiles to an empty set, so the predicate is a
    /// constant `false`.
    pub fn new(config: &FilterConfig) -> Result<Self, regex::Error> {
        if !config.enabled {
            return Ok(Self {
                patterns: Vec::new(),
            });
        }

        let mut sources = vec![MOVIE_PATTERN, SERIES_PATTERN, ALL_DAY_PATTERN, VOD_PATTERN];
        if !config.include_adult {
            sources.push(ADULT_PATTERN);
        }
        if !config.include_radio {
            sources.push(RADIO_PATTERN);
        }

        let patterns = sources
            .into_iter()
            .map(Regex::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// True when the stream should be excluded from probing and output.
    pub fn should_filter(&self, channel_name: &str, group_title: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let text = format!("{channel_name} {group_title}").to_lowercase();
        self.patterns.iter().any(|pattern| pattern.is_match(&text))
    }
}
