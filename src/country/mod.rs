//! Country inference from channel metadata.
//!
//! Resolution order: tvg-id TLD suffix, tvg-id country prefix, then a
//! prioritized keyword scan over group title and channel name. The priority
//! pass exists to keep short codes from matching inside longer words, e.g.
//! "AR" inside "PARAMOUNT" or "FR" inside "FREEFORM".

use crate::models::ChannelInfo;

pub const UNKNOWN: &str = "Unknown";

/// TLD-style suffixes accepted after the last dot of a tvg-id.
const TVG_ID_TLDS: &[&str] = &[
    "BR", "US", "UK", "CA", "AR", "MX", "ES", "FR", "DE", "IT", "PT", "CL", "CO", "PE", "VE", "EC",
];

/// Prefixes accepted before a `#`, `-` or `_` separator at the start of a
/// tvg-id, e.g. `br#globo` or `uk-bbc-one`.
const TVG_ID_PREFIXES: &[(&str, &str)] = &[
    ("br", "BR"),
    ("us", "US"),
    ("uk", "UK"),
    ("ca", "CA"),
    ("ar", "AR"),
    ("mx", "MX"),
    ("es", "ES"),
    ("fr", "FR"),
    ("de", "DE"),
    ("it", "IT"),
    ("pt", "PT"),
    ("cl", "CL"),
];

/// Checked before the general table so that e.g. "USA" wins over a stray
/// two-letter code further along the text.
const PRIORITY_KEYWORDS: &[(&str, &[&str])] = &[
    ("US", &["USA", "UNITED STATES", "AMERICA"]),
    ("UK", &["UNITED KINGDOM", "UK", "GB", "ENGLAND", "BRITISH"]),
    ("INT", &["INTERNATIONAL", "INT"]),
];

const COUNTRY_KEYWORDS: &[(&str, &[&str])] = &[
    ("AR", &["ARGENTINA", "AR"]),
    ("BR", &["BRAZIL", "BRASIL", "BR"]),
    ("CA", &["CANADA", "CA"]),
    ("DE", &["GERMANY", "DEUTSCHLAND", "DE"]),
    ("ES", &["SPAIN", "ESPAÑA", "ES"]),
    ("FR", &["FRANCE", "FR"]),
    ("IT", &["ITALY", "ITALIA", "IT"]),
    ("MX", &["MEXICO", "MX"]),
    ("PT", &["PORTUGAL", "PT"]),
];

/// Infer a country code for a channel, falling back to [`UNKNOWN`].
pub fn resolve(info: &ChannelInfo) -> String {
    if let Some(code) = from_tvg_id(&info.tvg_id) {
        return code.to_string();
    }
    from_text(&info.group_title, &info.channel_name)
}

/// Extract a country code from a tvg-id such as `CNNBrasil.br` or
/// `uk#bbc-one`. Returns `None` when the id carries no usable hint.
pub fn from_tvg_id(tvg_id: &str) -> Option<&'static str> {
    if tvg_id.is_empty() {
        return None;
    }

    if tvg_id.contains('.') {
        let suffix = tvg_id.rsplit('.').next().unwrap_or_default().to_uppercase();
        if let Some(code) = TVG_ID_TLDS.iter().copied().find(|code| *code == suffix) {
            return Some(code);
        }
    }

    let lower = tvg_id.to_lowercase();
    for (prefix, code) in TVG_ID_PREFIXES {
        for separator in ['#', '-', '_'] {
            if lower.starts_with(&format!("{prefix}{separator}")) {
                return Some(*code);
            }
        }
    }

    None
}

/// Keyword scan over `group_title + " " + channel_name`, priority list first.
pub fn from_text(group_title: &str, channel_name: &str) -> String {
    let text = format!("{group_title} {channel_name}").to_uppercase();

    for (code, keywords) in PRIORITY_KEYWORDS.iter().chain(COUNTRY_KEYWORDS) {
        for keyword in keywords.iter().copied() {
            let matched = if keyword.chars().count() <= 3 {
                contains_standalone(&text, keyword)
            } else {
                text.contains(keyword)
            };
            if matched {
                return (*code).to_string();
            }
        }
    }

    UNKNOWN.to_string()
}

/// Space-padded comparison: short codes only count as standalone words.
fn contains_standalone(text: &str, keyword: &str) -> bool {
    format!(" {text} ").contains(&format!(" {keyword} "))
}
