//! Extended-M3U serialization of the organized stream set.

use crate::models::timestamp_now;
use crate::organizer::OrganizedOutput;

/// Render the full output playlist. The file is always regenerated from
/// scratch so its contents stay a pure function of the working-stream set.
pub fn render(organized: &OrganizedOutput) -> String {
    let mut m3u = String::from("#EXTM3U\n");
    m3u.push_str(&format!("# Generated: {}\n", timestamp_now()));
    m3u.push_str("# Organized by country, alphabetically, and by bitrate\n");
    m3u.push('\n');

    for (country, streams) in organized {
        m3u.push_str(&format!(
            "\n# ===== {} ({} streams) =====\n",
            country,
            streams.len()
        ));
        for entry in streams {
            let info = &entry.stream.info;
            let mut extinf = String::from("#EXTINF:-1");

            if !info.tvg_id.is_empty() {
                extinf.push_str(&format!(" tvg-id=\"{}\"", info.tvg_id));
            }
            if !info.tvg_name.is_empty() {
                extinf.push_str(&format!(" tvg-name=\"{}\"", info.tvg_name));
            }
            if !info.tvg_logo.is_empty() {
                extinf.push_str(&format!(" tvg-logo=\"{}\"", info.tvg_logo));
            }
            extinf.push_str(&format!(" group-title=\"{}\"", country));
            extinf.push_str(&format!(
                ",{} [{} {}]\n",
                entry.final_name, entry.stream.resolution, entry.stream.video_bitrate
            ));

            m3u.push_str(&extinf);
            m3u.push_str(&format!("{}\n", entry.stream.url));
        }
    }

    m3u
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelInfo, WorkingStream};
    use crate::organizer::StreamOrganizer;

    fn working(name: &str, tvg_id: &str, country: &str, bitrate: &str) -> WorkingStream {
        WorkingStream {
            extinf: format!("#EXTINF:-1,{name}"),
            url: format!("http://host/{}", name.replace(' ', "-")),
            info: ChannelInfo {
                tvg_id: tvg_id.to_string(),
                channel_name: name.to_string(),
                ..Default::default()
            },
            codec: "h264".to_string(),
            video_bitrate: bitrate.to_string(),
            resolution: "1280x720".to_string(),
            fps: "25".to_string(),
            audio_info: "128 kb/s".to_string(),
            country: country.to_string(),
            channel_name: name.to_string(),
            group_title: "Sports".to_string(),
            checked_at: "2025-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn renders_header_banners_and_entries() {
        let organizer = StreamOrganizer::new().unwrap();
        let organized = organizer.organize(&[
            working("ESPN", "espn.us", "US", "5000 kb/s"),
            working("Globo", "", "BR", "3000 kb/s"),
        ]);
        let output = render(&organized);

        assert!(output.starts_with("#EXTM3U\n# Generated: "));
        assert!(output.contains("\n# ===== BR (1 streams) =====\n"));
        assert!(output.contains("\n# ===== US (1 streams) =====\n"));
        // group-title always carries the inferred country.
        assert!(output.contains(
            "#EXTINF:-1 tvg-id=\"espn.us\" group-title=\"US\",ESPN [1280x720 5000 kb/s]\nhttp://host/ESPN\n"
        ));
        // Empty attributes are omitted entirely.
        assert!(output
            .contains("#EXTINF:-1 group-title=\"BR\",Globo [1280x720 3000 kb/s]\nhttp://host/Globo\n"));
        // BR bucket is listed before US.
        assert!(output.find("===== BR").unwrap() < output.find("===== US").unwrap());
    }

    #[test]
    fn output_parses_back_as_extended_m3u() {
        let organizer = StreamOrganizer::new().unwrap();
        let organized = organizer.organize(&[working("ESPN", "espn.us", "US", "5000 kb/s")]);
        let output = render(&organized);

        let parsed = crate::ingestor::parse_m3u(&output);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].url, "http://host/ESPN");
        assert_eq!(parsed[0].info.tvg_id, "espn.us");
        assert_eq!(parsed[0].info.group_title, "US");
        assert_eq!(parsed[0].info.channel_name, "ESPN [1280x720 5000 kb/s]");
    }
}
