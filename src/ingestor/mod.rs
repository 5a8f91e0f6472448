pub mod m3u_parser;

pub use m3u_parser::{parse_channel_info, parse_m3u, PlaylistFetcher};
