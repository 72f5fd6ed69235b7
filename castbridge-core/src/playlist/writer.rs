use std::fmt::Write;

use chrono::SecondsFormat;

use super::types::{MasterPlaylist, MediaPlaylist, Playlist};

/// Emit canonical HLS text for a playlist. Output is newline terminated;
/// segment durations are formatted `%.6f`.
#[must_use]
pub fn generate(playlist: &Playlist) -> String {
    match playlist {
        Playlist::Master(master) => generate_master(master),
        Playlist::Media(media) => generate_media(media),
    }
}

fn generate_master(master: &MasterPlaylist) -> String {
    let mut out = String::new();
    out.push_str("#EXTM3U\n");
    let _ = writeln!(out, "#EXT-X-VERSION:{}", master.version);
    if master.independent_segments {
        out.push_str("#EXT-X-INDEPENDENT-SEGMENTS\n");
    }
    for line in &master.extra {
        out.push_str(line);
        out.push('\n');
    }
    for entries in master.audio_groups.values() {
        write_media_entries(&mut out, "AUDIO", entries);
    }
    for entries in master.subtitle_groups.values() {
        write_media_entries(&mut out, "SUBTITLES", entries);
    }
    for variant in &master.variants {
        let mut line = String::from("#EXT-X-STREAM-INF:");
        let mut first = true;
        for (name, value) in &variant.attrs {
            if !first {
                line.push(',');
            }
            first = false;
            let _ = write!(line, "{}={}", name, format_attr_value(name, value));
        }
        out.push_str(&line);
        out.push('\n');
        out.push_str(&variant.uri);
        out.push('\n');
    }
    out
}

fn write_media_entries(out: &mut String, media_type: &str, entries: &[super::types::AlternativeMedia]) {
    for media in entries {
        let mut line = format!("#EXT-X-MEDIA:TYPE={media_type}");
        for (name, value) in &media.attrs {
            if name == "TYPE" {
                continue;
            }
            let _ = write!(line, ",{}={}", name, format_attr_value(name, value));
        }
        out.push_str(&line);
        out.push('\n');
    }
}

fn generate_media(media: &MediaPlaylist) -> String {
    let mut out = String::new();
    out.push_str("#EXTM3U\n");
    let _ = writeln!(out, "#EXT-X-VERSION:{}", media.version);
    let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", media.target_duration);
    let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", media.media_sequence);
    if let Some(playlist_type) = &media.playlist_type {
        let _ = writeln!(out, "#EXT-X-PLAYLIST-TYPE:{playlist_type}");
    }
    for line in &media.extra {
        out.push_str(line);
        out.push('\n');
    }
    if let Some(map) = &media.map {
        if let Some(range) = &map.byte_range {
            let _ = writeln!(out, "#EXT-X-MAP:URI=\"{}\",BYTERANGE=\"{}\"", map.uri, range);
        } else {
            let _ = writeln!(out, "#EXT-X-MAP:URI=\"{}\"", map.uri);
        }
    }
    for segment in &media.segments {
        for tag in &segment.extra_tags {
            out.push_str(tag);
            out.push('\n');
        }
        if segment.discontinuity {
            out.push_str("#EXT-X-DISCONTINUITY\n");
        }
        if let Some(key) = &segment.key {
            let _ = writeln!(out, "#EXT-X-KEY:{key}");
        }
        if let Some(pdt) = &segment.program_date_time {
            let _ = writeln!(
                out,
                "#EXT-X-PROGRAM-DATE-TIME:{}",
                pdt.to_rfc3339_opts(SecondsFormat::Millis, false)
            );
        }
        if let Some(range) = &segment.byte_range {
            let _ = writeln!(out, "#EXT-X-BYTERANGE:{range}");
        }
        let _ = writeln!(out, "#EXTINF:{:.6},{}", segment.duration, segment.title);
        out.push_str(&segment.uri);
        out.push('\n');
    }
    if media.end_list {
        out.push_str("#EXT-X-ENDLIST\n");
    }
    out
}

/// HLS attribute values: enumerated and numeric values are emitted bare,
/// everything else is quoted.
fn format_attr_value(name: &str, value: &str) -> String {
    let bare = matches!(
        name,
        "BANDWIDTH"
            | "AVERAGE-BANDWIDTH"
            | "RESOLUTION"
            | "FRAME-RATE"
            | "DEFAULT"
            | "AUTOSELECT"
            | "FORCED"
            | "TYPE"
            | "CLOSED-CAPTIONS"
            | "PROGRAM-ID"
    );
    if bare {
        value.to_string()
    } else {
        format!("\"{value}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::super::types::Playlist;
    use super::*;

    const MASTER: &str = r#"#EXTM3U
#EXT-X-VERSION:4
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID="aac",NAME="English",DEFAULT=YES,URI="audio/en/index.m3u8"
#EXT-X-STREAM-INF:BANDWIDTH=2149280,CODECS="avc1.64001f,mp4a.40.2",RESOLUTION=1280x720,AUDIO="aac"
video/720p/index.m3u8
"#;

    const MEDIA: &str = r#"#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:8
#EXT-X-MEDIA-SEQUENCE:0
#EXT-X-PLAYLIST-TYPE:VOD
#EXT-X-KEY:METHOD=AES-128,URI="https://keys.example/k"
#EXTINF:8.000000,
seg0.ts
#EXT-X-DISCONTINUITY
#EXTINF:8.000000,second
seg1.ts
#EXT-X-PROGRAM-DATE-TIME:2024-05-01T00:00:16.000+00:00
#EXT-X-BYTERANGE:75232@0
#EXTINF:5.500000,
seg2.ts
#EXT-X-ENDLIST
"#;

    fn round_trip(text: &str) -> (Playlist, Playlist) {
        let first = parse(text).unwrap();
        let regenerated = generate(&first);
        let second = parse(&regenerated).unwrap();
        (first, second)
    }

    #[test]
    fn test_media_round_trip_is_semantically_equal() {
        let (first, second) = round_trip(MEDIA);
        assert_eq!(first, second);
    }

    #[test]
    fn test_master_round_trip_is_semantically_equal() {
        let (first, second) = round_trip(MASTER);
        assert_eq!(first, second);
    }

    #[test]
    fn test_extinf_format() {
        let text = generate(&parse(MEDIA).unwrap());
        assert!(text.contains("#EXTINF:8.000000,"));
        assert!(text.contains("#EXTINF:5.500000,"));
        assert!(text.ends_with("#EXT-X-ENDLIST\n"));
    }

    #[test]
    fn test_key_and_byterange_preserved() {
        let text = generate(&parse(MEDIA).unwrap());
        assert!(text.contains("#EXT-X-KEY:METHOD=AES-128,URI=\"https://keys.example/k\""));
        assert!(text.contains("#EXT-X-BYTERANGE:75232@0"));
        assert!(text.contains("#EXT-X-PROGRAM-DATE-TIME:2024-05-01T00:00:16.000+00:00"));
    }
}
