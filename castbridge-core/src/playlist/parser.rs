use chrono::DateTime;
use indexmap::IndexMap;

use crate::error::{Error, Result};

use super::types::{
    AlternativeMedia, MasterPlaylist, MediaMap, MediaPlaylist, Playlist, Segment, VariantStream,
};

/// Parse playlist text into a [`Playlist`].
///
/// Fails with [`Error::MalformedManifest`] when the first non-blank line is
/// not `#EXTM3U`. Presence of `#EXT-X-STREAM-INF` or `#EXT-X-MEDIA` anywhere
/// classifies the document as a master playlist; otherwise it is media.
pub fn parse(text: &str) -> Result<Playlist> {
    let mut lines = text.lines().map(str::trim_end);
    let first = lines
        .by_ref()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| Error::MalformedManifest("empty playlist".to_string()))?;
    if first.trim() != "#EXTM3U" {
        return Err(Error::MalformedManifest(format!(
            "expected #EXTM3U, got {:?}",
            first.trim()
        )));
    }

    let rest: Vec<&str> = lines.collect();
    let is_master = rest.iter().any(|l| {
        l.starts_with("#EXT-X-STREAM-INF") || l.starts_with("#EXT-X-MEDIA:")
    });

    if is_master {
        parse_master(&rest).map(Playlist::Master)
    } else {
        parse_media(&rest).map(Playlist::Media)
    }
}

fn parse_master(lines: &[&str]) -> Result<MasterPlaylist> {
    let mut playlist = MasterPlaylist::default();
    let mut pending_variant: Option<VariantStream> = None;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(variant) = pending_variant.take() {
            // The URI line following #EXT-X-STREAM-INF.
            if !line.starts_with('#') {
                playlist.variants.push(VariantStream {
                    uri: line.to_string(),
                    ..variant
                });
                continue;
            }
            // Tag between STREAM-INF and its URI: keep the variant pending.
            pending_variant = Some(variant);
        }

        if let Some(rest) = line.strip_prefix("#EXT-X-VERSION:") {
            playlist.version = rest.trim().parse().unwrap_or(3);
        } else if line == "#EXT-X-INDEPENDENT-SEGMENTS" {
            playlist.independent_segments = true;
        } else if let Some(rest) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            pending_variant = Some(VariantStream {
                uri: String::new(),
                attrs: parse_attribute_list(rest),
            });
        } else if let Some(rest) = line.strip_prefix("#EXT-X-MEDIA:") {
            let attrs = parse_attribute_list(rest);
            let media_type = attrs.get("TYPE").cloned().unwrap_or_default();
            let group_id = attrs.get("GROUP-ID").cloned().unwrap_or_default();
            let media = AlternativeMedia {
                group_id: group_id.clone(),
                uri: attrs.get("URI").cloned(),
                attrs,
            };
            match media_type.as_str() {
                "AUDIO" => playlist.audio_groups.entry(group_id).or_default().push(media),
                "SUBTITLES" => playlist
                    .subtitle_groups
                    .entry(group_id)
                    .or_default()
                    .push(media),
                // CLOSED-CAPTIONS / VIDEO renditions are not modeled; carry
                // the raw line so regeneration keeps them.
                _ => playlist.extra.push(line.to_string()),
            }
        } else if line.starts_with('#') {
            playlist.extra.push(line.to_string());
        }
        // Bare URI lines without a preceding STREAM-INF are dropped.
    }

    Ok(playlist)
}

fn parse_media(lines: &[&str]) -> Result<MediaPlaylist> {
    let mut playlist = MediaPlaylist::default();
    let mut pending = Segment::default();
    let mut have_extinf = false;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if !line.starts_with('#') {
            // Segment URI; completes the pending segment.
            if !have_extinf {
                return Err(Error::MalformedManifest(format!(
                    "segment URI without #EXTINF: {line}"
                )));
            }
            playlist.segments.push(Segment {
                uri: line.to_string(),
                ..std::mem::take(&mut pending)
            });
            have_extinf = false;
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            let mut parts = rest.splitn(2, ',');
            let duration = parts
                .next()
                .unwrap_or_default()
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::MalformedManifest(format!("bad EXTINF: {line}")))?;
            pending.duration = duration;
            pending.title = parts.next().unwrap_or_default().to_string();
            have_extinf = true;
        } else if let Some(rest) = line.strip_prefix("#EXT-X-VERSION:") {
            playlist.version = rest.trim().parse().unwrap_or(3);
        } else if let Some(rest) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
            playlist.target_duration = rest.trim().parse().unwrap_or(0);
        } else if let Some(rest) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
            playlist.media_sequence = rest.trim().parse().unwrap_or(0);
        } else if let Some(rest) = line.strip_prefix("#EXT-X-PLAYLIST-TYPE:") {
            playlist.playlist_type = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("#EXT-X-MAP:") {
            let attrs = parse_attribute_list(rest);
            playlist.map = Some(MediaMap {
                uri: attrs.get("URI").cloned().unwrap_or_default(),
                byte_range: attrs.get("BYTERANGE").cloned(),
            });
        } else if let Some(rest) = line.strip_prefix("#EXT-X-BYTERANGE:") {
            pending.byte_range = Some(rest.trim().to_string());
        } else if line == "#EXT-X-DISCONTINUITY" {
            pending.discontinuity = true;
        } else if let Some(rest) = line.strip_prefix("#EXT-X-KEY:") {
            pending.key = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("#EXT-X-PROGRAM-DATE-TIME:") {
            pending.program_date_time = DateTime::parse_from_rfc3339(rest.trim()).ok();
        } else if line == "#EXT-X-ENDLIST" {
            playlist.end_list = true;
        } else if have_extinf {
            // Unknown tag between EXTINF and URI stays with the segment.
            pending.extra_tags.push(line.to_string());
        } else if playlist.segments.is_empty() && !have_extinf {
            playlist.extra.push(line.to_string());
        } else {
            pending.extra_tags.push(line.to_string());
        }
    }

    Ok(playlist)
}

/// Parse an HLS attribute list: `KEY=value` pairs separated by commas, where
/// quoted values may contain commas and unquoted values terminate at the next
/// comma.
#[must_use]
pub fn parse_attribute_list(input: &str) -> IndexMap<String, String> {
    let mut attrs = IndexMap::new();
    let mut chars = input.chars().peekable();

    loop {
        // Key runs up to '='.
        let mut key = String::new();
        for c in chars.by_ref() {
            if c == '=' {
                break;
            }
            key.push(c);
        }
        let key = key.trim_start_matches(',').trim().to_string();
        if key.is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                value.push(c);
            }
            // Skip the comma (if any) after the closing quote.
            if chars.peek() == Some(&',') {
                chars.next();
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    chars.next();
                    break;
                }
                value.push(c);
                chars.next();
            }
        }
        attrs.insert(key, value);

        if chars.peek().is_none() {
            break;
        }
    }

    attrs
}
