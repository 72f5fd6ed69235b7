use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;

/// A parsed playlist: master (variants and rendition groups) or media
/// (a list of segments).
#[derive(Debug, Clone, PartialEq)]
pub enum Playlist {
    Master(MasterPlaylist),
    Media(MediaPlaylist),
}

impl Playlist {
    #[must_use]
    pub fn as_master(&self) -> Option<&MasterPlaylist> {
        match self {
            Self::Master(m) => Some(m),
            Self::Media(_) => None,
        }
    }

    #[must_use]
    pub fn as_media(&self) -> Option<&MediaPlaylist> {
        match self {
            Self::Master(_) => None,
            Self::Media(m) => Some(m),
        }
    }
}

/// An `#EXT-X-STREAM-INF` entry and the URI line that follows it.
///
/// All attributes are kept in declaration order so regeneration preserves
/// them; typed accessors cover the ones the proxy inspects.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariantStream {
    pub uri: String,
    pub attrs: IndexMap<String, String>,
}

impl VariantStream {
    #[must_use]
    pub fn bandwidth(&self) -> Option<u64> {
        self.attrs.get("BANDWIDTH").and_then(|v| v.parse().ok())
    }

    #[must_use]
    pub fn audio_group(&self) -> Option<&str> {
        self.attrs.get("AUDIO").map(String::as_str)
    }

    #[must_use]
    pub fn subtitle_group(&self) -> Option<&str> {
        self.attrs.get("SUBTITLES").map(String::as_str)
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        self.attrs.insert(name.to_string(), value.into());
    }

    pub fn remove_attr(&mut self, name: &str) {
        self.attrs.shift_remove(name);
    }
}

/// An `#EXT-X-MEDIA` rendition entry (audio or subtitles).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlternativeMedia {
    pub group_id: String,
    pub uri: Option<String>,
    pub attrs: IndexMap<String, String>,
}

impl AlternativeMedia {
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.attrs.get("NAME").map(String::as_str)
    }

    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.attrs.get("LANGUAGE").map(String::as_str)
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        self.attrs.get("DEFAULT").map(String::as_str) == Some("YES")
    }
}

/// Master playlist: variants plus audio/subtitle rendition groups keyed by
/// GROUP-ID. Entries keep their position within each group, which is how
/// track indices stay stable.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterPlaylist {
    pub version: u32,
    pub independent_segments: bool,
    pub variants: Vec<VariantStream>,
    pub audio_groups: IndexMap<String, Vec<AlternativeMedia>>,
    pub subtitle_groups: IndexMap<String, Vec<AlternativeMedia>>,
    /// Unrecognized header lines, preserved verbatim on regeneration.
    pub extra: Vec<String>,
}

impl Default for MasterPlaylist {
    fn default() -> Self {
        Self {
            version: 3,
            independent_segments: false,
            variants: Vec::new(),
            audio_groups: IndexMap::new(),
            subtitle_groups: IndexMap::new(),
            extra: Vec::new(),
        }
    }
}

impl MasterPlaylist {
    /// The audio renditions bound to a variant via its AUDIO attribute.
    #[must_use]
    pub fn audio_for_variant(&self, variant: &VariantStream) -> &[AlternativeMedia] {
        variant
            .audio_group()
            .and_then(|g| self.audio_groups.get(g))
            .map_or(&[], Vec::as_slice)
    }
}

/// An `#EXT-X-MAP` initialization section.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaMap {
    pub uri: String,
    pub byte_range: Option<String>,
}

/// One media segment: the `#EXTINF` line, its URI, and the per-segment tags
/// observed immediately before it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Segment {
    pub duration: f64,
    pub title: String,
    pub uri: String,
    pub byte_range: Option<String>,
    pub discontinuity: bool,
    /// The raw attribute list of an `#EXT-X-KEY` tag that applies starting at
    /// this segment; passed through unchanged.
    pub key: Option<String>,
    pub program_date_time: Option<DateTime<FixedOffset>>,
    /// Unrecognized tags preceding this segment, preserved verbatim.
    pub extra_tags: Vec<String>,
}

/// Media playlist: ordered segments with the VOD framing tags.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    pub version: u32,
    pub target_duration: u64,
    pub media_sequence: u64,
    pub playlist_type: Option<String>,
    pub map: Option<MediaMap>,
    pub segments: Vec<Segment>,
    pub end_list: bool,
    /// Unrecognized header lines, preserved verbatim on regeneration.
    pub extra: Vec<String>,
}

impl Default for MediaPlaylist {
    fn default() -> Self {
        Self {
            version: 3,
            target_duration: 0,
            media_sequence: 0,
            playlist_type: None,
            map: None,
            segments: Vec::new(),
            end_list: false,
            extra: Vec::new(),
        }
    }
}

impl MediaPlaylist {
    /// Total duration in seconds: the sum of all segment durations.
    #[must_use]
    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }
}
