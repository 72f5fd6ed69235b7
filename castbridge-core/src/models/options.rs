use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Where subtitles come from for a stream.
///
/// Serialized in the settings/history blobs as `"none"`,
/// `"external:<path>"` or `"embedded:<index>"`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubtitleSelection {
    #[default]
    None,
    External(PathBuf),
    Embedded(usize),
}

impl SubtitleSelection {
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for SubtitleSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::External(path) => write!(f, "external:{}", path.display()),
            Self::Embedded(index) => write!(f, "embedded:{index}"),
        }
    }
}

impl FromStr for SubtitleSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "none" || s.is_empty() {
            return Ok(Self::None);
        }
        if let Some(path) = s.strip_prefix("external:") {
            return Ok(Self::External(PathBuf::from(path)));
        }
        if let Some(index) = s.strip_prefix("embedded:") {
            return index
                .parse::<usize>()
                .map(Self::Embedded)
                .map_err(|_| format!("invalid embedded subtitle index: {index}"));
        }
        Err(format!("invalid subtitle selection: {s}"))
    }
}

impl Serialize for SubtitleSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SubtitleSelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// The full transcode parameter set for one stream.
///
/// Only a subset of these fields affects the bytes of a transcoded segment;
/// see [`crate::cache::SegmentSidecar`] for the cache equality key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    pub subtitle: SubtitleSelection,
    pub burn_in: bool,
    pub font_size: u32,
    pub ignore_closed_captions: bool,
    pub video_track: usize,
    pub audio_track: usize,
    pub bitrate: Option<String>,
    pub max_output_width: u32,
    pub no_transcode_cache: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            subtitle: SubtitleSelection::None,
            burn_in: false,
            font_size: 24,
            ignore_closed_captions: false,
            video_track: 0,
            audio_track: 0,
            bitrate: None,
            max_output_width: 0,
            no_transcode_cache: false,
        }
    }
}

impl StreamOptions {
    /// The subtitle path to burn in, when burn-in is active and a source is
    /// selected. Embedded selections burn from the input itself.
    #[must_use]
    pub fn burn_in_external_path(&self) -> Option<&PathBuf> {
        if !self.burn_in {
            return None;
        }
        match &self.subtitle {
            SubtitleSelection::External(path) => Some(path),
            _ => None,
        }
    }

    #[must_use]
    pub fn burn_in_embedded_index(&self) -> Option<usize> {
        if !self.burn_in {
            return None;
        }
        match &self.subtitle {
            SubtitleSelection::Embedded(index) => Some(*index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtitle_selection_string_round_trip() {
        for raw in ["none", "external:/tmp/a.srt", "embedded:2"] {
            let parsed: SubtitleSelection = raw.parse().unwrap();
            assert_eq!(parsed.to_string(), raw);
        }
    }

    #[test]
    fn test_subtitle_selection_rejects_garbage() {
        assert!("embedded:x".parse::<SubtitleSelection>().is_err());
        assert!("internal:/a".parse::<SubtitleSelection>().is_err());
    }

    #[test]
    fn test_subtitle_selection_json() {
        let opts = StreamOptions {
            subtitle: SubtitleSelection::External(PathBuf::from("/tmp/a.srt")),
            ..StreamOptions::default()
        };
        let json = serde_json::to_string(&opts).unwrap();
        assert!(json.contains("\"external:/tmp/a.srt\""));
        let back: StreamOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, opts);
    }

    #[test]
    fn test_burn_in_accessors() {
        let mut opts = StreamOptions {
            subtitle: SubtitleSelection::Embedded(1),
            ..StreamOptions::default()
        };
        assert_eq!(opts.burn_in_embedded_index(), None);
        opts.burn_in = true;
        assert_eq!(opts.burn_in_embedded_index(), Some(1));
        assert!(opts.burn_in_external_path().is_none());
    }
}
