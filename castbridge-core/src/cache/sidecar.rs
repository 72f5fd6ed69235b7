//! Per-segment sidecar metadata.
//!
//! A transcoded segment on disk is only valid together with a sidecar whose
//! parameter subset matches the currently requested options and whose
//! duration matches the slice. Everything else in `StreamOptions` is
//! deliberately excluded: changing it must not invalidate cached segments.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::layout::write_atomic;
use crate::error::Result;
use crate::models::StreamOptions;

const DURATION_TOLERANCE: f64 = 1e-6;

/// The subset of transcode parameters that changes bytes on disk, plus the
/// slice duration the segment was produced with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSidecar {
    pub duration: f64,
    pub bitrate: Option<String>,
    pub max_output_width: u32,
    pub burn_in: bool,
    /// Burned subtitle source; `None` unless burn-in is active.
    pub subtitle: Option<String>,
    /// Burned subtitle font size; `None` unless burn-in is active.
    pub font_size: Option<u32>,
}

impl SegmentSidecar {
    /// The sidecar a transcode with these options and slice duration would
    /// produce.
    #[must_use]
    pub fn for_options(options: &StreamOptions, slice_duration: f64) -> Self {
        let burn_in = options.burn_in && !options.subtitle.is_none();
        Self {
            duration: slice_duration,
            bitrate: options.bitrate.clone(),
            max_output_width: options.max_output_width,
            burn_in,
            subtitle: if burn_in {
                Some(options.subtitle.to_string())
            } else {
                None
            },
            font_size: if burn_in { Some(options.font_size) } else { None },
        }
    }

    /// Whether a cached segment produced under `self` is still valid for the
    /// currently requested parameters. A missing sidecar always mismatches,
    /// which callers express by comparing against `None`.
    #[must_use]
    pub fn matches(&self, current: &StreamOptions, slice_duration: f64) -> bool {
        let expected = Self::for_options(current, slice_duration);
        (self.duration - expected.duration).abs() < DURATION_TOLERANCE
            && self.bitrate == expected.bitrate
            && self.max_output_width == expected.max_output_width
            && self.burn_in == expected.burn_in
            && self.subtitle == expected.subtitle
            && self.font_size == expected.font_size
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json).await
    }

    /// Load a sidecar; `None` when the file is missing or unreadable (both
    /// count as a cache mismatch, never an error).
    pub async fn load(path: &Path) -> Option<Self> {
        let bytes = tokio::fs::read(path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}
