use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A subtitle file captured alongside the stream by the page extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedSubtitle {
    pub url: String,
    pub charset: String,
    pub label: String,
    /// Decoded subtitle text when the extractor captured the body; empty when
    /// only the URL was harvested and the body must be fetched on demand.
    pub content: String,
}

/// The opaque bundle produced by the headless-browser extractor: a manifest
/// URL plus the session credentials needed to fetch it again.
///
/// Persisted as JSON next to the upstream manifest under the source's content
/// key so relaunches skip the browser entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Extraction {
    pub page_url: String,
    pub manifest_url: String,
    pub base_url: String,
    pub raw_manifest_body: String,
    pub cookies: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub subtitles: Vec<ExtractedSubtitle>,
}

impl Extraction {
    /// Render the captured cookie map as a single `Cookie:` header value.
    /// Returns `None` when no cookies were captured.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let mut pairs: Vec<_> = self.cookies.iter().collect();
        // Stable ordering so the header is deterministic across requests.
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        Some(
            pairs
                .into_iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Base URL for resolving relative URIs in the captured manifest.
    /// Falls back to the manifest URL itself when the extractor did not
    /// record an explicit base.
    #[must_use]
    pub fn resolve_base(&self) -> &str {
        if self.base_url.is_empty() {
            &self.manifest_url
        } else {
            &self.base_url
        }
    }
}
