//! Extraction persistence.
//!
//! Caches the extractor's output (the `Extraction` record and the raw
//! upstream manifest) under the source's content key, so relaunching the
//! app can re-cast the same page without running the headless browser.
//! Freshness is never verified here; the user triggers re-extraction
//! explicitly when the credentials stop working.

use std::sync::Arc;

use tracing::debug;

use crate::cache::{layout::write_atomic, CacheLayout};
use crate::error::Result;
use crate::models::{Extraction, MediaSource};

pub struct ExtractionStore {
    layout: CacheLayout,
}

impl ExtractionStore {
    #[must_use]
    pub fn new(layout: CacheLayout) -> Arc<Self> {
        Arc::new(Self { layout })
    }

    /// Load a cached extraction and manifest for a page URL, or `None` on
    /// any miss (either file absent or unreadable).
    pub async fn load(&self, page_url: &str) -> Result<Option<(Extraction, String)>> {
        let content_key = MediaSource::remote(page_url).content_key();
        let extraction_path = self.layout.extraction_path(&content_key);
        let manifest_path = self.layout.manifest_path(&content_key);

        let Ok(extraction_bytes) = tokio::fs::read(&extraction_path).await else {
            return Ok(None);
        };
        let Ok(manifest) = tokio::fs::read_to_string(&manifest_path).await else {
            return Ok(None);
        };
        let Ok(extraction) = serde_json::from_slice::<Extraction>(&extraction_bytes) else {
            debug!(page_url, "discarding unreadable cached extraction");
            return Ok(None);
        };
        Ok(Some((extraction, manifest)))
    }

    /// Persist an extraction and its manifest body.
    pub async fn save(&self, extraction: &Extraction) -> Result<()> {
        let content_key = MediaSource::remote(&extraction.page_url).content_key();
        write_atomic(
            &self.layout.extraction_path(&content_key),
            &serde_json::to_vec_pretty(extraction)?,
        )
        .await?;
        write_atomic(
            &self.layout.manifest_path(&content_key),
            extraction.raw_manifest_body.as_bytes(),
        )
        .await?;
        debug!(page_url = %extraction.page_url, "extraction cached");
        Ok(())
    }
}
