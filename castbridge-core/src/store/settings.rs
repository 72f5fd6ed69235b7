//! User settings persistence.
//!
//! An opaque JSON blob owned by the GUI shell; the core reads the fields
//! that feed default stream options and writes updates atomically.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::layout::write_atomic;
use crate::error::Result;
use crate::models::StreamOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bitrate: Option<String>,
    pub max_output_width: u32,
    pub subtitle_font_size: u32,
    pub ignore_closed_captions: bool,
    pub no_transcode_cache: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bitrate: None,
            max_output_width: 0,
            subtitle_font_size: 24,
            ignore_closed_captions: false,
            no_transcode_cache: false,
        }
    }
}

impl Settings {
    /// Stream options seeded from these settings; per-cast fields keep their
    /// defaults.
    #[must_use]
    pub fn default_stream_options(&self) -> StreamOptions {
        StreamOptions {
            font_size: self.subtitle_font_size,
            ignore_closed_captions: self.ignore_closed_captions,
            bitrate: self.bitrate.clone(),
            max_output_width: self.max_output_width,
            no_transcode_cache: self.no_transcode_cache,
            ..StreamOptions::default()
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    inner: Mutex<Settings>,
}

impl SettingsStore {
    /// Open the store, falling back to defaults when the file is missing or
    /// unreadable.
    pub async fn open(path: impl Into<PathBuf>) -> Arc<Self> {
        let path = path.into();
        let settings = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "unreadable settings, using defaults");
                Settings::default()
            }),
            Err(_) => Settings::default(),
        };
        Arc::new(Self {
            path,
            inner: Mutex::new(settings),
        })
    }

    #[must_use]
    pub fn get(&self) -> Settings {
        self.inner.lock().clone()
    }

    /// Apply a mutation and persist the result.
    pub async fn update(&self, apply: impl FnOnce(&mut Settings)) -> Result<Settings> {
        let updated = {
            let mut settings = self.inner.lock();
            apply(&mut settings);
            settings.clone()
        };
        write_atomic(&self.path, &serde_json::to_vec_pretty(&updated)?).await?;
        Ok(updated)
    }
}
