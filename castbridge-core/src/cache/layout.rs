//! Deterministic cache paths.
//!
//! Paths are the sole coordination primitive between handlers and the
//! downloader: both sides derive the same file locations from
//! `(content key, track kind, track index, segment index)` and trust disk
//! state. Callers create parent directories before writing.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::TrackKind;

/// Root of the on-disk segment cache plus the path helpers under it.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Per-source directory, named by the content key.
    #[must_use]
    pub fn source_dir(&self, content_key: &str) -> PathBuf {
        self.root.join(content_key)
    }

    /// Per-track directory `<kind>_<index>` under the source directory.
    #[must_use]
    pub fn track_dir(&self, content_key: &str, kind: TrackKind, track: usize) -> PathBuf {
        self.source_dir(content_key)
            .join(format!("{}_{}", kind.as_str(), track))
    }

    #[must_use]
    pub fn segment_path(
        &self,
        content_key: &str,
        kind: TrackKind,
        track: usize,
        index: usize,
    ) -> PathBuf {
        self.track_dir(content_key, kind, track)
            .join(format!("segment_{index}.ts"))
    }

    /// Raw (un-remuxed) upstream segment bytes; remote sources only.
    #[must_use]
    pub fn raw_segment_path(
        &self,
        content_key: &str,
        kind: TrackKind,
        track: usize,
        index: usize,
    ) -> PathBuf {
        self.track_dir(content_key, kind, track)
            .join(format!("segment_{index}_raw.ts"))
    }

    /// Sidecar JSON next to a transcoded segment; local sources only.
    #[must_use]
    pub fn sidecar_path(
        &self,
        content_key: &str,
        kind: TrackKind,
        track: usize,
        index: usize,
    ) -> PathBuf {
        self.track_dir(content_key, kind, track)
            .join(format!("segment_{index}.ts.json"))
    }

    /// Cached upstream track playlist; remote sources only.
    #[must_use]
    pub fn track_playlist_path(&self, content_key: &str, kind: TrackKind, track: usize) -> PathBuf {
        self.track_dir(content_key, kind, track).join("playlist.m3u8")
    }

    /// Segment-index → upstream-URL map; remote sources only.
    #[must_use]
    pub fn url_map_path(&self, content_key: &str, kind: TrackKind, track: usize) -> PathBuf {
        self.track_dir(content_key, kind, track).join("map.json")
    }

    /// Persisted extraction record; remote sources only.
    #[must_use]
    pub fn extraction_path(&self, content_key: &str) -> PathBuf {
        self.source_dir(content_key).join("extraction.json")
    }

    /// Persisted upstream manifest body; remote sources only.
    #[must_use]
    pub fn manifest_path(&self, content_key: &str) -> PathBuf {
        self.source_dir(content_key).join("playlist.m3u8")
    }

    /// Extracted embedded-subtitle cache; local sources only.
    #[must_use]
    pub fn embedded_subtitle_path(&self, content_key: &str, stream_index: usize) -> PathBuf {
        self.source_dir(content_key)
            .join(format!("subtitle_{stream_index}.vtt"))
    }

    /// Remove everything cached for one source. Safe whenever no handler is
    /// actively serving the source; the next request rebuilds the tree.
    pub async fn purge_source(&self, content_key: &str) -> Result<()> {
        let dir = self.source_dir(content_key);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Total bytes cached for one source. Missing directories count as zero.
    pub async fn source_size(&self, content_key: &str) -> Result<u64> {
        fn dir_size(path: PathBuf) -> std::io::Result<u64> {
            let mut total = 0;
            for entry in std::fs::read_dir(path)? {
                let entry = entry?;
                let meta = entry.metadata()?;
                if meta.is_dir() {
                    total += dir_size(entry.path())?;
                } else {
                    total += meta.len();
                }
            }
            Ok(total)
        }

        let dir = self.source_dir(content_key);
        tokio::task::spawn_blocking(move || match dir_size(dir) {
            Ok(size) => Ok(size),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        })
        .await
        .map_err(|e| crate::Error::Internal(e.to_string()))?
        .map_err(Into::into)
    }
}

/// Write bytes atomically: to a temp file in the same directory, then rename
/// over the destination.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
