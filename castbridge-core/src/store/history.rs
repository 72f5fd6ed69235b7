//! Cast history persistence.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cache::layout::write_atomic;
use crate::error::Result;

const MAX_ENTRIES: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastEntry {
    pub media_path: String,
    pub media_name: String,
    pub device_name: String,
    pub device_url: String,
    pub cast_at: DateTime<Utc>,
}

/// Most-recent-first list of past casts, capped and deduplicated by media
/// path.
pub struct HistoryStore {
    path: PathBuf,
    inner: Mutex<Vec<CastEntry>>,
}

impl HistoryStore {
    pub async fn open(path: impl Into<PathBuf>) -> Arc<Self> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        Arc::new(Self {
            path,
            inner: Mutex::new(entries),
        })
    }

    #[must_use]
    pub fn entries(&self) -> Vec<CastEntry> {
        self.inner.lock().clone()
    }

    /// Record a cast: moves an existing entry for the same media to the
    /// front, truncates to the cap, persists.
    pub async fn record(&self, entry: CastEntry) -> Result<()> {
        let snapshot = {
            let mut entries = self.inner.lock();
            entries.retain(|e| e.media_path != entry.media_path);
            entries.insert(0, entry);
            entries.truncate(MAX_ENTRIES);
            entries.clone()
        };
        write_atomic(&self.path, &serde_json::to_vec_pretty(&snapshot)?).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.inner.lock().clear();
        write_atomic(&self.path, b"[]").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> CastEntry {
        CastEntry {
            media_path: path.to_string(),
            media_name: path.rsplit('/').next().unwrap_or_default().to_string(),
            device_name: "Living Room TV".to_string(),
            device_url: "192.168.1.50:8009".to_string(),
            cast_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_record_is_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("cast_history.json")).await;

        store.record(entry("/movies/a.mkv")).await.unwrap();
        store.record(entry("/movies/b.mkv")).await.unwrap();

        let entries = store.entries();
        assert_eq!(entries[0].media_path, "/movies/b.mkv");
        assert_eq!(entries[1].media_path, "/movies/a.mkv");
    }

    #[tokio::test]
    async fn test_recasting_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("cast_history.json")).await;

        store.record(entry("/movies/a.mkv")).await.unwrap();
        store.record(entry("/movies/b.mkv")).await.unwrap();
        store.record(entry("/movies/a.mkv")).await.unwrap();

        let entries = store.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].media_path, "/movies/a.mkv");
    }

    #[tokio::test]
    async fn test_cap() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("cast_history.json")).await;
        for i in 0..60 {
            store.record(entry(&format!("/movies/{i}.mkv"))).await.unwrap();
        }
        assert_eq!(store.entries().len(), MAX_ENTRIES);
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cast_history.json");
        {
            let store = HistoryStore::open(&path).await;
            store.record(entry("/movies/a.mkv")).await.unwrap();
        }
        let store = HistoryStore::open(&path).await;
        assert_eq!(store.entries().len(), 1);
    }
}
