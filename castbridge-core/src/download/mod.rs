//! Background segment downloader.
//!
//! Pre-populates the raw-segment cache for one remote track at a time, under
//! explicit user control. Raw segments are parameter-independent, so a
//! pre-filled cache serves any later transcode options. One worker task runs
//! per active item; progress events for an item are emitted in increasing
//! segment order. The registry is a concurrent map keyed by
//! `(page URL, kind, track)`; each item's state sits behind its own mutex.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{Event, EventBus};
use crate::cache::CacheLayout;
use crate::error::{Error, Result};
use crate::handler::{RemoteSourceHandler, StreamHandler};
use crate::models::{MediaSource, StreamOptions, TrackKind};
use crate::store::ExtractionStore;
use crate::transcoder::Transcoder;

/// Identity of one downloadable track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DownloadKey {
    /// Page URL of the remote source.
    pub url: String,
    pub kind: TrackKind,
    pub track: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadStatus {
    Idle,
    InProgress,
    Error,
    Stopped,
    JustCompleted,
}

/// Snapshot returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadState {
    pub status: DownloadStatus,
    pub progress: Vec<bool>,
}

impl DownloadState {
    #[must_use]
    pub fn completed(&self) -> usize {
        self.progress.iter().filter(|p| **p).count()
    }
}

struct Item {
    status: DownloadStatus,
    progress: Vec<bool>,
    cancel: CancellationToken,
    /// Signals worker completion; `stop` waits on it.
    done_rx: watch::Receiver<bool>,
    handler: Option<Arc<RemoteSourceHandler>>,
}

impl Item {
    fn idle(progress: Vec<bool>) -> Self {
        let (_, done_rx) = watch::channel(true);
        Self {
            status: DownloadStatus::Idle,
            progress,
            cancel: CancellationToken::new(),
            done_rx,
            handler: None,
        }
    }

    fn state(&self) -> DownloadState {
        DownloadState {
            status: self.status,
            progress: self.progress.clone(),
        }
    }
}

/// Stateful manager for background downloads, one item per
/// `(page URL, kind, track)`.
pub struct DownloadManager {
    items: DashMap<DownloadKey, Arc<Mutex<Item>>>,
    extractions: Arc<ExtractionStore>,
    layout: CacheLayout,
    transcoder: Arc<Transcoder>,
    bus: EventBus,
}

impl DownloadManager {
    #[must_use]
    pub fn new(
        extractions: Arc<ExtractionStore>,
        layout: CacheLayout,
        transcoder: Arc<Transcoder>,
        bus: EventBus,
    ) -> Self {
        Self {
            items: DashMap::new(),
            extractions,
            layout,
            transcoder,
            bus,
        }
    }

    /// The item for a key, cloned out of the registry so no map guard is
    /// held while its mutex is taken.
    fn item(&self, key: &DownloadKey) -> Option<Arc<Mutex<Item>>> {
        self.items.get(key).map(|entry| entry.value().clone())
    }

    /// Current state for a key. Unknown keys are probed lazily from disk:
    /// a segment counts as downloaded when its raw file (or a transcoded
    /// copy) already exists.
    pub async fn get_status(&self, key: &DownloadKey) -> Result<DownloadState> {
        if let Some(item) = self.item(key) {
            return Ok(item.lock().state());
        }
        let progress = self.probe_disk(key).await;
        let item = self
            .items
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Item::idle(progress))))
            .value()
            .clone();
        let state = item.lock().state();
        Ok(state)
    }

    /// Start filling the cache for a track. Refuses when the item is already
    /// in progress.
    pub async fn start_download(self: &Arc<Self>, key: DownloadKey) -> Result<()> {
        // Make sure the item exists (probing disk for resumable progress).
        self.get_status(&key).await?;
        let item = self
            .item(&key)
            .ok_or_else(|| Error::Internal("download item vanished".to_string()))?;

        let handler = self.handler_for(&key).await?;
        let total = handler.segment_count(key.kind, key.track).await?;

        let (done_tx, cancel) = {
            let mut item = item.lock();
            if item.status == DownloadStatus::InProgress {
                return Err(Error::Internal(format!(
                    "download already in progress for {}",
                    key.url
                )));
            }
            item.progress.resize(total, false);
            item.status = DownloadStatus::InProgress;
            item.cancel = CancellationToken::new();
            item.handler = Some(handler.clone());
            let (done_tx, done_rx) = watch::channel(false);
            item.done_rx = done_rx;
            (done_tx, item.cancel.clone())
        };

        info!(url = %key.url, kind = key.kind.as_str(), track = key.track, total, "download started");

        let manager = self.clone();
        tokio::spawn(async move {
            let outcome = manager
                .run_worker(&key, &item, &handler, total, &cancel)
                .await;
            let final_status = match outcome {
                Ok(true) => DownloadStatus::JustCompleted,
                Ok(false) => DownloadStatus::Stopped,
                Err(e) => {
                    warn!(url = %key.url, error = %e, "download failed");
                    DownloadStatus::Error
                }
            };
            item.lock().status = final_status;
            let _ = done_tx.send(true);
        });

        Ok(())
    }

    /// Worker body: fill every missing segment in index order. Returns
    /// `Ok(true)` when the track is complete, `Ok(false)` when stopped.
    async fn run_worker(
        &self,
        key: &DownloadKey,
        item: &Arc<Mutex<Item>>,
        handler: &Arc<RemoteSourceHandler>,
        total: usize,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        for index in 0..total {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            if item.lock().progress[index] {
                continue;
            }

            match handler
                .serve_segment(key.kind, key.track, index, true, cancel.clone())
                .await
            {
                Ok(_) => {}
                Err(Error::Cancelled) => return Ok(false),
                Err(e) => return Err(e),
            }

            let completed = {
                let mut item = item.lock();
                item.progress[index] = true;
                item.progress.iter().filter(|p| **p).count()
            };
            debug!(url = %key.url, index, completed, total, "segment downloaded");
            self.bus.emit(Event::DownloadProgress {
                url: key.url.clone(),
                kind: key.kind,
                track: key.track,
                segment: index,
                completed,
                total,
            });
        }
        Ok(true)
    }

    /// Stop one download and wait for its worker to wind down.
    pub async fn stop(&self, key: &DownloadKey) -> Result<()> {
        let Some(item) = self.item(key) else {
            return Ok(());
        };

        let (cancel, mut done_rx, in_progress) = {
            let item = item.lock();
            (
                item.cancel.clone(),
                item.done_rx.clone(),
                item.status == DownloadStatus::InProgress,
            )
        };
        if !in_progress {
            return Ok(());
        }

        cancel.cancel();
        // Wait for the worker to acknowledge.
        while !*done_rx.borrow() {
            if done_rx.changed().await.is_err() {
                break;
            }
        }
        item.lock().status = DownloadStatus::Stopped;
        info!(url = %key.url, "download stopped");
        Ok(())
    }

    /// Cancel every active download and wait for the workers.
    pub async fn stop_all(&self) -> Result<()> {
        let keys: Vec<DownloadKey> = self.items.iter().map(|entry| entry.key().clone()).collect();
        for key in &keys {
            self.stop(key).await?;
        }
        Ok(())
    }

    /// Cancel every active download, wait for each worker, and reset all
    /// progress. Precondition for cache purges that remove the files.
    pub async fn stop_all_and_clear(&self) -> Result<()> {
        self.stop_all().await?;
        let items: Vec<_> = self
            .items
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for item in items {
            let mut item = item.lock();
            item.progress.iter_mut().for_each(|p| *p = false);
            item.status = DownloadStatus::Idle;
            item.handler = None;
        }
        Ok(())
    }

    /// Remove everything cached for a source. Active downloads are stopped
    /// and cleared first so no worker writes into the doomed tree.
    pub async fn purge_source(&self, source: &MediaSource) -> Result<()> {
        self.stop_all_and_clear().await?;
        self.layout.purge_source(&source.content_key()).await
    }

    /// Lazily construct (or reuse) the remote handler for a key. Download
    /// options do not matter for raw segments, so defaults are used.
    async fn handler_for(&self, key: &DownloadKey) -> Result<Arc<RemoteSourceHandler>> {
        if let Some(item) = self.item(key) {
            if let Some(handler) = &item.lock().handler {
                return Ok(handler.clone());
            }
        }
        let (extraction, _) = self
            .extractions
            .load(&key.url)
            .await?
            .ok_or_else(|| Error::ExtractionStale(format!("no cached extraction for {}", key.url)))?;
        let handler = RemoteSourceHandler::new(
            extraction,
            StreamOptions::default(),
            self.layout.clone(),
            self.transcoder.clone(),
        )
        .await?;
        Ok(Arc::new(handler))
    }

    /// Disk probe for an unknown item: which segments already exist.
    async fn probe_disk(&self, key: &DownloadKey) -> Vec<bool> {
        let content_key = MediaSource::remote(&key.url).content_key();
        let map_path = self.layout.url_map_path(&content_key, key.kind, key.track);
        let Ok(bytes) = tokio::fs::read(&map_path).await else {
            return Vec::new();
        };
        let Ok(urls) = serde_json::from_slice::<Vec<String>>(&bytes) else {
            return Vec::new();
        };

        let mut progress = Vec::with_capacity(urls.len());
        for index in 0..urls.len() {
            let raw = self
                .layout
                .raw_segment_path(&content_key, key.kind, key.track, index);
            let transcoded = self
                .layout
                .segment_path(&content_key, key.kind, key.track, index);
            let have_raw = tokio::fs::metadata(&raw)
                .await
                .map(|m| m.len() > 0)
                .unwrap_or(false);
            progress.push(have_raw || transcoded.exists());
        }
        progress
    }
}
