//! Cast session.
//!
//! The thin facade between the GUI and the serving machinery: builds the
//! right handler for a source, binds it on the origin, and hands the
//! playback URL to the external control channel.

use std::net::UdpSocket;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use tracing::info;

use crate::bus::{Event, EventBus};
use crate::cache::CacheLayout;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::handler::{LocalSourceHandler, RemoteSourceHandler, StreamHandler};
use crate::models::{Extraction, MediaSource, PlaybackState, ReceiverEvent, StreamOptions};
use crate::origin::Origin;
use crate::store::{CastEntry, ExtractionStore, HistoryStore};
use crate::transcoder::Transcoder;

/// HLS content type announced in the load request.
pub const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// A discovered receiver, as handed over by the discovery collaborator.
#[derive(Debug, Clone)]
pub struct DeviceTarget {
    pub name: String,
    pub address: String,
}

/// The load request handed to the control channel.
#[derive(Debug, Clone)]
pub struct LoadMediaRequest {
    pub device: DeviceTarget,
    pub url: String,
    pub title: String,
    pub content_type: String,
    pub app_id: String,
    pub custom_data: serde_json::Value,
}

/// The external cast control channel. Device protocol specifics live in the
/// shell; the core only issues these calls.
#[async_trait]
pub trait MediaController: Send + Sync {
    async fn load_media(&self, request: LoadMediaRequest) -> Result<()>;
    /// Side-channel subtitle override without re-casting.
    async fn set_subtitle_url(&self, url: &str) -> Result<()>;
    /// Side-channel subtitle size override without re-casting.
    async fn set_subtitle_size(&self, size: u32) -> Result<()>;
}

pub struct CastSession {
    config: Config,
    origin: Arc<Origin>,
    controller: Arc<dyn MediaController>,
    extractions: Arc<ExtractionStore>,
    history: Arc<HistoryStore>,
    layout: CacheLayout,
    transcoder: Arc<Transcoder>,
    bus: EventBus,
    state: Mutex<Option<PlaybackState>>,
}

impl CastSession {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        config: Config,
        origin: Arc<Origin>,
        controller: Arc<dyn MediaController>,
        extractions: Arc<ExtractionStore>,
        history: Arc<HistoryStore>,
        layout: CacheLayout,
        transcoder: Arc<Transcoder>,
        bus: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            origin,
            controller,
            extractions,
            history,
            layout,
            transcoder,
            bus,
            state: Mutex::new(None),
        })
    }

    /// Cast a source to a device.
    ///
    /// For remote sources a fresh `extraction` may be supplied (and is
    /// persisted); when absent, the cached one is used, and its absence
    /// surfaces as `ExtractionStale` so the shell can prompt a re-extract.
    pub async fn cast(
        &self,
        device: DeviceTarget,
        source: MediaSource,
        options: StreamOptions,
        extraction: Option<Extraction>,
    ) -> Result<PlaybackState> {
        let handler: Arc<dyn StreamHandler> = match &source {
            MediaSource::Local { path } => Arc::new(
                LocalSourceHandler::open(
                    path.clone(),
                    options,
                    self.config.transcoder.segment_seconds,
                    self.layout.clone(),
                    self.transcoder.clone(),
                )
                .await?,
            ),
            MediaSource::Remote { page_url } => {
                let extraction = match extraction {
                    Some(extraction) => {
                        self.extractions.save(&extraction).await?;
                        extraction
                    }
                    None => {
                        self.extractions
                            .load(page_url)
                            .await?
                            .ok_or_else(|| {
                                Error::ExtractionStale(format!(
                                    "no cached extraction for {page_url}"
                                ))
                            })?
                            .0
                    }
                };
                Arc::new(
                    RemoteSourceHandler::new(
                        extraction,
                        options,
                        self.layout.clone(),
                        self.transcoder.clone(),
                    )
                    .await?,
                )
            }
        };

        let duration = handler.duration();
        self.origin.bind(handler);

        let url = self.playback_url();
        info!(device = %device.name, url = %url, duration, "casting");

        let title = source.display_name();
        self.controller
            .load_media(LoadMediaRequest {
                device: device.clone(),
                url,
                title: title.clone(),
                content_type: HLS_CONTENT_TYPE.to_string(),
                app_id: self.config.cast.receiver_app_id.clone(),
                custom_data: json!({ "useShakaForHls": true }),
            })
            .await?;

        let state = PlaybackState::new(
            source.identity(),
            title,
            device.address.clone(),
            device.name.clone(),
            duration,
        );

        self.history
            .record(CastEntry {
                media_path: state.media_path.clone(),
                media_name: state.media_name.clone(),
                device_name: state.device_name.clone(),
                device_url: state.device_url.clone(),
                cast_at: Utc::now(),
            })
            .await?;
        self.bus.emit(Event::HistoryUpdated);

        *self.state.lock() = Some(state.clone());
        self.bus.emit(Event::PlaybackState(state.clone()));
        Ok(state)
    }

    /// Fold one receiver event into the current playback state.
    pub fn handle_receiver_event(&self, event: &ReceiverEvent) -> Option<PlaybackState> {
        let mut guard = self.state.lock();
        let state = guard.as_mut()?;
        state.apply(event);
        let snapshot = state.clone();
        drop(guard);
        self.bus.emit(Event::PlaybackState(snapshot.clone()));
        Some(snapshot)
    }

    #[must_use]
    pub fn playback_state(&self) -> Option<PlaybackState> {
        self.state.lock().clone()
    }

    /// Point the receiver at a different subtitle URL without re-casting.
    pub async fn set_subtitle_url(&self, url: &str) -> Result<()> {
        self.controller.set_subtitle_url(url).await
    }

    /// Change the receiver-side subtitle size without re-casting.
    pub async fn set_subtitle_size(&self, size: u32) -> Result<()> {
        self.controller.set_subtitle_size(size).await
    }

    /// Stop serving: unbind the handler and mark playback stopped.
    pub fn stop(&self) {
        self.origin.unbind();
        let snapshot = {
            let mut guard = self.state.lock();
            if let Some(state) = guard.as_mut() {
                state.apply(&ReceiverEvent::Close);
                Some(state.clone())
            } else {
                None
            }
        };
        if let Some(state) = snapshot {
            self.bus.emit(Event::PlaybackState(state));
        }
    }

    /// The canonical playback URL. The cachebust query defeats receiver-side
    /// stale caches between sessions.
    fn playback_url(&self) -> String {
        format!(
            "http://{}:{}/playlist.m3u8?cachebust={}",
            local_ip().unwrap_or_else(|| self.config.server.host.clone()),
            self.config.server.port,
            Utc::now().timestamp_millis()
        )
    }
}

/// The LAN address the receiver reaches this machine on: the local side of a
/// UDP socket "connected" to a public address. No packets are sent.
#[must_use]
pub fn local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlayerStatus;
    use crate::origin::NoopKeepAwake;
    use parking_lot::Mutex as PlMutex;

    struct RecordingController {
        loads: PlMutex<Vec<LoadMediaRequest>>,
    }

    #[async_trait]
    impl MediaController for RecordingController {
        async fn load_media(&self, request: LoadMediaRequest) -> Result<()> {
            self.loads.lock().push(request);
            Ok(())
        }
        async fn set_subtitle_url(&self, _url: &str) -> Result<()> {
            Ok(())
        }
        async fn set_subtitle_size(&self, _size: u32) -> Result<()> {
            Ok(())
        }
    }

    async fn session(dir: &std::path::Path) -> (Arc<CastSession>, Arc<RecordingController>) {
        let controller = Arc::new(RecordingController {
            loads: PlMutex::new(Vec::new()),
        });
        let layout = CacheLayout::new(dir.join("cache"));
        let session = CastSession::new(
            Config::default(),
            Origin::new(Arc::new(NoopKeepAwake)),
            controller.clone(),
            ExtractionStore::new(layout.clone()),
            HistoryStore::open(dir.join("cast_history.json")).await,
            layout,
            Transcoder::with_defaults(),
            EventBus::new(),
        );
        (session, controller)
    }

    #[tokio::test]
    async fn test_remote_cast_without_extraction_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _) = session(dir.path()).await;
        let result = session
            .cast(
                DeviceTarget {
                    name: "TV".to_string(),
                    address: "192.168.1.50:8009".to_string(),
                },
                MediaSource::remote("https://example.com/watch"),
                StreamOptions::default(),
                None,
            )
            .await;
        assert!(matches!(result, Err(Error::ExtractionStale(_))));
    }

    #[tokio::test]
    async fn test_receiver_event_fold_requires_active_cast() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _) = session(dir.path()).await;
        assert!(session
            .handle_receiver_event(&ReceiverEvent::Close)
            .is_none());
        assert!(session.playback_state().is_none());
    }

    #[tokio::test]
    async fn test_stop_without_cast_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _) = session(dir.path()).await;
        session.stop();
        assert!(session.playback_state().is_none());
    }

    #[test]
    fn test_playback_state_fold_marks_stopped() {
        let mut state = PlaybackState::new(
            "/m/a.mkv".to_string(),
            "a.mkv".to_string(),
            "addr".to_string(),
            "TV".to_string(),
            10.0,
        );
        state.apply(&ReceiverEvent::Close);
        assert_eq!(state.status, PlayerStatus::Stopped);
    }
}
