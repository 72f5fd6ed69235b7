//! Server lifecycle: bind the origin listener, serve until ctrl-c, shut
//! down cleanly (stopping active downloads first).

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use castbridge_api::{create_router, AppState};
use castbridge_core::bus::EventBus;
use castbridge_core::download::DownloadManager;
use castbridge_core::session::{CastSession, LoadMediaRequest, MediaController};
use castbridge_core::store::SettingsStore;
use castbridge_core::{Config, Origin};

/// Control-channel stub for headless runs: logs the load request instead of
/// talking to a device. The GUI shell supplies the real implementation.
pub struct NullMediaController;

#[async_trait]
impl MediaController for NullMediaController {
    async fn load_media(&self, request: LoadMediaRequest) -> castbridge_core::Result<()> {
        info!(
            device = %request.device.name,
            url = %request.url,
            "load request (no control channel attached)"
        );
        Ok(())
    }

    async fn set_subtitle_url(&self, url: &str) -> castbridge_core::Result<()> {
        info!(url, "subtitle override (no control channel attached)");
        Ok(())
    }

    async fn set_subtitle_size(&self, size: u32) -> castbridge_core::Result<()> {
        info!(size, "subtitle size override (no control channel attached)");
        Ok(())
    }
}

pub struct OriginServer {
    config: Config,
    origin: Arc<Origin>,
    #[allow(dead_code)]
    session: Arc<CastSession>,
    downloads: Arc<DownloadManager>,
    #[allow(dead_code)]
    settings: Arc<SettingsStore>,
    #[allow(dead_code)]
    bus: EventBus,
}

impl OriginServer {
    #[must_use]
    pub fn new(
        config: Config,
        origin: Arc<Origin>,
        session: Arc<CastSession>,
        downloads: Arc<DownloadManager>,
        settings: Arc<SettingsStore>,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            origin,
            session,
            downloads,
            settings,
            bus,
        }
    }

    pub async fn run(self) -> Result<()> {
        let state = AppState {
            config: Arc::new(self.config.clone()),
            origin: self.origin.clone(),
        };
        let router = create_router(state);

        let address = self.config.http_address();
        let listener = tokio::net::TcpListener::bind(&address).await?;
        info!("origin server listening on {}", address);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("shutting down");
        if let Err(e) = self.downloads.stop_all().await {
            warn!("failed to stop downloads cleanly: {e}");
        }
        self.origin.unbind();
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
    }
}
