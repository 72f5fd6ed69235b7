// Module: http
// The HLS origin surface the receiver talks to.

pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use castbridge_core::{Config, Origin};

pub use error::{AppError, AppResult};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub origin: Arc<Origin>,
}

/// Create the origin router: manifest, per-track playlists, segments,
/// subtitles, and the receiver diagnostics drain.
pub fn create_router(state: AppState) -> Router {
    let read_timeout = Duration::from_secs(state.config.server.read_timeout_seconds);

    // The receiver player runs inside a browser-like sandbox; every response
    // must be CORS-permissive for GET.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/playlist.m3u8", get(routes::manifest))
        .route("/video.m3u8", get(routes::video_playlist))
        .route("/audio.m3u8", get(routes::audio_playlist))
        .route("/subs.m3u8", get(routes::subtitle_playlist))
        .route("/subtitles.vtt", get(routes::subtitles))
        .route("/debug/log", post(routes::receiver_log))
        .route("/{track}/{file}", get(routes::segment))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Bounds response production, not body streaming: segment bodies may
        // stream for as long as they need.
        .layer(TimeoutLayer::new(read_timeout))
        .with_state(state)
}
