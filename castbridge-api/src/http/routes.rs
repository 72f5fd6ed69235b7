//! Route handlers for the origin surface.
//!
//! Playlists are regenerated per request (no-cache); segments are immutable
//! once produced and served with a year-long cache lifetime. Dropping a
//! request cancels the work it started: the guard tied to each segment
//! request cancels its token when the response future is dropped.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::debug;

use castbridge_core::handler::SegmentPayload;
use castbridge_core::models::TrackKind;

use super::error::{AppError, AppResult};
use super::AppState;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";
const VTT_CONTENT_TYPE: &str = "text/vtt";
const SEGMENT_CACHE_CONTROL: &str = "public, max-age=31536000";

pub async fn manifest(State(state): State<AppState>) -> AppResult<Response> {
    state.origin.touch();
    let (handler, _) = state.origin.handler()?;
    let text = handler.serve_manifest().await?;
    Ok(playlist_response(text))
}

pub async fn video_playlist(State(state): State<AppState>) -> AppResult<Response> {
    track_playlist(state, TrackKind::Video).await
}

pub async fn audio_playlist(State(state): State<AppState>) -> AppResult<Response> {
    track_playlist(state, TrackKind::Audio).await
}

pub async fn subtitle_playlist(State(state): State<AppState>) -> AppResult<Response> {
    track_playlist(state, TrackKind::Subtitle).await
}

async fn track_playlist(state: AppState, kind: TrackKind) -> AppResult<Response> {
    state.origin.touch();
    let (handler, _) = state.origin.handler()?;
    let text = handler.serve_track_playlist(kind).await?;
    Ok(playlist_response(text))
}

/// `/{kind}_{i}/segment_{j}.ts` and `/{kind}_{i}/segment_{j}_raw.ts`.
pub async fn segment(
    State(state): State<AppState>,
    Path((track_dir, file)): Path<(String, String)>,
) -> AppResult<Response> {
    state.origin.touch();
    let (kind, track) = parse_track_dir(&track_dir)
        .ok_or_else(|| AppError::not_found(format!("unknown track {track_dir:?}")))?;
    let (index, raw) = parse_segment_file(&file)
        .ok_or_else(|| AppError::not_found(format!("unknown segment {file:?}")))?;

    let (handler, root_cancel) = state.origin.handler()?;

    // Child token per request: cancelled by a handler rebind (via the root)
    // or by the client abandoning the request (via the drop guard).
    let cancel = root_cancel.child_token();
    let guard = cancel.clone().drop_guard();

    let payload = handler.serve_segment(kind, track, index, raw, cancel).await?;
    // Work finished; disarm so the response body can stream.
    drop(guard.disarm());

    debug!(track = %track_dir, file = %file, "serving segment");
    segment_response(payload).await
}

pub async fn subtitles(State(state): State<AppState>) -> AppResult<Response> {
    state.origin.touch();
    let (handler, _) = state.origin.handler()?;
    let text = handler.serve_subtitles().await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, VTT_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        text,
    )
        .into_response())
}

/// POST `/debug/log`: drain receiver-side diagnostics into the local log.
pub async fn receiver_log(body: String) -> StatusCode {
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        debug!(target: "receiver", "{}", line);
    }
    StatusCode::NO_CONTENT
}

fn playlist_response(text: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        text,
    )
        .into_response()
}

async fn segment_response(payload: SegmentPayload) -> AppResult<Response> {
    let body = match payload {
        SegmentPayload::Bytes(bytes) => Body::from(bytes),
        SegmentPayload::File(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| AppError::internal(format!("cached segment vanished: {e}")))?;
            Body::from_stream(ReaderStream::new(file))
        }
    };
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, SEGMENT_CONTENT_TYPE),
            (header::CACHE_CONTROL, SEGMENT_CACHE_CONTROL),
        ],
        body,
    )
        .into_response())
}

/// `video_0` → `(Video, 0)`.
fn parse_track_dir(dir: &str) -> Option<(TrackKind, usize)> {
    let (kind, index) = dir.rsplit_once('_')?;
    Some((TrackKind::from_str(kind)?, index.parse().ok()?))
}

/// `segment_5.ts` → `(5, false)`; `segment_5_raw.ts` → `(5, true)`.
fn parse_segment_file(file: &str) -> Option<(usize, bool)> {
    let stem = file.strip_suffix(".ts")?;
    let rest = stem.strip_prefix("segment_")?;
    if let Some(index) = rest.strip_suffix("_raw") {
        Some((index.parse().ok()?, true))
    } else {
        Some((rest.parse().ok()?, false))
    }
}
