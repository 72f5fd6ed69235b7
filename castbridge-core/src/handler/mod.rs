//! Stream handlers.
//!
//! A handler turns one bound source into the HLS surface the origin server
//! exposes: a manifest, per-track playlists, per-segment bytes, and
//! subtitles. Exactly one handler is bound at a time; the origin dispatches
//! to whichever is current.

pub mod local;
pub mod remote;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::models::TrackKind;

pub use local::LocalSourceHandler;
pub use remote::RemoteSourceHandler;

/// How long an incoming segment request may be abandoned before any
/// transcoding or downloading work begins. Rapid seeks cancel inside this
/// window and cost nothing.
pub const RAPID_SEEK_WINDOW: Duration = Duration::from_millis(100);

/// Bytes for one served segment: a cache file streamed from disk, or an
/// in-memory buffer for uncached transcodes.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentPayload {
    File(PathBuf),
    Bytes(Bytes),
}

#[async_trait]
pub trait StreamHandler: Send + Sync {
    /// The synthesized master manifest (`/playlist.m3u8`).
    async fn serve_manifest(&self) -> Result<String>;

    /// A per-track media playlist (`/video.m3u8`, `/audio.m3u8`, `/subs.m3u8`).
    async fn serve_track_playlist(&self, kind: TrackKind) -> Result<String>;

    /// One segment's bytes, materializing them on demand. `raw` selects the
    /// un-remuxed upstream copy (remote sources only).
    async fn serve_segment(
        &self,
        kind: TrackKind,
        track: usize,
        index: usize,
        raw: bool,
        cancel: CancellationToken,
    ) -> Result<SegmentPayload>;

    /// The active subtitles as WebVTT (`/subtitles.vtt`).
    async fn serve_subtitles(&self) -> Result<String>;

    /// Total media duration in seconds.
    fn duration(&self) -> f64;
}

/// Wait out the rapid-seek window, completing early with `Cancelled` when
/// the request is abandoned. This is the normal completion path for seek
/// bursts.
pub(crate) async fn rapid_seek_gate(cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        () = cancel.cancelled() => Err(Error::Cancelled),
        () = tokio::time::sleep(RAPID_SEEK_WINDOW) => Ok(()),
    }
}
