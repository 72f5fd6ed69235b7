//! Local file handler.
//!
//! Slices one local video into fixed-size segments, transcoding each slice
//! on demand. Transcoded segments are cached next to a sidecar recording the
//! parameters that produced them; a parameter or duration mismatch
//! transparently re-transcodes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{CacheLayout, SegmentFlight, SegmentKey, SegmentSidecar};
use crate::error::{Error, Result};
use crate::models::{MediaSource, StreamOptions, SubtitleSelection, TrackKind};
use crate::playlist::{
    generate, AlternativeMedia, MasterPlaylist, MediaPlaylist, Playlist, Segment, VariantStream,
};
use crate::subtitle::{strip_closed_captions, WebVtt};
use crate::transcoder::{
    BurnIn, StreamMapping, TranscodeInput, TranscodeOptions, TranscodeTarget, Transcoder,
};

use super::{rapid_seek_gate, SegmentPayload, StreamHandler};

pub const DEFAULT_SEGMENT_SECONDS: u32 = 8;

/// Program-date-time base for synthesized playlists. The absolute value is
/// arbitrary; wall-clock stamps let the receiver align audio and video whose
/// segment boundaries differ slightly.
fn playlist_epoch() -> DateTime<Utc> {
    // 2020-01-01T00:00:00Z
    DateTime::from_timestamp(1_577_836_800, 0).unwrap_or_default()
}

pub struct LocalSourceHandler {
    video_path: PathBuf,
    options: StreamOptions,
    duration: f64,
    segment_seconds: u32,
    content_key: String,
    layout: CacheLayout,
    transcoder: Arc<Transcoder>,
    flight: SegmentFlight,
}

impl LocalSourceHandler {
    /// Build a handler for a local file whose duration has already been
    /// probed.
    pub fn new(
        video_path: impl Into<PathBuf>,
        options: StreamOptions,
        duration: f64,
        segment_seconds: u32,
        layout: CacheLayout,
        transcoder: Arc<Transcoder>,
    ) -> Self {
        let video_path = video_path.into();
        let content_key = MediaSource::local(&video_path).content_key();
        Self {
            video_path,
            options,
            duration,
            segment_seconds: segment_seconds.max(1),
            content_key,
            layout,
            transcoder,
            flight: SegmentFlight::new(),
        }
    }

    /// Probe the file and build the handler.
    pub async fn open(
        video_path: impl Into<PathBuf>,
        options: StreamOptions,
        segment_seconds: u32,
        layout: CacheLayout,
        transcoder: Arc<Transcoder>,
    ) -> Result<Self> {
        let video_path = video_path.into();
        let duration = transcoder.media_duration(&video_path).await?;
        Ok(Self::new(
            video_path,
            options,
            duration,
            segment_seconds,
            layout,
            transcoder,
        ))
    }

    #[must_use]
    pub fn content_key(&self) -> &str {
        &self.content_key
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        (self.duration / f64::from(self.segment_seconds)).ceil() as usize
    }

    fn slice_bounds(&self, index: usize) -> (f64, f64) {
        let start = index as f64 * f64::from(self.segment_seconds);
        let slice = (self.duration - start).min(f64::from(self.segment_seconds));
        (start, slice)
    }

    fn has_selectable_subtitles(&self) -> bool {
        !self.options.subtitle.is_none() && !self.options.burn_in
    }

    /// Transcode options for one slice.
    async fn slice_options(&self, start: f64, slice: f64) -> Result<TranscodeOptions> {
        let burn_in = if self.options.burn_in {
            match &self.options.subtitle {
                SubtitleSelection::None => None,
                SubtitleSelection::Embedded(index) => Some(BurnIn {
                    path: self.video_path.clone(),
                    stream_index: Some(*index),
                    font_size: self.options.font_size,
                }),
                SubtitleSelection::External(path) => Some(BurnIn {
                    path: self.subtitle_link(path).await?,
                    stream_index: None,
                    font_size: self.options.font_size,
                }),
            }
        } else {
            None
        };

        Ok(TranscodeOptions {
            start_time: Some(start),
            duration: Some(slice),
            mapping: StreamMapping::Transcode,
            bitrate: self.options.bitrate.clone(),
            max_output_width: self.options.max_output_width,
            burn_in,
        })
    }

    /// Indirect an external subtitle file through a cache-local symlink so
    /// the transcoder's filter parser never sees the original path.
    async fn subtitle_link(&self, target: &Path) -> Result<PathBuf> {
        let extension = target
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "srt".to_string());
        let dir = self.layout.track_dir(&self.content_key, TrackKind::Video, 0);
        tokio::fs::create_dir_all(&dir).await?;
        let link = dir.join(format!("subtitle_link.{extension}"));

        match tokio::fs::symlink_metadata(&link).await {
            Ok(_) => {
                tokio::fs::remove_file(&link).await?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        #[cfg(unix)]
        tokio::fs::symlink(target, &link).await?;
        #[cfg(windows)]
        tokio::fs::symlink_file(target, &link).await?;
        Ok(link)
    }

    async fn serve_video_segment(
        &self,
        index: usize,
        cancel: CancellationToken,
    ) -> Result<SegmentPayload> {
        let count = self.segment_count();
        if index >= count {
            return Err(Error::NotFound(format!(
                "segment {index} out of range (0..{count})"
            )));
        }
        let (start, slice) = self.slice_bounds(index);

        rapid_seek_gate(&cancel).await?;

        let transcode_options = self.slice_options(start, slice).await?;

        if self.options.no_transcode_cache {
            let bytes = self
                .transcoder
                .transcode_segment(
                    &transcode_options,
                    TranscodeInput::File(self.video_path.clone()),
                    TranscodeTarget::Stdout,
                    &cancel,
                )
                .await?
                .unwrap_or_default();
            return Ok(SegmentPayload::Bytes(bytes));
        }

        let segment_path = self
            .layout
            .segment_path(&self.content_key, TrackKind::Video, 0, index);
        let sidecar_path = self
            .layout
            .sidecar_path(&self.content_key, TrackKind::Video, 0, index);

        if self.cached_segment_valid(&segment_path, &sidecar_path, slice).await {
            return Ok(SegmentPayload::File(segment_path.clone()));
        }

        let key = SegmentKey::new(&self.content_key, TrackKind::Video, 0, index, false);
        self.flight
            .run(key, async {
                // Re-check under the single-flight lock: the winner may have
                // produced the segment while this request queued.
                if self.cached_segment_valid(&segment_path, &sidecar_path, slice).await {
                    return Ok(SegmentPayload::File(segment_path.clone()));
                }
                debug!(index, start, slice, "transcoding local segment");
                self.transcoder
                    .transcode_segment(
                        &transcode_options,
                        TranscodeInput::File(self.video_path.clone()),
                        TranscodeTarget::File(segment_path.clone()),
                        &cancel,
                    )
                    .await?;
                SegmentSidecar::for_options(&self.options, slice)
                    .save(&sidecar_path)
                    .await?;
                Ok(SegmentPayload::File(segment_path.clone()))
            })
            .await
    }

    async fn cached_segment_valid(
        &self,
        segment_path: &Path,
        sidecar_path: &Path,
        slice: f64,
    ) -> bool {
        if !segment_path.exists() {
            return false;
        }
        match SegmentSidecar::load(sidecar_path).await {
            Some(sidecar) => sidecar.matches(&self.options, slice),
            None => false,
        }
    }

    async fn subtitles_vtt(&self) -> Result<WebVtt> {
        let text = match &self.options.subtitle {
            SubtitleSelection::None => return Err(Error::NoSubtitles),
            SubtitleSelection::External(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| Error::NotFound(format!("subtitle file {}: {e}", path.display())))?,
            SubtitleSelection::Embedded(index) => {
                let cached = self
                    .layout
                    .embedded_subtitle_path(&self.content_key, *index);
                if !cached.exists() {
                    if let Some(parent) = cached.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    self.transcoder
                        .extract_subtitle(
                            &self.video_path,
                            *index,
                            &cached,
                            &CancellationToken::new(),
                        )
                        .await?;
                }
                tokio::fs::read_to_string(&cached).await?
            }
        };
        WebVtt::parse(&text)
    }
}

#[async_trait]
impl StreamHandler for LocalSourceHandler {
    async fn serve_manifest(&self) -> Result<String> {
        let mut variant = VariantStream {
            uri: TrackKind::Video.playlist_name().to_string(),
            attrs: IndexMap::new(),
        };
        variant.set_attr("BANDWIDTH", "2000000");

        let mut master = MasterPlaylist::default();
        if self.has_selectable_subtitles() {
            let mut attrs = IndexMap::new();
            attrs.insert("GROUP-ID".to_string(), "subs".to_string());
            attrs.insert("NAME".to_string(), "Subtitles".to_string());
            attrs.insert("DEFAULT".to_string(), "YES".to_string());
            attrs.insert("AUTOSELECT".to_string(), "YES".to_string());
            attrs.insert(
                "URI".to_string(),
                TrackKind::Subtitle.playlist_name().to_string(),
            );
            master.subtitle_groups.insert(
                "subs".to_string(),
                vec![AlternativeMedia {
                    group_id: "subs".to_string(),
                    uri: Some(TrackKind::Subtitle.playlist_name().to_string()),
                    attrs,
                }],
            );
            variant.set_attr("SUBTITLES", "subs");
        }
        master.variants.push(variant);

        Ok(generate(&Playlist::Master(master)))
    }

    async fn serve_track_playlist(&self, kind: TrackKind) -> Result<String> {
        match kind {
            TrackKind::Video => {}
            TrackKind::Subtitle if self.has_selectable_subtitles() => {
                // Single full-length entry pointing at the WebVTT endpoint.
                let playlist = MediaPlaylist {
                    target_duration: self.duration.ceil() as u64,
                    playlist_type: Some("VOD".to_string()),
                    segments: vec![Segment {
                        duration: self.duration,
                        uri: "subtitles.vtt".to_string(),
                        program_date_time: Some(playlist_epoch().fixed_offset()),
                        ..Segment::default()
                    }],
                    end_list: true,
                    ..MediaPlaylist::default()
                };
                return Ok(generate(&Playlist::Media(playlist)));
            }
            _ => {
                return Err(Error::NotFound(format!(
                    "no {} track for this source",
                    kind.as_str()
                )))
            }
        }

        let count = self.segment_count();
        let mut segments = Vec::with_capacity(count);
        let mut timestamp = playlist_epoch();
        for index in 0..count {
            let (_, slice) = self.slice_bounds(index);
            segments.push(Segment {
                duration: slice,
                uri: format!("video_0/segment_{index}.ts"),
                program_date_time: Some(timestamp.fixed_offset()),
                ..Segment::default()
            });
            timestamp += chrono::Duration::microseconds((slice * 1_000_000.0) as i64);
        }

        let playlist = MediaPlaylist {
            target_duration: u64::from(self.segment_seconds),
            playlist_type: Some("VOD".to_string()),
            segments,
            end_list: true,
            ..MediaPlaylist::default()
        };
        Ok(generate(&Playlist::Media(playlist)))
    }

    async fn serve_segment(
        &self,
        kind: TrackKind,
        track: usize,
        index: usize,
        raw: bool,
        cancel: CancellationToken,
    ) -> Result<SegmentPayload> {
        if raw {
            return Err(Error::NotFound(
                "raw segments exist only for remote sources".to_string(),
            ));
        }
        if kind != TrackKind::Video || track != 0 {
            return Err(Error::NotFound(format!(
                "no {}_{track} track for this source",
                kind.as_str()
            )));
        }
        self.serve_video_segment(index, cancel).await
    }

    async fn serve_subtitles(&self) -> Result<String> {
        if self.options.subtitle.is_none() || self.options.burn_in {
            return Err(Error::NoSubtitles);
        }
        let vtt = self.subtitles_vtt().await?;
        let vtt = if self.options.ignore_closed_captions {
            strip_closed_captions(&vtt)
        } else {
            vtt
        };
        Ok(vtt.to_string())
    }

    fn duration(&self) -> f64 {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(duration: f64, options: StreamOptions) -> LocalSourceHandler {
        LocalSourceHandler::new(
            "/movies/example.mkv",
            options,
            duration,
            DEFAULT_SEGMENT_SECONDS,
            CacheLayout::new("/tmp/castbridge-test-cache"),
            Transcoder::with_defaults(),
        )
    }

    #[test]
    fn test_segment_count_and_bounds() {
        let h = handler(125.5, StreamOptions::default());
        assert_eq!(h.segment_count(), 16);
        assert_eq!(h.slice_bounds(0), (0.0, 8.0));
        let (start, slice) = h.slice_bounds(15);
        assert!((start - 120.0).abs() < 1e-9);
        assert!((slice - 5.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_track_playlist_durations_sum_to_total() {
        let h = handler(125.5, StreamOptions::default());
        let text = h.serve_track_playlist(TrackKind::Video).await.unwrap();
        let playlist = crate::playlist::parse(&text).unwrap();
        let media = playlist.as_media().unwrap();
        assert_eq!(media.segments.len(), 16);
        assert!((media.total_duration() - 125.5).abs() < 1e-6);
        assert!(media.end_list);
        assert!(text.contains("#EXTINF:5.500000,"));
        assert!(media.segments.iter().all(|s| s.program_date_time.is_some()));
    }

    #[tokio::test]
    async fn test_program_date_time_advances_by_segment_duration() {
        let h = handler(20.0, StreamOptions::default());
        let text = h.serve_track_playlist(TrackKind::Video).await.unwrap();
        let playlist = crate::playlist::parse(&text).unwrap();
        let media = playlist.as_media().unwrap();
        let t0 = media.segments[0].program_date_time.unwrap();
        let t1 = media.segments[1].program_date_time.unwrap();
        assert_eq!((t1 - t0).num_seconds(), 8);
    }

    #[tokio::test]
    async fn test_manifest_without_subtitles() {
        let h = handler(125.5, StreamOptions::default());
        let text = h.serve_manifest().await.unwrap();
        assert!(text.contains("video.m3u8"));
        assert!(!text.contains("SUBTITLES"));
    }

    #[tokio::test]
    async fn test_manifest_with_selectable_subtitles() {
        let options = StreamOptions {
            subtitle: SubtitleSelection::External(PathBuf::from("/tmp/a.srt")),
            ..StreamOptions::default()
        };
        let h = handler(125.5, options);
        let text = h.serve_manifest().await.unwrap();
        assert!(text.contains("TYPE=SUBTITLES"));
        assert!(text.contains("SUBTITLES=\"subs\""));
        assert!(text.contains("URI=\"subs.m3u8\""));
    }

    #[tokio::test]
    async fn test_burned_in_subtitles_not_selectable() {
        let options = StreamOptions {
            subtitle: SubtitleSelection::External(PathBuf::from("/tmp/a.srt")),
            burn_in: true,
            ..StreamOptions::default()
        };
        let h = handler(125.5, options);
        let text = h.serve_manifest().await.unwrap();
        assert!(!text.contains("TYPE=SUBTITLES"));
        assert!(matches!(h.serve_subtitles().await, Err(Error::NoSubtitles)));
    }

    #[tokio::test]
    async fn test_out_of_range_segment_is_not_found() {
        let h = handler(16.0, StreamOptions::default());
        let result = h
            .serve_segment(TrackKind::Video, 0, 2, false, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_audio_track_is_not_found() {
        let h = handler(16.0, StreamOptions::default());
        let result = h
            .serve_segment(TrackKind::Audio, 0, 0, false, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        let result = h.serve_track_playlist(TrackKind::Audio).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_cancelled_in_window_does_no_work() {
        let h = handler(16.0, StreamOptions::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = h
            .serve_segment(TrackKind::Video, 0, 0, false, cancel)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
