//! Remote source handler.
//!
//! Proxies an upstream HLS stream captured by the page extractor: rewrites
//! the upstream manifest so every URI points back into this server, caches
//! upstream track playlists plus a segment-index → URL map, downloads raw
//! segments with the captured session credentials, and remuxes them into
//! receiver-compatible MPEG-TS.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{layout::write_atomic, CacheLayout, SegmentFlight, SegmentKey};
use crate::error::{Error, Result};
use crate::models::{Extraction, MediaSource, StreamOptions, SubtitleSelection, TrackKind};
use crate::playlist::{generate, parse, resolve_uri, MasterPlaylist, Playlist};
use crate::subtitle::{decode, strip_closed_captions, WebVtt};
use crate::transcoder::{StreamMapping, TranscodeInput, TranscodeOptions, TranscodeTarget, Transcoder};

use super::{rapid_seek_gate, SegmentPayload, StreamHandler};

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);
const UPSTREAM_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// One upstream media playlist this handler serves segments from.
#[derive(Debug, Clone)]
struct TrackBinding {
    kind: TrackKind,
    track: usize,
    /// Absolute upstream playlist URL; empty when the extraction body itself
    /// is the media playlist.
    upstream_url: String,
    /// Whether segments carry both audio and video.
    muxed: bool,
}

/// How the upstream presents its streams.
enum UpstreamShape {
    /// Master with separate audio and video media playlists.
    Demuxed,
    /// Master whose variant carries muxed segments.
    MuxedMaster,
    /// The manifest itself is a media playlist.
    SingleMedia,
}

pub struct RemoteSourceHandler {
    extraction: Extraction,
    options: StreamOptions,
    content_key: String,
    layout: CacheLayout,
    transcoder: Arc<Transcoder>,
    client: reqwest::Client,
    shape: UpstreamShape,
    master: Option<MasterPlaylist>,
    bindings: Vec<TrackBinding>,
    /// In-memory copy of each binding's URL map, lazily loaded from disk.
    url_maps: RwLock<Vec<Option<Arc<Vec<String>>>>>,
    duration: f64,
    flight: SegmentFlight,
}

impl RemoteSourceHandler {
    /// Build the handler: classify the captured manifest, cache the active
    /// track playlists and their URL maps, and compute the total duration.
    pub async fn new(
        extraction: Extraction,
        options: StreamOptions,
        layout: CacheLayout,
        transcoder: Arc<Transcoder>,
    ) -> Result<Self> {
        let content_key = MediaSource::remote(&extraction.page_url).content_key();
        let client = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        let manifest = parse(&extraction.raw_manifest_body)?;
        let (shape, master, bindings) = Self::classify(&manifest, &options)?;

        let mut handler = Self {
            extraction,
            options,
            content_key,
            layout,
            transcoder,
            client,
            shape,
            master,
            url_maps: RwLock::new(vec![None; bindings.len()]),
            bindings,
            duration: 0.0,
            flight: SegmentFlight::new(),
        };

        for index in 0..handler.bindings.len() {
            handler.ensure_track_cached(index).await?;
        }
        handler.duration = handler.video_duration().await?;
        info!(
            content_key = %handler.content_key,
            duration = handler.duration,
            tracks = handler.bindings.len(),
            "remote source ready"
        );
        Ok(handler)
    }

    fn classify(
        manifest: &Playlist,
        options: &StreamOptions,
    ) -> Result<(UpstreamShape, Option<MasterPlaylist>, Vec<TrackBinding>)> {
        match manifest {
            Playlist::Media(_) => Ok((
                UpstreamShape::SingleMedia,
                None,
                vec![TrackBinding {
                    kind: TrackKind::Video,
                    track: 0,
                    upstream_url: String::new(),
                    muxed: true,
                }],
            )),
            Playlist::Master(master) => {
                if master.variants.is_empty() {
                    return Err(Error::MalformedManifest(
                        "master playlist has no variants".to_string(),
                    ));
                }
                let video_track = options.video_track.min(master.variants.len() - 1);
                let variant = &master.variants[video_track];

                let audio = master
                    .audio_for_variant(variant)
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| m.uri.is_some())
                    .nth(options.audio_track)
                    .or_else(|| {
                        master
                            .audio_for_variant(variant)
                            .iter()
                            .enumerate()
                            .find(|(_, m)| m.uri.is_some())
                    })
                    .map(|(i, m)| (i, m.uri.clone().unwrap_or_default()));

                match audio {
                    Some((audio_track, audio_url)) => {
                        let bindings = vec![
                            TrackBinding {
                                kind: TrackKind::Video,
                                track: video_track,
                                upstream_url: variant.uri.clone(),
                                muxed: false,
                            },
                            TrackBinding {
                                kind: TrackKind::Audio,
                                track: audio_track,
                                upstream_url: audio_url,
                                muxed: false,
                            },
                        ];
                        Ok((UpstreamShape::Demuxed, Some(master.clone()), bindings))
                    }
                    None => Ok((
                        UpstreamShape::MuxedMaster,
                        Some(master.clone()),
                        vec![TrackBinding {
                            kind: TrackKind::Video,
                            track: video_track,
                            upstream_url: variant.uri.clone(),
                            muxed: true,
                        }],
                    )),
                }
            }
        }
    }

    fn binding_for(&self, kind: TrackKind, track: usize) -> Result<(usize, &TrackBinding)> {
        self.bindings
            .iter()
            .enumerate()
            .find(|(_, b)| b.kind == kind && b.track == track)
            .ok_or_else(|| {
                Error::NotFound(format!("no {}_{track} track for this source", kind.as_str()))
            })
    }

    fn binding_by_kind(&self, kind: TrackKind) -> Result<(usize, &TrackBinding)> {
        self.bindings
            .iter()
            .enumerate()
            .find(|(_, b)| b.kind == kind)
            .ok_or_else(|| {
                Error::NotFound(format!("no {} track for this source", kind.as_str()))
            })
    }

    /// Fetch text from upstream with the captured session credentials.
    async fn fetch_upstream_text(&self, url: &str) -> Result<String> {
        let response = self.upstream_get(url).await?;
        Ok(response.text().await?)
    }

    async fn upstream_get(&self, url: &str) -> Result<reqwest::Response> {
        let send = || async {
            let mut request = self.client.get(url);
            for (name, value) in &self.extraction.headers {
                request = request.header(name.as_str(), value.as_str());
            }
            if let Some(cookie) = self.extraction.cookie_header() {
                request = request.header("Cookie", cookie);
            }
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::Upstream {
                    status: Some(status.as_u16()),
                    message: format!("upstream returned {status} for {url}"),
                });
            }
            Ok(response)
        };

        // One retry on upstream 5xx before surfacing the error.
        send.retry(
            ConstantBuilder::default()
                .with_delay(UPSTREAM_RETRY_BACKOFF)
                .with_max_times(1),
        )
        .when(Error::is_upstream_server_error)
        .notify(|err: &Error, _| warn!(%err, "retrying upstream request"))
        .await
    }

    /// Make sure a binding's playlist and URL map exist on disk, fetching
    /// from upstream on first touch. The segment ordering is immutable once
    /// observed; the map file is authoritative afterwards.
    async fn ensure_track_cached(&self, binding_index: usize) -> Result<()> {
        let binding = &self.bindings[binding_index];
        let playlist_path =
            self.layout
                .track_playlist_path(&self.content_key, binding.kind, binding.track);
        let map_path = self
            .layout
            .url_map_path(&self.content_key, binding.kind, binding.track);

        if playlist_path.exists() && map_path.exists() {
            return Ok(());
        }

        let (base, text) = if binding.upstream_url.is_empty() {
            (
                self.extraction.resolve_base().to_string(),
                self.extraction.raw_manifest_body.clone(),
            )
        } else {
            let url = resolve_uri(self.extraction.resolve_base(), &binding.upstream_url);
            (url.clone(), self.fetch_upstream_text(&url).await?)
        };

        let playlist = parse(&text)?;
        let media = playlist
            .as_media()
            .ok_or_else(|| Error::MalformedManifest("expected a media playlist".to_string()))?;
        let urls: Vec<String> = media
            .segments
            .iter()
            .map(|s| resolve_uri(&base, &s.uri))
            .collect();

        write_atomic(&playlist_path, text.as_bytes()).await?;
        write_atomic(&map_path, &serde_json::to_vec_pretty(&urls)?).await?;
        debug!(
            kind = binding.kind.as_str(),
            track = binding.track,
            segments = urls.len(),
            "cached upstream track playlist"
        );
        Ok(())
    }

    /// The authoritative segment-index → upstream-URL map for a binding.
    async fn url_map(&self, binding_index: usize) -> Result<Arc<Vec<String>>> {
        if let Some(map) = &self.url_maps.read()[binding_index] {
            return Ok(map.clone());
        }

        let binding = &self.bindings[binding_index];
        let map_path = self
            .layout
            .url_map_path(&self.content_key, binding.kind, binding.track);

        let urls: Vec<String> = match tokio::fs::read(&map_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(_) => {
                // Rebuild from the cached playlist (or upstream).
                self.ensure_track_cached(binding_index).await?;
                serde_json::from_slice(&tokio::fs::read(&map_path).await?)?
            }
        };

        let map = Arc::new(urls);
        self.url_maps.write()[binding_index] = Some(map.clone());
        Ok(map)
    }

    /// Download one raw segment to cache, atomically. A cancelled download
    /// never leaves a partial file behind.
    async fn download_raw(
        &self,
        url: &str,
        raw_path: &PathBuf,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(parent) = raw_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self.upstream_get(url).await?;
        let tmp = raw_path.with_extension("download");
        let mut file = tokio::fs::File::create(&tmp).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        loop {
            let chunk = tokio::select! {
                chunk = stream.next() => chunk,
                () = cancel.cancelled() => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(Error::Cancelled);
                }
            };
            match chunk {
                Some(Ok(bytes)) => {
                    file.write_all(&bytes).await?;
                    written += bytes.len() as u64;
                }
                Some(Err(e)) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(e.into());
                }
                None => break,
            }
        }
        file.flush().await?;
        drop(file);

        if written == 0 {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::Upstream {
                status: None,
                message: format!("empty segment body from {url}"),
            });
        }
        tokio::fs::rename(&tmp, raw_path).await?;
        Ok(())
    }

    async fn raw_cached(&self, raw_path: &PathBuf) -> bool {
        match tokio::fs::metadata(raw_path).await {
            Ok(meta) => meta.len() > 0,
            Err(_) => false,
        }
    }

    /// Remux one raw segment into receiver-compatible MPEG-TS. Muxed inputs
    /// try a video stream copy first and re-encode when the copy fails.
    async fn remux(
        &self,
        binding: &TrackBinding,
        raw_path: &PathBuf,
        out_path: &PathBuf,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mapping = match (binding.kind, binding.muxed) {
            (_, true) => StreamMapping::CopyMuxed,
            (TrackKind::Video, false) => StreamMapping::CopyVideo,
            (TrackKind::Audio, false) => StreamMapping::AudioOnly,
            (TrackKind::Subtitle, _) => {
                return Err(Error::NotFound("subtitle tracks have no segments".to_string()))
            }
        };
        let options = TranscodeOptions {
            mapping,
            ..TranscodeOptions::default()
        };

        let result = self
            .transcoder
            .transcode_segment(
                &options,
                TranscodeInput::File(raw_path.clone()),
                TranscodeTarget::File(out_path.clone()),
                cancel,
            )
            .await;

        match result {
            Err(Error::TranscoderFailed { stderr }) if binding.muxed => {
                warn!("stream copy failed, re-encoding muxed segment: {stderr}");
                let options = TranscodeOptions {
                    mapping: StreamMapping::ReencodeMuxed,
                    ..TranscodeOptions::default()
                };
                self.transcoder
                    .transcode_segment(
                        &options,
                        TranscodeInput::File(raw_path.clone()),
                        TranscodeTarget::File(out_path.clone()),
                        cancel,
                    )
                    .await
                    .map(|_| ())
            }
            other => other.map(|_| ()),
        }
    }

    /// Download (and optionally remux) one segment. Serves both the origin
    /// server and the background downloader's raw-only path.
    async fn materialize_segment(
        &self,
        binding_index: usize,
        index: usize,
        raw: bool,
        cancel: CancellationToken,
    ) -> Result<SegmentPayload> {
        let binding = self.bindings[binding_index].clone();
        let urls = self.url_map(binding_index).await?;
        let Some(url) = urls.get(index).cloned() else {
            return Err(Error::NotFound(format!(
                "segment {index} out of range (0..{})",
                urls.len()
            )));
        };

        let raw_path = self
            .layout
            .raw_segment_path(&self.content_key, binding.kind, binding.track, index);

        if raw {
            if self.raw_cached(&raw_path).await {
                return Ok(SegmentPayload::File(raw_path.clone()));
            }
            let key = SegmentKey::new(&self.content_key, binding.kind, binding.track, index, true);
            return self
                .flight
                .run(key, async {
                    if !self.raw_cached(&raw_path).await {
                        self.download_raw(&url, &raw_path, &cancel).await?;
                    }
                    Ok(SegmentPayload::File(raw_path.clone()))
                })
                .await;
        }

        let out_path = self
            .layout
            .segment_path(&self.content_key, binding.kind, binding.track, index);
        if out_path.exists() {
            return Ok(SegmentPayload::File(out_path.clone()));
        }

        rapid_seek_gate(&cancel).await?;

        let key = SegmentKey::new(&self.content_key, binding.kind, binding.track, index, false);
        self.flight
            .run(key, async {
                if out_path.exists() {
                    return Ok(SegmentPayload::File(out_path.clone()));
                }
                if !self.raw_cached(&raw_path).await {
                    self.download_raw(&url, &raw_path, &cancel).await?;
                }
                self.remux(&binding, &raw_path, &out_path, &cancel).await?;
                Ok(SegmentPayload::File(out_path.clone()))
            })
            .await
    }

    /// Rewritten local URI for one segment of a binding.
    fn local_segment_uri(binding: &TrackBinding, index: usize) -> String {
        format!(
            "/{}_{}/segment_{}.ts",
            binding.kind.as_str(),
            binding.track,
            index
        )
    }

    /// The cached upstream playlist for a binding, with segment URIs
    /// rewritten to point into this server. KEY, MAP, BYTERANGE and
    /// PROGRAM-DATE-TIME tags pass through unchanged.
    async fn rewritten_track_playlist(&self, binding_index: usize) -> Result<String> {
        self.ensure_track_cached(binding_index).await?;
        let binding = &self.bindings[binding_index];
        let playlist_path =
            self.layout
                .track_playlist_path(&self.content_key, binding.kind, binding.track);
        let text = tokio::fs::read_to_string(&playlist_path).await?;
        let playlist = parse(&text)?;
        let Playlist::Media(mut media) = playlist else {
            return Err(Error::MalformedManifest(
                "cached track playlist is not a media playlist".to_string(),
            ));
        };

        for (index, segment) in media.segments.iter_mut().enumerate() {
            segment.uri = Self::local_segment_uri(binding, index);
        }
        // VOD output dialect: the receiver must see a bounded playlist.
        media.end_list = true;
        if media.playlist_type.is_none() {
            media.playlist_type = Some("VOD".to_string());
        }
        Ok(generate(&Playlist::Media(media)))
    }

    async fn video_duration(&self) -> Result<f64> {
        let (binding_index, _) = self.binding_by_kind(TrackKind::Video)?;
        let binding = &self.bindings[binding_index];
        let playlist_path =
            self.layout
                .track_playlist_path(&self.content_key, binding.kind, binding.track);
        let text = tokio::fs::read_to_string(&playlist_path).await?;
        let playlist = parse(&text)?;
        playlist
            .as_media()
            .map(crate::playlist::MediaPlaylist::total_duration)
            .ok_or_else(|| Error::MalformedManifest("video playlist is not media".to_string()))
    }

    /// Number of segments in one bound track; used by the downloader.
    pub async fn segment_count(&self, kind: TrackKind, track: usize) -> Result<usize> {
        let (binding_index, _) = self.binding_for(kind, track)?;
        Ok(self.url_map(binding_index).await?.len())
    }

    /// The tracks this handler serves, as `(kind, index)` pairs.
    #[must_use]
    pub fn tracks(&self) -> Vec<(TrackKind, usize)> {
        self.bindings.iter().map(|b| (b.kind, b.track)).collect()
    }

    #[must_use]
    pub fn content_key(&self) -> &str {
        &self.content_key
    }
}

#[async_trait]
impl StreamHandler for RemoteSourceHandler {
    async fn serve_manifest(&self) -> Result<String> {
        match &self.shape {
            UpstreamShape::SingleMedia => {
                let (binding_index, _) = self.binding_by_kind(TrackKind::Video)?;
                self.rewritten_track_playlist(binding_index).await
            }
            UpstreamShape::MuxedMaster | UpstreamShape::Demuxed => {
                let upstream = self
                    .master
                    .as_ref()
                    .ok_or_else(|| Error::Internal("master playlist missing".to_string()))?;
                let (_, video) = self.binding_by_kind(TrackKind::Video)?;
                let source_variant = &upstream.variants[video.track];

                let mut master = MasterPlaylist {
                    version: upstream.version,
                    independent_segments: upstream.independent_segments,
                    ..MasterPlaylist::default()
                };
                let mut variant = source_variant.clone();
                variant.uri = TrackKind::Video.playlist_name().to_string();
                variant.remove_attr("AUDIO");
                variant.remove_attr("SUBTITLES");

                if matches!(self.shape, UpstreamShape::Demuxed) {
                    let (_, audio) = self.binding_by_kind(TrackKind::Audio)?;
                    let upstream_media = upstream
                        .audio_for_variant(source_variant)
                        .get(audio.track)
                        .cloned()
                        .unwrap_or_default();
                    let mut media = upstream_media;
                    media.group_id = "audio".to_string();
                    media.uri = Some(TrackKind::Audio.playlist_name().to_string());
                    media
                        .attrs
                        .insert("GROUP-ID".to_string(), "audio".to_string());
                    media.attrs.insert(
                        "URI".to_string(),
                        TrackKind::Audio.playlist_name().to_string(),
                    );
                    media
                        .attrs
                        .entry("NAME".to_string())
                        .or_insert_with(|| "Audio".to_string());
                    media
                        .attrs
                        .insert("DEFAULT".to_string(), "YES".to_string());
                    master.audio_groups.insert("audio".to_string(), vec![media]);
                    variant.set_attr("AUDIO", "audio");
                }

                master.variants.push(variant);
                Ok(generate(&Playlist::Master(master)))
            }
        }
    }

    async fn serve_track_playlist(&self, kind: TrackKind) -> Result<String> {
        let (binding_index, _) = self.binding_by_kind(kind)?;
        self.rewritten_track_playlist(binding_index).await
    }

    async fn serve_segment(
        &self,
        kind: TrackKind,
        track: usize,
        index: usize,
        raw: bool,
        cancel: CancellationToken,
    ) -> Result<SegmentPayload> {
        let (binding_index, _) = self.binding_for(kind, track)?;
        self.materialize_segment(binding_index, index, raw, cancel)
            .await
    }

    async fn serve_subtitles(&self) -> Result<String> {
        if self.options.burn_in {
            return Err(Error::NoSubtitles);
        }
        let subtitle = match &self.options.subtitle {
            SubtitleSelection::None => return Err(Error::NoSubtitles),
            SubtitleSelection::External(path) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::NotFound(format!("subtitle file {}: {e}", path.display()))
                })?;
                WebVtt::parse(&text)?
            }
            SubtitleSelection::Embedded(index) => {
                let captured = self.extraction.subtitles.get(*index).ok_or_else(|| {
                    Error::NotFound(format!("no captured subtitle at index {index}"))
                })?;
                let text = if captured.content.is_empty() {
                    let response = self.upstream_get(&captured.url).await?;
                    let bytes = response.bytes().await?;
                    decode(&bytes, &captured.charset)
                } else {
                    captured.content.clone()
                };
                WebVtt::parse(&text)?
            }
        };

        let subtitle = if self.options.ignore_closed_captions {
            strip_closed_captions(&subtitle)
        } else {
            subtitle
        };
        Ok(subtitle.to_string())
    }

    fn duration(&self) -> f64 {
        self.duration
    }
}
