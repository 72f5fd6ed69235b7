//! Transcoder argv construction.
//!
//! The argv shape is the contract with the external transcoder: segments are
//! MPEG-TS with normalized timestamps so the receiver can splice
//! independently produced slices.

use std::path::PathBuf;

/// Which streams the invocation maps and how they are encoded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamMapping {
    /// Full re-encode: platform H.264 encoder + AAC. Local file slices.
    #[default]
    Transcode,
    /// Copy the video elementary stream; video-only remote tracks.
    CopyVideo,
    /// Re-encode audio to AAC; audio-only remote tracks.
    AudioOnly,
    /// Muxed remote segments: copy video, re-encode audio.
    CopyMuxed,
    /// Fallback for muxed segments whose video stream cannot be copied.
    ReencodeMuxed,
}

/// A burned-in subtitle source for the `-vf subtitles=` filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnIn {
    /// Path handed to the filter: the input itself for embedded tracks, or a
    /// per-track symlink for external files.
    pub path: PathBuf,
    /// Subtitle stream index within the input, for embedded tracks.
    pub stream_index: Option<usize>,
    pub font_size: u32,
}

/// One transcoder invocation.
#[derive(Debug, Clone, Default)]
pub struct TranscodeOptions {
    pub start_time: Option<f64>,
    pub duration: Option<f64>,
    pub mapping: StreamMapping,
    pub bitrate: Option<String>,
    pub max_output_width: u32,
    pub burn_in: Option<BurnIn>,
}

/// The hardware H.264 encoder for the current platform. Falls back to a
/// software encode where no portable hardware path exists.
#[must_use]
pub fn platform_video_encoder() -> &'static str {
    if cfg!(target_os = "macos") {
        "h264_videotoolbox"
    } else if cfg!(target_os = "windows") {
        "h264_mf"
    } else {
        "libx264"
    }
}

impl TranscodeOptions {
    /// Build the full argv (minus the binary itself) for this invocation.
    #[must_use]
    pub fn build_args(&self, input: &str, output: &str) -> Vec<String> {
        let mut args: Vec<String> = vec!["-y".into()];

        if let Some(start) = self.start_time {
            args.push("-ss".into());
            args.push(format!("{start}"));
        }
        if let Some(duration) = self.duration {
            args.push("-t".into());
            args.push(format!("{duration}"));
        }
        args.push("-i".into());
        args.push(input.into());

        match &self.mapping {
            StreamMapping::Transcode => {
                args.extend(encode_video_args());
                args.extend(encode_audio_args());
            }
            StreamMapping::CopyVideo => {
                args.extend(["-map", "0:v", "-c:v", "copy"].map(String::from));
            }
            StreamMapping::AudioOnly => {
                args.extend(["-map", "0:a"].map(String::from));
                args.extend(encode_audio_args());
            }
            StreamMapping::CopyMuxed => {
                args.extend(["-map", "0:v", "-map", "0:a?", "-c:v", "copy"].map(String::from));
                args.extend(encode_audio_args());
            }
            StreamMapping::ReencodeMuxed => {
                args.extend(["-map", "0:v", "-map", "0:a?"].map(String::from));
                args.extend(encode_video_args());
                args.extend(encode_audio_args());
            }
        }

        if let Some(bitrate) = &self.bitrate {
            args.push("-b:v".into());
            args.push(bitrate.clone());
        }

        if let Some(filter) = self.video_filter() {
            args.push("-vf".into());
            args.push(filter);
        }

        args.extend(
            [
                "-vsync",
                "cfr",
                "-g",
                "48",
                "-f",
                "mpegts",
                "-copyts",
                "-avoid_negative_ts",
                "make_zero",
                "-start_at_zero",
                "-muxdelay",
                "0",
                "-muxpreload",
                "0",
            ]
            .map(String::from),
        );

        args.push(output.into());
        args
    }

    /// The `-vf` chain: a width clamp first, then subtitle burn-in.
    fn video_filter(&self) -> Option<String> {
        if !matches!(
            self.mapping,
            StreamMapping::Transcode | StreamMapping::ReencodeMuxed
        ) {
            return None;
        }

        let mut filters = Vec::new();
        if self.max_output_width > 0 {
            filters.push(format!("scale='min({},iw)':-2", self.max_output_width));
        }
        if let Some(burn) = &self.burn_in {
            let path = burn.path.to_string_lossy();
            match burn.stream_index {
                Some(index) => filters.push(format!(
                    "subtitles='{path}':si={index}:force_style='FontSize={}'",
                    burn.font_size
                )),
                None => filters.push(format!(
                    "subtitles='{path}':force_style='FontSize={}'",
                    burn.font_size
                )),
            }
        }

        if filters.is_empty() {
            None
        } else {
            Some(filters.join(","))
        }
    }
}

fn encode_video_args() -> Vec<String> {
    vec![
        "-c:v".into(),
        platform_video_encoder().into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
    ]
}

fn encode_audio_args() -> Vec<String> {
    ["-c:a", "aac", "-b:a", "128k", "-ac", "2"]
        .map(String::from)
        .to_vec()
}

/// Argv for extracting one embedded subtitle stream as WebVTT.
#[must_use]
pub fn subtitle_extract_args(input: &str, stream_index: usize, output: &str) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-map".into(),
        format!("0:s:{stream_index}"),
        "-f".into(),
        "webvtt".into(),
        output.into(),
    ]
}
