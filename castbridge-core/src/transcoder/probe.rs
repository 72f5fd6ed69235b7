//! Container duration probing.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

use super::locate;

/// Probe a media container and return its duration in seconds.
///
/// Uses the probing sibling of the transcoder binary (`ffprobe` for
/// `ffmpeg`), asking only for the format duration.
pub async fn media_duration(transcoder_binary: &Path, media: &Path) -> Result<f64> {
    let prober = locate::prober_for(transcoder_binary);
    debug!(prober = %prober.display(), media = %media.display(), "probing duration");

    let output = Command::new(&prober)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(media)
        .stdin(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::TranscoderUnavailable {
                    candidates: vec![prober.to_string_lossy().into_owned()],
                }
            } else {
                Error::from(e)
            }
        })?;

    if !output.status.success() {
        return Err(Error::TranscoderFailed {
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let text = String::from_utf8_lossy(&output.stdout);
    text.trim()
        .parse::<f64>()
        .map_err(|_| Error::Internal(format!("unparseable duration: {:?}", text.trim())))
}
