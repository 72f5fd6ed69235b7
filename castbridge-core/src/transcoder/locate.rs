//! Transcoder binary discovery.
//!
//! The external transcoder is resolved lazily on first use from an ordered,
//! platform-specific search path. A missing binary surfaces as
//! `TranscoderUnavailable` carrying every candidate that was tried.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Ordered candidates for the transcoder binary on this platform.
#[must_use]
pub fn default_candidates() -> Vec<String> {
    let mut candidates = vec!["ffmpeg".to_string()];
    if cfg!(target_os = "macos") {
        candidates.push("/opt/homebrew/bin/ffmpeg".to_string());
        candidates.push("/usr/local/bin/ffmpeg".to_string());
    } else if cfg!(target_os = "windows") {
        candidates.push("ffmpeg.exe".to_string());
    } else {
        candidates.push("/usr/bin/ffmpeg".to_string());
        candidates.push("/usr/local/bin/ffmpeg".to_string());
    }
    candidates
}

/// Resolve the first candidate that exists. Bare names are searched on
/// `PATH`; names with separators are checked directly.
pub fn resolve(candidates: &[String]) -> Result<PathBuf> {
    for candidate in candidates {
        let path = Path::new(candidate);
        if path.components().count() > 1 {
            if path.is_file() {
                return Ok(path.to_path_buf());
            }
            continue;
        }
        if let Some(found) = search_path(candidate) {
            return Ok(found);
        }
    }
    Err(Error::TranscoderUnavailable {
        candidates: candidates.to_vec(),
    })
}

/// The probing sibling of a transcoder binary (`ffmpeg` → `ffprobe`).
#[must_use]
pub fn prober_for(transcoder: &Path) -> PathBuf {
    let name = transcoder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let probe_name = if name.contains("ffmpeg") {
        name.replace("ffmpeg", "ffprobe")
    } else {
        "ffprobe".to_string()
    };
    transcoder.with_file_name(probe_name)
}

fn search_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_lists_candidates() {
        let candidates = vec![
            "/nonexistent/dir/transcoder".to_string(),
            "definitely-not-a-real-binary-name".to_string(),
        ];
        match resolve(&candidates) {
            Err(Error::TranscoderUnavailable { candidates: c }) => {
                assert_eq!(c.len(), 2);
            }
            other => panic!("expected TranscoderUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_explicit_path_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("transcoder");
        std::fs::write(&bin, b"#!/bin/sh\n").unwrap();
        let resolved = resolve(&[bin.to_string_lossy().into_owned()]).unwrap();
        assert_eq!(resolved, bin);
    }

    #[test]
    fn test_prober_name_derivation() {
        assert_eq!(
            prober_for(Path::new("/usr/bin/ffmpeg")),
            PathBuf::from("/usr/bin/ffprobe")
        );
        assert_eq!(
            prober_for(Path::new("ffmpeg.exe")),
            PathBuf::from("ffprobe.exe")
        );
        assert_eq!(
            prober_for(Path::new("/opt/tools/transcode")),
            PathBuf::from("/opt/tools/ffprobe")
        );
    }

    #[test]
    fn test_default_candidates_start_with_path_lookup() {
        assert_eq!(default_candidates()[0], "ffmpeg");
    }
}
