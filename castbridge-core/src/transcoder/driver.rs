//! External transcoder subprocess driver.
//!
//! One invocation produces one segment slice (or one subtitle extract).
//! Cancellation kills the child and removes any partially written output;
//! non-zero exits surface the captured stderr.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::locate;
use super::options::{subtitle_extract_args, TranscodeOptions};

/// Input handed to the transcoder: a file on disk or bytes fed via stdin.
#[derive(Debug, Clone)]
pub enum TranscodeInput {
    File(PathBuf),
    Buffer(Bytes),
}

/// Where output goes: a file on disk or a captured stdout buffer.
#[derive(Debug, Clone)]
pub enum TranscodeTarget {
    File(PathBuf),
    Stdout,
}

/// Lazily resolved transcoder binary plus the invocation primitives built on
/// top of it.
pub struct Transcoder {
    candidates: Vec<String>,
    binary: OnceCell<PathBuf>,
}

impl Transcoder {
    #[must_use]
    pub fn new(candidates: Vec<String>) -> Self {
        let candidates = if candidates.is_empty() {
            locate::default_candidates()
        } else {
            candidates
        };
        Self {
            candidates,
            binary: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_defaults() -> Arc<Self> {
        Arc::new(Self::new(Vec::new()))
    }

    /// Resolve the binary, once. Missing binaries surface on first use, not
    /// at construction.
    async fn binary(&self) -> Result<&PathBuf> {
        self.binary
            .get_or_try_init(|| {
                let candidates = self.candidates.clone();
                async move { locate::resolve(&candidates) }
            })
            .await
    }

    /// Probe a media container for its duration in seconds.
    pub async fn media_duration(&self, media: &Path) -> Result<f64> {
        let binary = self.binary().await?;
        super::probe::media_duration(binary, media).await
    }

    /// Transcode one segment slice. Returns the stdout buffer for
    /// [`TranscodeTarget::Stdout`], `None` when writing to a file.
    pub async fn transcode_segment(
        &self,
        options: &TranscodeOptions,
        input: TranscodeInput,
        target: TranscodeTarget,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>> {
        let input_arg = match &input {
            TranscodeInput::File(path) => path.to_string_lossy().into_owned(),
            TranscodeInput::Buffer(_) => "pipe:0".to_string(),
        };
        let output_arg = match &target {
            TranscodeTarget::File(path) => path.to_string_lossy().into_owned(),
            TranscodeTarget::Stdout => "pipe:1".to_string(),
        };
        let args = options.build_args(&input_arg, &output_arg);
        self.run(&args, input, target, cancel).await
    }

    /// Extract one embedded subtitle stream (`0:s:<index>`) as WebVTT.
    pub async fn extract_subtitle(
        &self,
        input: &Path,
        stream_index: usize,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let args = subtitle_extract_args(
            &input.to_string_lossy(),
            stream_index,
            &output.to_string_lossy(),
        );
        self.run(
            &args,
            TranscodeInput::File(input.to_path_buf()),
            TranscodeTarget::File(output.to_path_buf()),
            cancel,
        )
        .await
        .map(|_| ())
    }

    async fn run(
        &self,
        args: &[String],
        input: TranscodeInput,
        target: TranscodeTarget,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let binary = self.binary().await?;
        debug!(binary = %binary.display(), args = ?args, "spawning transcoder");

        if let TranscodeTarget::File(path) = &target {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut command = Command::new(binary);
        command
            .args(args)
            .stdin(match input {
                TranscodeInput::Buffer(_) => Stdio::piped(),
                TranscodeInput::File(_) => Stdio::null(),
            })
            .stdout(match target {
                TranscodeTarget::Stdout => Stdio::piped(),
                TranscodeTarget::File(_) => Stdio::null(),
            })
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::TranscoderUnavailable {
                    candidates: vec![binary.to_string_lossy().into_owned()],
                }
            } else {
                e.into()
            }
        })?;

        if let TranscodeInput::Buffer(bytes) = input {
            if let Some(mut stdin) = child.stdin.take() {
                tokio::spawn(async move {
                    let _ = stdin.write_all(&bytes).await;
                    let _ = stdin.shutdown().await;
                });
            }
        }

        let stdout_task = child.stdout.take().map(|mut stdout| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stdout.read_to_end(&mut buf).await;
                buf
            })
        });
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        let status = tokio::select! {
            status = child.wait() => status?,
            () = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                remove_partial(&target).await;
                return Err(Error::Cancelled);
            }
        };

        if !status.success() {
            let stderr = match stderr_task {
                Some(task) => String::from_utf8_lossy(&task.await.unwrap_or_default()).into_owned(),
                None => String::new(),
            };
            warn!(code = ?status.code(), "transcoder exited with an error");
            remove_partial(&target).await;
            return Err(Error::TranscoderFailed { stderr });
        }

        match (target, stdout_task) {
            (TranscodeTarget::Stdout, Some(task)) => {
                Ok(Some(Bytes::from(task.await.unwrap_or_default())))
            }
            _ => Ok(None),
        }
    }
}

async fn remove_partial(target: &TranscodeTarget) {
    if let TranscodeTarget::File(path) = target {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to remove partial output");
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// A stand-in transcoder: writes a marker to its last argument (or
    /// stdout for `pipe:1`) and exits 0.
    fn fake_transcoder(dir: &Path) -> PathBuf {
        let bin = dir.join("fake-transcoder");
        std::fs::write(
            &bin,
            "#!/bin/sh\nfor last; do :; done\nif [ \"$last\" = \"pipe:1\" ]; then printf TSDATA; else printf TSDATA > \"$last\"; fi\n",
        )
        .unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        bin
    }

    fn failing_transcoder(dir: &Path) -> PathBuf {
        let bin = dir.join("failing-transcoder");
        std::fs::write(
            &bin,
            "#!/bin/sh\nfor last; do :; done\nprintf partial > \"$last\"\necho 'encoder blew up' >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        bin
    }

    fn hanging_transcoder(dir: &Path) -> PathBuf {
        let bin = dir.join("hanging-transcoder");
        std::fs::write(
            &bin,
            "#!/bin/sh\nfor last; do :; done\nprintf partial > \"$last\"\nsleep 30\n",
        )
        .unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        bin
    }

    #[tokio::test]
    async fn test_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder =
            Transcoder::new(vec![fake_transcoder(dir.path()).to_string_lossy().into_owned()]);
        let out = dir.path().join("cache/segment_0.ts");

        let result = transcoder
            .transcode_segment(
                &TranscodeOptions::default(),
                TranscodeInput::File(dir.path().join("in.mkv")),
                TranscodeTarget::File(out.clone()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(std::fs::read(&out).unwrap(), b"TSDATA");
    }

    #[tokio::test]
    async fn test_stdout_capture() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder =
            Transcoder::new(vec![fake_transcoder(dir.path()).to_string_lossy().into_owned()]);

        let bytes = transcoder
            .transcode_segment(
                &TranscodeOptions::default(),
                TranscodeInput::File(dir.path().join("in.mkv")),
                TranscodeTarget::Stdout,
                &CancellationToken::new(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&bytes[..], b"TSDATA");
    }

    #[tokio::test]
    async fn test_failure_removes_partial_and_captures_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Transcoder::new(vec![failing_transcoder(dir.path())
            .to_string_lossy()
            .into_owned()]);
        let out = dir.path().join("segment_0.ts");

        let result = transcoder
            .transcode_segment(
                &TranscodeOptions::default(),
                TranscodeInput::File(dir.path().join("in.mkv")),
                TranscodeTarget::File(out.clone()),
                &CancellationToken::new(),
            )
            .await;

        match result {
            Err(Error::TranscoderFailed { stderr }) => {
                assert!(stderr.contains("encoder blew up"));
            }
            other => panic!("expected TranscoderFailed, got {other:?}"),
        }
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_cancellation_kills_child_and_removes_partial() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Transcoder::new(vec![hanging_transcoder(dir.path())
            .to_string_lossy()
            .into_owned()]);
        let out = dir.path().join("segment_0.ts");
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            cancel_clone.cancel();
        });

        let result = transcoder
            .transcode_segment(
                &TranscodeOptions::default(),
                TranscodeInput::File(dir.path().join("in.mkv")),
                TranscodeTarget::File(out.clone()),
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_skips_spawn() {
        let transcoder = Transcoder::new(vec!["/nonexistent/bin".to_string()]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = transcoder
            .transcode_segment(
                &TranscodeOptions::default(),
                TranscodeInput::File(PathBuf::from("/in.mkv")),
                TranscodeTarget::Stdout,
                &cancel,
            )
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_transcoder_unavailable() {
        let transcoder = Transcoder::new(vec!["/nonexistent/bin".to_string()]);
        let result = transcoder
            .transcode_segment(
                &TranscodeOptions::default(),
                TranscodeInput::File(PathBuf::from("/in.mkv")),
                TranscodeTarget::Stdout,
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(Error::TranscoderUnavailable { .. })));
    }
}
