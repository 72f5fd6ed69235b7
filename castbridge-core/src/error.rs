use thiserror::Error;

/// Error kinds shared across the segment pipeline.
///
/// Every variant is `Clone` so results can be fanned out to single-flight
/// followers waiting on the same segment.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    /// A subtitle document (local file, extracted track, or captured
    /// payload) that is neither WebVTT nor SRT. Distinct from
    /// `MalformedManifest` because it never implicates the upstream origin.
    #[error("Malformed subtitle document: {0}")]
    MalformedSubtitle(String),

    #[error("Upstream error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("Transcoder binary not found; searched: {}", candidates.join(", "))]
    TranscoderUnavailable { candidates: Vec<String> },

    #[error("Transcoder exited with an error: {stderr}")]
    TranscoderFailed { stderr: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Subtitles are disabled or burned into the video")]
    NoSubtitles,

    #[error("Cached extraction is no longer valid: {0}")]
    ExtractionStale(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error represents cooperative cancellation rather than a
    /// failure. Cancellation is not surfaced to callers as an error response.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the upstream response carried a 5xx status (retry candidate).
    #[must_use]
    pub fn is_upstream_server_error(&self) -> bool {
        matches!(self, Self::Upstream { status: Some(s), .. } if (500..600).contains(s))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
