//! Origin binding state.
//!
//! The HTTP server holds exactly one stream handler at a time. Binding a new
//! handler cancels every context handed out for the previous one, which
//! tears down in-flight transcodes and downloads.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Error, Result};
use crate::handler::StreamHandler;

/// Keep-awake refresh TTL: each served request re-arms the inhibitor for
/// this long.
pub const KEEP_AWAKE_TTL: Duration = Duration::from_secs(30);

/// System sleep inhibition, implemented by the shell. The core only refreshes
/// a token with an expiry; OS specifics live outside.
pub trait KeepAwake: Send + Sync {
    fn refresh(&self, ttl: Duration);
}

/// No-op inhibitor for headless and test use.
pub struct NoopKeepAwake;

impl KeepAwake for NoopKeepAwake {
    fn refresh(&self, _ttl: Duration) {}
}

struct Bound {
    handler: Arc<dyn StreamHandler>,
    cancel: CancellationToken,
}

/// The handler slot shared between the cast session and the HTTP surface.
pub struct Origin {
    bound: RwLock<Option<Bound>>,
    keep_awake: Arc<dyn KeepAwake>,
}

impl Origin {
    #[must_use]
    pub fn new(keep_awake: Arc<dyn KeepAwake>) -> Arc<Self> {
        Arc::new(Self {
            bound: RwLock::new(None),
            keep_awake,
        })
    }

    /// Bind a handler, cancelling whatever the previous one was doing.
    pub fn bind(&self, handler: Arc<dyn StreamHandler>) {
        let previous = self.bound.write().replace(Bound {
            handler,
            cancel: CancellationToken::new(),
        });
        if let Some(previous) = previous {
            previous.cancel.cancel();
            info!("previous handler unbound, in-flight requests cancelled");
        }
    }

    /// Drop the bound handler, cancelling its in-flight requests.
    pub fn unbind(&self) {
        if let Some(previous) = self.bound.write().take() {
            previous.cancel.cancel();
        }
    }

    /// The bound handler plus the cancellation root for request contexts.
    pub fn handler(&self) -> Result<(Arc<dyn StreamHandler>, CancellationToken)> {
        self.bound
            .read()
            .as_ref()
            .map(|b| (b.handler.clone(), b.cancel.clone()))
            .ok_or_else(|| Error::NotFound("no media is currently bound".to_string()))
    }

    /// Re-arm the sleep inhibitor; called once per served request.
    pub fn touch(&self) {
        self.keep_awake.refresh(KEEP_AWAKE_TTL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::handler::SegmentPayload;
    use crate::models::TrackKind;

    struct StubHandler;

    #[async_trait]
    impl StreamHandler for StubHandler {
        async fn serve_manifest(&self) -> Result<String> {
            Ok("#EXTM3U\n".to_string())
        }
        async fn serve_track_playlist(&self, _kind: TrackKind) -> Result<String> {
            Ok("#EXTM3U\n".to_string())
        }
        async fn serve_segment(
            &self,
            _kind: TrackKind,
            _track: usize,
            _index: usize,
            _raw: bool,
            _cancel: CancellationToken,
        ) -> Result<SegmentPayload> {
            Err(Error::NotFound("stub".to_string()))
        }
        async fn serve_subtitles(&self) -> Result<String> {
            Err(Error::NoSubtitles)
        }
        fn duration(&self) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_unbound_origin_has_no_handler() {
        let origin = Origin::new(Arc::new(NoopKeepAwake));
        assert!(matches!(origin.handler(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_rebind_cancels_previous_contexts() {
        let origin = Origin::new(Arc::new(NoopKeepAwake));
        origin.bind(Arc::new(StubHandler));
        let (_, first_cancel) = origin.handler().unwrap();
        assert!(!first_cancel.is_cancelled());

        origin.bind(Arc::new(StubHandler));
        assert!(first_cancel.is_cancelled());

        let (_, second_cancel) = origin.handler().unwrap();
        assert!(!second_cancel.is_cancelled());
    }

    #[test]
    fn test_unbind_cancels_and_clears() {
        let origin = Origin::new(Arc::new(NoopKeepAwake));
        origin.bind(Arc::new(StubHandler));
        let (_, cancel) = origin.handler().unwrap();
        origin.unbind();
        assert!(cancel.is_cancelled());
        assert!(origin.handler().is_err());
    }
}
