//! Per-segment single-flight.
//!
//! Collapses concurrent demands for one segment into a single execution:
//! the first request transcodes or downloads, followers await the winner's
//! result. Backed by the `async_singleflight` crate, which handles leader
//! failure with automatic retry.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::handler::SegmentPayload;
use crate::models::TrackKind;

/// Identity of one unit of segment work. `raw` distinguishes the upstream
/// download from the remux of the same segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub content_key: String,
    pub kind: TrackKind,
    pub track: usize,
    pub index: usize,
    pub raw: bool,
}

impl SegmentKey {
    #[must_use]
    pub fn new(content_key: &str, kind: TrackKind, track: usize, index: usize, raw: bool) -> Self {
        Self {
            content_key: content_key.to_string(),
            kind,
            track,
            index,
            raw,
        }
    }
}

/// Single-flight group over segment work.
#[derive(Clone, Default)]
pub struct SegmentFlight {
    group: Arc<async_singleflight::Group<SegmentKey, SegmentPayload, Error>>,
}

impl SegmentFlight {
    #[must_use]
    pub fn new() -> Self {
        Self {
            group: Arc::new(async_singleflight::Group::new()),
        }
    }

    /// Run `work` for `key`, or await an in-flight execution for the same
    /// key. `Err(None)` from the library means the leader was dropped after
    /// retries; surfaced as cancellation since that is the only way a leader
    /// disappears here.
    pub async fn run<Fut>(&self, key: SegmentKey, work: Fut) -> Result<SegmentPayload>
    where
        Fut: std::future::Future<Output = Result<SegmentPayload>> + Send,
    {
        self.group.work(&key, work).await.map_err(|err| match err {
            Some(inner) => inner,
            None => Error::Cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::{sleep, Duration};

    fn key(index: usize) -> SegmentKey {
        SegmentKey::new("abc", TrackKind::Video, 0, index, false)
    }

    #[tokio::test]
    async fn test_concurrent_requests_collapse_to_one_execution() {
        let flight = SegmentFlight::new();
        let counter = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];
        for _ in 0..8 {
            let flight = flight.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run(key(0), async move {
                        sleep(Duration::from_millis(30)).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(SegmentPayload::File(PathBuf::from("/tmp/segment_0.ts")))
                    })
                    .await
            }));
        }

        for handle in handles {
            let payload = handle.await.unwrap().unwrap();
            assert_eq!(
                payload,
                SegmentPayload::File(PathBuf::from("/tmp/segment_0.ts"))
            );
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let flight = SegmentFlight::new();
        let counter = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];
        for index in 0..4 {
            let flight = flight.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run(key(index), async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(SegmentPayload::File(PathBuf::from(format!(
                            "/tmp/segment_{index}.ts"
                        ))))
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_raw_and_transcoded_keys_are_distinct() {
        let raw = SegmentKey::new("abc", TrackKind::Video, 0, 0, true);
        assert_ne!(raw, key(0));
    }

    #[tokio::test]
    async fn test_error_propagates_and_key_recovers() {
        let flight = SegmentFlight::new();

        let result = flight
            .run(key(1), async { Err(Error::TranscoderFailed { stderr: "boom".to_string() }) })
            .await;
        assert!(matches!(result, Err(Error::TranscoderFailed { .. })));

        let result = flight
            .run(key(1), async {
                Ok(SegmentPayload::File(PathBuf::from("/tmp/segment_1.ts")))
            })
            .await;
        assert!(result.is_ok());
    }
}
