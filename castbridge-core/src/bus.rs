//! Process-wide event bus.
//!
//! Topics carry progress and state transitions to the GUI shell. Emission is
//! non-blocking: a slow subscriber lags and drops events rather than stalling
//! the emitter, which is exactly the broadcast-channel contract.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{PlaybackState, TrackKind};

const BUS_CAPACITY: usize = 256;

/// Everything the core announces to its surroundings.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "topic", content = "payload")]
pub enum Event {
    #[serde(rename = "device:found")]
    DeviceFound { name: String, address: String },
    #[serde(rename = "discovery:complete")]
    DiscoveryComplete,
    #[serde(rename = "history:updated")]
    HistoryUpdated,
    #[serde(rename = "download:progress")]
    DownloadProgress {
        url: String,
        kind: TrackKind,
        track: usize,
        /// Index of the segment that just completed.
        segment: usize,
        completed: usize,
        total: usize,
    },
    #[serde(rename = "playback:state")]
    PlaybackState(PlaybackState),
}

impl Event {
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::DeviceFound { .. } => "device:found",
            Self::DiscoveryComplete => "discovery:complete",
            Self::HistoryUpdated => "history:updated",
            Self::DownloadProgress { .. } => "download:progress",
            Self::PlaybackState(_) => "playback:state",
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Never blocks; an event with no subscribers is
    /// silently dropped.
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to all events from this point on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.emit(Event::DiscoveryComplete);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        for segment in 0..3 {
            bus.emit(Event::DownloadProgress {
                url: "https://example.com/watch".to_string(),
                kind: TrackKind::Video,
                track: 0,
                segment,
                completed: segment + 1,
                total: 3,
            });
        }

        for expected in 0..3 {
            match rx.recv().await.unwrap() {
                Event::DownloadProgress { segment, .. } => assert_eq!(segment, expected),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_lagged_subscriber_drops_rather_than_blocks() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        for _ in 0..(BUS_CAPACITY + 16) {
            bus.emit(Event::DiscoveryComplete);
        }
        // The receiver lags: the first recv reports the dropped count.
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => assert!(n > 0),
            other => panic!("expected lag, got {other:?}"),
        }
    }

    #[test]
    fn test_topic_names() {
        assert_eq!(Event::DiscoveryComplete.topic(), "discovery:complete");
        assert_eq!(Event::HistoryUpdated.topic(), "history:updated");
    }
}
