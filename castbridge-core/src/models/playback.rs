use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Player status as reported back by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    Idle,
    Buffering,
    Playing,
    Paused,
    Stopped,
    Failed,
}

/// An inbound message from the receiver's control channel, reduced to the
/// cases the core reacts to. The playback state is a fold over this stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverEvent {
    MediaStatus {
        current_time: f64,
        player_state: String,
        idle_reason: Option<String>,
    },
    Close,
    LoadFailed,
}

/// Snapshot of the active cast, recorded when a session starts and updated
/// as receiver events arrive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub status: PlayerStatus,
    pub media_path: String,
    pub media_name: String,
    pub device_url: String,
    pub device_name: String,
    pub current_time: f64,
    pub duration: f64,
    pub updated_at: DateTime<Utc>,
}

impl PlaybackState {
    #[must_use]
    pub fn new(
        media_path: String,
        media_name: String,
        device_url: String,
        device_name: String,
        duration: f64,
    ) -> Self {
        Self {
            status: PlayerStatus::Buffering,
            media_path,
            media_name,
            device_url,
            device_name,
            current_time: 0.0,
            duration,
            updated_at: Utc::now(),
        }
    }

    /// Fold one receiver event into the state.
    pub fn apply(&mut self, event: &ReceiverEvent) {
        match event {
            ReceiverEvent::MediaStatus {
                current_time,
                player_state,
                idle_reason,
            } => {
                self.current_time = *current_time;
                self.status = match player_state.as_str() {
                    "PLAYING" => PlayerStatus::Playing,
                    "PAUSED" => PlayerStatus::Paused,
                    "BUFFERING" => PlayerStatus::Buffering,
                    "IDLE" => match idle_reason.as_deref() {
                        Some("FINISHED") | Some("CANCELLED") => PlayerStatus::Stopped,
                        Some("ERROR") => PlayerStatus::Failed,
                        _ => PlayerStatus::Idle,
                    },
                    _ => self.status,
                };
            }
            ReceiverEvent::Close => self.status = PlayerStatus::Stopped,
            ReceiverEvent::LoadFailed => self.status = PlayerStatus::Failed,
        }
        self.updated_at = Utc::now();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            PlayerStatus::Playing | PlayerStatus::Paused | PlayerStatus::Buffering
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> PlaybackState {
        PlaybackState::new(
            "/movies/example.mkv".to_string(),
            "example.mkv".to_string(),
            "192.168.1.50:8009".to_string(),
            "Living Room TV".to_string(),
            125.5,
        )
    }

    #[test]
    fn test_media_status_fold() {
        let mut s = state();
        s.apply(&ReceiverEvent::MediaStatus {
            current_time: 12.0,
            player_state: "PLAYING".to_string(),
            idle_reason: None,
        });
        assert_eq!(s.status, PlayerStatus::Playing);
        assert!((s.current_time - 12.0).abs() < f64::EPSILON);

        s.apply(&ReceiverEvent::MediaStatus {
            current_time: 13.5,
            player_state: "PAUSED".to_string(),
            idle_reason: None,
        });
        assert_eq!(s.status, PlayerStatus::Paused);
    }

    #[test]
    fn test_idle_reasons() {
        let mut s = state();
        s.apply(&ReceiverEvent::MediaStatus {
            current_time: 125.5,
            player_state: "IDLE".to_string(),
            idle_reason: Some("FINISHED".to_string()),
        });
        assert_eq!(s.status, PlayerStatus::Stopped);

        let mut s = state();
        s.apply(&ReceiverEvent::MediaStatus {
            current_time: 0.0,
            player_state: "IDLE".to_string(),
            idle_reason: Some("ERROR".to_string()),
        });
        assert_eq!(s.status, PlayerStatus::Failed);
    }

    #[test]
    fn test_close_and_load_failed() {
        let mut s = state();
        s.apply(&ReceiverEvent::Close);
        assert_eq!(s.status, PlayerStatus::Stopped);
        assert!(!s.is_active());

        let mut s = state();
        s.apply(&ReceiverEvent::LoadFailed);
        assert_eq!(s.status, PlayerStatus::Failed);
    }

    #[test]
    fn test_unknown_player_state_keeps_previous() {
        let mut s = state();
        s.apply(&ReceiverEvent::MediaStatus {
            current_time: 5.0,
            player_state: "PLAYING".to_string(),
            idle_reason: None,
        });
        s.apply(&ReceiverEvent::MediaStatus {
            current_time: 6.0,
            player_state: "MYSTERY".to_string(),
            idle_reason: None,
        });
        assert_eq!(s.status, PlayerStatus::Playing);
        assert!((s.current_time - 6.0).abs() < f64::EPSILON);
    }
}
