pub mod source;
pub mod options;
pub mod extraction;
pub mod playback;

pub use source::{MediaSource, TrackKind};
pub use options::{StreamOptions, SubtitleSelection};
pub use extraction::{Extraction, ExtractedSubtitle};
pub use playback::{PlaybackState, PlayerStatus, ReceiverEvent};
