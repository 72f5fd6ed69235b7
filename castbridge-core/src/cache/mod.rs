pub mod layout;
pub mod sidecar;
pub mod singleflight;

pub use layout::CacheLayout;
pub use sidecar::SegmentSidecar;
pub use singleflight::{SegmentFlight, SegmentKey};
