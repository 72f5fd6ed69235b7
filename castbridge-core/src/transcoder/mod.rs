pub mod driver;
pub mod locate;
pub mod options;
pub mod probe;

pub use driver::{Transcoder, TranscodeInput, TranscodeTarget};
pub use options::{BurnIn, StreamMapping, TranscodeOptions};
