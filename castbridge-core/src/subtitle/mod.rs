pub mod strip;
pub mod webvtt;

pub use strip::strip_closed_captions;
pub use webvtt::{Cue, WebVtt};

/// Decode subtitle bytes with the charset the extractor captured.
/// UTF-8 is the default; latin-1 variants are mapped byte-for-byte; anything
/// else falls back to lossy UTF-8.
#[must_use]
pub fn decode(bytes: &[u8], charset: &str) -> String {
    match charset.to_ascii_lowercase().as_str() {
        "" | "utf-8" | "utf8" => String::from_utf8_lossy(bytes).into_owned(),
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" => {
            bytes.iter().map(|&b| b as char).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}
