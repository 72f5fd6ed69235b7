//! Minimal WebVTT model: enough to re-serialize cues with their timing
//! intact and to let the closed-caption stripper edit cue text.

use crate::error::{Error, Result};

/// One cue: a timing line plus its text lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    /// Optional cue identifier line.
    pub id: Option<String>,
    /// Start timestamp, verbatim (`00:01:02.500`).
    pub start: String,
    /// End timestamp, verbatim.
    pub end: String,
    /// Settings after the arrow (`line:0 position:50%`), verbatim.
    pub settings: String,
    pub lines: Vec<String>,
}

/// A parsed WebVTT document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WebVtt {
    /// Text after `WEBVTT` on the header line, if any.
    pub header: String,
    pub cues: Vec<Cue>,
}

impl WebVtt {
    /// Parse WebVTT text. SRT-style input (numeric counters, comma decimal
    /// separators, no header) is accepted and normalized, since external
    /// subtitle files are frequently SRT.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim_start_matches('\u{feff}');
        let mut lines = text.lines().peekable();

        let mut vtt = WebVtt::default();
        let is_vtt = lines
            .peek()
            .map(|l| l.trim_start().starts_with("WEBVTT"))
            .unwrap_or(false);
        if is_vtt {
            let header_line = lines.next().unwrap_or_default();
            vtt.header = header_line
                .trim_start()
                .strip_prefix("WEBVTT")
                .unwrap_or_default()
                .trim()
                .to_string();
        }

        let mut pending_id: Option<String> = None;
        while let Some(line) = lines.next() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                pending_id = None;
                continue;
            }
            // NOTE/STYLE/REGION blocks are dropped; timing is all we keep.
            if trimmed.starts_with("NOTE") || trimmed.starts_with("STYLE") || trimmed.starts_with("REGION") {
                for skipped in lines.by_ref() {
                    if skipped.trim().is_empty() {
                        break;
                    }
                }
                continue;
            }

            if let Some((start, end, settings)) = parse_timing(trimmed) {
                let mut cue = Cue {
                    id: pending_id.take(),
                    start,
                    end,
                    settings,
                    lines: Vec::new(),
                };
                for text_line in lines.by_ref() {
                    if text_line.trim().is_empty() {
                        break;
                    }
                    cue.lines.push(text_line.trim_end().to_string());
                }
                vtt.cues.push(cue);
            } else {
                // Cue identifier (or SRT counter) preceding a timing line.
                pending_id = Some(trimmed.to_string());
            }
        }

        if !is_vtt && vtt.cues.is_empty() && !text.trim().is_empty() {
            return Err(Error::MalformedSubtitle(
                "not a WebVTT or SRT document".to_string(),
            ));
        }
        Ok(vtt)
    }

}

/// Serialization back to canonical WebVTT. SRT counters picked up as cue ids
/// are dropped.
impl std::fmt::Display for WebVtt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WEBVTT")?;
        if !self.header.is_empty() {
            write!(f, " {}", self.header)?;
        }
        write!(f, "\n\n")?;
        for cue in &self.cues {
            if let Some(id) = &cue.id {
                if id.parse::<u64>().is_err() {
                    writeln!(f, "{id}")?;
                }
            }
            write!(f, "{} --> {}", cue.start, cue.end)?;
            if !cue.settings.is_empty() {
                write!(f, " {}", cue.settings)?;
            }
            writeln!(f)?;
            for line in &cue.lines {
                writeln!(f, "{line}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Parse a timing line, normalizing SRT comma decimals to dots.
fn parse_timing(line: &str) -> Option<(String, String, String)> {
    let (start, rest) = line.split_once("-->")?;
    let rest = rest.trim();
    let (end, settings) = match rest.split_once(char::is_whitespace) {
        Some((end, settings)) => (end, settings.trim()),
        None => (rest, ""),
    };
    let normalize = |t: &str| t.trim().replace(',', ".");
    let start = normalize(start);
    let end = normalize(end);
    if start.is_empty() || !start.contains(':') || !end.contains(':') {
        return None;
    }
    Some((start, end, settings.to_string()))
}
