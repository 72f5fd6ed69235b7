//! Closed-caption stripping.
//!
//! Removes hearing-impaired annotations from parsed WebVTT: bracketed
//! sound descriptions (`[music]`, `(door slams)`) and dash-only lines.
//! Relative timing is untouched; cues left with no text are dropped.
//! Idempotent: stripping a stripped document is a no-op.

use std::sync::OnceLock;

use regex::Regex;

use super::webvtt::WebVtt;

fn annotation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)").expect("annotation regex"))
}

/// Strip closed-caption annotations from a parsed document.
#[must_use]
pub fn strip_closed_captions(vtt: &WebVtt) -> WebVtt {
    let mut out = WebVtt {
        header: vtt.header.clone(),
        cues: Vec::with_capacity(vtt.cues.len()),
    };

    for cue in &vtt.cues {
        let mut lines = Vec::with_capacity(cue.lines.len());
        for line in &cue.lines {
            let cleaned = annotation_re().replace_all(line, "");
            let cleaned = cleaned.trim();
            if cleaned.is_empty() || is_dash_only(cleaned) {
                continue;
            }
            lines.push(cleaned.to_string());
        }
        if !lines.is_empty() {
            let mut cue = cue.clone();
            cue.lines = lines;
            out.cues.push(cue);
        }
    }

    out
}

fn is_dash_only(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c == '-' || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitle::webvtt::Cue;

    fn cue(lines: &[&str]) -> Cue {
        Cue {
            id: None,
            start: "00:00.000".to_string(),
            end: "00:04.000".to_string(),
            settings: String::new(),
            lines: lines.iter().map(ToString::to_string).collect(),
        }
    }

    fn doc(cues: Vec<Cue>) -> WebVtt {
        WebVtt {
            header: String::new(),
            cues,
        }
    }

    #[test]
    fn test_bracketed_annotations_removed() {
        let vtt = doc(vec![cue(&["[music]", "Hello there", "(door slams) Hi"])]);
        let stripped = strip_closed_captions(&vtt);
        assert_eq!(stripped.cues.len(), 1);
        assert_eq!(stripped.cues[0].lines, vec!["Hello there", "Hi"]);
    }

    #[test]
    fn test_dash_only_lines_removed() {
        let vtt = doc(vec![cue(&["-", "- Hello", "--"])]);
        let stripped = strip_closed_captions(&vtt);
        assert_eq!(stripped.cues[0].lines, vec!["- Hello"]);
    }

    #[test]
    fn test_empty_cues_dropped_but_timing_preserved() {
        let vtt = doc(vec![cue(&["[thunder]"]), cue(&["Line"])]);
        let stripped = strip_closed_captions(&vtt);
        assert_eq!(stripped.cues.len(), 1);
        assert_eq!(stripped.cues[0].start, "00:00.000");
        assert_eq!(stripped.cues[0].end, "00:04.000");
    }

    #[test]
    fn test_idempotent() {
        let vtt = doc(vec![
            cue(&["[music]", "Hello [loudly] there"]),
            cue(&["-"]),
            cue(&["Plain"]),
        ]);
        let once = strip_closed_captions(&vtt);
        let twice = strip_closed_captions(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_untouched_document_passes_through() {
        let vtt = doc(vec![cue(&["Hello", "World"])]);
        assert_eq!(strip_closed_captions(&vtt), vtt);
    }
}
