//! Import of Whisper-style transcription logs.
//!
//! One caption per matching line:
//!
//! ```text
//! [00:00.720 --> 00:05.120]  Text content
//! ```
//!
//! Minutes and seconds are two digits, milliseconds three. Lines that do
//! not match, or whose end precedes their start, are skipped without error.

use std::sync::OnceLock;

use capburn_common::error::{CapburnError, CapburnResult};
use regex::Regex;

use crate::caption::TimedText;

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[([0-9]{2}):([0-9]{2}\.[0-9]{3})\s+-->\s+([0-9]{2}):([0-9]{2}\.[0-9]{3})\]\s+(.*)")
            .unwrap_or_else(|e| unreachable!("log line pattern is valid: {e}"))
    })
}

/// Parse every matching line of a Whisper log into timed text.
pub fn parse_whisper_log(text: &str) -> Vec<TimedText> {
    text.split('\n')
        .filter_map(|line| parse_line(line.trim()))
        .collect()
}

/// Like [`parse_whisper_log`], but an input yielding no captions is an
/// error the caller can report while keeping the input for correction.
pub fn import_whisper_log(text: &str) -> CapburnResult<Vec<TimedText>> {
    let captions = parse_whisper_log(text);
    if captions.is_empty() {
        return Err(CapburnError::parse(
            "no captions found; expected lines like [00:00.000 --> 00:02.500]  text",
        ));
    }
    tracing::info!(count = captions.len(), "Imported captions from log");
    Ok(captions)
}

fn parse_line(line: &str) -> Option<TimedText> {
    let caps = line_pattern().captures(line)?;
    let start = to_seconds(caps.get(1)?.as_str(), caps.get(2)?.as_str())?;
    let end = to_seconds(caps.get(3)?.as_str(), caps.get(4)?.as_str())?;
    let text = caps.get(5)?.as_str().trim();
    if end < start {
        tracing::debug!(start, end, "Skipping log line that ends before it starts");
        return None;
    }
    Some(TimedText::new(start, end, text))
}

fn to_seconds(minutes: &str, seconds: &str) -> Option<f64> {
    let minutes: f64 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    Some(minutes * 60.0 + seconds)
}
