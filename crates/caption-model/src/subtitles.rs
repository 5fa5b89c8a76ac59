//! Caption export in SRT, WebVTT, and JSON formats.

use std::path::Path;

use capburn_common::error::CapburnResult;
use serde::{Deserialize, Serialize};

use crate::caption::{Caption, CaptionStore, TimedText};

/// Output format for caption export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    Srt,
    Vtt,
    Json,
}

impl SubtitleFormat {
    /// Guess the format from a file extension, defaulting to SRT.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("vtt") => SubtitleFormat::Vtt,
            Some("json") => SubtitleFormat::Json,
            _ => SubtitleFormat::Srt,
        }
    }
}

/// Generate SRT content. Cues are numbered in start order.
pub fn generate_srt(captions: &[&Caption]) -> String {
    let mut output = String::new();

    for (i, caption) in captions.iter().enumerate() {
        output.push_str(&format!("{}\n", i + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            format_timestamp(caption.start, ','),
            format_timestamp(caption.end, ','),
        ));
        output.push_str(&caption.text);
        output.push_str("\n\n");
    }

    output
}

/// Generate WebVTT content.
pub fn generate_vtt(captions: &[&Caption]) -> String {
    let mut output = String::from("WEBVTT\n\n");

    for caption in captions {
        output.push_str(&format!(
            "{} --> {}\n",
            format_timestamp(caption.start, '.'),
            format_timestamp(caption.end, '.'),
        ));
        output.push_str(&caption.text);
        output.push_str("\n\n");
    }

    output
}

/// Render the store in the requested format, ordered by start time.
pub fn render_captions(store: &CaptionStore, format: SubtitleFormat) -> CapburnResult<String> {
    let ordered = store.by_start();
    Ok(match format {
        SubtitleFormat::Srt => generate_srt(&ordered),
        SubtitleFormat::Vtt => generate_vtt(&ordered),
        SubtitleFormat::Json => {
            let segments: Vec<TimedText> = ordered.iter().map(|c| c.timed_text()).collect();
            serde_json::to_string_pretty(&segments)?
        }
    })
}

/// Write the store to `path`, choosing the format from the extension.
pub fn save_captions(store: &CaptionStore, path: &Path) -> CapburnResult<()> {
    let content = render_captions(store, SubtitleFormat::from_path(path))?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), count = store.len(), "Captions saved");
    Ok(())
}

/// Load a JSON segment array (the format written by [`save_captions`]).
pub fn load_segments(path: &Path) -> CapburnResult<Vec<TimedText>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Format seconds as `HH:MM:SS<sep>mmm`.
fn format_timestamp(secs: f64, separator: char) -> String {
    let total_ms = (secs.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02}{separator}{millis:03}")
}

/// Format seconds as `m:ss` for status display. Non-finite input reads
/// as zero.
pub fn format_clock(secs: f64) -> String {
    let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
    let whole = secs.floor() as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CaptionStore {
        CaptionStore::from_segments(vec![
            TimedText::new(3.0, 5.0, "This is a test"),
            TimedText::new(0.0, 2.5, "Hello world"),
        ])
        .unwrap()
    }

    #[test]
    fn test_srt_generation_is_in_start_order() {
        let srt = render_captions(&store(), SubtitleFormat::Srt).unwrap();
        assert!(srt.contains("1\n00:00:00,000 --> 00:00:02,500\nHello world"));
        assert!(srt.contains("2\n00:00:03,000 --> 00:00:05,000\nThis is a test"));
    }

    #[test]
    fn test_vtt_generation() {
        let store = CaptionStore::from_segments(vec![TimedText::new(61.5, 63.0, "One minute in")])
            .unwrap();
        let vtt = render_captions(&store, SubtitleFormat::Vtt).unwrap();
        assert!(vtt.starts_with("WEBVTT\n"));
        assert!(vtt.contains("00:01:01.500 --> 00:01:03.000"));
    }

    #[test]
    fn test_timestamp_formatting() {
        assert_eq!(format_timestamp(0.0, ','), "00:00:00,000");
        assert_eq!(format_timestamp(3661.5, ','), "01:01:01,500");
        assert_eq!(format_timestamp(3661.5, '.'), "01:01:01.500");
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0.0), "0:00");
        assert_eq!(format_clock(65.9), "1:05");
        assert_eq!(format_clock(f64::NAN), "0:00");
    }

    #[test]
    fn test_json_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("captions.json");
        save_captions(&store(), &path).unwrap();

        let loaded = load_segments(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].text, "Hello world");
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(SubtitleFormat::from_path(Path::new("a.vtt")), SubtitleFormat::Vtt);
        assert_eq!(SubtitleFormat::from_path(Path::new("a.json")), SubtitleFormat::Json);
        assert_eq!(SubtitleFormat::from_path(Path::new("a")), SubtitleFormat::Srt);
    }
}
