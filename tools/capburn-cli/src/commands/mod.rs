pub mod check;
pub mod export;
pub mod key;
pub mod layout;
pub mod parse_log;
pub mod simulate;
pub mod transcribe;

use std::path::{Path, PathBuf};

use anyhow::Context;
use capburn_caption_model::{
    format_clock, import_whisper_log, load_segments, CaptionStyle, TimedText,
};
use capburn_render_engine::{ExportArtifact, ExportProgress, ExportWarning, ProgressCallback};

/// Read captions from JSON segments (`.json`) or a timestamped log.
pub fn read_captions(path: &Path) -> anyhow::Result<Vec<TimedText>> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        return load_segments(path)
            .with_context(|| format!("Failed to load captions from {}", path.display()));
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(import_whisper_log(&text)?)
}

/// Read a style file, or the default style.
pub fn read_style(path: Option<&Path>) -> anyhow::Result<CaptionStyle> {
    let Some(path) = path else {
        return Ok(CaptionStyle::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read style {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid style file {}", path.display()))
}

/// Progress printer for export runs.
pub fn progress_printer() -> ProgressCallback {
    Box::new(|p: ExportProgress| {
        eprint!(
            "\r  {:?}: {:5.1}% ({} frames, {})  ",
            p.stage,
            p.percent,
            p.frames_captured,
            format_clock(p.media_time_secs)
        );
    })
}

pub fn print_warnings(warnings: &[ExportWarning]) {
    for warning in warnings {
        println!("  [WARN] {warning}");
    }
}

pub fn print_artifact(artifact: &ExportArtifact, saved_to: Option<&PathBuf>) {
    println!("  Frames:   {}", artifact.frames);
    println!("  Duration: {}", format_clock(artifact.duration_secs));
    println!("  Audio:    {}", if artifact.has_audio { "yes" } else { "no" });
    println!("  Size:     {} bytes ({})", artifact.data.len(), artifact.mime_type);
    if let Some(path) = saved_to {
        println!("  Saved:    {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_captions_accepts_logs_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let log = dir.path().join("whisper.txt");
        std::fs::write(&log, "[00:01.000 --> 00:02.000]  Hi").unwrap();
        let segments = read_captions(&log).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "Hi");

        let json = dir.path().join("captions.json");
        std::fs::write(&json, r#"[{"start":0.0,"end":1.5,"text":"Saved"}]"#).unwrap();
        let segments = read_captions(&json).unwrap();
        assert_eq!(segments[0].end, 1.5);
    }

    #[test]
    fn test_missing_style_means_default() {
        assert_eq!(read_style(None).unwrap(), CaptionStyle::default());
    }
}
