//! ffmpeg-backed media host.
//!
//! Decoding, encoding, probing, and audio extraction all run as ffmpeg /
//! ffprobe subprocesses with their pipes serviced by helper threads.

mod player;
mod recorder;

pub use player::FfmpegMediaElement;
pub use recorder::{FfmpegRecorder, FfmpegRecorderFactory};

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};

use capburn_common::error::{CapburnError, CapburnResult};
use serde::Deserialize;

/// Facts about a media file, as reported by ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub duration_secs: Option<f64>,
    pub audio: Option<AudioStreamInfo>,
}

/// First audio stream of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioStreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    sample_rate: Option<String>,
    channels: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Whether `binary` resolves on PATH.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Probe a media file for video size, duration, and its first audio stream.
pub fn probe_media(path: &Path) -> CapburnResult<MediaInfo> {
    if !path.exists() {
        return Err(CapburnError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "stream=codec_type,width,height,sample_rate,channels:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| CapburnError::media(format!("Failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(CapburnError::media(format!(
            "ffprobe failed (status {}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&raw)
}

/// Interpret ffprobe's JSON output.
pub fn parse_probe_output(raw: &str) -> CapburnResult<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_str(raw)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| CapburnError::media("no video stream found"))?;
    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(CapburnError::media("video stream has no usable dimensions")),
    };

    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .map(|s| AudioStreamInfo {
            sample_rate: s
                .sample_rate
                .as_deref()
                .and_then(|r| r.parse().ok())
                .unwrap_or(48_000),
            channels: s.channels.unwrap_or(2),
        });

    let duration_secs = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    Ok(MediaInfo {
        width,
        height,
        duration_secs,
        audio,
    })
}

/// Extract the first audio stream as mono 16 kHz WAV bytes.
pub fn extract_audio_wav(path: &Path) -> CapburnResult<Vec<u8>> {
    if !path.exists() {
        return Err(CapburnError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut child = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
        .arg(path)
        .args([
            "-vn", "-map", "0:a:0", "-ac", "1", "-ar", "16000", "-f", "wav", "pipe:1",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CapburnError::media(format!("Failed to start ffmpeg: {e}")))?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| CapburnError::media("Failed to capture ffmpeg stderr"))?;
    let stderr_task = std::thread::spawn(move || drain_to_string(stderr));

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| CapburnError::media("Failed to capture ffmpeg stdout"))?;
    let mut wav = Vec::new();
    stdout
        .read_to_end(&mut wav)
        .map_err(|e| CapburnError::media(format!("Failed reading extracted audio: {e}")))?;

    let status = child
        .wait()
        .map_err(|e| CapburnError::media(format!("Failed to wait on ffmpeg: {e}")))?;
    let stderr_output = stderr_task
        .join()
        .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

    if !status.success() || wav.is_empty() {
        return Err(CapburnError::media(format!(
            "audio extraction failed (status {status}): {}",
            stderr_output.trim()
        )));
    }

    tracing::info!(path = %path.display(), bytes = wav.len(), "Extracted audio");
    Ok(wav)
}

fn drain_to_string(mut reader: impl Read) -> String {
    let mut output = String::new();
    match reader.read_to_string(&mut output) {
        Ok(_) => output,
        Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output_with_audio() {
        let raw = r#"{
            "streams": [
                {"codec_type": "video", "width": 1920, "height": 1080},
                {"codec_type": "audio", "sample_rate": "44100", "channels": 2}
            ],
            "format": {"duration": "12.500000"}
        }"#;
        let info = parse_probe_output(raw).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.duration_secs, Some(12.5));
        assert_eq!(
            info.audio,
            Some(AudioStreamInfo {
                sample_rate: 44_100,
                channels: 2
            })
        );
    }

    #[test]
    fn test_parse_probe_output_without_audio_or_duration() {
        let raw = r#"{"streams": [{"codec_type": "video", "width": 640, "height": 360}],
                      "format": {"duration": "N/A"}}"#;
        let info = parse_probe_output(raw).unwrap();
        assert!(info.audio.is_none());
        assert!(info.duration_secs.is_none());
    }

    #[test]
    fn test_parse_probe_output_requires_video() {
        let raw = r#"{"streams": [{"codec_type": "audio"}]}"#;
        assert!(parse_probe_output(raw).is_err());
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = probe_media(Path::new("/definitely/not/here.mp4")).unwrap_err();
        assert!(matches!(err, CapburnError::FileNotFound { .. }));
    }
}
