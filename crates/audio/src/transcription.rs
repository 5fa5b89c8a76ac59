//! Transcription collaborator boundary.
//!
//! A transcriber takes a base64 audio payload and returns timed text
//! segments. The segments arrive as a JSON array of objects with required
//! `start`, `end` (seconds), and `text` fields. Anything else is a failed
//! transcription the caller recovers from.

use std::process::Stdio;

use async_trait::async_trait;
use base64::Engine;
use capburn_caption_model::TimedText;
use capburn_common::error::{CapburnError, CapburnResult};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Errors raised while interpreting a transcriber's response.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("response is not a segment array: {0}")]
    MalformedResponse(String),

    #[error("segment {index} has invalid timing ({start}..{end})")]
    InvalidSegment { index: usize, start: f64, end: f64 },

    #[error("transcriber unavailable: {0}")]
    Unavailable(String),
}

impl From<TranscriptionError> for CapburnError {
    fn from(err: TranscriptionError) -> Self {
        CapburnError::transcription(err.to_string())
    }
}

/// Audio handed to a transcriber.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    /// Base64 (standard alphabet) encoded audio.
    pub audio_base64: String,
    pub mime_type: String,
}

impl TranscriptionRequest {
    pub fn from_wav(wav: &[u8]) -> Self {
        Self {
            audio_base64: base64::engine::general_purpose::STANDARD.encode(wav),
            mime_type: "audio/wav".to_string(),
        }
    }
}

/// An external speech-to-text service.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
        api_key: &str,
    ) -> CapburnResult<Vec<TimedText>>;

    fn name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct ResponseSegment {
    start: f64,
    end: f64,
    text: String,
}

/// Parse a transcriber's JSON response into segments, in response order.
///
/// A single surrounding Markdown code fence is tolerated.
pub fn parse_transcription_response(body: &str) -> Result<Vec<TimedText>, TranscriptionError> {
    let trimmed = strip_code_fence(body.trim());
    let segments: Vec<ResponseSegment> = serde_json::from_str(trimmed)
        .map_err(|e| TranscriptionError::MalformedResponse(e.to_string()))?;

    segments
        .into_iter()
        .enumerate()
        .map(|(index, s)| {
            let valid = s.start.is_finite() && s.end.is_finite() && s.start >= 0.0 && s.end >= s.start;
            if !valid {
                return Err(TranscriptionError::InvalidSegment {
                    index,
                    start: s.start,
                    end: s.end,
                });
            }
            Ok(TimedText::new(s.start, s.end, s.text))
        })
        .collect()
}

fn strip_code_fence(body: &str) -> &str {
    let Some(rest) = body.strip_prefix("```") else {
        return body;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Runs a shell command as the transcriber.
///
/// The payload is written to the command's stdin, the API key is passed in
/// `CAPBURN_API_KEY`, and stdout must hold the JSON segment array.
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    command: String,
}

impl CommandTranscriber {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
        api_key: &str,
    ) -> CapburnResult<Vec<TimedText>> {
        tracing::info!(
            command = %self.command,
            payload_bytes = request.audio_base64.len(),
            "Starting transcription"
        );

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("CAPBURN_API_KEY", api_key)
            .env("CAPBURN_AUDIO_MIME", &request.mime_type)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TranscriptionError::Unavailable(format!("failed to start command: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TranscriptionError::Unavailable("failed to open stdin".to_string()))?;
        let payload = request.audio_base64.into_bytes();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&payload).await;
            drop(stdin);
            result
        });

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| TranscriptionError::Unavailable("failed to open stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| TranscriptionError::Unavailable("failed to open stderr".to_string()))?;

        let mut body = String::new();
        let mut errors = String::new();
        let (out, err) = tokio::join!(
            stdout.read_to_string(&mut body),
            stderr.read_to_string(&mut errors)
        );
        out.map_err(|e| TranscriptionError::Unavailable(format!("failed to read output: {e}")))?;
        err.map_err(|e| {
            TranscriptionError::Unavailable(format!("failed to read error output: {e}"))
        })?;

        let status = child
            .wait()
            .await
            .map_err(|e| TranscriptionError::Unavailable(format!("failed to wait for command: {e}")))?;
        if let Ok(Err(e)) = writer.await {
            tracing::debug!(error = %e, "Transcriber closed stdin early");
        }

        if !status.success() {
            return Err(TranscriptionError::Unavailable(format!(
                "command exited with {status}: {}",
                errors.trim()
            ))
            .into());
        }

        let segments = parse_transcription_response(&body)?;
        tracing::info!(segments = segments.len(), "Transcription finished");
        Ok(segments)
    }

    fn name(&self) -> &str {
        "command"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_response() {
        let body = r#"[{"start": 0, "end": 1.5, "text": "Hello there"},
                       {"start": 1.5, "end": 3, "text": "General"}]"#;
        let segments = parse_transcription_response(body).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1], TimedText::new(1.5, 3.0, "General"));
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let body = r#"[{"start": 0, "text": "no end"}]"#;
        assert!(matches!(
            parse_transcription_response(body),
            Err(TranscriptionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_non_array_is_malformed() {
        assert!(parse_transcription_response("").is_err());
        assert!(parse_transcription_response(r#"{"text": "x"}"#).is_err());
    }

    #[test]
    fn test_inverted_segment_is_rejected() {
        let body = r#"[{"start": 2, "end": 1, "text": "x"}]"#;
        assert!(matches!(
            parse_transcription_response(body),
            Err(TranscriptionError::InvalidSegment { index: 0, .. })
        ));
    }

    #[test]
    fn test_code_fence_is_tolerated() {
        let body = "```json\n[{\"start\": 0, \"end\": 1, \"text\": \"x\"}]\n```";
        assert_eq!(parse_transcription_response(body).unwrap().len(), 1);
    }

    #[test]
    fn test_request_is_base64() {
        let request = TranscriptionRequest::from_wav(b"RIFF");
        assert_eq!(request.audio_base64, "UklGRg==");
        assert_eq!(request.mime_type, "audio/wav");
    }

    #[test]
    fn test_failures_map_to_transcription_errors() {
        let err: CapburnError = TranscriptionError::Unavailable("down".to_string()).into();
        assert!(matches!(err, CapburnError::Transcription { .. }));
    }

    #[tokio::test]
    async fn test_unreadable_output_is_a_transcription_error() {
        let transcriber = CommandTranscriber::new(r"cat > /dev/null; printf '\377\376'");
        let err = transcriber
            .transcribe(TranscriptionRequest::from_wav(b"RIFF"), "key")
            .await
            .unwrap_err();
        assert!(matches!(err, CapburnError::Transcription { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_command_transcriber_reads_stdout() {
        let transcriber = CommandTranscriber::new(
            r#"cat > /dev/null; printf '[{"start":0,"end":1,"text":"%s"}]' "$CAPBURN_API_KEY""#,
        );
        let segments = transcriber
            .transcribe(TranscriptionRequest::from_wav(b"audio"), "key-123")
            .await
            .unwrap();
        assert_eq!(segments, vec![TimedText::new(0.0, 1.0, "key-123")]);
    }

    #[tokio::test]
    async fn test_command_transcriber_failure_is_transcription_error() {
        let transcriber = CommandTranscriber::new("cat > /dev/null; echo boom >&2; exit 3");
        let err = transcriber
            .transcribe(TranscriptionRequest::from_wav(b"audio"), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, CapburnError::Transcription { .. }));
    }
}
