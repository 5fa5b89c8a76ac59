//! Error types shared across Capburn crates.

use std::path::PathBuf;

/// Top-level error type for Capburn operations.
#[derive(Debug, thiserror::Error)]
pub enum CapburnError {
    #[error("Media error: {message}")]
    Media { message: String },

    #[error("Audio error: {message}")]
    Audio { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Recorder error: {message}")]
    Recorder { message: String },

    #[error("Export error: {message}")]
    Export { message: String },

    #[error("An export is already running")]
    ExportInProgress,

    #[error("Export stalled: the recording did not finish within {waited_secs:.1}s")]
    ExportStalled { waited_secs: f64 },

    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Missing credential '{name}': set it with `capburn key set <value>`")]
    MissingCredential { name: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using CapburnError.
pub type CapburnResult<T> = Result<T, CapburnError>;

impl CapburnError {
    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media {
            message: msg.into(),
        }
    }

    pub fn audio(msg: impl Into<String>) -> Self {
        Self::Audio {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn recorder(msg: impl Into<String>) -> Self {
        Self::Recorder {
            message: msg.into(),
        }
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export {
            message: msg.into(),
        }
    }

    pub fn transcription(msg: impl Into<String>) -> Self {
        Self::Transcription {
            message: msg.into(),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether the error leaves the session usable.
    ///
    /// Only a complete lack of media capture support is terminal; everything
    /// else is reported in place and the user can retry.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Unsupported { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_message_names_key() {
        let err = CapburnError::MissingCredential {
            name: "gemini_api_key".to_string(),
        };
        assert!(err.to_string().contains("gemini_api_key"));
    }

    #[test]
    fn test_only_unsupported_is_terminal() {
        assert!(CapburnError::transcription("bad json").is_recoverable());
        assert!(CapburnError::ExportInProgress.is_recoverable());
        assert!(!CapburnError::unsupported("no recorder").is_recoverable());
    }
}
