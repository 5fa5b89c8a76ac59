//! Session status machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the user is in a captioning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    /// No media loaded.
    Idle,
    /// Media loaded; choosing how to create captions.
    Choosing,
    /// Waiting on the transcription collaborator.
    Transcribing,
    /// Pasting a timestamped log.
    Pasting,
    Editing,
    Exporting,
    /// An artifact is ready.
    Completed,
}

impl AppStatus {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: AppStatus) -> bool {
        use AppStatus::*;
        matches!(
            (self, next),
            (_, Idle)
                | (_, Choosing)
                | (Choosing, Transcribing)
                | (Choosing | Editing, Pasting)
                | (Choosing | Transcribing | Pasting | Completed, Editing)
                | (Editing | Completed, Exporting)
                | (Exporting, Editing | Completed)
        ) && self != next
            && !(self == Exporting && matches!(next, Idle | Choosing))
    }

    /// Whether captions and style may be edited.
    pub fn allows_editing(self) -> bool {
        matches!(self, AppStatus::Editing | AppStatus::Completed)
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AppStatus::Idle => "idle",
            AppStatus::Choosing => "choosing",
            AppStatus::Transcribing => "transcribing",
            AppStatus::Pasting => "pasting",
            AppStatus::Editing => "editing",
            AppStatus::Exporting => "exporting",
            AppStatus::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_legal() {
        let path = [
            AppStatus::Idle,
            AppStatus::Choosing,
            AppStatus::Pasting,
            AppStatus::Editing,
            AppStatus::Exporting,
            AppStatus::Completed,
            AppStatus::Editing,
            AppStatus::Idle,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_exporting_cannot_jump_away() {
        assert!(!AppStatus::Exporting.can_transition_to(AppStatus::Idle));
        assert!(!AppStatus::Exporting.can_transition_to(AppStatus::Choosing));
        assert!(!AppStatus::Exporting.can_transition_to(AppStatus::Exporting));
        assert!(!AppStatus::Idle.can_transition_to(AppStatus::Exporting));
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&AppStatus::Transcribing).unwrap(),
            "\"transcribing\""
        );
    }
}
