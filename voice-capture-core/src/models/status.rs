use std::path::{Path, PathBuf};

/// Status values emitted over a capture session's lifetime.
///
/// One session produces an ordered stream:
/// ```text
/// starting → preparing → (prepare ticks) → finished-preparing
///          → recording → (recording ticks) → stopped-recording
///          → checking-samples → check-successful → recording-successful
///          → stopped
/// ```
/// with `RecordingFailed` and `RecorderInitializationError` as alternate
/// terminal outcomes. Every session ends with exactly one `Stopped`,
/// regardless of which branch was taken before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Starting,
    Preparing,
    UpdatePrepareCounter(u32),
    FinishedPreparing,
    Recording,
    UpdateRecordingCounter(u32),
    StoppedRecording,
    CheckingSamples,
    CheckSuccessful,
    CheckFailed,
    RecordingSuccessful(PathBuf),
    RecordingFailed,
    RecorderInitializationError,
    Stopped,
}

impl SessionStatus {
    /// The countdown or counter value carried by tick statuses.
    pub fn counter(&self) -> Option<u32> {
        match self {
            Self::UpdatePrepareCounter(n) | Self::UpdateRecordingCounter(n) => Some(*n),
            _ => None,
        }
    }

    /// The finished output path, carried by the success status.
    pub fn output_path(&self) -> Option<&Path> {
        match self {
            Self::RecordingSuccessful(path) => Some(path),
            _ => None,
        }
    }

    /// Whether this status is a terminal outcome (success or failure).
    ///
    /// `Stopped` is not an outcome; it follows the terminal status once the
    /// session worker has wound down.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RecordingSuccessful(_) | Self::RecordingFailed | Self::RecorderInitializationError
        )
    }
}
