use thiserror::Error;

/// Errors that can occur during voice sample capture.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// No supported sample rate was found, or the capture handle could not
    /// be opened or started.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// An operation was invoked outside its valid device or session state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A file read, write, or header patch failed.
    #[error("i/o failure: {0}")]
    IoFailure(String),

    /// Two WAV containers with differing headers cannot be merged.
    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    /// The recorded sample does not exceed the minimum playable length.
    #[error("sample duration {actual}s does not exceed the required minimum of {required}s")]
    DurationTooShort { actual: u32, required: u32 },
}
