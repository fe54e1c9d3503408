use crate::models::result::RecordingResult;
use crate::models::status::SessionStatus;

/// Event delegate for capture session notifications.
///
/// Statuses arrive in session order but from different threads (the caller
/// thread for `Starting`, the worker and countdown threads for the rest).
/// Implementations should marshal to the UI thread if needed.
pub trait SessionDelegate: Send + Sync {
    /// Called on every session status transition.
    fn on_status(&self, status: &SessionStatus);

    /// Called once after `CheckSuccessful` with the finished recording.
    fn on_finished(&self, result: &RecordingResult);
}
