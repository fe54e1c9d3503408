use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a capture session.
///
/// Paths are inputs: the session derives its scratch file from
/// `storage_root` and `scratch_dir` and never hardcodes a location. Moving a
/// finished sample out of the scratch directory is the caller's job.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Root directory for recordings (e.g. the app's external storage dir).
    pub storage_root: PathBuf,

    /// Subdirectory of `storage_root` for in-progress captures.
    pub scratch_dir: String,

    /// Capture sample rate in Hz, or `None` to probe the candidate list.
    pub sample_rate: Option<u32>,

    /// Number of one-interval countdown ticks before recording starts.
    pub prepare_ticks: u32,

    /// Number of one-interval counter ticks the recording runs for.
    pub recording_ticks: u32,

    /// A finished sample must be strictly longer than this many seconds.
    pub min_sample_secs: u32,

    /// Length of one countdown/counter tick (default: 1s).
    pub tick_interval: Duration,

    /// Sleep interval of the worker's cooperative poll loop (default: 200ms).
    pub poll_interval: Duration,
}

impl CaptureConfig {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.scratch_dir.is_empty() {
            return Err("scratch directory name must not be empty".into());
        }
        if self.prepare_ticks == 0 || self.recording_ticks == 0 {
            return Err("prepare and recording tick counts must be positive".into());
        }
        if self.tick_interval.is_zero() || self.poll_interval.is_zero() {
            return Err("tick and poll intervals must be positive".into());
        }
        if let Some(rate) = self.sample_rate {
            if rate == 0 {
                return Err("explicit sample rate must be positive".into());
            }
        }
        Ok(())
    }

    /// Scratch file path for a session: `<storage_root>/<scratch_dir>/<id>.wav`.
    pub fn scratch_path(&self, session_id: &str) -> PathBuf {
        self.storage_root
            .join(&self.scratch_dir)
            .join(format!("{}.wav", session_id))
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("."),
            scratch_dir: "tmp".into(),
            sample_rate: None,
            prepare_ticks: 4,
            recording_ticks: 8,
            min_sample_secs: 4,
            tick_interval: Duration::from_secs(1),
            poll_interval: Duration::from_millis(200),
        }
    }
}
