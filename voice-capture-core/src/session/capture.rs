use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use parking_lot::Mutex;

use crate::device::registry::DeviceRegistry;
use crate::device::recorder::RecordingDevice;
use crate::format::container::WavContainer;
use crate::models::config::CaptureConfig;
use crate::models::error::CaptureError;
use crate::models::result::RecordingResult;
use crate::models::status::SessionStatus;
use crate::traits::session_delegate::SessionDelegate;

/// One end-to-end capture attempt: acquire the recording device, run the
/// prepare countdown, record for the configured duration, validate the
/// produced sample, and report a terminal outcome.
///
/// Status flow on the happy path:
/// ```text
/// Starting → Preparing → UpdatePrepareCounter(n..0) → FinishedPreparing
///          → Recording → UpdateRecordingCounter(1..n) → StoppedRecording
///          → CheckingSamples → CheckSuccessful → RecordingSuccessful(path)
///          → Stopped
/// ```
///
/// The worker thread sleep-polls phase flags set by the countdown threads;
/// stopping is cooperative — a stop request is observed between ticks and
/// additionally tears the device down immediately. Every session, however
/// it ends, emits exactly one terminal status followed by `Stopped`.
pub struct CaptureSession {
    registry: Arc<DeviceRegistry>,
    config: CaptureConfig,
    delegate: Option<Arc<dyn SessionDelegate>>,
    worker: Option<thread::JoinHandle<()>>,
    active: Option<Arc<WorkerShared>>,
}

impl CaptureSession {
    pub fn new(registry: Arc<DeviceRegistry>, config: CaptureConfig) -> Self {
        Self {
            registry,
            config,
            delegate: None,
            worker: None,
            active: None,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn SessionDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Start a capture for `session_id`, stopping any session still in
    /// flight first.
    pub fn start(&mut self, session_id: &str) -> Result<(), CaptureError> {
        self.stop();

        self.config
            .validate()
            .map_err(|e| CaptureError::InvalidState(format!("invalid configuration: {}", e)))?;

        let shared = Arc::new(WorkerShared {
            session_id: session_id.to_string(),
            sample_path: self.config.scratch_path(session_id),
            config: self.config.clone(),
            delegate: self.delegate.clone(),
            device: Mutex::new(None),
            timers: Mutex::new(Vec::new()),
            stop_requested: AtomicBool::new(false),
            preparing: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            succeeded: AtomicBool::new(false),
        });
        shared.emit(SessionStatus::Starting);

        let worker_shared = Arc::clone(&shared);
        let registry = Arc::clone(&self.registry);
        let worker = thread::Builder::new()
            .name("capture-worker".into())
            .spawn(move || worker_run(worker_shared, registry))
            .map_err(|e| CaptureError::DeviceUnavailable(format!("failed to spawn worker: {}", e)))?;

        self.worker = Some(worker);
        self.active = Some(shared);
        log::debug!("capture session started for id {}", session_id);
        Ok(())
    }

    /// Request cooperative cancellation and wait for the worker to wind
    /// down. A no-op when no session is in flight.
    pub fn stop(&mut self) {
        if let Some(shared) = self.active.take() {
            shared.request_stop();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
            log::debug!("capture session stopped");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State shared between the worker thread, the countdown threads, the
/// device fault handler, and the caller's stop path.
struct WorkerShared {
    session_id: String,
    sample_path: PathBuf,
    config: CaptureConfig,
    delegate: Option<Arc<dyn SessionDelegate>>,
    device: Mutex<Option<RecordingDevice>>,
    timers: Mutex<Vec<thread::JoinHandle<()>>>,
    stop_requested: AtomicBool,
    preparing: AtomicBool,
    recording: AtomicBool,
    succeeded: AtomicBool,
}

impl WorkerShared {
    fn emit(&self, status: SessionStatus) {
        log::debug!("session {}: {:?}", self.session_id, status);
        if let Some(ref delegate) = self.delegate {
            delegate.on_status(&status);
        }
    }

    fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Set the stop flag and tear down any live device immediately; the
    /// worker and countdown threads observe the flag at their next tick.
    fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        // Take the device out before stopping it so the slot lock is never
        // held across the stop (which may join the capture thread).
        let device = self.device.lock().take();
        if let Some(device) = device {
            let _ = device.stop();
            let _ = device.release();
        }
    }
}

fn worker_run(shared: Arc<WorkerShared>, registry: Arc<DeviceRegistry>) {
    record_audio(&shared, &registry);

    let poll = shared.config.poll_interval;
    while !shared.is_stop_requested()
        && (shared.preparing.load(Ordering::SeqCst) || shared.recording.load(Ordering::SeqCst))
    {
        thread::sleep(poll);
    }
    log::debug!("session {}: countdown phases finished", shared.session_id);

    if !shared.is_stop_requested() {
        export_sample(&shared);
    }

    while !shared.is_stop_requested() {
        thread::sleep(poll);
    }

    // Wind down: no tick may land after the final status. Joining the
    // prepare timer can register the recording timer, so drain repeatedly.
    loop {
        let timers: Vec<_> = shared.timers.lock().drain(..).collect();
        if timers.is_empty() {
            break;
        }
        for timer in timers {
            let _ = timer.join();
        }
    }
    let device = shared.device.lock().take();
    if let Some(device) = device {
        let _ = device.stop();
        let _ = device.release();
    }
    if !shared.succeeded.load(Ordering::SeqCst) {
        discard_scratch(&shared);
    }

    shared.emit(SessionStatus::Stopped);
}

/// Acquire and prepare the recording device, then arm the prepare
/// countdown. Acquisition failure is terminal for the session.
fn record_audio(shared: &Arc<WorkerShared>, registry: &DeviceRegistry) {
    let device = match registry.acquire(shared.config.sample_rate) {
        Ok(device) => device,
        Err(e) => {
            log::error!("session {}: failed to acquire recording device: {}", shared.session_id, e);
            shared.emit(SessionStatus::RecorderInitializationError);
            shared.request_stop();
            return;
        }
    };

    let weak: Weak<WorkerShared> = Arc::downgrade(shared);
    device.set_fault_handler(Arc::new(move |err| {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        log::error!("session {}: recording device failed: {}", shared.session_id, err);
        shared.emit(SessionStatus::RecordingFailed);
        shared.request_stop();
    }));

    if device.prepare(&shared.sample_path).is_err() {
        // The fault handler has already reported and requested a stop.
        return;
    }

    *shared.device.lock() = Some(device);
    spawn_prepare_timer(shared);
}

/// Arm the prepare countdown: one tick per interval, counting down to
/// zero, then the record phase boundary.
fn spawn_prepare_timer(shared: &Arc<WorkerShared>) {
    shared.preparing.store(true, Ordering::SeqCst);
    shared.emit(SessionStatus::Preparing);

    let s = Arc::clone(shared);
    let handle = thread::Builder::new()
        .name("prepare-countdown".into())
        .spawn(move || {
            let mut countdown = s.config.prepare_ticks;
            loop {
                thread::sleep(s.config.tick_interval);
                countdown -= 1;
                s.emit(SessionStatus::UpdatePrepareCounter(countdown));
                if s.is_stop_requested() || countdown == 0 {
                    break;
                }
            }

            // The device may have faulted (or a stop request may have torn
            // it down) during the countdown; recheck before starting.
            let device = s.device.lock().take();
            let Some(device) = device else {
                finish_preparing_failed(&s);
                return;
            };
            if s.is_stop_requested() || !device.is_ready() {
                *s.device.lock() = Some(device);
                finish_preparing_failed(&s);
                return;
            }
            if device.start().is_err() {
                // Reported through the fault handler; the device is torn down.
                s.preparing.store(false, Ordering::SeqCst);
                s.request_stop();
                return;
            }
            *s.device.lock() = Some(device);

            s.emit(SessionStatus::FinishedPreparing);
            if !s.is_stop_requested() {
                spawn_recording_timer(&s);
            }
            s.preparing.store(false, Ordering::SeqCst);
        })
        .expect("failed to spawn prepare countdown thread");

    shared.timers.lock().push(handle);
}

fn finish_preparing_failed(shared: &Arc<WorkerShared>) {
    log::error!(
        "session {}: recording device not ready after prepare countdown",
        shared.session_id
    );
    shared.emit(SessionStatus::RecorderInitializationError);
    shared.preparing.store(false, Ordering::SeqCst);
    shared.request_stop();
}

/// Arm the recording counter: one tick per interval up to the configured
/// length, then stop and release the device.
fn spawn_recording_timer(shared: &Arc<WorkerShared>) {
    shared.recording.store(true, Ordering::SeqCst);
    shared.emit(SessionStatus::Recording);

    let s = Arc::clone(shared);
    let handle = thread::Builder::new()
        .name("recording-counter".into())
        .spawn(move || {
            let mut elapsed = 0;
            loop {
                thread::sleep(s.config.tick_interval);
                elapsed += 1;
                s.emit(SessionStatus::UpdateRecordingCounter(elapsed));
                if s.is_stop_requested() || elapsed >= s.config.recording_ticks {
                    break;
                }
            }

            let device = s.device.lock().take();
            if let Some(device) = device {
                let _ = device.stop();
                let _ = device.release();
            }
            s.emit(SessionStatus::StoppedRecording);
            s.recording.store(false, Ordering::SeqCst);
        })
        .expect("failed to spawn recording counter thread");

    shared.timers.lock().push(handle);
}

/// Validate the captured sample and emit the terminal outcome.
fn export_sample(shared: &Arc<WorkerShared>) {
    shared.emit(SessionStatus::CheckingSamples);

    match check_sample(shared) {
        Ok(result) => {
            shared.emit(SessionStatus::CheckSuccessful);
            shared.succeeded.store(true, Ordering::SeqCst);
            shared.emit(SessionStatus::RecordingSuccessful(result.file_path.clone()));
            if let Some(ref delegate) = shared.delegate {
                delegate.on_finished(&result);
            }
        }
        Err(e) => {
            // A too-short or unreadable sample is treated as a device/setup
            // fault, not a user-recoverable condition.
            log::error!("session {}: sample check failed: {}", shared.session_id, e);
            shared.emit(SessionStatus::RecorderInitializationError);
        }
    }

    shared.request_stop();
}

fn check_sample(shared: &Arc<WorkerShared>) -> Result<RecordingResult, CaptureError> {
    let container = WavContainer::load(&shared.sample_path)?;
    let duration = container.duration();
    log::debug!("session {}: sample duration {}s", shared.session_id, duration);

    if duration <= shared.config.min_sample_secs {
        return Err(CaptureError::DurationTooShort {
            actual: duration,
            required: shared.config.min_sample_secs,
        });
    }

    RecordingResult::new(&shared.session_id, shared.sample_path.clone(), duration)
}

fn discard_scratch(shared: &WorkerShared) {
    if shared.sample_path.exists() {
        if let Err(e) = fs::remove_file(&shared.sample_path) {
            log::error!(
                "session {}: failed to delete scratch file {}: {}",
                shared.session_id,
                shared.sample_path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::device::fakes::FakeBackend;

    struct CollectingDelegate {
        statuses: Mutex<Vec<SessionStatus>>,
        results: Mutex<Vec<RecordingResult>>,
    }

    impl CollectingDelegate {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                statuses: Mutex::new(Vec::new()),
                results: Mutex::new(Vec::new()),
            })
        }

        fn statuses(&self) -> Vec<SessionStatus> {
            self.statuses.lock().clone()
        }

        fn results(&self) -> Vec<RecordingResult> {
            self.results.lock().clone()
        }
    }

    impl SessionDelegate for CollectingDelegate {
        fn on_status(&self, status: &SessionStatus) {
            self.statuses.lock().push(status.clone());
        }

        fn on_finished(&self, result: &RecordingResult) {
            self.results.lock().push(result.clone());
        }
    }

    fn fast_config(root: &std::path::Path) -> CaptureConfig {
        CaptureConfig {
            tick_interval: Duration::from_millis(10),
            poll_interval: Duration::from_millis(2),
            ..CaptureConfig::new(root)
        }
    }

    fn wait_for_stopped(delegate: &CollectingDelegate) {
        for _ in 0..500 {
            if delegate.statuses().last() == Some(&SessionStatus::Stopped) {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("session never emitted Stopped; saw {:?}", delegate.statuses());
    }

    #[test]
    fn acquisition_failure_emits_initialization_error_then_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(DeviceRegistry::new(Arc::new(FakeBackend::new(vec![]))));
        let delegate = CollectingDelegate::new();

        let mut session = CaptureSession::new(registry, fast_config(dir.path()));
        session.set_delegate(Arc::clone(&delegate) as Arc<dyn SessionDelegate>);
        session.start("sess1").unwrap();
        wait_for_stopped(&delegate);
        session.stop();

        assert_eq!(
            delegate.statuses(),
            vec![
                SessionStatus::Starting,
                SessionStatus::RecorderInitializationError,
                SessionStatus::Stopped,
            ]
        );
    }

    #[test]
    fn stop_before_finished_preparing_never_succeeds_and_deletes_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(DeviceRegistry::new(Arc::new(FakeBackend::new(vec![44100]))));
        let delegate = CollectingDelegate::new();

        let config = CaptureConfig {
            // Long ticks keep the session inside the prepare countdown.
            tick_interval: Duration::from_millis(50),
            poll_interval: Duration::from_millis(2),
            ..CaptureConfig::new(dir.path())
        };
        let mut session = CaptureSession::new(registry, config);
        session.set_delegate(Arc::clone(&delegate) as Arc<dyn SessionDelegate>);
        session.start("sess1").unwrap();
        thread::sleep(Duration::from_millis(20));
        session.stop();

        let statuses = delegate.statuses();
        assert!(!statuses.contains(&SessionStatus::FinishedPreparing));
        assert!(!statuses.iter().any(|s| s.output_path().is_some()));
        assert_eq!(statuses.last(), Some(&SessionStatus::Stopped));
        assert_eq!(
            statuses.iter().filter(|s| s.is_terminal()).count(),
            1,
            "exactly one terminal status expected: {:?}",
            statuses
        );
        assert!(!dir.path().join("tmp/sess1.wav").exists());
        assert!(delegate.results().is_empty());
    }

    #[test]
    fn restarting_a_session_stops_the_previous_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(DeviceRegistry::new(Arc::new(FakeBackend::new(vec![44100]))));
        let delegate = CollectingDelegate::new();

        let config = CaptureConfig {
            tick_interval: Duration::from_millis(50),
            poll_interval: Duration::from_millis(2),
            ..CaptureConfig::new(dir.path())
        };
        let mut session = CaptureSession::new(registry, config);
        session.set_delegate(Arc::clone(&delegate) as Arc<dyn SessionDelegate>);
        session.start("first").unwrap();
        session.start("second").unwrap();
        session.stop();

        // Both attempts wound down with a final Stopped each.
        let stopped = delegate
            .statuses()
            .iter()
            .filter(|s| **s == SessionStatus::Stopped)
            .count();
        assert_eq!(stopped, 2);
    }

    #[test]
    fn invalid_config_is_rejected_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(DeviceRegistry::new(Arc::new(FakeBackend::new(vec![44100]))));

        let config = CaptureConfig {
            recording_ticks: 0,
            ..fast_config(dir.path())
        };
        let mut session = CaptureSession::new(registry, config);
        let err = session.start("sess1").unwrap_err();
        assert!(matches!(err, CaptureError::InvalidState(_)));
    }
}
