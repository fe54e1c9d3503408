//! Simulated input backend.
//!
//! Delivers silent PCM buffers from a dedicated feeder thread, pacing
//! deliveries in real time by default or at a configured interval for
//! fast tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use voice_capture_core::models::error::CaptureError;
use voice_capture_core::traits::input_backend::{
    BufferSizeError, FrameCallback, InputBackend, InputParams, InputStream,
};

/// Deterministic software audio input.
///
/// Supports the same candidate rates as real capture hardware by default
/// and reports a 20ms minimum buffer. Every knob exists to exercise one
/// failure path of the capture pipeline.
pub struct SimulatedInput {
    supported_rates: Vec<u32>,
    buffer_query_error: Option<BufferSizeError>,
    fail_start: bool,
    callback_interval: Option<Duration>,
    frames_per_callback: Option<usize>,
    max_frames: Option<u64>,
    open_streams: Arc<AtomicUsize>,
}

impl SimulatedInput {
    pub fn new() -> Self {
        Self {
            supported_rates: vec![44100, 22050, 11025, 8000],
            buffer_query_error: None,
            fail_start: false,
            callback_interval: None,
            frames_per_callback: None,
            max_frames: None,
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Restrict the rates the backend reports as supported.
    pub fn with_supported_rates(mut self, rates: Vec<u32>) -> Self {
        self.supported_rates = rates;
        self
    }

    /// Make every minimum-buffer-size query fail with `error`.
    pub fn with_buffer_query_error(mut self, error: BufferSizeError) -> Self {
        self.buffer_query_error = Some(error);
        self
    }

    /// Make `InputStream::start` fail, as an unstartable device would.
    pub fn with_failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Deliver buffers at `interval` instead of real-time pacing.
    pub fn with_callback_interval(mut self, interval: Duration) -> Self {
        self.callback_interval = Some(interval);
        self
    }

    /// Deliver `frames` per callback instead of the negotiated frame period.
    pub fn with_frames_per_callback(mut self, frames: usize) -> Self {
        self.frames_per_callback = Some(frames);
        self
    }

    /// Stop producing audio after `frames` total, as if the source ran dry.
    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.max_frames = Some(frames);
        self
    }

    /// Number of streams currently open (for exclusivity assertions).
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedInput {
    fn default() -> Self {
        Self::new()
    }
}

impl InputBackend for SimulatedInput {
    fn min_buffer_size(
        &self,
        sample_rate: u32,
        channels: u16,
        bit_depth: u16,
    ) -> Result<usize, BufferSizeError> {
        if let Some(error) = self.buffer_query_error {
            return Err(error);
        }
        if !self.supported_rates.contains(&sample_rate) {
            return Err(BufferSizeError::Unsupported);
        }
        // Mimic a typical hardware minimum of 20ms of frames.
        Ok(sample_rate as usize / 50 * (bit_depth as usize / 8) * channels as usize)
    }

    fn open(&self, params: InputParams) -> Result<Box<dyn InputStream>, CaptureError> {
        if !self.supported_rates.contains(&params.sample_rate) {
            return Err(CaptureError::DeviceUnavailable(format!(
                "simulated input does not support {} Hz",
                params.sample_rate
            )));
        }
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        log::debug!(
            "simulated stream opened: {} Hz, {} frame period",
            params.sample_rate,
            params.frame_period
        );
        Ok(Box::new(SimStream {
            params,
            fail_start: self.fail_start,
            callback_interval: self.callback_interval,
            frames_per_callback: self.frames_per_callback,
            max_frames: self.max_frames,
            open_streams: Arc::clone(&self.open_streams),
            running: Arc::new(AtomicBool::new(false)),
            feeder: Mutex::new(None),
        }))
    }
}

struct SimStream {
    params: InputParams,
    fail_start: bool,
    callback_interval: Option<Duration>,
    frames_per_callback: Option<usize>,
    max_frames: Option<u64>,
    open_streams: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    feeder: Mutex<Option<thread::JoinHandle<()>>>,
}

impl InputStream for SimStream {
    fn start(&mut self, callback: FrameCallback) -> Result<(), CaptureError> {
        if self.fail_start {
            return Err(CaptureError::DeviceUnavailable(
                "simulated capture refused to start".into(),
            ));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::InvalidState("simulated capture already running".into()));
        }

        let running = Arc::clone(&self.running);
        let frames = self.frames_per_callback.unwrap_or(self.params.frame_period);
        let frame_bytes = (self.params.bit_depth / 8) as usize * self.params.channels as usize;
        let interval = self.callback_interval.unwrap_or_else(|| {
            Duration::from_secs_f64(frames as f64 / self.params.sample_rate as f64)
        });
        let max_frames = self.max_frames;

        let handle = thread::Builder::new()
            .name("sim-input-feeder".into())
            .spawn(move || {
                let buffer = vec![0u8; frames * frame_bytes];
                let mut delivered: u64 = 0;
                while running.load(Ordering::SeqCst) {
                    thread::sleep(interval);
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    // A dry source keeps the stream alive without delivering.
                    if let Some(max) = max_frames {
                        let remaining = max.saturating_sub(delivered) as usize;
                        if remaining == 0 {
                            continue;
                        }
                        if remaining < frames {
                            callback(&buffer[..remaining * frame_bytes]);
                            delivered = max;
                            continue;
                        }
                    }
                    callback(&buffer);
                    delivered += frames as u64;
                }
            })
            .map_err(|e| {
                CaptureError::DeviceUnavailable(format!("failed to spawn feeder thread: {}", e))
            })?;

        *self.feeder.lock() = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.feeder.lock().take() {
            // The device fault path may stop the stream from within the
            // capture callback itself; never join the current thread.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        Ok(())
    }
}

impl Drop for SimStream {
    fn drop(&mut self) {
        let _ = self.stop();
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_minimum_buffer_for_supported_rate() {
        let input = SimulatedInput::new();
        // 20ms of 16-bit mono at 44100 Hz.
        assert_eq!(input.min_buffer_size(44100, 1, 16), Ok(1764));
    }

    #[test]
    fn unsupported_rate_query_fails() {
        let input = SimulatedInput::new().with_supported_rates(vec![8000]);
        assert_eq!(
            input.min_buffer_size(44100, 1, 16),
            Err(BufferSizeError::Unsupported)
        );
    }

    #[test]
    fn injected_query_error_wins() {
        let input = SimulatedInput::new().with_buffer_query_error(BufferSizeError::Unqueryable);
        assert_eq!(
            input.min_buffer_size(44100, 1, 16),
            Err(BufferSizeError::Unqueryable)
        );
    }

    #[test]
    fn stream_delivers_frames_until_stopped() {
        let input = SimulatedInput::new()
            .with_callback_interval(Duration::from_millis(1))
            .with_frames_per_callback(100);
        let params = InputParams {
            sample_rate: 44100,
            channels: 1,
            bit_depth: 16,
            buffer_size: 400,
            frame_period: 100,
        };

        let mut stream = input.open(params).unwrap();
        assert_eq!(input.open_streams(), 1);

        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        stream
            .start(Arc::new(move |frames: &[u8]| {
                counter.fetch_add(frames.len(), Ordering::SeqCst);
            }))
            .unwrap();

        thread::sleep(Duration::from_millis(50));
        stream.stop().unwrap();
        let total = received.load(Ordering::SeqCst);
        assert!(total > 0, "no frames delivered");
        // 100 frames of 16-bit mono per delivery.
        assert_eq!(total % 200, 0);

        drop(stream);
        assert_eq!(input.open_streams(), 0);
    }

    #[test]
    fn max_frames_caps_total_delivery() {
        let input = SimulatedInput::new()
            .with_callback_interval(Duration::from_millis(1))
            .with_frames_per_callback(64)
            .with_max_frames(150);
        let params = InputParams {
            sample_rate: 8000,
            channels: 1,
            bit_depth: 16,
            buffer_size: 256,
            frame_period: 64,
        };

        let mut stream = input.open(params).unwrap();
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        stream
            .start(Arc::new(move |frames: &[u8]| {
                counter.fetch_add(frames.len(), Ordering::SeqCst);
            }))
            .unwrap();

        thread::sleep(Duration::from_millis(50));
        stream.stop().unwrap();
        // Exactly 150 frames (300 bytes) despite time for far more.
        assert_eq!(received.load(Ordering::SeqCst), 300);
    }

    #[test]
    fn failing_start_reports_device_unavailable() {
        let input = SimulatedInput::new().with_failing_start();
        let params = InputParams {
            sample_rate: 44100,
            channels: 1,
            bit_depth: 16,
            buffer_size: 400,
            frame_period: 100,
        };

        let mut stream = input.open(params).unwrap();
        let err = stream.start(Arc::new(|_frames: &[u8]| {})).unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
    }
}
