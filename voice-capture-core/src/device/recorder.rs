use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::format::header;
use crate::models::error::CaptureError;
use crate::models::state::DeviceState;
use crate::traits::input_backend::{BufferSizeError, FrameCallback, InputBackend, InputParams, InputStream};

use super::{BIT_DEPTH, CHANNELS, FRAME_INTERVAL_MS};

/// Handler invoked once when the device enters its terminal fault state.
///
/// By the time the handler returns, the device has been stopped and its
/// handles released; callers may not issue further capture calls.
pub type FaultHandler = Arc<dyn Fn(&CaptureError) + Send + Sync + 'static>;

/// Open output file plus the number of payload bytes appended so far.
struct SampleSink {
    file: File,
    payload_bytes: u32,
}

/// State shared between the owning handle, the capture callback, and the
/// registry's forced-release path.
pub(crate) struct DeviceShared {
    sample_rate: u32,
    frame_period: usize,
    buffer_size: usize,
    state: Mutex<DeviceState>,
    sink: Mutex<Option<SampleSink>>,
    stream: Mutex<Option<Box<dyn InputStream>>>,
    fault_handler: Mutex<Option<FaultHandler>>,
}

/// Exclusive handle to the hardware capture stream.
///
/// Obtained from [`DeviceRegistry::acquire`](super::registry::DeviceRegistry::acquire),
/// which guarantees at most one live handle at a time. Drives the
/// per-attempt state machine: prepare an output file, start capture,
/// stream frames into the file as the backend delivers them, then stop
/// (patching the WAV header sizes in place) and release.
///
/// Any fault — invalid call ordering, I/O error in the capture callback,
/// a failed hardware start — latches the absorbing `Error` state, reports
/// once through the registered [`FaultHandler`], and tears the device down.
pub struct RecordingDevice {
    shared: Arc<DeviceShared>,
}

impl std::fmt::Debug for RecordingDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingDevice").finish_non_exhaustive()
    }
}

impl RecordingDevice {
    /// Negotiate buffer size and open the capture stream at `sample_rate`.
    pub(crate) fn open(backend: &dyn InputBackend, sample_rate: u32) -> Result<Self, CaptureError> {
        let min_buffer = match backend.min_buffer_size(sample_rate, CHANNELS, BIT_DEPTH) {
            Ok(size) => size,
            Err(BufferSizeError::Unqueryable) => {
                return Err(CaptureError::DeviceUnavailable(
                    "backend cannot query the hardware for a minimum buffer size".into(),
                ))
            }
            Err(BufferSizeError::Unsupported) => {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "capture parameters not supported: {} Hz, {}-bit, {} channel(s)",
                    sample_rate, BIT_DEPTH, CHANNELS
                )))
            }
        };

        let frame_bytes = (BIT_DEPTH / 8) as usize * CHANNELS as usize;
        let mut frame_period = sample_rate as usize * FRAME_INTERVAL_MS as usize / 1000;
        let mut buffer_size = frame_period * 2 * frame_bytes;
        if buffer_size < min_buffer {
            // Never open with less than the smallest allowed buffer; the
            // frame period follows the raised size.
            buffer_size = min_buffer;
            frame_period = buffer_size / (2 * frame_bytes);
            log::debug!("increasing capture buffer to {} bytes", buffer_size);
        }

        let params = InputParams {
            sample_rate,
            channels: CHANNELS,
            bit_depth: BIT_DEPTH,
            buffer_size,
            frame_period,
        };
        let stream = backend.open(params).map_err(|e| {
            CaptureError::DeviceUnavailable(format!("failed to open capture stream: {}", e))
        })?;
        log::debug!(
            "capture stream opened: {} Hz, {} byte buffer, {} frame period",
            sample_rate,
            buffer_size,
            frame_period
        );

        Ok(Self {
            shared: Arc::new(DeviceShared {
                sample_rate,
                frame_period,
                buffer_size,
                state: Mutex::new(DeviceState::Initializing),
                sink: Mutex::new(None),
                stream: Mutex::new(Some(stream)),
                fault_handler: Mutex::new(None),
            }),
        })
    }

    pub(crate) fn shared(&self) -> &Arc<DeviceShared> {
        &self.shared
    }

    pub fn state(&self) -> DeviceState {
        self.shared.state()
    }

    pub fn is_ready(&self) -> bool {
        self.shared.state().is_ready()
    }

    pub fn has_error(&self) -> bool {
        self.shared.state().is_error()
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    /// Frames delivered per buffer-ready callback.
    pub fn frame_period(&self) -> usize {
        self.shared.frame_period
    }

    /// Negotiated capture buffer size in bytes.
    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size
    }

    /// Payload bytes appended to the output file so far.
    pub fn payload_bytes(&self) -> u32 {
        self.shared.sink.lock().as_ref().map_or(0, |s| s.payload_bytes)
    }

    /// Register the handler invoked when the device faults.
    pub fn set_fault_handler(&self, handler: FaultHandler) {
        *self.shared.fault_handler.lock() = Some(handler);
    }

    /// Write the placeholder WAV header to `path` and become ready.
    ///
    /// Valid only while initializing; anything else is a fault.
    pub fn prepare(&self, path: &Path) -> Result<(), CaptureError> {
        self.shared.prepare(path)
    }

    /// Begin capture. Valid only from the ready state; the accumulated
    /// payload counter restarts at zero.
    pub fn start(&self) -> Result<(), CaptureError> {
        if !self.shared.state().is_ready() {
            let err = CaptureError::InvalidState("start() requires a prepared device".into());
            self.shared.fault(&err);
            return Err(err);
        }

        if let Some(sink) = self.shared.sink.lock().as_mut() {
            sink.payload_bytes = 0;
        }

        let weak = Arc::downgrade(&self.shared);
        let callback: FrameCallback = Arc::new(move |frames| {
            if let Some(shared) = weak.upgrade() {
                shared.append_frames(frames);
            }
        });

        let started = {
            let mut stream = self.shared.stream.lock();
            match stream.as_mut() {
                Some(stream) => stream.start(callback),
                None => Err(CaptureError::InvalidState("capture stream already released".into())),
            }
        };
        if let Err(e) = started {
            // An unstartable stream is an unrecoverable device fault, not a
            // retryable condition.
            let err = CaptureError::DeviceUnavailable(format!("failed to start capture: {}", e));
            self.shared.fault(&err);
            return Err(err);
        }

        self.shared.set_state(DeviceState::Recording);
        log::debug!("recording started at {} Hz", self.shared.sample_rate);
        Ok(())
    }

    /// Halt capture and patch the WAV header's size fields in place.
    ///
    /// A no-op unless recording; an errored device stays errored.
    pub fn stop(&self) -> Result<(), CaptureError> {
        self.shared.stop_capture()
    }

    /// Close the output file and release the capture stream.
    ///
    /// Forbidden while recording: the caller must stop first. Safe to call
    /// repeatedly otherwise.
    pub fn release(&self) -> Result<(), CaptureError> {
        if self.shared.state().is_recording() {
            return Err(CaptureError::InvalidState(
                "release() called while recording; stop the device first".into(),
            ));
        }
        self.shared.release_handles();
        Ok(())
    }
}

impl Drop for RecordingDevice {
    fn drop(&mut self) {
        self.shared.force_release();
    }
}

impl DeviceShared {
    pub(crate) fn state(&self) -> DeviceState {
        *self.state.lock()
    }

    fn set_state(&self, state: DeviceState) {
        *self.state.lock() = state;
    }

    fn prepare(&self, path: &Path) -> Result<(), CaptureError> {
        if !self.state().is_initializing() {
            let err = CaptureError::InvalidState(
                "prepare() called on a device that is not initializing".into(),
            );
            self.fault(&err);
            return Err(err);
        }

        let opened = (|| {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(path)?;
            file.write_all(&header::encode_header(self.sample_rate, BIT_DEPTH, CHANNELS, 0))?;
            Ok::<File, std::io::Error>(file)
        })();
        let file = match opened {
            Ok(file) => file,
            Err(e) => {
                let err = CaptureError::IoFailure(format!(
                    "failed to write wav header to {}: {}",
                    path.display(),
                    e
                ));
                self.fault(&err);
                return Err(err);
            }
        };

        *self.sink.lock() = Some(SampleSink { file, payload_bytes: 0 });
        self.set_state(DeviceState::Ready);
        log::debug!("placeholder wav header written to {}", path.display());
        Ok(())
    }

    /// Append one delivered buffer to the output file. Runs on the
    /// backend's capture thread.
    fn append_frames(&self, frames: &[u8]) {
        let mut guard = self.sink.lock();
        let Some(sink) = guard.as_mut() else {
            return;
        };
        match sink.file.write_all(frames) {
            Ok(()) => sink.payload_bytes += frames.len() as u32,
            Err(e) => {
                drop(guard);
                self.fault(&CaptureError::IoFailure(format!(
                    "failed to append captured frames: {}",
                    e
                )));
            }
        }
    }

    pub(crate) fn stop_capture(&self) -> Result<(), CaptureError> {
        match self.state() {
            DeviceState::Recording => {
                // Take the stream out before stopping it: stop() may join
                // the capture thread, which must stay free to lock `stream`.
                let stream = self.stream.lock().take();
                if let Some(mut stream) = stream {
                    let _ = stream.stop();
                    *self.stream.lock() = Some(stream);
                }
                if let Err(e) = self.finish_header() {
                    self.fault(&e);
                    return Err(e);
                }
                self.set_state(DeviceState::Stopped);
                Ok(())
            }
            // Fault teardown already ran; Error is absorbing.
            DeviceState::Error => Ok(()),
            _ => {
                self.set_state(DeviceState::Stopped);
                Ok(())
            }
        }
    }

    /// Patch the header's RIFF-size and data-size fields and close the file.
    fn finish_header(&self) -> Result<(), CaptureError> {
        let Some(mut sink) = self.sink.lock().take() else {
            return Ok(());
        };
        let payload = sink.payload_bytes;
        let io_err =
            |e: std::io::Error| CaptureError::IoFailure(format!("failed to finalize wav header: {}", e));

        sink.file.seek(SeekFrom::Start(header::RIFF_SIZE_OFFSET)).map_err(io_err)?;
        sink.file.write_all(&(36 + payload).to_le_bytes()).map_err(io_err)?;
        sink.file.seek(SeekFrom::Start(header::DATA_SIZE_OFFSET)).map_err(io_err)?;
        sink.file.write_all(&payload.to_le_bytes()).map_err(io_err)?;
        sink.file.flush().map_err(io_err)?;
        log::debug!("wav header finalized with {} payload bytes", payload);
        Ok(())
    }

    pub(crate) fn release_handles(&self) {
        self.sink.lock().take();
        let stream = self.stream.lock().take();
        if let Some(mut stream) = stream {
            let _ = stream.stop();
        }
    }

    /// Stop (if recording) and release, regardless of state. Used by the
    /// registry's exclusive-acquire path and on handle drop.
    pub(crate) fn force_release(&self) {
        if self.state().is_recording() {
            let _ = self.stop_capture();
        }
        self.release_handles();
        if !self.state().is_error() {
            self.set_state(DeviceState::Stopped);
        }
    }

    /// Latch the terminal fault state, report once, then tear down.
    ///
    /// No internal locks are held while the handler runs, so the handler
    /// may call back into `stop`/`release` safely.
    fn fault(&self, err: &CaptureError) {
        {
            let mut state = self.state.lock();
            if *state == DeviceState::Error {
                return;
            }
            *state = DeviceState::Error;
        }
        log::error!("recording device fault: {}", err);

        let handler = self.fault_handler.lock().clone();
        if let Some(handler) = handler {
            handler(err);
        }

        // Torn down before fault() returns; the header keeps its zeroed
        // size fields.
        self.release_handles();
    }
}
