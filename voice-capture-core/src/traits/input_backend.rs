use std::sync::Arc;

use crate::models::error::CaptureError;

/// Callback invoked by the backend each time one frame period's worth of
/// PCM has been captured.
///
/// `frames` holds raw little-endian samples in the stream's negotiated
/// format. The callback fires on the backend's capture thread — keep
/// processing minimal.
pub type FrameCallback = Arc<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Why a minimum-buffer-size query failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSizeError {
    /// The backend could not query the hardware for its input properties.
    Unqueryable,
    /// The requested capture parameters are not supported by the hardware.
    Unsupported,
}

/// Parameters a capture stream is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputParams {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    /// Capture buffer size in bytes.
    pub buffer_size: usize,
    /// Frames delivered per callback.
    pub frame_period: usize,
}

/// Interface to a platform's audio input.
///
/// Implemented by platform backends (and by the simulated backend in
/// `voice-capture-sim`). The registry probes `min_buffer_size` to negotiate
/// a sample rate and buffer size, then opens one exclusive stream.
pub trait InputBackend: Send + Sync {
    /// Minimum supported capture buffer size in bytes for the given format.
    fn min_buffer_size(
        &self,
        sample_rate: u32,
        channels: u16,
        bit_depth: u16,
    ) -> Result<usize, BufferSizeError>;

    /// Open a capture stream. The stream is exclusive; opening does not yet
    /// start capture.
    fn open(&self, params: InputParams) -> Result<Box<dyn InputStream>, CaptureError>;
}

/// An open capture stream.
pub trait InputStream: Send {
    /// Begin capture, delivering buffers via `callback` until `stop`.
    fn start(&mut self, callback: FrameCallback) -> Result<(), CaptureError>;

    /// Halt capture. No further callbacks fire after this returns.
    fn stop(&mut self) -> Result<(), CaptureError>;
}
