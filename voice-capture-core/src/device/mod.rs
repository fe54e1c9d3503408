pub mod recorder;
pub mod registry;

/// Interval between buffer-ready deliveries, in milliseconds.
pub(crate) const FRAME_INTERVAL_MS: u32 = 120;

/// Fixed capture format: 16-bit mono PCM.
pub(crate) const BIT_DEPTH: u16 = 16;
pub(crate) const CHANNELS: u16 = 1;

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::models::error::CaptureError;
    use crate::traits::input_backend::{
        BufferSizeError, FrameCallback, InputBackend, InputParams, InputStream,
    };

    /// In-memory input backend for unit tests. Streams deliver nothing on
    /// their own; tests pump frames through the captured callback.
    pub struct FakeBackend {
        pub supported_rates: Vec<u32>,
        pub min_buffer: usize,
        pub fail_start: bool,
        pub unqueryable: bool,
        pub opened: AtomicUsize,
        pub live_streams: Arc<AtomicUsize>,
        pub callback: Arc<Mutex<Option<FrameCallback>>>,
    }

    impl FakeBackend {
        pub fn new(supported_rates: Vec<u32>) -> Self {
            Self {
                supported_rates,
                min_buffer: 1024,
                fail_start: false,
                unqueryable: false,
                opened: AtomicUsize::new(0),
                live_streams: Arc::new(AtomicUsize::new(0)),
                callback: Arc::new(Mutex::new(None)),
            }
        }

        /// Deliver one buffer through the most recently started stream.
        pub fn pump(&self, frames: &[u8]) {
            let callback = self.callback.lock().clone();
            if let Some(callback) = callback {
                callback(frames);
            }
        }
    }

    impl InputBackend for FakeBackend {
        fn min_buffer_size(
            &self,
            sample_rate: u32,
            _channels: u16,
            _bit_depth: u16,
        ) -> Result<usize, BufferSizeError> {
            if self.unqueryable {
                return Err(BufferSizeError::Unqueryable);
            }
            if !self.supported_rates.contains(&sample_rate) {
                return Err(BufferSizeError::Unsupported);
            }
            Ok(self.min_buffer)
        }

        fn open(&self, _params: InputParams) -> Result<Box<dyn InputStream>, CaptureError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.live_streams.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeStream {
                live: Arc::clone(&self.live_streams),
                callback: Arc::clone(&self.callback),
                fail_start: self.fail_start,
            }))
        }
    }

    pub struct FakeStream {
        live: Arc<AtomicUsize>,
        callback: Arc<Mutex<Option<FrameCallback>>>,
        fail_start: bool,
    }

    impl InputStream for FakeStream {
        fn start(&mut self, callback: FrameCallback) -> Result<(), CaptureError> {
            if self.fail_start {
                return Err(CaptureError::DeviceUnavailable("injected start failure".into()));
            }
            *self.callback.lock() = Some(callback);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), CaptureError> {
            *self.callback.lock() = None;
            Ok(())
        }
    }

    impl Drop for FakeStream {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
