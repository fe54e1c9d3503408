use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::traits::input_backend::InputBackend;

use super::recorder::{DeviceShared, RecordingDevice};
use super::{BIT_DEPTH, CHANNELS};

/// Candidate sample rates, probed highest first.
pub const CANDIDATE_SAMPLE_RATES: [u32; 4] = [44100, 22050, 11025, 8000];

/// Factory for [`RecordingDevice`] handles that enforces the
/// one-live-capture-handle invariant.
///
/// Acquiring a new device forcibly stops and releases any prior live
/// device before the new stream is opened, so two handles never hold the
/// underlying hardware at once. The returned handle is move-only; there is
/// no ambient global.
pub struct DeviceRegistry {
    backend: Arc<dyn InputBackend>,
    active: Mutex<Weak<DeviceShared>>,
}

impl DeviceRegistry {
    pub fn new(backend: Arc<dyn InputBackend>) -> Self {
        Self {
            backend,
            active: Mutex::new(Weak::new()),
        }
    }

    /// Acquire the capture device, negotiating a sample rate when none is
    /// given. Returns either a device in the initializing state or an
    /// error — never both.
    pub fn acquire(&self, sample_rate: Option<u32>) -> Result<RecordingDevice, CaptureError> {
        {
            let mut active = self.active.lock();
            if let Some(previous) = active.upgrade() {
                log::debug!("forcibly releasing previously acquired recording device");
                previous.force_release();
            }
            *active = Weak::new();
        }

        let rate = match sample_rate {
            Some(rate) => rate,
            None => self.highest_supported_sample_rate()?,
        };
        let device = RecordingDevice::open(self.backend.as_ref(), rate)?;
        *self.active.lock() = Arc::downgrade(device.shared());
        Ok(device)
    }

    /// First candidate rate for which the backend reports a valid minimum
    /// buffer size.
    pub fn highest_supported_sample_rate(&self) -> Result<u32, CaptureError> {
        for &rate in CANDIDATE_SAMPLE_RATES.iter() {
            if self.backend.min_buffer_size(rate, CHANNELS, BIT_DEPTH).is_ok() {
                return Ok(rate);
            }
        }
        Err(CaptureError::DeviceUnavailable(
            "no supported sample rate found".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::super::fakes::FakeBackend;
    use super::*;
    use crate::models::state::DeviceState;

    #[test]
    fn probes_highest_supported_rate_first() {
        let backend = Arc::new(FakeBackend::new(vec![22050, 8000]));
        let registry = DeviceRegistry::new(backend);

        let device = registry.acquire(None).unwrap();
        assert_eq!(device.sample_rate(), 22050);
    }

    #[test]
    fn explicit_rate_skips_probing() {
        let backend = Arc::new(FakeBackend::new(vec![44100, 11025]));
        let registry = DeviceRegistry::new(backend);

        let device = registry.acquire(Some(11025)).unwrap();
        assert_eq!(device.sample_rate(), 11025);
    }

    #[test]
    fn no_supported_rate_is_device_unavailable() {
        let backend = Arc::new(FakeBackend::new(vec![]));
        let registry = DeviceRegistry::new(backend);

        let err = registry.acquire(None).unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
    }

    #[test]
    fn unqueryable_backend_is_device_unavailable() {
        let mut fake = FakeBackend::new(vec![44100]);
        fake.unqueryable = true;
        let registry = DeviceRegistry::new(Arc::new(fake));

        assert!(registry.acquire(None).is_err());
    }

    #[test]
    fn second_acquire_releases_the_first_handle() {
        let backend = Arc::new(FakeBackend::new(vec![44100]));
        let live = Arc::clone(&backend.live_streams);
        let registry = DeviceRegistry::new(
            Arc::clone(&backend) as Arc<dyn crate::traits::input_backend::InputBackend>
        );

        let first = registry.acquire(None).unwrap();
        assert_eq!(live.load(Ordering::SeqCst), 1);

        let second = registry.acquire(None).unwrap();
        // Two streams were opened in total, but never two at once.
        assert_eq!(backend.opened.load(Ordering::SeqCst), 2);
        assert_eq!(live.load(Ordering::SeqCst), 1);
        assert_eq!(second.state(), DeviceState::Initializing);
        assert_eq!(first.state(), DeviceState::Stopped);
    }

    #[test]
    fn second_acquire_stops_a_recording_device() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::new(vec![44100]));
        let live = Arc::clone(&backend.live_streams);
        let registry = DeviceRegistry::new(Arc::clone(&backend) as Arc<dyn crate::traits::input_backend::InputBackend>);

        let first = registry.acquire(None).unwrap();
        first.prepare(&dir.path().join("a.wav")).unwrap();
        first.start().unwrap();
        backend.pump(&[0u8; 100]);

        let _second = registry.acquire(None).unwrap();
        assert_eq!(live.load(Ordering::SeqCst), 1);
        assert_eq!(first.state(), DeviceState::Stopped);

        // The forced stop patched the first file's header.
        let bytes = std::fs::read(dir.path().join("a.wav")).unwrap();
        assert_eq!(u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]), 100);
    }
}
