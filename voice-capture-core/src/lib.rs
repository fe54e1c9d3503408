//! # voice-capture-core
//!
//! Platform-agnostic voice sample capture core library.
//!
//! Provides the WAV container format, the exclusive recording-device state
//! machine, and the capture-session orchestration that ties them together.
//! Platform-specific audio inputs implement the `InputBackend` trait and
//! plug into the generic `CaptureSession` via the `DeviceRegistry`.
//!
//! ## Architecture
//!
//! ```text
//! voice-capture-core (this crate)
//! ├── traits/    ← InputBackend, InputStream, SessionDelegate
//! ├── models/    ← CaptureError, DeviceState, SessionStatus, CaptureConfig, RecordingResult
//! ├── format/    ← WavContainer, WAV header encode/patch offsets
//! ├── device/    ← DeviceRegistry (exclusive acquire), RecordingDevice
//! └── session/   ← CaptureSession (worker + countdown orchestration)
//! ```

pub mod device;
pub mod format;
pub mod models;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use device::recorder::{FaultHandler, RecordingDevice};
pub use device::registry::{DeviceRegistry, CANDIDATE_SAMPLE_RATES};
pub use format::container::WavContainer;
pub use models::config::CaptureConfig;
pub use models::error::CaptureError;
pub use models::result::RecordingResult;
pub use models::state::DeviceState;
pub use models::status::SessionStatus;
pub use session::capture::CaptureSession;
pub use traits::input_backend::{BufferSizeError, FrameCallback, InputBackend, InputParams, InputStream};
pub use traits::session_delegate::SessionDelegate;
