//! # voice-capture-sim
//!
//! Deterministic software input backend for voice-capture.
//!
//! Provides:
//! - `SimulatedInput` — an `InputBackend` producing silent 16-bit mono PCM
//!   on a feeder thread, with configurable pacing and failure injection
//!   (unsupported rates, unqueryable buffer sizes, failed starts, capped
//!   capture length)
//!
//! Used for development without audio hardware and for end-to-end tests of
//! the capture session choreography.
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use voice_capture_core::{CaptureConfig, CaptureSession, DeviceRegistry};
//! use voice_capture_sim::SimulatedInput;
//!
//! let registry = Arc::new(DeviceRegistry::new(Arc::new(SimulatedInput::new())));
//! let mut session = CaptureSession::new(registry, CaptureConfig::new("/tmp/voice"));
//! ```

pub mod input;

pub use input::SimulatedInput;
