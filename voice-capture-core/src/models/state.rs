/// Recording device state machine.
///
/// State transitions within one capture attempt:
/// ```text
/// initializing → ready → recording → stopped
///       ↓          ↓         ↓
///       └──────── error ─────┘   (absorbing; forces stop + release)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Initializing,
    Ready,
    Recording,
    Stopped,
    Error,
}

impl DeviceState {
    pub fn is_initializing(&self) -> bool {
        matches!(self, Self::Initializing)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}
