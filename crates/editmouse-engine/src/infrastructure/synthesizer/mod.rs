//! Event synthesizer implementations.
//!
//! The synthesizer injects the replacement button event chosen by the remap
//! engine.  Injected events must never be handed back to the engine; on Linux
//! this holds because they come from the engine's own uinput device, which
//! the tap never grabs.

use editmouse_core::{ButtonPhase, DeviceId, Location, SourceButton, Timestamp};

use crate::application::remap_engine::{EventSynthesizer, SynthesisError};

pub mod mock;

#[cfg(target_os = "linux")]
pub mod linux;

/// Synthesizer used when no backend could be created.
///
/// Every emit fails, so the engine lets every press through unchanged.
#[derive(Debug, Clone)]
pub struct UnavailableSynthesizer {
    reason: String,
}

impl UnavailableSynthesizer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl EventSynthesizer for UnavailableSynthesizer {
    fn emit(
        &self,
        _device_id: &DeviceId,
        _button: SourceButton,
        _phase: ButtonPhase,
        _timestamp: Timestamp,
        _location: Location,
    ) -> Result<(), SynthesisError> {
        Err(SynthesisError::Unavailable(self.reason.clone()))
    }
}
