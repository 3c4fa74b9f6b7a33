//! Mock event synthesizer for integration testing.
//!
//! Records every emitted event in order instead of touching uinput, so
//! tests can assert exactly which replacement events the engine produced.
//!
//! # `should_fail` flag
//!
//! Call [`MockSynthesizer::set_failing`] to make every subsequent `emit`
//! return [`SynthesisError::Rejected`], for testing the engine's fallback to
//! passthrough.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use editmouse_core::{ButtonPhase, DeviceId, Location, SourceButton, Timestamp};

use crate::application::remap_engine::{EventSynthesizer, SynthesisError};

/// A single recorded emit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedEvent {
    pub device_id: DeviceId,
    pub button: SourceButton,
    pub phase: ButtonPhase,
    pub timestamp: Timestamp,
    pub location: Location,
}

/// A mock implementation of [`EventSynthesizer`].
#[derive(Default)]
pub struct MockSynthesizer {
    emitted: Mutex<Vec<SynthesizedEvent>>,
    should_fail: AtomicBool,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Returns a copy of everything emitted so far.
    pub fn emitted(&self) -> Vec<SynthesizedEvent> {
        self.emitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns `(button, phase)` pairs in emit order.
    pub fn emitted_buttons(&self) -> Vec<(SourceButton, ButtonPhase)> {
        self.emitted()
            .into_iter()
            .map(|e| (e.button, e.phase))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.emitted.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn clear(&self) {
        self.emitted.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl EventSynthesizer for MockSynthesizer {
    fn emit(
        &self,
        device_id: &DeviceId,
        button: SourceButton,
        phase: ButtonPhase,
        timestamp: Timestamp,
        location: Location,
    ) -> Result<(), SynthesisError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(SynthesisError::Rejected("mock failure".into()));
        }
        self.emitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SynthesizedEvent {
                device_id: device_id.clone(),
                button,
                phase,
                timestamp,
                location,
            });
        Ok(())
    }
}
