//! uinput-backed event synthesizer for Linux.
//!
//! Creates one virtual pointer advertising the five emitted button codes.
//! Each `emit` writes a single `EV_KEY` event; `VirtualDevice::emit` appends
//! the `SYN_REPORT` that makes it visible to readers.
//!
//! The virtual pointer's name starts with the prefix the tap and inventory
//! exclude, which is what keeps synthesized events out of the engine.

use std::sync::Mutex;

use editmouse_core::buttonmap::linux_evdev::EMITTED_CODES;
use editmouse_core::buttonmap::ButtonMapper;
use editmouse_core::{ButtonPhase, DeviceId, Location, SourceButton, Timestamp};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};
use tracing::{info, trace};

use crate::application::remap_engine::{EventSynthesizer, SynthesisError};

/// Injects button events through a dedicated uinput device.
pub struct UinputSynthesizer {
    name: String,
    // Locked by the tap thread and, rarely, by hot-plug compensation.
    device: Mutex<VirtualDevice>,
}

impl UinputSynthesizer {
    /// Creates the virtual pointer `name`.
    ///
    /// # Errors
    ///
    /// [`SynthesisError::Unavailable`] if `/dev/uinput` cannot be opened or
    /// the device cannot be registered.
    pub fn new(name: impl Into<String>) -> Result<Self, SynthesisError> {
        let name = name.into();
        let mut keys = AttributeSet::<Key>::new();
        for code in EMITTED_CODES {
            keys.insert(Key::new(code));
        }

        let device = VirtualDeviceBuilder::new()
            .and_then(|builder| builder.name(name.as_str()).with_keys(&keys))
            .and_then(|builder| builder.build())
            .map_err(|e| SynthesisError::Unavailable(format!("cannot create {name:?}: {e}")))?;

        info!(name = %name, "virtual pointer created");
        Ok(Self {
            name,
            device: Mutex::new(device),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn key_value(phase: ButtonPhase) -> i32 {
    match phase {
        ButtonPhase::Down => 1,
        ButtonPhase::Up => 0,
    }
}

impl EventSynthesizer for UinputSynthesizer {
    fn emit(
        &self,
        device_id: &DeviceId,
        button: SourceButton,
        phase: ButtonPhase,
        _timestamp: Timestamp,
        _location: Location,
    ) -> Result<(), SynthesisError> {
        let code = ButtonMapper::button_to_evdev(button);
        let event = InputEvent::new(EventType::KEY, code, key_value(phase));
        self.device
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .emit(&[event])
            .map_err(|e| SynthesisError::Rejected(e.to_string()))?;
        trace!(device = %device_id, button = %button, ?phase, "synthesized");
        Ok(())
    }
}

impl std::fmt::Debug for UinputSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UinputSynthesizer")
            .field("name", &self.name)
            .finish()
    }
}
