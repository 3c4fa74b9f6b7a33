//! Shared fixture: a fully wired engine over mock adapters.

#![allow(dead_code)]

use std::sync::Arc;

use editmouse_core::{
    ButtonEvent, ButtonPhase, DeviceDescriptor, DeviceId, DeviceMapping, Location, SourceButton,
    Timestamp,
};
use editmouse_engine::application::remap_engine::TapVerdict;
use editmouse_engine::infrastructure::event_tap::mock::MockEventTap;
use editmouse_engine::infrastructure::inventory::mock::MockInventory;
use editmouse_engine::infrastructure::storage::config::EngineConfig;
use editmouse_engine::infrastructure::synthesizer::mock::MockSynthesizer;
use editmouse_engine::infrastructure::ui_bridge::EngineState;

pub const MX_SERIAL: &str = "MX-1";
pub const MX_PATH: &str = "usb-0000:00:14.0-1/input0";
pub const DA_PATH: &str = "usb-0000:00:14.0-2/input0";

pub fn mx_master() -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: 0x046d,
        product_id: 0xc52b,
        serial: Some(MX_SERIAL.to_string()),
        path: MX_PATH.to_string(),
        name: "MX Master 3".to_string(),
    }
}

/// A mouse without a serial number, identified by its port.
pub fn deathadder() -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: 0x1532,
        product_id: 0x0084,
        serial: None,
        path: DA_PATH.to_string(),
        name: "Razer DeathAdder V2".to_string(),
    }
}

pub fn id_of(descriptor: &DeviceDescriptor) -> DeviceId {
    DeviceId::derive(descriptor).0
}

pub struct Harness {
    pub state: Arc<EngineState>,
    pub tap: Arc<MockEventTap>,
    pub inventory: Arc<MockInventory>,
    pub synth: Arc<MockSynthesizer>,
}

impl Harness {
    /// Engine with `devices` plugged in, scanned, and capture running.
    pub fn running(devices: Vec<DeviceDescriptor>) -> Self {
        let harness = Self::idle(devices);
        harness.state.registry.rescan().expect("initial scan");
        harness.state.capture.start().expect("capture start");
        harness
    }

    /// Engine with `devices` plugged in but not scanned and not capturing.
    pub fn idle(devices: Vec<DeviceDescriptor>) -> Self {
        Self::with_tap(devices, MockEventTap::new())
    }

    pub fn with_tap(devices: Vec<DeviceDescriptor>, tap: MockEventTap) -> Self {
        let tap = Arc::new(tap);
        let inventory = Arc::new(MockInventory::with_devices(devices));
        let synth = Arc::new(MockSynthesizer::new());
        let state = EngineState::new(
            inventory.clone(),
            tap.clone(),
            synth.clone(),
            &EngineConfig::default(),
        );
        Self {
            state,
            tap,
            inventory,
            synth,
        }
    }

    pub fn map(&self, device: &DeviceId, mapping: DeviceMapping) {
        self.state.mappings.set_mapping(device.clone(), mapping);
        self.state.capture.refresh_state();
    }

    /// Injects a physical event; `None` means no session intercepted it.
    pub fn press(&self, device: &DeviceId, button: SourceButton, phase: ButtonPhase) -> Option<TapVerdict> {
        self.tap.inject(&physical(device, button, phase))
    }

    /// Injects Down then Up and returns both verdicts.
    pub fn click(&self, device: &DeviceId, button: SourceButton) -> (Option<TapVerdict>, Option<TapVerdict>) {
        (
            self.press(device, button, ButtonPhase::Down),
            self.press(device, button, ButtonPhase::Up),
        )
    }

    pub fn unplug(&self, path: &str) {
        self.inventory.unplug(path);
        self.state.registry.rescan().expect("rescan after unplug");
    }

    pub fn plug(&self, device: DeviceDescriptor) {
        self.inventory.plug(device);
        self.state.registry.rescan().expect("rescan after plug");
    }
}

pub fn physical(device: &DeviceId, button: SourceButton, phase: ButtonPhase) -> ButtonEvent {
    ButtonEvent::physical(device.clone(), button, phase, Timestamp(1_000), Location::new(640, 360))
}
