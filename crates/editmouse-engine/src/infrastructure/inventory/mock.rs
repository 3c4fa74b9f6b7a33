//! Mock device inventory for integration testing.
//!
//! Holds an in-memory list of attached devices that tests edit with
//! [`MockInventory::plug`] and [`MockInventory::unplug`] to simulate hot-plug.
//!
//! # `should_fail` flag
//!
//! Call [`MockInventory::set_failing`] to make every subsequent
//! `enumerate()` return an error, for testing the registry's error path.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use editmouse_core::DeviceDescriptor;

use crate::application::device_registry::{DeviceInventory, EnumerationError};

/// An in-memory [`DeviceInventory`].
#[derive(Default)]
pub struct MockInventory {
    devices: Mutex<Vec<DeviceDescriptor>>,
    should_fail: AtomicBool,
    calls: AtomicUsize,
}

impl MockInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an inventory that already lists `devices`.
    pub fn with_devices(devices: Vec<DeviceDescriptor>) -> Self {
        let inventory = Self::new();
        *inventory.devices.lock().unwrap_or_else(|e| e.into_inner()) = devices;
        inventory
    }

    /// Attaches a device.
    pub fn plug(&self, device: DeviceDescriptor) {
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(device);
    }

    /// Detaches every device attached at `path`.
    pub fn unplug(&self, path: &str) {
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|d| d.path != path);
    }

    pub fn set_failing(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Number of `enumerate()` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DeviceInventory for MockInventory {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, EnumerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(EnumerationError::Unavailable("mock failure".into()));
        }
        Ok(self
            .devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }
}
