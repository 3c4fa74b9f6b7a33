//! Linux device inventory via evdev.
//!
//! Walks `/dev/input/event*` with [`evdev::enumerate`] and keeps the nodes
//! that look like mice: they advertise `BTN_LEFT` and are not touchpads or the
//! engine's own uinput devices.
//!
//! # Identity sources
//!
//! | Descriptor field | evdev source                              |
//! |------------------|-------------------------------------------|
//! | `vendor_id`      | `input_id().vendor()`                     |
//! | `product_id`     | `input_id().product()`                    |
//! | `serial`         | `unique_name()` (`EVIOCGUNIQ`)            |
//! | `path`           | `physical_path()` (`EVIOCGPHYS`), else the node path |
//! | `name`           | `name()`                                  |
//!
//! Many cheap mice report an empty unique name, so their identity falls back
//! to the physical path (see `IdentityStability::PortBound`).
//!
//! # Permissions
//!
//! `evdev::enumerate` silently skips nodes this process may not open, so a
//! user outside the `input` group simply sees no devices.

use std::path::Path;

use editmouse_core::buttonmap::linux_evdev::BTN_LEFT;
use editmouse_core::DeviceDescriptor;
use evdev::{Device, Key};
use tracing::trace;

use super::is_excluded_name;
use crate::application::device_registry::{DeviceInventory, EnumerationError};

const INPUT_DIR: &str = "/dev/input";

/// Returns `true` if `device` advertises a left mouse button.
pub fn is_pointing_device(device: &Device) -> bool {
    device
        .supported_keys()
        .is_some_and(|keys| keys.contains(Key::new(BTN_LEFT)))
}

/// Builds the identity descriptor for an opened evdev node.
pub fn descriptor_for(node: &Path, device: &Device) -> DeviceDescriptor {
    let id = device.input_id();
    DeviceDescriptor {
        vendor_id: id.vendor(),
        product_id: id.product(),
        serial: device.unique_name().map(str::to_string),
        path: device
            .physical_path()
            .filter(|p| !p.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| node.display().to_string()),
        name: device.name().unwrap_or_default().to_string(),
    }
}

/// Returns `true` if the node should be listed and intercepted.
pub fn is_remappable(device: &Device, virtual_prefix: &str) -> bool {
    is_pointing_device(device) && !is_excluded_name(device.name().unwrap_or_default(), virtual_prefix)
}

/// Lists remappable pointing devices from `/dev/input`.
#[derive(Debug, Clone)]
pub struct EvdevInventory {
    virtual_prefix: String,
}

impl EvdevInventory {
    /// `virtual_prefix` is the name prefix of the engine's own uinput devices.
    pub fn new(virtual_prefix: impl Into<String>) -> Self {
        Self {
            virtual_prefix: virtual_prefix.into(),
        }
    }
}

impl DeviceInventory for EvdevInventory {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, EnumerationError> {
        // Surface a missing or unreadable /dev/input instead of an empty list.
        std::fs::read_dir(INPUT_DIR)?;

        let mut found: Vec<(std::path::PathBuf, DeviceDescriptor)> = evdev::enumerate()
            .filter(|(_, dev)| is_remappable(dev, &self.virtual_prefix))
            .map(|(node, dev)| {
                let descriptor = descriptor_for(&node, &dev);
                (node, descriptor)
            })
            .collect();
        // enumerate() order follows readdir; sort for stable diffs.
        found.sort_by(|a, b| a.0.cmp(&b.0));

        trace!(count = found.len(), "enumerated pointing devices");
        Ok(found.into_iter().map(|(_, d)| d).collect())
    }
}
