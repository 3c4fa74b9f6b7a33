//! Device inventory implementations.
//!
//! The inventory answers one question: which pointing devices are attached
//! right now?  The registry diffs consecutive answers to detect hot-plug.
//!
//! Filtering rules shared by every backend:
//!
//! - only devices with a left button count as pointing devices;
//! - trackpads and touchpads are skipped (their buttons are gestures, not
//!   physical buttons worth remapping);
//! - the engine's own virtual devices are never listed.

use editmouse_core::DeviceDescriptor;

use crate::application::device_registry::{DeviceInventory, EnumerationError};

pub mod mock;

#[cfg(target_os = "linux")]
pub mod linux;

/// Name fragments (lower-case) of devices that are never remapped.
const SKIPPED_NAME_FRAGMENTS: &[&str] = &["trackpad", "touchpad"];

/// Returns `true` if a device called `name` should be hidden from the registry.
///
/// `virtual_prefix` is the name prefix of the engine's own uinput devices.
pub fn is_excluded_name(name: &str, virtual_prefix: &str) -> bool {
    if !virtual_prefix.is_empty() && name.starts_with(virtual_prefix) {
        return true;
    }
    let lowered = name.to_lowercase();
    SKIPPED_NAME_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
}

/// Inventory for platforms without a backend.
#[derive(Debug, Default)]
pub struct UnsupportedInventory;

impl DeviceInventory for UnsupportedInventory {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, EnumerationError> {
        Err(EnumerationError::Unavailable(format!(
            "no device inventory for {}",
            std::env::consts::OS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "Edit Mouse virtual pointer";

    #[test]
    fn test_trackpads_and_touchpads_are_excluded() {
        assert!(is_excluded_name("Apple Magic Trackpad", PREFIX));
        assert!(is_excluded_name("SynPS/2 Synaptics TouchPad", PREFIX));
    }

    #[test]
    fn test_own_virtual_devices_are_excluded() {
        assert!(is_excluded_name("Edit Mouse virtual pointer", PREFIX));
        assert!(is_excluded_name("Edit Mouse virtual pointer (forwarder)", PREFIX));
    }

    #[test]
    fn test_ordinary_mice_are_kept() {
        assert!(!is_excluded_name("Logitech MX Master 3", PREFIX));
        assert!(!is_excluded_name("Razer DeathAdder V2", PREFIX));
    }

    #[test]
    fn test_unsupported_inventory_reports_unavailable() {
        assert!(matches!(
            UnsupportedInventory.enumerate(),
            Err(EnumerationError::Unavailable(_))
        ));
    }
}
