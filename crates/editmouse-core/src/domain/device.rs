//! Physical device identity.
//!
//! A [`DeviceId`] must stay the same when the same physical mouse is
//! unplugged and plugged back in, and must differ between two units of the
//! same model plugged in at the same time.  The derivation rule is:
//!
//! ```text
//! serial reported   →  "{vendor:04x}:{product:04x}:{serial}"   (IdentityStability::Serial)
//! no serial         →  "{vendor:04x}:{product:04x}@{path}"     (IdentityStability::PortBound)
//! ```
//!
//! Devices without a serial can only be told apart by where they are
//! attached, so their identity does not survive a move to a different port.
//! That degradation is explicit in [`IdentityStability::PortBound`] rather
//! than hidden.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fallback display name for devices that report neither product nor manufacturer.
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown Mouse";

/// Stable identity of a physical pointing device.
///
/// Cheap to clone (reference counted) so it can travel with every button
/// event without allocating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    /// Derives the identity for `descriptor` following the module-level rule.
    pub fn derive(descriptor: &DeviceDescriptor) -> (DeviceId, IdentityStability) {
        match descriptor.serial() {
            Some(serial) => (
                DeviceId::from(format!(
                    "{:04x}:{:04x}:{}",
                    descriptor.vendor_id, descriptor.product_id, serial
                )),
                IdentityStability::Serial,
            ),
            None => (
                Self::path_based(descriptor),
                IdentityStability::PortBound,
            ),
        }
    }

    /// The positional identity, used when no serial is available or when two
    /// connected units report the same serial.
    pub fn path_based(descriptor: &DeviceDescriptor) -> DeviceId {
        let path = descriptor.path.trim();
        let path = if path.is_empty() { "unknown" } else { path };
        DeviceId::from(format!(
            "{:04x}:{:04x}@{}",
            descriptor.vendor_id, descriptor.product_id, path
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<DeviceId> for String {
    fn from(value: DeviceId) -> Self {
        value.0.to_string()
    }
}

/// Derives identities for every device attached at the same time.
///
/// Units that would share a serial-based id (cloned or placeholder serials)
/// all fall back to their positional id so they stay distinguishable.  The
/// result is index-aligned with `descriptors`.
pub fn assign_ids(descriptors: &[DeviceDescriptor]) -> Vec<(DeviceId, IdentityStability)> {
    let derived: Vec<(DeviceId, IdentityStability)> =
        descriptors.iter().map(DeviceId::derive).collect();

    let mut seen: HashMap<&DeviceId, usize> = HashMap::new();
    for (id, _) in &derived {
        *seen.entry(id).or_insert(0) += 1;
    }

    derived
        .iter()
        .zip(descriptors)
        .map(|((id, stability), descriptor)| {
            if *stability == IdentityStability::Serial && seen.get(id).copied().unwrap_or(0) > 1 {
                let fallback = DeviceId::path_based(descriptor);
                debug!(serial_id = %id, id = %fallback, "duplicate serial; using port-bound id");
                (fallback, IdentityStability::PortBound)
            } else {
                (id.clone(), *stability)
            }
        })
        .collect()
}

/// How durable a device's identity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityStability {
    /// Derived from a hardware serial; survives replugging into any port.
    Serial,
    /// Derived from the attachment path; the same unit plugged into a
    /// different port is seen as a new device and its mapping is not carried over.
    PortBound,
}

/// Whether a known device is currently attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Raw facts about an attached device, as reported by the OS inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Hardware serial or unique string, if the device reports one.
    pub serial: Option<String>,
    /// Physical/topology path (e.g. `usb-0000:00:14.0-2/input0`).
    pub path: String,
    /// Product name, if any.
    pub name: String,
}

impl DeviceDescriptor {
    /// The serial with surrounding whitespace removed, or `None` if blank.
    pub fn serial(&self) -> Option<&str> {
        self.serial
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A pointing device known to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    pub display_name: String,
    pub connection_state: ConnectionState,
    pub stability: IdentityStability,
}

impl Device {
    /// Builds a connected device from its descriptor and assigned identity.
    pub fn connected(
        descriptor: &DeviceDescriptor,
        id: DeviceId,
        stability: IdentityStability,
    ) -> Self {
        let name = descriptor.name.trim();
        Self {
            id,
            display_name: if name.is_empty() {
                UNKNOWN_DEVICE_NAME.to_string()
            } else {
                name.to_string()
            },
            connection_state: ConnectionState::Connected,
            stability,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
