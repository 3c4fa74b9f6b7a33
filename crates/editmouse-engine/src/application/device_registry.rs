//! Device registry: which pointing devices exist and whether they are attached.
//!
//! The registry never talks to the OS directly.  Each [`DeviceRegistry::rescan`]
//! asks the injected [`DeviceInventory`] for the devices attached right now,
//! diffs the answer against what it knew before, and reports one
//! [`DeviceEvent`] per change.
//!
//! # Device lifecycle
//!
//! ```text
//!   (unknown) ──first seen──►  Connected  ◄──reappears──┐
//!                                  │                     │
//!                              disappears                │
//!                                  ▼                     │
//!                             Disconnected ──────────────┘
//! ```
//!
//! A disconnected device stays in the list so the UI can still show (and
//! edit) its mapping; its id is reused when the same unit comes back.
//!
//! # Who gets told
//!
//! Synchronous [`DeviceListener`]s (the remap engine) run first, on the
//! scanning thread, so that by the time anyone else hears about a
//! disconnect the engine has already released the device's held buttons.
//! Async subscribers (the UI) then receive the same event over a
//! `tokio::sync::broadcast` channel.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use editmouse_core::{
    assign_ids, ConnectionState, Device, DeviceDescriptor, DeviceId, IdentityStability,
    SnapshotCell,
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Capacity of the async device-event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Error type for device enumeration.
#[derive(Debug, Error)]
pub enum EnumerationError {
    /// The OS device list could not be read.
    #[error("I/O error enumerating input devices: {0}")]
    Io(#[from] std::io::Error),

    /// The inventory backend is not usable in this environment.
    #[error("device inventory unavailable: {0}")]
    Unavailable(String),
}

/// Source of the currently attached pointing devices.
///
/// The Linux implementation walks `/dev/input/event*`; tests use an
/// in-memory list.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceInventory: Send + Sync {
    /// Returns every pointing device attached right now.
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, EnumerationError>;
}

/// A change in the set of attached devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Connected(Device),
    Disconnected(DeviceId),
}

/// Receives connect/disconnect notifications synchronously during a rescan.
pub trait DeviceListener: Send + Sync {
    fn on_device_connected(&self, device: &Device);
    fn on_device_disconnected(&self, device_id: &DeviceId);
}

/// In-memory registry of every pointing device seen since startup.
pub struct DeviceRegistry {
    inventory: Arc<dyn DeviceInventory>,
    devices: SnapshotCell<BTreeMap<DeviceId, Device>>,
    /// Serializes rescans so two diffs never interleave.
    scan_lock: Mutex<()>,
    listeners: RwLock<Vec<Arc<dyn DeviceListener>>>,
    events: broadcast::Sender<DeviceEvent>,
}

impl DeviceRegistry {
    pub fn new(inventory: Arc<dyn DeviceInventory>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inventory,
            devices: SnapshotCell::new(BTreeMap::new()),
            scan_lock: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Every known device, connected or not, sorted by id.
    pub fn list_devices(&self) -> Vec<Device> {
        self.devices.load().values().cloned().collect()
    }

    /// Only the devices currently attached, sorted by id.
    pub fn connected_devices(&self) -> Vec<Device> {
        self.devices
            .load()
            .values()
            .filter(|d| d.is_connected())
            .cloned()
            .collect()
    }

    pub fn device(&self, id: &DeviceId) -> Option<Device> {
        self.devices.load().get(id).cloned()
    }

    /// Subscribes to future connect/disconnect events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Registers a synchronous listener.
    ///
    /// The listener is immediately told about every device that is already
    /// connected, so registration order relative to the first scan does not
    /// matter.
    pub fn add_listener(&self, listener: Arc<dyn DeviceListener>) {
        let _scan = self.scan_lock.lock().unwrap_or_else(|e| e.into_inner());
        for device in self.devices.load().values().filter(|d| d.is_connected()) {
            listener.on_device_connected(device);
        }
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Queries the inventory and applies the difference to the registry.
    ///
    /// Returns the events that were emitted, disconnects first.
    ///
    /// # Errors
    ///
    /// Returns [`EnumerationError`] if the inventory cannot be queried.  The
    /// registry is left exactly as it was; nothing is retried.
    pub fn rescan(&self) -> Result<Vec<DeviceEvent>, EnumerationError> {
        let _scan = self.scan_lock.lock().unwrap_or_else(|e| e.into_inner());

        let descriptors = self.inventory.enumerate()?;
        let assigned = assign_ids(&descriptors);

        let previous = self.devices.load_full();
        let mut next = (*previous).clone();
        let mut disconnects = Vec::new();
        let mut connects = Vec::new();

        let present: HashSet<&DeviceId> = assigned.iter().map(|(id, _)| id).collect();
        for (id, device) in previous.iter() {
            if device.is_connected() && !present.contains(id) {
                if let Some(entry) = next.get_mut(id) {
                    entry.connection_state = ConnectionState::Disconnected;
                }
                disconnects.push(DeviceEvent::Disconnected(id.clone()));
            }
        }

        for ((id, stability), descriptor) in assigned.iter().zip(&descriptors) {
            match previous.get(id) {
                Some(known) if known.is_connected() => continue,
                _ if connects
                    .iter()
                    .any(|e| matches!(e, DeviceEvent::Connected(d) if &d.id == id)) =>
                {
                    debug!(device = %id, path = %descriptor.path, "duplicate device node ignored");
                    continue;
                }
                _ => {}
            }
            if *stability == IdentityStability::PortBound {
                info!(
                    device = %id,
                    "device reports no serial; its mapping is tied to this port"
                );
            }
            let device = Device::connected(descriptor, id.clone(), *stability);
            next.insert(id.clone(), device.clone());
            connects.push(DeviceEvent::Connected(device));
        }

        if disconnects.is_empty() && connects.is_empty() {
            debug!(devices = next.len(), "rescan found no changes");
            return Ok(Vec::new());
        }

        self.devices.store(next);

        let events: Vec<DeviceEvent> = disconnects.into_iter().chain(connects).collect();
        for event in &events {
            self.notify(event);
        }
        Ok(events)
    }

    fn notify(&self, event: &DeviceEvent) {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        match event {
            DeviceEvent::Connected(device) => {
                info!(device = %device.id, name = %device.display_name, "device connected");
                for l in listeners.iter() {
                    l.on_device_connected(device);
                }
            }
            DeviceEvent::Disconnected(id) => {
                info!(device = %id, "device disconnected");
                for l in listeners.iter() {
                    l.on_device_disconnected(id);
                }
            }
        }
        drop(listeners);

        // No receivers is normal when no UI is attached.
        if self.events.send(event.clone()).is_err() {
            debug!("no device-event subscribers");
        }
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &*self.devices.load())
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
