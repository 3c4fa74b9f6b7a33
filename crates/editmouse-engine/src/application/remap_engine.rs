//! RemapEngine: decides, per button event, whether to pass it or replace it.
//!
//! This use case runs on the event-tap thread for every button press and
//! release in the system.  It must answer quickly and must never block, so it
//! touches only:
//!
//! - the mapping store's current snapshot (a lock-free pointer load),
//! - the engine's own device set (another lock-free pointer load),
//! - one atomic slot per `(device, button)` recording the pending press.
//!
//! # Press consistency
//!
//! A press is resolved once, at Down, against the snapshot current at that
//! moment.  The resolution is stored in the pending slot and the matching Up
//! is completed with it, even if the user changed the mapping in between.
//! Without this, remapping Button4→Middle while Button4 is held would leave a
//! synthetic Middle stuck down.
//!
//! ```text
//!   Down ──lookup──► identity ──────► record PassThrough, pass original
//!                ├─► Disabled ──────► record Disabled,    consume
//!                └─► Button(t) ─emit Down(t)─► ok:  record Remapped(t), consume
//!                                          └─► err: record PassThrough, pass original
//!
//!   Up ──take slot─► none / PassThrough ─► pass original
//!                ├─► Disabled ──────────► consume
//!                └─► Remapped(t) ─emit Up(t)─► consume (pass original if emit fails)
//! ```
//!
//! # Hot-plug
//!
//! When a device disconnects the engine first removes it from the visible set
//! (later events from it pass through untracked), then takes every pending
//! slot and synthesizes one compensating Up for each remapped press.  Slots are
//! taken with an atomic `swap`, so exactly one of {the real Up, the
//! compensation} completes any given press even if they race.  A Down that
//! records its press after the device was removed sees the removal when it
//! re-checks the device set, and releases the press itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use editmouse_core::{
    ButtonEvent, ButtonPhase, Device, DeviceId, Location, SnapshotCell, SourceButton,
    TargetAction, Timestamp,
};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::device_registry::DeviceListener;
use super::mapping_store::MappingStore;

/// Error type for event synthesis.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SynthesisError {
    /// The OS refused the injected event.
    #[error("synthesized event rejected: {0}")]
    Rejected(String),

    /// No synthesis backend is available (e.g. `/dev/uinput` missing).
    #[error("event synthesizer unavailable: {0}")]
    Unavailable(String),
}

/// Injects replacement button events into the OS input stream.
///
/// Implementations must mark injected events so the event tap never hands
/// them back to the engine.
pub trait EventSynthesizer: Send + Sync {
    fn emit(
        &self,
        device_id: &DeviceId,
        button: SourceButton,
        phase: ButtonPhase,
        timestamp: Timestamp,
        location: Location,
    ) -> Result<(), SynthesisError>;
}

/// What the event tap should do with the original event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapVerdict {
    /// Deliver the original event to applications unchanged.
    PassThrough,
    /// Drop the original event.
    Consume,
}

/// Synchronous per-event callback invoked by the event tap.
///
/// Called on the tap thread; implementations must not block.
pub trait TapHandler: Send + Sync {
    fn handle(&self, event: &ButtonEvent) -> TapVerdict;
}

// ── Pending press slots ───────────────────────────────────────────────────────

/// Resolution of a press, recorded at Down and consumed at Up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    PassThrough,
    Disabled,
    Remapped(SourceButton),
}

const SLOT_EMPTY: u8 = 0;
const SLOT_PASSTHROUGH: u8 = 1;
const SLOT_DISABLED: u8 = 2;
const SLOT_REMAPPED_BASE: u8 = 3;

impl Pending {
    fn encode(self) -> u8 {
        match self {
            Pending::PassThrough => SLOT_PASSTHROUGH,
            Pending::Disabled => SLOT_DISABLED,
            Pending::Remapped(b) => SLOT_REMAPPED_BASE + b.index() as u8,
        }
    }

    fn decode(raw: u8) -> Option<Self> {
        match raw {
            SLOT_EMPTY => None,
            SLOT_PASSTHROUGH => Some(Pending::PassThrough),
            SLOT_DISABLED => Some(Pending::Disabled),
            n => SourceButton::from_index((n - SLOT_REMAPPED_BASE) as usize).map(Pending::Remapped),
        }
    }
}

// Slot word layout: bits 0..8 pending state, 8..32 y, 32..56 x.
const COORD_BITS: u32 = 24;
const COORD_MASK: u64 = (1 << COORD_BITS) - 1;
const COORD_MIN: i32 = -(1 << (COORD_BITS - 1));
const COORD_MAX: i32 = (1 << (COORD_BITS - 1)) - 1;

fn pack_coord(v: i32) -> u64 {
    (v.clamp(COORD_MIN, COORD_MAX) as u32 as u64) & COORD_MASK
}

fn unpack_coord(raw: u64) -> i32 {
    // Sign-extend the 24-bit field.
    let shifted = ((raw & COORD_MASK) as u32) << (32 - COORD_BITS);
    (shifted as i32) >> (32 - COORD_BITS)
}

/// Packs a press and its Down location into one word so both change together.
/// Coordinates are clamped to ±2^23.
fn pack_slot(pending: Pending, location: Location) -> u64 {
    u64::from(pending.encode()) | pack_coord(location.y) << 8 | pack_coord(location.x) << 32
}

fn unpack_slot(raw: u64) -> Option<(Pending, Location)> {
    let pending = Pending::decode(raw as u8)?;
    Some((pending, Location::new(unpack_coord(raw >> 32), unpack_coord(raw >> 8))))
}

/// Pending presses of one connected device, with the location of each Down.
#[derive(Debug, Default)]
struct PressSlots {
    slots: [AtomicU64; SourceButton::COUNT],
}

impl PressSlots {
    /// Records a new press and returns whatever was pending before.
    fn record(
        &self,
        button: SourceButton,
        pending: Pending,
        location: Location,
    ) -> Option<(Pending, Location)> {
        unpack_slot(self.slots[button.index()].swap(pack_slot(pending, location), Ordering::AcqRel))
    }

    /// Takes the pending press, leaving the slot empty.  Take-once.
    fn take(&self, button: SourceButton) -> Option<(Pending, Location)> {
        unpack_slot(self.slots[button.index()].swap(u64::from(SLOT_EMPTY), Ordering::AcqRel))
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// The remap engine.
///
/// Shared as `Arc<RemapEngine>` between the event tap (as a [`TapHandler`])
/// and the device registry (as a [`DeviceListener`]).
pub struct RemapEngine {
    mappings: Arc<MappingStore>,
    synthesizer: Arc<dyn EventSynthesizer>,
    /// Connected devices visible to the engine, with their pending presses.
    devices: SnapshotCell<HashMap<DeviceId, Arc<PressSlots>>>,
}

impl RemapEngine {
    pub fn new(mappings: Arc<MappingStore>, synthesizer: Arc<dyn EventSynthesizer>) -> Self {
        Self {
            mappings,
            synthesizer,
            devices: SnapshotCell::new(HashMap::new()),
        }
    }

    /// Returns `true` if `device_id` is in the engine's connected set.
    pub fn is_visible(&self, device_id: &DeviceId) -> bool {
        self.devices.load().contains_key(device_id)
    }

    /// Ids of every device the engine currently attributes events to, sorted.
    pub fn visible_devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.load().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns `true` if at least one connected device has a non-identity mapping.
    pub fn is_remapping(&self) -> bool {
        let snapshot = self.mappings.current_snapshot();
        self.devices
            .load()
            .keys()
            .any(|id| snapshot.is_remapping_for(id))
    }

    /// Processes one button event and returns what to do with the original.
    pub fn handle_event(&self, event: &ButtonEvent) -> TapVerdict {
        if event.synthetic {
            return TapVerdict::PassThrough;
        }

        let devices = self.devices.load();
        let Some(slots) = devices.get(&event.device_id) else {
            trace!(device = %event.device_id, "event from untracked device passed through");
            return TapVerdict::PassThrough;
        };

        match event.phase {
            ButtonPhase::Down => self.handle_down(event, slots),
            ButtonPhase::Up => self.handle_up(event, slots),
        }
    }

    fn handle_down(&self, event: &ButtonEvent, slots: &Arc<PressSlots>) -> TapVerdict {
        let action = self.mappings.lookup(&event.device_id, event.button);

        let (pending, verdict) = match action {
            a if a.is_identity_for(event.button) => (Pending::PassThrough, TapVerdict::PassThrough),
            TargetAction::Disabled => (Pending::Disabled, TapVerdict::Consume),
            TargetAction::Button(target) => match self.synthesizer.emit(
                &event.device_id,
                target,
                ButtonPhase::Down,
                event.timestamp,
                event.location,
            ) {
                Ok(()) => (Pending::Remapped(target), TapVerdict::Consume),
                Err(e) => {
                    warn!(
                        device = %event.device_id,
                        source = %event.button,
                        target = %target,
                        "synthesis failed, passing original press through: {e}"
                    );
                    (Pending::PassThrough, TapVerdict::PassThrough)
                }
            },
            TargetAction::NoOp => (Pending::PassThrough, TapVerdict::PassThrough),
        };

        // A second Down without an Up in between: release whatever the first one holds.
        if let Some((Pending::Remapped(stale), _)) = slots.record(event.button, pending, event.location)
        {
            debug!(device = %event.device_id, button = %stale, "releasing stale remapped press");
            self.emit_release(&event.device_id, stale, event.timestamp, event.location);
        }

        // The device may have been detached while the Down was synthesized.  Its
        // slots were already drained, so nothing else would complete this press.
        if !self.still_attached(&event.device_id, slots) {
            if let Some((Pending::Remapped(target), location)) = slots.take(event.button) {
                debug!(device = %event.device_id, button = %target, "device detached mid-press");
                self.emit_release(&event.device_id, target, Timestamp::now(), location);
            }
        }

        trace!(
            device = %event.device_id,
            button = %event.button,
            action = %action,
            ?verdict,
            "button down"
        );
        verdict
    }

    fn handle_up(&self, event: &ButtonEvent, slots: &PressSlots) -> TapVerdict {
        let verdict = match slots.take(event.button).map(|(pending, _)| pending) {
            None | Some(Pending::PassThrough) => TapVerdict::PassThrough,
            Some(Pending::Disabled) => TapVerdict::Consume,
            Some(Pending::Remapped(target)) => {
                if self.emit_release(&event.device_id, target, event.timestamp, event.location) {
                    TapVerdict::Consume
                } else {
                    TapVerdict::PassThrough
                }
            }
        };
        trace!(device = %event.device_id, button = %event.button, ?verdict, "button up");
        verdict
    }

    fn still_attached(&self, device_id: &DeviceId, slots: &Arc<PressSlots>) -> bool {
        self.devices
            .load()
            .get(device_id)
            .is_some_and(|current| Arc::ptr_eq(current, slots))
    }

    fn emit_release(
        &self,
        device_id: &DeviceId,
        target: SourceButton,
        timestamp: Timestamp,
        location: Location,
    ) -> bool {
        match self
            .synthesizer
            .emit(device_id, target, ButtonPhase::Up, timestamp, location)
        {
            Ok(()) => true,
            Err(e) => {
                warn!(device = %device_id, target = %target, "synthesized release failed: {e}");
                false
            }
        }
    }

    /// Adds `device_id` to the visible set with no pending presses.
    ///
    /// Attaching an already visible device keeps its pending presses.
    pub fn attach_device(&self, device_id: &DeviceId) {
        self.devices.update(|current| {
            let mut next = current.clone();
            next.entry(device_id.clone())
                .or_insert_with(|| Arc::new(PressSlots::default()));
            next
        });
        debug!(device = %device_id, "device visible to engine");
    }

    /// Removes `device_id` from the visible set and releases its remapped presses.
    ///
    /// Returns the number of compensating Up events synthesized.
    pub fn detach_device(&self, device_id: &DeviceId) -> usize {
        let mut removed: Option<Arc<PressSlots>> = None;
        self.devices.update(|current| {
            let mut next = current.clone();
            removed = next.remove(device_id);
            next
        });

        let Some(slots) = removed else {
            return 0;
        };

        let now = Timestamp::now();
        let mut released = 0;
        for button in SourceButton::ALL {
            if let Some((Pending::Remapped(target), location)) = slots.take(button) {
                if self.emit_release(device_id, target, now, location) {
                    released += 1;
                }
            }
        }
        if released > 0 {
            info!(device = %device_id, released, "released held buttons of disconnected device");
        }
        released
    }
}

impl TapHandler for RemapEngine {
    fn handle(&self, event: &ButtonEvent) -> TapVerdict {
        self.handle_event(event)
    }
}

impl DeviceListener for RemapEngine {
    fn on_device_connected(&self, device: &Device) {
        self.attach_device(&device.id);
    }

    fn on_device_disconnected(&self, device_id: &DeviceId) {
        self.detach_device(device_id);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
