//! Application layer use cases for the remapping engine.
//!
//! Use cases here orchestrate the domain types from `editmouse_core` and
//! depend only on traits (`DeviceInventory`, `EventTap`, `EventSynthesizer`).
//! The OS-backed implementations live in `crate::infrastructure` and are
//! injected at construction time, so every use case runs under test with
//! in-memory doubles.
//!
//! # Sub-modules
//!
//! - **`mapping_store`**   – Holds the per-device mapping tables and publishes
//!   them as immutable, versioned snapshots.
//!
//! - **`device_registry`** – Tracks which pointing devices exist, diffs each
//!   inventory scan, and notifies listeners of connects and disconnects.
//!
//! - **`remap_engine`**    – The per-event state machine run on the event-tap
//!   thread for every button press and release.
//!
//! - **`capture`**         – Owns the single tap session and reports the
//!   engine's capture state (`Inactive`, `Passthrough`, `Remapping`).

pub mod capture;
pub mod device_registry;
pub mod mapping_store;
pub mod remap_engine;
