//! # editmouse-core
//!
//! Shared library for the Edit Mouse remapping engine containing the
//! button/action model, device identity rules, per-device mappings, and the
//! versioned snapshot types read on the real-time event path.
//!
//! It has zero dependencies on OS APIs, UI frameworks, or device files.
//!
//! # Architecture overview
//!
//! Edit Mouse lets a user remap the five physical mouse buttons per device,
//! system-wide.  An OS-level event tap hands every button press to the engine,
//! which looks up the device's mapping and either lets the press through or
//! swallows it and injects a replacement.
//!
//! This crate is the shared foundation.  It defines:
//!
//! - **`domain`** – Pure business types: [`SourceButton`], [`TargetAction`],
//!   [`ButtonEvent`], device identity ([`DeviceId`]) and the mapping tables
//!   ([`DeviceMapping`], [`MappingSnapshot`]).
//!
//! - **`snapshot`** – [`SnapshotCell`], the copy-on-write publication point
//!   that lets the event tap read the latest table without taking a lock.
//!
//! - **`buttonmap`** – Translation tables between platform button codes
//!   (Linux evdev `BTN_*`) and the canonical [`SourceButton`].

pub mod buttonmap;
pub mod domain;
pub mod snapshot;

pub use domain::button::{ButtonEvent, ButtonPhase, Location, SourceButton, TargetAction, Timestamp};
pub use domain::device::{
    assign_ids, ConnectionState, Device, DeviceDescriptor, DeviceId, IdentityStability,
};
pub use domain::mapping::{DeviceMapping, MappingError, MappingSnapshot};
pub use snapshot::SnapshotCell;
