//! Domain entities for the Edit Mouse remapping engine.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies.  Outer layers (the event tap, the synthesizer, the device
//! inventory) translate OS data into these types at their boundaries, so the
//! rules here can be compiled and tested on any platform.

/// Buttons, actions, and the ephemeral button event.
pub mod button;

/// Physical device identity and connection state.
pub mod device;

/// Per-device mapping tables and the versioned snapshot of all of them.
pub mod mapping;
