//! Infrastructure layer for the remapping engine.
//!
//! Contains OS-facing adapters: the event tap, the event synthesizer, the
//! device inventory and its hot-plug watcher, configuration storage, and the
//! UI command bridge.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `editmouse_core`, but MUST NOT be imported by the `application` layer.

pub mod device_watch;
pub mod event_tap;
pub mod inventory;
pub mod storage;
pub mod synthesizer;
pub mod ui_bridge;
