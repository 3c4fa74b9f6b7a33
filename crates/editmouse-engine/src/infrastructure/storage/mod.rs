//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the engine settings and the per-device
//! mappings that seed the mapping store at startup, from a TOML file in the
//! platform-appropriate directory.  A missing file means defaults.

pub mod config;
