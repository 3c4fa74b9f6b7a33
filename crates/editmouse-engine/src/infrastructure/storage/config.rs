//! TOML-based configuration persistence for the remapping engine.
//!
//! Reads and writes `EngineConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\EditMouse\config.toml`
//! - Linux:    `~/.config/editmouse/config.toml`
//! - macOS:    `~/Library/Application Support/EditMouse/config.toml`
//!
//! # File layout (for beginners)
//!
//! ```toml
//! [engine]
//! log_level = "info"
//! rescan_interval_ms = 1000
//! capture_on_start = true
//! virtual_device_name = "Edit Mouse virtual pointer"
//!
//! [[devices]]
//! id = "046d:c52b:4A3F9E21"
//! name = "MX Master 3"
//! [devices.buttons]
//! button4 = "Back"
//! button5 = "Forward"
//! ```
//!
//! `[[devices]]` is a TOML *array of tables*: each `[[devices]]` header starts
//! a new entry.  Button keys are `left`, `right`, `middle`, `button4` and
//! `button5`; values are the labels the settings UI shows ("Back",
//! "Disabled", "Right Click", ...).  A button that is not listed keeps its
//! default behaviour.
//!
//! # Serde default values
//!
//! Every field has a `#[serde(default)]`, so an empty file, a file with only
//! `[engine]`, or no file at all all produce a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use editmouse_core::{DeviceId, DeviceMapping};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed, including unknown button or
    /// action names in a `[devices.buttons]` table.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

/// Runtime behaviour of the engine process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSettings {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// How often the hot-plug watcher re-enumerates devices.
    #[serde(default = "default_rescan_interval_ms")]
    pub rescan_interval_ms: u64,
    /// Whether capture starts as soon as the engine is up.
    #[serde(default = "default_true")]
    pub capture_on_start: bool,
    /// Name of the virtual pointer that carries synthesized events.  Also the
    /// prefix the tap uses to recognise, and skip, the engine's own devices.
    #[serde(default = "default_virtual_device_name")]
    pub virtual_device_name: String,
}

/// Stored mapping for one device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceEntry {
    pub id: DeviceId,
    /// Display name at the time the mapping was saved; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub buttons: DeviceMapping,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_rescan_interval_ms() -> u64 {
    1000
}
fn default_true() -> bool {
    true
}
fn default_virtual_device_name() -> String {
    "Edit Mouse virtual pointer".to_string()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            rescan_interval_ms: default_rescan_interval_ms(),
            capture_on_start: default_true(),
            virtual_device_name: default_virtual_device_name(),
        }
    }
}

impl EngineSettings {
    /// The rescan interval, never shorter than 50 ms.
    pub fn rescan_interval(&self) -> Duration {
        Duration::from_millis(self.rescan_interval_ms.max(50))
    }
}

impl EngineConfig {
    /// The `(device, mapping)` pairs that seed the mapping store.
    ///
    /// A device listed twice keeps its last entry.
    pub fn seed_mappings(&self) -> impl Iterator<Item = (DeviceId, DeviceMapping)> + '_ {
        self.devices
            .iter()
            .map(|entry| (entry.id.clone(), entry.buttons))
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `EngineConfig` from `path`, returning `EngineConfig::default()` if
/// the file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed or names an unknown
/// button or action.
pub fn load_config_from(path: &Path) -> Result<EngineConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(EngineConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &EngineConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the `EditMouse` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("EditMouse"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("editmouse"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("EditMouse")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
