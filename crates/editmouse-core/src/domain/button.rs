//! Button and action model.
//!
//! [`SourceButton`] is the closed set of physical buttons the engine can
//! intercept.  [`TargetAction`] is what a mapping entry resolves to: another
//! button, an explicit passthrough, or a swallowed press.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::device::DeviceId;
use super::mapping::MappingError;

/// A physical mouse button that can be intercepted and remapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceButton {
    Left,
    Right,
    Middle,
    /// The "back" side button.
    Button4,
    /// The "forward" side button.
    Button5,
}

impl SourceButton {
    /// All source buttons in table order.
    pub const ALL: [SourceButton; 5] = [
        SourceButton::Left,
        SourceButton::Right,
        SourceButton::Middle,
        SourceButton::Button4,
        SourceButton::Button5,
    ];

    /// Number of source buttons; the length of every per-device table.
    pub const COUNT: usize = 5;

    /// Position of this button in a per-device table.
    pub const fn index(self) -> usize {
        match self {
            SourceButton::Left => 0,
            SourceButton::Right => 1,
            SourceButton::Middle => 2,
            SourceButton::Button4 => 3,
            SourceButton::Button5 => 4,
        }
    }

    /// Inverse of [`SourceButton::index`].
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// The lower-case name used as a configuration key (`"button4"`).
    pub const fn name(self) -> &'static str {
        match self {
            SourceButton::Left => "left",
            SourceButton::Right => "right",
            SourceButton::Middle => "middle",
            SourceButton::Button4 => "button4",
            SourceButton::Button5 => "button5",
        }
    }
}

impl fmt::Display for SourceButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceButton {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        SourceButton::ALL
            .iter()
            .copied()
            .find(|b| b.name() == lowered)
            .ok_or_else(|| MappingError::UnknownButton(s.to_string()))
    }
}

impl Serialize for SourceButton {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for SourceButton {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// What a mapping entry does with a press of its source button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TargetAction {
    /// Deliver the original event untouched.
    #[default]
    NoOp,
    /// Swallow the press; nothing reaches applications.
    Disabled,
    /// Replace the press with a press of this button.
    Button(SourceButton),
}

impl TargetAction {
    /// Returns `true` if applying this action to `source` leaves the event unchanged.
    pub fn is_identity_for(self, source: SourceButton) -> bool {
        match self {
            TargetAction::NoOp => true,
            TargetAction::Button(target) => target == source,
            TargetAction::Disabled => false,
        }
    }

    /// Canonical display name.
    pub const fn name(self) -> &'static str {
        match self {
            TargetAction::NoOp => "Default",
            TargetAction::Disabled => "Disabled",
            TargetAction::Button(SourceButton::Left) => "Left",
            TargetAction::Button(SourceButton::Right) => "Right",
            TargetAction::Button(SourceButton::Middle) => "Middle",
            TargetAction::Button(SourceButton::Button4) => "Button4",
            TargetAction::Button(SourceButton::Button5) => "Button5",
        }
    }
}

impl fmt::Display for TargetAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetAction {
    type Err = MappingError;

    /// Parses canonical names and the labels used by the settings UI
    /// (`"Back"`, `"Forward"`, `"Middle Click"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        let action = match key.as_str() {
            "default" | "noop" | "passthrough" | "none" => TargetAction::NoOp,
            "disabled" | "disable" => TargetAction::Disabled,
            "left" | "leftclick" => TargetAction::Button(SourceButton::Left),
            "right" | "rightclick" => TargetAction::Button(SourceButton::Right),
            "middle" | "middleclick" => TargetAction::Button(SourceButton::Middle),
            "button4" | "back" => TargetAction::Button(SourceButton::Button4),
            "button5" | "forward" => TargetAction::Button(SourceButton::Button5),
            "doubleclick" => return Err(MappingError::UnsupportedAction(s.to_string())),
            _ => return Err(MappingError::UnknownAction(s.to_string())),
        };
        Ok(action)
    }
}

impl Serialize for TargetAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for TargetAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonPhase {
    Down,
    Up,
}

/// Event time in microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Converts an OS event time; times before the epoch clamp to zero.
    pub fn from_system_time(time: SystemTime) -> Self {
        let micros = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Self(micros)
    }

    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }
}

/// Pointer position at the time of the event, in screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Location {
    pub x: i32,
    pub y: i32,
}

impl Location {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A single button transition as seen by the event tap.
///
/// Produced by the OS, consumed and possibly replaced by the remap engine,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonEvent {
    /// The physical device the event originated from.
    pub device_id: DeviceId,
    pub button: SourceButton,
    pub phase: ButtonPhase,
    pub timestamp: Timestamp,
    pub location: Location,
    /// Set on events injected by the engine itself; the tap never hands
    /// these to the engine again.
    pub synthetic: bool,
}

impl ButtonEvent {
    /// Creates an event as produced by physical hardware.
    pub fn physical(
        device_id: DeviceId,
        button: SourceButton,
        phase: ButtonPhase,
        timestamp: Timestamp,
        location: Location,
    ) -> Self {
        Self {
            device_id,
            button,
            phase,
            timestamp,
            location,
            synthetic: false,
        }
    }

    /// Returns a copy of this event carrying a different button and the synthetic marker.
    pub fn synthesized_as(&self, button: SourceButton) -> Self {
        Self {
            button,
            synthetic: true,
            ..self.clone()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
