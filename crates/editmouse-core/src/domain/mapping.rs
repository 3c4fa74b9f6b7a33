//! Per-device mapping tables and the versioned snapshot of all of them.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::button::{SourceButton, TargetAction};
use super::device::DeviceId;

/// Errors that can occur while building or parsing a mapping.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("unknown button name: {0:?}")]
    UnknownButton(String),

    #[error("unknown action name: {0:?}")]
    UnknownAction(String),

    #[error("action {0:?} is a multi-click macro and is not supported")]
    UnsupportedAction(String),
}

/// Total function from every [`SourceButton`] to a [`TargetAction`].
///
/// Buttons that were never set resolve to [`TargetAction::NoOp`], so a
/// mapping can never be partial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DeviceMapping {
    actions: [TargetAction; SourceButton::COUNT],
}

impl DeviceMapping {
    /// The mapping that passes every button through unchanged.
    pub const fn identity() -> Self {
        Self {
            actions: [TargetAction::NoOp; SourceButton::COUNT],
        }
    }

    /// Builder-style setter.
    pub fn with(mut self, source: SourceButton, action: TargetAction) -> Self {
        self.set(source, action);
        self
    }

    /// Builds a mapping from explicit entries; later entries win.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (SourceButton, TargetAction)>,
    {
        entries
            .into_iter()
            .fold(Self::identity(), |mapping, (source, action)| {
                mapping.with(source, action)
            })
    }

    #[inline]
    pub fn get(&self, source: SourceButton) -> TargetAction {
        self.actions[source.index()]
    }

    pub fn set(&mut self, source: SourceButton, action: TargetAction) {
        self.actions[source.index()] = action;
    }

    /// Returns `true` if no button is changed by this mapping.
    pub fn is_identity(&self) -> bool {
        SourceButton::ALL
            .iter()
            .all(|&b| self.get(b).is_identity_for(b))
    }

    /// Iterates over every `(source, action)` pair in table order.
    pub fn entries(&self) -> impl Iterator<Item = (SourceButton, TargetAction)> + '_ {
        SourceButton::ALL.iter().map(move |&b| (b, self.get(b)))
    }
}

impl Serialize for DeviceMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let table: BTreeMap<&'static str, TargetAction> = self
            .entries()
            .filter(|(_, action)| *action != TargetAction::NoOp)
            .map(|(source, action)| (source.name(), action))
            .collect();
        table.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DeviceMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let table = BTreeMap::<String, TargetAction>::deserialize(deserializer)?;
        let mut mapping = DeviceMapping::identity();
        for (key, action) in table {
            let source: SourceButton = key.parse().map_err(serde::de::Error::custom)?;
            mapping.set(source, action);
        }
        Ok(mapping)
    }
}

/// Immutable, versioned copy of every configured [`DeviceMapping`].
///
/// Snapshots are never mutated after publication; an update builds a new
/// one with `version + 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingSnapshot {
    pub version: u64,
    pub mappings: HashMap<DeviceId, DeviceMapping>,
}

impl MappingSnapshot {
    /// The empty snapshot: every device resolves to identity.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolves the action for `button` on `device`.  Does not allocate.
    #[inline]
    pub fn lookup(&self, device: &DeviceId, button: SourceButton) -> TargetAction {
        self.mappings
            .get(device)
            .map(|m| m.get(button))
            .unwrap_or_default()
    }

    /// The mapping for `device`, identity if none is configured.
    pub fn mapping(&self, device: &DeviceId) -> DeviceMapping {
        self.mappings.get(device).copied().unwrap_or_default()
    }

    /// Returns `true` if any configured device changes at least one button.
    pub fn has_remapping(&self) -> bool {
        self.mappings.values().any(|m| !m.is_identity())
    }

    /// Returns `true` if `device` has a non-identity mapping.
    pub fn is_remapping_for(&self, device: &DeviceId) -> bool {
        self.mappings
            .get(device)
            .is_some_and(|m| !m.is_identity())
    }

    /// A copy of this snapshot with `device` set to `mapping` and the version bumped.
    pub fn with_mapping(&self, device: DeviceId, mapping: DeviceMapping) -> Self {
        let mut mappings = self.mappings.clone();
        mappings.insert(device, mapping);
        Self {
            version: self.version + 1,
            mappings,
        }
    }

    /// A copy of this snapshot without an entry for `device` and the version bumped.
    pub fn without_mapping(&self, device: &DeviceId) -> Self {
        let mut mappings = self.mappings.clone();
        mappings.remove(device);
        Self {
            version: self.version + 1,
            mappings,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
