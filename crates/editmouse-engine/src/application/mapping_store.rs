//! Mapping store: per-device button tables behind an atomic snapshot.
//!
//! Writers (the UI bridge, the config seeder) build a complete new
//! [`MappingSnapshot`] and publish it in one pointer swap.  The event tap reads
//! the current snapshot without locking, so a settings change can never stall
//! input, and a reader never sees a table that is half old and half new.

use std::sync::Arc;

use editmouse_core::{
    DeviceId, DeviceMapping, MappingSnapshot, SnapshotCell, SourceButton, TargetAction,
};
use tracing::{debug, info};

/// Versioned store of every device's [`DeviceMapping`].
#[derive(Debug, Default)]
pub struct MappingStore {
    cell: SnapshotCell<MappingSnapshot>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mapping for `device_id`, identity if none was configured.
    pub fn get_mapping(&self, device_id: &DeviceId) -> DeviceMapping {
        self.cell.load().mapping(device_id)
    }

    /// Replaces the mapping for `device_id` and returns the new snapshot version.
    pub fn set_mapping(&self, device_id: DeviceId, mapping: DeviceMapping) -> u64 {
        let published = self
            .cell
            .update(|snap| snap.with_mapping(device_id.clone(), mapping));
        info!(
            device = %device_id,
            version = published.version,
            identity = mapping.is_identity(),
            "mapping updated"
        );
        published.version
    }

    /// Resets `device_id` to identity and returns the new snapshot version.
    pub fn clear_mapping(&self, device_id: &DeviceId) -> u64 {
        let published = self.cell.update(|snap| snap.without_mapping(device_id));
        info!(device = %device_id, version = published.version, "mapping cleared");
        published.version
    }

    /// Replaces every mapping at once (e.g. when loading configuration).
    ///
    /// Produces exactly one new snapshot regardless of how many entries are given.
    pub fn replace_all<I>(&self, entries: I) -> u64
    where
        I: IntoIterator<Item = (DeviceId, DeviceMapping)>,
    {
        let mappings: std::collections::HashMap<DeviceId, DeviceMapping> =
            entries.into_iter().collect();
        let count = mappings.len();
        let published = self.cell.update(|snap| MappingSnapshot {
            version: snap.version + 1,
            mappings: mappings.clone(),
        });
        info!(devices = count, version = published.version, "mappings replaced");
        published.version
    }

    /// The current snapshot as an owned handle.
    pub fn current_snapshot(&self) -> Arc<MappingSnapshot> {
        self.cell.load_full()
    }

    /// Hot-path lookup: no locks, no allocation.
    #[inline]
    pub fn lookup(&self, device_id: &DeviceId, button: SourceButton) -> TargetAction {
        self.cell.load().lookup(device_id, button)
    }

    /// Returns `true` if `device_id` currently changes at least one button.
    pub fn is_remapping_for(&self, device_id: &DeviceId) -> bool {
        self.cell.load().is_remapping_for(device_id)
    }

    /// Ids of every device with a stored entry, sorted.
    pub fn configured_devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.cell.load().mappings.keys().cloned().collect();
        ids.sort();
        debug!(count = ids.len(), "listing configured devices");
        ids
    }

    pub fn version(&self) -> u64 {
        self.cell.load().version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn swap_side_buttons() -> DeviceMapping {
        DeviceMapping::identity()
            .with(SourceButton::Button4, TargetAction::Button(SourceButton::Button5))
            .with(SourceButton::Button5, TargetAction::Button(SourceButton::Button4))
    }

    #[test]
    fn test_get_mapping_defaults_to_identity() {
        let store = MappingStore::new();
        assert_eq!(
            store.get_mapping(&DeviceId::from("046d:c52b:X")),
            DeviceMapping::identity()
        );
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_set_mapping_publishes_new_version() {
        // Arrange
        let store = MappingStore::new();
        let id = DeviceId::from("046d:c52b:X");
        let before = store.current_snapshot();

        // Act
        let version = store.set_mapping(id.clone(), swap_side_buttons());

        // Assert
        assert_eq!(version, 1);
        assert_eq!(before.version, 0, "old snapshot must be untouched");
        assert!(before.mappings.is_empty());
        assert_eq!(
            store.lookup(&id, SourceButton::Button4),
            TargetAction::Button(SourceButton::Button5)
        );
        assert!(store.is_remapping_for(&id));
    }

    #[test]
    fn test_clear_mapping_restores_identity() {
        let store = MappingStore::new();
        let id = DeviceId::from("046d:c52b:X");
        store.set_mapping(id.clone(), swap_side_buttons());

        let version = store.clear_mapping(&id);

        assert_eq!(version, 2);
        assert_eq!(store.get_mapping(&id), DeviceMapping::identity());
        assert!(store.configured_devices().is_empty());
    }

    #[test]
    fn test_replace_all_publishes_once() {
        // Arrange
        let store = MappingStore::new();
        store.set_mapping(DeviceId::from("stale"), swap_side_buttons());

        // Act
        let version = store.replace_all([
            (DeviceId::from("b"), swap_side_buttons()),
            (DeviceId::from("a"), DeviceMapping::identity()),
        ]);

        // Assert
        assert_eq!(version, 2);
        assert_eq!(
            store.configured_devices(),
            vec![DeviceId::from("a"), DeviceId::from("b")]
        );
    }

    #[test]
    fn test_concurrent_writers_each_bump_version_once() {
        let store = Arc::new(MappingStore::new());
        let handles: Vec<_> = (0..4)
            .map(|w| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..25 {
                        store.set_mapping(DeviceId::from(format!("{w}-{i}")), swap_side_buttons());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("writer panicked");
        }

        assert_eq!(store.version(), 100);
        assert_eq!(store.configured_devices().len(), 100);
    }
}
