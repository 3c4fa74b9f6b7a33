//! Integration tests for mapping snapshots.
//!
//! These tests drive the public API the way the engine does: readers load
//! the current snapshot on many threads while writers publish replacements,
//! and every reader must see a complete table from exactly one version.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use editmouse_core::{
    DeviceDescriptor, DeviceId, DeviceMapping, IdentityStability, MappingSnapshot, SnapshotCell,
    SourceButton, TargetAction,
};

/// A mapping whose every entry encodes the version it was written at, so a
/// reader can tell whether it observed a mix of two versions.
fn stamped_mapping(version: u64) -> DeviceMapping {
    let target = SourceButton::ALL[(version as usize) % SourceButton::COUNT];
    DeviceMapping::from_entries(SourceButton::ALL.map(|b| (b, TargetAction::Button(target))))
}

#[test]
fn test_readers_never_observe_a_torn_snapshot() {
    // Arrange
    let devices: Vec<DeviceId> = (0..4).map(|i| DeviceId::from(format!("dev-{i}"))).collect();
    let initial = devices
        .iter()
        .fold(MappingSnapshot::empty(), |snap, id| {
            snap.with_mapping(id.clone(), stamped_mapping(0))
        });
    let cell = Arc::new(SnapshotCell::new(initial));
    let stop = Arc::new(AtomicBool::new(false));

    // Act – one writer republishes all devices at once; readers verify consistency
    let writer = {
        let cell = Arc::clone(&cell);
        let devices = devices.clone();
        thread::spawn(move || {
            for round in 1..=500_u64 {
                let mapping = stamped_mapping(round);
                cell.update(|snap| {
                    let mut next = snap.clone();
                    next.version += 1;
                    for id in &devices {
                        next.mappings.insert(id.clone(), mapping);
                    }
                    next
                });
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cell = Arc::clone(&cell);
            let devices = devices.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut observed = 0_u64;
                while !stop.load(Ordering::Relaxed) {
                    let snap = cell.load_full();
                    let first = snap.lookup(&devices[0], SourceButton::Left);
                    for id in &devices {
                        for button in SourceButton::ALL {
                            assert_eq!(
                                snap.lookup(id, button),
                                first,
                                "snapshot v{} mixes entries from two versions",
                                snap.version
                            );
                        }
                    }
                    observed += 1;
                }
                observed
            })
        })
        .collect();

    writer.join().expect("writer panicked");
    stop.store(true, Ordering::Relaxed);

    // Assert
    for r in readers {
        let observed = r.join().expect("reader panicked");
        assert!(observed > 0);
    }
    assert_eq!(cell.load().version, 500);
}

#[test]
fn test_version_increases_by_one_per_update() {
    let cell = SnapshotCell::new(MappingSnapshot::empty());
    let id = DeviceId::from("046d:c52b:ABC");

    let v1 = cell.update(|s| s.with_mapping(id.clone(), DeviceMapping::identity()));
    let v2 = cell.update(|s| s.without_mapping(&id));

    assert_eq!(v1.version, 1);
    assert_eq!(v2.version, 2);
}

#[test]
fn test_same_unit_replugged_keeps_its_mapping() {
    // Arrange
    let first_plug = DeviceDescriptor {
        vendor_id: 0x046d,
        product_id: 0x4082,
        serial: Some("4A3F9E21".to_string()),
        path: "usb-0000:00:14.0-1/input2".to_string(),
        name: "MX Master 3".to_string(),
    };
    let (id, stability) = DeviceId::derive(&first_plug);
    let snapshot = MappingSnapshot::empty().with_mapping(
        id,
        DeviceMapping::identity().with(SourceButton::Button4, TargetAction::Disabled),
    );

    // Act – the same unit shows up on another port
    let second_plug = DeviceDescriptor {
        path: "usb-0000:00:14.0-4/input2".to_string(),
        ..first_plug
    };
    let (replugged_id, _) = DeviceId::derive(&second_plug);

    // Assert
    assert_eq!(stability, IdentityStability::Serial);
    assert_eq!(
        snapshot.lookup(&replugged_id, SourceButton::Button4),
        TargetAction::Disabled
    );
}
