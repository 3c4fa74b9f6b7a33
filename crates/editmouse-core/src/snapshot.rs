//! Lock-free publication of immutable snapshots.
//!
//! # Why not a `RwLock`?
//!
//! The event tap calls into the engine for every button press, on a thread
//! the OS expects to answer within a few milliseconds.  If that thread had to
//! take a lock that a settings update also takes, a slow writer could stall
//! the whole input pipeline.
//!
//! [`SnapshotCell`] instead holds an `Arc` to an immutable value behind an
//! atomic pointer ([`arc_swap::ArcSwap`]):
//!
//! - **Readers** load the current pointer.  They never block and never see a
//!   half-written value, because values are never written after publication.
//! - **Writers** build a complete new value off to the side, then swap the
//!   pointer in one atomic step.  Readers that already hold the old value keep
//!   using it until they drop it.
//!
//! Concurrent writers are serialized by a compare-and-swap loop
//! ([`SnapshotCell::update`]), so no update is lost.

use std::fmt;
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};

/// An atomically replaceable, immutable `T`.
pub struct SnapshotCell<T> {
    inner: ArcSwap<T>,
}

impl<T> SnapshotCell<T> {
    /// Creates a cell holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            inner: ArcSwap::from_pointee(initial),
        }
    }

    /// Borrows the current value without touching the reference count on the
    /// common path.  Suitable for the real-time event path.
    ///
    /// Keep the guard short-lived; long-lived handles should use [`load_full`](Self::load_full).
    #[inline]
    pub fn load(&self) -> Guard<Arc<T>> {
        self.inner.load()
    }

    /// Returns an owned handle to the current value.
    pub fn load_full(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Replaces the current value unconditionally.
    pub fn store(&self, value: T) {
        self.inner.store(Arc::new(value));
    }

    /// Publishes `f(current)` as the new value and returns it.
    ///
    /// Under contention `f` may run more than once against newer values, so
    /// it must be a pure function of its input.
    pub fn update<F>(&self, mut f: F) -> Arc<T>
    where
        F: FnMut(&T) -> T,
    {
        let mut published: Option<Arc<T>> = None;
        self.inner.rcu(|current| {
            let next = Arc::new(f(current));
            published = Some(Arc::clone(&next));
            next
        });
        published.unwrap_or_else(|| self.inner.load_full())
    }
}

impl<T: Default> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for SnapshotCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SnapshotCell").field(&*self.load()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::button::{SourceButton, TargetAction};
    use crate::domain::device::DeviceId;
    use crate::domain::mapping::{DeviceMapping, MappingSnapshot};
    use std::thread;

    #[test]
    fn test_new_cell_returns_initial_value() {
        // Arrange
        let cell = SnapshotCell::new(7_u32);

        // Act / Assert
        assert_eq!(**cell.load(), 7);
        assert_eq!(*cell.load_full(), 7);
    }

    #[test]
    fn test_store_replaces_value_but_old_handles_survive() {
        // Arrange
        let cell = SnapshotCell::new(String::from("old"));
        let held = cell.load_full();

        // Act
        cell.store(String::from("new"));

        // Assert
        assert_eq!(held.as_str(), "old");
        assert_eq!(cell.load().as_str(), "new");
    }

    #[test]
    fn test_update_returns_published_value() {
        let cell = SnapshotCell::new(1_u64);
        let published = cell.update(|v| v + 1);
        assert_eq!(*published, 2);
        assert_eq!(**cell.load(), 2);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        // Arrange
        let cell = Arc::new(SnapshotCell::new(MappingSnapshot::empty()));
        let writers = 8;
        let updates_per_writer = 50;

        // Act – every writer adds its own devices through copy-on-write updates
        let handles: Vec<_> = (0..writers)
            .map(|w| {
                let cell = Arc::clone(&cell);
                thread::spawn(move || {
                    for i in 0..updates_per_writer {
                        let id = DeviceId::from(format!("{w}:{i}"));
                        let mapping = DeviceMapping::identity()
                            .with(SourceButton::Left, TargetAction::Disabled);
                        cell.update(|snap| snap.with_mapping(id.clone(), mapping));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("writer panicked");
        }

        // Assert
        let snapshot = cell.load_full();
        assert_eq!(snapshot.mappings.len(), writers * updates_per_writer);
        assert_eq!(snapshot.version, (writers * updates_per_writer) as u64);
    }
}
