//! Hot-plug watcher.
//!
//! Polls the device registry on a background thread.  Each [`rescan`] diffs
//! the inventory against the last known set and notifies listeners (the remap
//! engine among them) of connects and disconnects, so a press held on an
//! unplugged mouse gets its compensating release.
//!
//! Polling keeps the watcher independent of udev.  The tap's own read error
//! on unplug is usually noticed first; the next tick then reports the
//! disconnect to the registry.
//!
//! [`rescan`]: crate::application::device_registry::DeviceRegistry::rescan

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::application::device_registry::DeviceRegistry;

const WATCH_THREAD_NAME: &str = "editmouse-device-watch";

/// Granularity at which the watcher checks `running` while waiting.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Spawns the watcher thread.  It exits once `running` is cleared.
///
/// # Errors
///
/// Returns the OS error if the thread cannot be spawned.
pub fn start_device_watcher(
    registry: Arc<DeviceRegistry>,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(WATCH_THREAD_NAME.to_string())
        .spawn(move || watch_loop(&registry, interval, &running))?;
    info!(interval_ms = interval.as_millis() as u64, "device watcher started");
    Ok(handle)
}

fn watch_loop(registry: &DeviceRegistry, interval: Duration, running: &AtomicBool) {
    let mut last_scan = Instant::now();
    let mut last_error: Option<String> = None;

    while running.load(Ordering::Relaxed) {
        thread::sleep(STOP_POLL.min(interval));
        if last_scan.elapsed() < interval {
            continue;
        }
        last_scan = Instant::now();

        match registry.rescan() {
            Ok(events) => {
                if !events.is_empty() {
                    debug!(changes = events.len(), "device set changed");
                }
                last_error = None;
            }
            Err(e) => {
                // Log each distinct failure once rather than every tick.
                let message = e.to_string();
                if last_error.as_deref() != Some(message.as_str()) {
                    warn!("device rescan failed: {message}");
                    last_error = Some(message);
                }
            }
        }
    }

    info!("device watcher stopped");
}
