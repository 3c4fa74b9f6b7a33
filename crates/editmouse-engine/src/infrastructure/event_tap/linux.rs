//! Linux event tap: exclusive evdev grab plus a uinput forwarder.
//!
//! # How interception works on Linux (for beginners)
//!
//! There is no system-wide "mouse hook" on Linux.  Instead the tap opens each
//! mouse's `/dev/input/eventN` node and calls `EVIOCGRAB`, which makes the
//! tap the node's only reader: the compositor and X server stop seeing it.
//! Every event is then either
//!
//! - re-emitted unchanged through a *forwarder* uinput device (passthrough), or
//! - dropped, after the engine has injected its replacement through the
//!   synthesizer's own uinput device (consume).
//!
//! Motion and wheel events are always forwarded.  Only the five remappable
//! buttons are offered to the engine.
//!
//! # Threading
//!
//! One named thread (`editmouse-tap`) owns the grabbed devices and the
//! forwarder.  It only grabs and polls the non-blocking device nodes.
//! Enumeration opens every `/dev/input/event*` node, so it runs on a second
//! thread (`editmouse-tap-scan`) that hands newly plugged mice to the tap over
//! a channel every `rescan_interval`.
//! A device whose read fails (typically `ENODEV` on unplug) is dropped and any
//! button it still held down on the forwarder is released.
//!
//! The session counts as dead once the tap thread exits for any reason,
//! including a panic, a forwarder that keeps refusing events, or read access
//! revoked on every grabbed node.
//!
//! # Pointer location
//!
//! evdev mice report relative motion only.  The `Location` attached to each
//! event is the running sum of the device's `REL_X`/`REL_Y` since it was
//! grabbed; the synthesizer does not need absolute coordinates because the
//! replacement click lands wherever the cursor already is.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use editmouse_core::buttonmap::linux_evdev::{BTN_BACK, BTN_FORWARD, EMITTED_CODES};
use editmouse_core::buttonmap::ButtonMapper;
use editmouse_core::{assign_ids, ButtonEvent, ButtonPhase, DeviceId, Location, Timestamp};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, Device, EventType, InputEvent, InputEventKind, Key, RelativeAxisType};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::dispatch;
use crate::application::capture::{EventTap, PermissionStatus, TapBackend, TapError, TapSession};
use crate::application::remap_engine::{TapHandler, TapVerdict};
use crate::infrastructure::inventory::linux::{descriptor_for, is_remappable};

const TAP_THREAD_NAME: &str = "editmouse-tap";
const SCAN_THREAD_NAME: &str = "editmouse-tap-scan";
const INPUT_DIR: &str = "/dev/input";
const UINPUT_PATH: &str = "/dev/uinput";
const IDLE_SLEEP: Duration = Duration::from_millis(2);
/// Granularity at which the scan thread checks for stop while waiting.
const STOP_POLL: Duration = Duration::from_millis(50);
/// Consecutive failed forwarder writes after which the session is ended.
const MAX_FORWARD_FAILURES: u32 = 32;

// Button ranges every forwarder advertises up front.
const BTN_MISC_FIRST: u16 = 0x100;
const BTN_MISC_LAST: u16 = 0x109;
const BTN_MOUSE_FIRST: u16 = 0x110;
const BTN_TASK: u16 = 0x117;

const KEY_RELEASED: i32 = 0;
const KEY_PRESSED: i32 = 1;
const KEY_REPEAT: i32 = 2;

/// Reports whether this process may create uinput devices.
pub fn uinput_permission() -> PermissionStatus {
    match OpenOptions::new().write(true).open(UINPUT_PATH) {
        Ok(_) => PermissionStatus::Granted,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => PermissionStatus::Denied,
        Err(_) => PermissionStatus::Unknown,
    }
}

/// Reports whether this process may read evdev nodes.
///
/// Granted if at least one `eventN` node opens; denied if every node that
/// exists refuses with `EACCES`.
fn input_permission() -> PermissionStatus {
    let Ok(entries) = fs::read_dir(INPUT_DIR) else {
        return PermissionStatus::Unknown;
    };
    let mut denied = false;
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with("event") {
            continue;
        }
        match fs::File::open(entry.path()) {
            Ok(_) => return PermissionStatus::Granted,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => denied = true,
            Err(_) => {}
        }
    }
    if denied {
        PermissionStatus::Denied
    } else {
        PermissionStatus::Unknown
    }
}

fn set_nonblocking(dev: &Device) -> io::Result<()> {
    let raw_fd = dev.as_raw_fd();

    // SAFETY: `raw_fd` is a valid descriptor owned by `dev` for this call.
    let current = unsafe { libc::fcntl(raw_fd, libc::F_GETFL) };
    if current < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above; only O_NONBLOCK is added to the existing flags.
    let rc = unsafe { libc::fcntl(raw_fd, libc::F_SETFL, current | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn tap_error(context: &str, err: io::Error) -> TapError {
    if err.kind() == io::ErrorKind::PermissionDenied {
        TapError::PermissionDenied(format!("{context}: {err}"))
    } else {
        TapError::Creation(format!("{context}: {err}"))
    }
}

// ── Tap loop failures ─────────────────────────────────────────────────────────

/// Why the tap thread gave up.
#[derive(Debug, Error)]
enum TapLoopError {
    #[error("forwarder rejected {failures} writes in a row: {source}")]
    Forwarder { failures: u32, source: io::Error },

    #[error("read access revoked on every grabbed device")]
    AccessRevoked,
}

/// Counts consecutive forwarder failures.
#[derive(Debug, Default)]
struct ForwardHealth {
    consecutive_failures: u32,
}

impl ForwardHealth {
    fn ok(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Records a failure; returns an error once the limit is reached.
    fn failed(&mut self, source: io::Error) -> Result<(), TapLoopError> {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= MAX_FORWARD_FAILURES {
            return Err(TapLoopError::Forwarder {
                failures: self.consecutive_failures,
                source,
            });
        }
        Ok(())
    }
}

/// `true` when the last grabbed devices all failed with `EACCES`.
fn access_revoked(lost: &[io::ErrorKind], remaining: usize) -> bool {
    remaining == 0
        && !lost.is_empty()
        && lost.iter().all(|kind| *kind == io::ErrorKind::PermissionDenied)
}

/// Clears the session's liveness flag when the tap thread ends, even by panic.
struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ── Grabbed devices ───────────────────────────────────────────────────────────

struct GrabbedDevice {
    node: PathBuf,
    device: Device,
    id: DeviceId,
    position: Location,
    /// Key codes forwarded as pressed and not yet released.
    held: Vec<u16>,
}

impl GrabbedDevice {
    fn grab(node: PathBuf, mut device: Device, id: DeviceId) -> io::Result<Self> {
        set_nonblocking(&device)?;
        device.grab()?;
        info!(
            node = %node.display(),
            device = %id,
            name = device.name().unwrap_or_default(),
            "grabbed pointing device"
        );
        Ok(Self {
            node,
            device,
            id,
            position: Location::default(),
            held: Vec::new(),
        })
    }

    fn track_forwarded_key(&mut self, code: u16, value: i32) {
        match value {
            KEY_PRESSED if !self.held.contains(&code) => self.held.push(code),
            KEY_RELEASED => self.held.retain(|&c| c != code),
            _ => {}
        }
    }

    fn release_events(&self) -> Vec<InputEvent> {
        self.held
            .iter()
            .map(|&code| InputEvent::new(EventType::KEY, code, KEY_RELEASED))
            .collect()
    }
}

/// Lists remappable nodes with their ids, in node order.
fn discover(virtual_prefix: &str) -> Vec<(PathBuf, Device, DeviceId)> {
    let mut found: Vec<(PathBuf, Device)> = evdev::enumerate()
        .filter(|(_, dev)| is_remappable(dev, virtual_prefix))
        .collect();
    found.sort_by(|a, b| a.0.cmp(&b.0));

    let descriptors: Vec<_> = found
        .iter()
        .map(|(node, dev)| descriptor_for(node, dev))
        .collect();
    found
        .into_iter()
        .zip(assign_ids(&descriptors))
        .map(|((node, dev), (id, _))| (node, dev, id))
        .collect()
}

// ── Discovery thread ──────────────────────────────────────────────────────────

/// One remappable node seen by a scan.  `device` is set only the first time
/// the node appears; later scans carry just its (possibly reassigned) id.
struct Discovered<D> {
    node: PathBuf,
    id: DeviceId,
    device: Option<D>,
}

/// Remembers which nodes were already handed to the tap.
#[derive(Debug, Default)]
struct ScanState {
    known: HashSet<PathBuf>,
}

impl ScanState {
    fn seeded<'a>(nodes: impl IntoIterator<Item = &'a PathBuf>) -> Self {
        Self {
            known: nodes.into_iter().cloned().collect(),
        }
    }

    /// Turns one full scan into the message for the tap thread.  A node that
    /// vanished and came back is treated as new.
    fn diff<D>(&mut self, found: Vec<(PathBuf, D, DeviceId)>) -> Vec<Discovered<D>> {
        let present: HashSet<PathBuf> = found.iter().map(|(node, _, _)| node.clone()).collect();
        self.known.retain(|node| present.contains(node));

        found
            .into_iter()
            .map(|(node, device, id)| {
                let is_new = self.known.insert(node.clone());
                Discovered {
                    node,
                    id,
                    device: is_new.then_some(device),
                }
            })
            .collect()
    }
}

fn scan_loop(
    mut state: ScanState,
    virtual_prefix: &str,
    interval: Duration,
    stop: &AtomicBool,
    tx: &Sender<Vec<Discovered<Device>>>,
) {
    let mut last_scan = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        thread::sleep(STOP_POLL.min(interval));
        if last_scan.elapsed() < interval {
            continue;
        }
        last_scan = Instant::now();

        let batch = state.diff(discover(virtual_prefix));
        if tx.send(batch).is_err() {
            // Tap thread is gone.
            break;
        }
    }
    debug!("tap discovery stopped");
}

// ── Forwarder ─────────────────────────────────────────────────────────────────

/// Mouse and misc button ranges plus every key the devices report.
fn forwarder_keys(devices: &[GrabbedDevice]) -> AttributeSet<Key> {
    let mut keys = AttributeSet::<Key>::new();
    for code in (BTN_MISC_FIRST..=BTN_MISC_LAST).chain(BTN_MOUSE_FIRST..=BTN_TASK) {
        keys.insert(Key::new(code));
    }
    for code in EMITTED_CODES.iter().chain([BTN_FORWARD, BTN_BACK].iter()) {
        keys.insert(Key::new(*code));
    }
    for grabbed in devices {
        if let Some(supported) = grabbed.device.supported_keys() {
            for key in supported.iter() {
                keys.insert(key);
            }
        }
    }
    keys
}

fn has_unadvertised_keys(advertised: &AttributeSet<Key>, device: &Device) -> bool {
    device
        .supported_keys()
        .is_some_and(|keys| keys.iter().any(|key| !advertised.contains(key)))
}

fn build_forwarder(name: &str, keys: &AttributeSet<Key>) -> io::Result<VirtualDevice> {
    let mut axes = AttributeSet::<RelativeAxisType>::new();
    for axis in [
        RelativeAxisType::REL_X,
        RelativeAxisType::REL_Y,
        RelativeAxisType::REL_WHEEL,
        RelativeAxisType::REL_HWHEEL,
        RelativeAxisType::REL_WHEEL_HI_RES,
        RelativeAxisType::REL_HWHEEL_HI_RES,
    ] {
        axes.insert(axis);
    }

    VirtualDeviceBuilder::new()?
        .name(name)
        .with_keys(keys)?
        .with_relative_axes(&axes)?
        .build()
}

// ── Tap loop ──────────────────────────────────────────────────────────────────

struct TapLoop {
    handler: Arc<dyn TapHandler>,
    forwarder: VirtualDevice,
    forwarder_name: String,
    advertised: AttributeSet<Key>,
    devices: Vec<GrabbedDevice>,
    discovered: Receiver<Vec<Discovered<Device>>>,
    health: ForwardHealth,
}

impl TapLoop {
    fn run(mut self, stop: &AtomicBool) -> Result<(), TapLoopError> {
        let result = self.pump(stop);

        for mut grabbed in self.devices {
            if let Err(e) = grabbed.device.ungrab() {
                debug!(node = %grabbed.node.display(), "ungrab failed: {e}");
            }
        }
        result
    }

    fn pump(&mut self, stop: &AtomicBool) -> Result<(), TapLoopError> {
        while !stop.load(Ordering::Relaxed) {
            self.take_discovered();
            if !self.poll_devices()? {
                thread::sleep(IDLE_SLEEP);
            }
        }
        Ok(())
    }

    /// Reads every device once.  Returns `true` if any event arrived.
    fn poll_devices(&mut self) -> Result<bool, TapLoopError> {
        let mut had_events = false;
        let mut lost: Vec<(usize, io::ErrorKind)> = Vec::new();

        for (index, grabbed) in self.devices.iter_mut().enumerate() {
            let events: Vec<InputEvent> = match grabbed.device.fetch_events() {
                Ok(events) => events.collect(),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    warn!(device = %grabbed.id, node = %grabbed.node.display(), "device lost: {e}");
                    lost.push((index, e.kind()));
                    continue;
                }
            };
            had_events |= !events.is_empty();
            forward_batch(
                self.handler.as_ref(),
                &mut self.forwarder,
                &mut self.health,
                grabbed,
                events,
            )?;
        }

        let kinds: Vec<io::ErrorKind> = lost.iter().map(|(_, kind)| *kind).collect();
        for (index, _) in lost.into_iter().rev() {
            let grabbed = self.devices.remove(index);
            let releases = grabbed.release_events();
            if !releases.is_empty() {
                if let Err(e) = self.forwarder.emit(&releases) {
                    warn!(device = %grabbed.id, "failed to release held buttons: {e}");
                }
            }
        }
        if access_revoked(&kinds, self.devices.len()) {
            return Err(TapLoopError::AccessRevoked);
        }
        Ok(had_events)
    }

    /// Applies every scan result queued by the discovery thread.
    fn take_discovered(&mut self) {
        loop {
            match self.discovered.try_recv() {
                Ok(batch) => {
                    for found in batch {
                        self.apply_discovered(found);
                    }
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return,
            }
        }
    }

    fn apply_discovered(&mut self, found: Discovered<Device>) {
        if let Some(existing) = self.devices.iter_mut().find(|d| d.node == found.node) {
            existing.id = found.id;
            return;
        }
        let Some(device) = found.device else {
            return;
        };
        let needs_rebuild = has_unadvertised_keys(&self.advertised, &device);
        match GrabbedDevice::grab(found.node.clone(), device, found.id) {
            Ok(grabbed) => {
                self.devices.push(grabbed);
                if needs_rebuild {
                    self.rebuild_forwarder();
                }
            }
            Err(e) => warn!(node = %found.node.display(), "cannot grab device: {e}"),
        }
    }

    /// Replaces the forwarder with one advertising every grabbed device's keys.
    ///
    /// Held buttons are released on the old forwarder first.
    fn rebuild_forwarder(&mut self) {
        let keys = forwarder_keys(&self.devices);
        let forwarder = match build_forwarder(&self.forwarder_name, &keys) {
            Ok(forwarder) => forwarder,
            Err(e) => {
                warn!("cannot extend forwarder for new buttons, extra keys will be lost: {e}");
                return;
            }
        };
        for grabbed in &mut self.devices {
            let releases = grabbed.release_events();
            if !releases.is_empty() {
                if let Err(e) = self.forwarder.emit(&releases) {
                    debug!(device = %grabbed.id, "release before forwarder rebuild failed: {e}");
                }
            }
            grabbed.held.clear();
        }
        self.forwarder = forwarder;
        self.advertised = keys;
        info!("forwarder rebuilt for newly grabbed device");
    }
}

/// Offers each remappable button event to the engine and forwards the rest.
fn forward_batch(
    handler: &dyn TapHandler,
    forwarder: &mut VirtualDevice,
    health: &mut ForwardHealth,
    grabbed: &mut GrabbedDevice,
    events: Vec<InputEvent>,
) -> Result<(), TapLoopError> {
    let mut pending: Vec<InputEvent> = Vec::with_capacity(events.len());

    for ev in events {
        match ev.kind() {
            // emit() appends its own SYN_REPORT.
            InputEventKind::Synchronization(_) => {}
            InputEventKind::RelAxis(axis) => {
                if axis == RelativeAxisType::REL_X {
                    grabbed.position.x = grabbed.position.x.saturating_add(ev.value());
                } else if axis == RelativeAxisType::REL_Y {
                    grabbed.position.y = grabbed.position.y.saturating_add(ev.value());
                }
                pending.push(ev);
            }
            InputEventKind::Key(key) => {
                let code = key.code();
                if let Some(button) = ButtonMapper::evdev_to_button(code) {
                    if ev.value() != KEY_REPEAT {
                        // Keep motion ahead of any replacement click.
                        flush(forwarder, health, &mut pending, &grabbed.id)?;

                        let phase = if ev.value() == KEY_RELEASED {
                            ButtonPhase::Up
                        } else {
                            ButtonPhase::Down
                        };
                        let event = ButtonEvent::physical(
                            grabbed.id.clone(),
                            button,
                            phase,
                            Timestamp::from_system_time(ev.timestamp()),
                            grabbed.position,
                        );
                        if dispatch(handler, &event) == TapVerdict::Consume {
                            continue;
                        }
                    }
                }
                grabbed.track_forwarded_key(code, ev.value());
                pending.push(ev);
            }
            _ => pending.push(ev),
        }
    }

    flush(forwarder, health, &mut pending, &grabbed.id)
}

fn flush(
    forwarder: &mut VirtualDevice,
    health: &mut ForwardHealth,
    pending: &mut Vec<InputEvent>,
    device: &DeviceId,
) -> Result<(), TapLoopError> {
    if pending.is_empty() {
        return Ok(());
    }
    let result = forwarder.emit(&pending[..]);
    pending.clear();
    match result {
        Ok(()) => {
            health.ok();
            Ok(())
        }
        Err(e) => {
            warn!(device = %device, "forwarder emit failed: {e}");
            health.failed(e)
        }
    }
}

// ── EventTap implementation ───────────────────────────────────────────────────

struct EvdevTapBackend {
    stop: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl TapBackend for EvdevTapBackend {
    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("tap").to_string();
            if handle.join().is_err() {
                error!(thread = %name, "tap thread panicked");
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Event tap that grabs every pointing device through evdev.
#[derive(Debug, Clone)]
pub struct EvdevEventTap {
    virtual_prefix: String,
    rescan_interval: Duration,
}

impl EvdevEventTap {
    /// `virtual_prefix` is the name prefix shared by the engine's own uinput
    /// devices, which are never grabbed.
    pub fn new(virtual_prefix: impl Into<String>, rescan_interval: Duration) -> Self {
        Self {
            virtual_prefix: virtual_prefix.into(),
            rescan_interval,
        }
    }

    fn forwarder_name(&self) -> String {
        format!("{} (forwarder)", self.virtual_prefix)
    }
}

impl EventTap for EvdevEventTap {
    fn permission_status(&self) -> PermissionStatus {
        match (input_permission(), uinput_permission()) {
            (PermissionStatus::Granted, PermissionStatus::Granted) => PermissionStatus::Granted,
            (PermissionStatus::Denied, _) | (_, PermissionStatus::Denied) => {
                PermissionStatus::Denied
            }
            _ => PermissionStatus::Unknown,
        }
    }

    fn start(&self, handler: Arc<dyn TapHandler>) -> Result<TapSession, TapError> {
        if input_permission() == PermissionStatus::Denied {
            return Err(TapError::PermissionDenied(format!(
                "cannot read {INPUT_DIR}/event*; add the user to the `input` group"
            )));
        }

        let mut devices = Vec::new();
        for (node, device, id) in discover(&self.virtual_prefix) {
            match GrabbedDevice::grab(node.clone(), device, id) {
                Ok(grabbed) => devices.push(grabbed),
                Err(e) => warn!(node = %node.display(), "cannot grab device: {e}"),
            }
        }
        if devices.is_empty() {
            info!("no pointing devices to grab yet; waiting for hot-plug");
        }

        let forwarder_name = self.forwarder_name();
        let advertised = forwarder_keys(&devices);
        let forwarder = build_forwarder(&forwarder_name, &advertised)
            .map_err(|e| tap_error(UINPUT_PATH, e))?;

        let scan_state = ScanState::seeded(devices.iter().map(|d| &d.node));
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let tap_loop = TapLoop {
            handler,
            forwarder,
            forwarder_name,
            advertised,
            devices,
            discovered: rx,
            health: ForwardHealth::default(),
        };

        let thread_stop = Arc::clone(&stop);
        let guard = AliveGuard(Arc::clone(&alive));
        let tap_thread = thread::Builder::new()
            .name(TAP_THREAD_NAME.into())
            .spawn(move || {
                let _guard = guard;
                match tap_loop.run(&thread_stop) {
                    Ok(()) => debug!("tap loop stopped"),
                    Err(e) => error!("event tap failed, buttons fall back to normal: {e}"),
                }
            })
            .map_err(|e| TapError::Creation(format!("spawn {TAP_THREAD_NAME}: {e}")))?;

        let scan_stop = Arc::clone(&stop);
        let prefix = self.virtual_prefix.clone();
        let interval = self.rescan_interval;
        let scan_thread = thread::Builder::new()
            .name(SCAN_THREAD_NAME.into())
            .spawn(move || scan_loop(scan_state, &prefix, interval, &scan_stop, &tx));
        let mut threads = vec![tap_thread];
        match scan_thread {
            Ok(handle) => threads.push(handle),
            Err(e) => warn!("hot-plugged mice will not be grabbed: spawn {SCAN_THREAD_NAME}: {e}"),
        }

        Ok(TapSession::new(Box::new(EvdevTapBackend {
            stop,
            alive,
            threads,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_io_error_maps_to_permission_denied() {
        let err = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(matches!(
            tap_error(UINPUT_PATH, err),
            TapError::PermissionDenied(_)
        ));
    }

    #[test]
    fn test_other_io_errors_map_to_creation() {
        let err = io::Error::from(io::ErrorKind::NotFound);
        assert!(matches!(tap_error(UINPUT_PATH, err), TapError::Creation(_)));
    }

    #[test]
    fn test_forwarder_name_shares_virtual_prefix() {
        let tap = EvdevEventTap::new("Edit Mouse virtual pointer", Duration::from_secs(1));
        assert!(tap.forwarder_name().starts_with("Edit Mouse virtual pointer"));
    }

    #[test]
    fn test_alive_flag_cleared_when_tap_thread_panics() {
        // Arrange
        let alive = Arc::new(AtomicBool::new(true));
        let guard = AliveGuard(Arc::clone(&alive));

        // Act
        let result = thread::spawn(move || {
            let _guard = guard;
            panic!("tap loop blew up");
        })
        .join();

        // Assert
        assert!(result.is_err());
        assert!(!alive.load(Ordering::SeqCst));
    }

    #[test]
    fn test_forwarder_failures_end_session_only_when_consecutive() {
        let mut health = ForwardHealth::default();
        for _ in 0..MAX_FORWARD_FAILURES - 1 {
            assert!(health.failed(io::Error::from(io::ErrorKind::Other)).is_ok());
        }
        health.ok();
        for _ in 0..MAX_FORWARD_FAILURES - 1 {
            assert!(health.failed(io::Error::from(io::ErrorKind::Other)).is_ok());
        }

        let result = health.failed(io::Error::from(io::ErrorKind::Other));

        assert!(matches!(
            result,
            Err(TapLoopError::Forwarder { failures, .. }) if failures == MAX_FORWARD_FAILURES
        ));
    }

    #[test]
    fn test_access_revoked_only_when_no_device_remains() {
        let denied = [io::ErrorKind::PermissionDenied, io::ErrorKind::PermissionDenied];
        assert!(access_revoked(&denied, 0));
        assert!(!access_revoked(&denied, 1));
        assert!(!access_revoked(&[io::ErrorKind::PermissionDenied, io::ErrorKind::Other], 0));
        assert!(!access_revoked(&[], 0));
    }

    #[test]
    fn test_scan_hands_over_each_node_once() {
        // Arrange
        let mx = PathBuf::from("/dev/input/event5");
        let da = PathBuf::from("/dev/input/event7");
        let mut state = ScanState::seeded([&mx]);

        // Act
        let first = state.diff(vec![
            (mx.clone(), (), DeviceId::from("046d:c52b:MX")),
            (da.clone(), (), DeviceId::from("1532:0084@usb-1")),
        ]);
        let second = state.diff(vec![(da.clone(), (), DeviceId::from("1532:0084@usb-1"))]);

        // Assert
        assert_eq!(first.len(), 2);
        assert!(first[0].device.is_none(), "already grabbed at start");
        assert!(first[1].device.is_some(), "newly plugged");
        assert_eq!(second.len(), 1);
        assert!(second[0].device.is_none());
        assert_eq!(second[0].node, da);
    }

    #[test]
    fn test_scan_treats_replugged_node_as_new() {
        let node = PathBuf::from("/dev/input/event5");
        let id = DeviceId::from("046d:c52b:MX");
        let mut state = ScanState::seeded([&node]);

        state.diff::<()>(vec![]);
        let back = state.diff(vec![(node.clone(), (), id.clone())]);

        assert!(back[0].device.is_some());
        assert_eq!(back[0].id, id);
    }

    #[test]
    fn test_forwarder_advertises_all_mouse_buttons_without_devices() {
        let keys = forwarder_keys(&[]);

        for code in (BTN_MOUSE_FIRST..=BTN_TASK).chain(BTN_MISC_FIRST..=BTN_MISC_LAST) {
            assert!(keys.contains(Key::new(code)), "missing {code:#x}");
        }
    }
}
