//! Mock event tap for unit and integration testing.
//!
//! Allows tests to inject [`ButtonEvent`]s as if they came from hardware,
//! without an evdev grab or any OS hook.  Injection runs the handler on the
//! caller's thread and returns its verdict, so assertions can check exactly
//! what would have happened to each original event.
//!
//! The tap can be configured to deny permission or to fail creation, and a
//! running session can be killed with [`MockEventTap::fail_session`] to
//! simulate the OS revoking the hook.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use editmouse_core::ButtonEvent;

use super::dispatch;
use crate::application::capture::{EventTap, PermissionStatus, TapBackend, TapError, TapSession};
use crate::application::remap_engine::{TapHandler, TapVerdict};

type HandlerSlot = Arc<Mutex<Option<Arc<dyn TapHandler>>>>;

/// A mock implementation of [`EventTap`].
pub struct MockEventTap {
    handler: HandlerSlot,
    alive: Arc<AtomicBool>,
    deny_permission: AtomicBool,
    fail_creation: AtomicBool,
    starts: AtomicUsize,
    delivered: Arc<AtomicUsize>,
}

impl MockEventTap {
    /// Creates a tap that grants permission and starts successfully.
    pub fn new() -> Self {
        Self {
            handler: Arc::new(Mutex::new(None)),
            alive: Arc::new(AtomicBool::new(false)),
            deny_permission: AtomicBool::new(false),
            fail_creation: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            delivered: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a tap whose `start` fails with [`TapError::PermissionDenied`].
    pub fn denying_permission() -> Self {
        let tap = Self::new();
        tap.deny_permission.store(true, Ordering::SeqCst);
        tap
    }

    /// Creates a tap whose `start` fails with [`TapError::Creation`].
    pub fn failing_creation() -> Self {
        let tap = Self::new();
        tap.fail_creation.store(true, Ordering::SeqCst);
        tap
    }

    pub fn set_permission_denied(&self, denied: bool) {
        self.deny_permission.store(denied, Ordering::SeqCst);
    }

    /// Delivers `event` to the running session's handler.
    ///
    /// Returns `None` when no session is running (the event would reach
    /// applications untouched), otherwise the handler's verdict.
    pub fn inject(&self, event: &ButtonEvent) -> Option<TapVerdict> {
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()?;
        if !event.synthetic {
            self.delivered.fetch_add(1, Ordering::SeqCst);
        }
        Some(dispatch(handler.as_ref(), event))
    }

    /// Kills the running session as if the OS had removed the hook.
    pub fn fail_session(&self) {
        self.handler.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Returns `true` while a session is running.
    pub fn is_active(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Number of successful `start` calls.
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of non-synthetic events handed to the handler.
    pub fn delivered_count(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

impl Default for MockEventTap {
    fn default() -> Self {
        Self::new()
    }
}

impl EventTap for MockEventTap {
    fn permission_status(&self) -> PermissionStatus {
        if self.deny_permission.load(Ordering::SeqCst) {
            PermissionStatus::Denied
        } else {
            PermissionStatus::Granted
        }
    }

    fn start(&self, handler: Arc<dyn TapHandler>) -> Result<TapSession, TapError> {
        if self.deny_permission.load(Ordering::SeqCst) {
            return Err(TapError::PermissionDenied("mock permission denied".into()));
        }
        if self.fail_creation.load(Ordering::SeqCst) {
            return Err(TapError::Creation("mock creation failure".into()));
        }
        *self.handler.lock().unwrap_or_else(|e| e.into_inner()) = Some(handler);
        self.alive.store(true, Ordering::SeqCst);
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(TapSession::new(Box::new(MockTapBackend {
            handler: Arc::clone(&self.handler),
            alive: Arc::clone(&self.alive),
        })))
    }
}

struct MockTapBackend {
    handler: HandlerSlot,
    alive: Arc<AtomicBool>,
}

impl TapBackend for MockTapBackend {
    fn stop(&mut self) {
        self.handler.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.alive.store(false, Ordering::SeqCst);
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}
