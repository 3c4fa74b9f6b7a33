//! Capture controller: owns the single event-tap session.
//!
//! # Capture states
//!
//! ```text
//!              start() ok
//!   Inactive ──────────────►  Passthrough  ◄──── mapping updates ────►  Remapping
//!      ▲                           │                                        │
//!      └──── stop() / tap failure / permission loss ────────────────────────┘
//! ```
//!
//! - `Inactive`: no session; every event reaches applications untouched
//!   because nothing intercepts it.
//! - `Passthrough`: the tap runs but no connected device has a non-identity
//!   mapping, so every event is handed straight back.
//! - `Remapping`: the tap runs and at least one connected device remaps.
//!
//! Moving between `Passthrough` and `Remapping` never restarts the tap; the
//! state is derived from the mapping snapshot and the engine's device set.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::remap_engine::{RemapEngine, TapHandler};

/// Error type for starting an event tap.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TapError {
    /// The OS refused to let this process intercept input.
    #[error("permission to intercept input denied: {0}")]
    PermissionDenied(String),

    /// Interception was permitted but the hook could not be created.
    #[error("failed to create event tap: {0}")]
    Creation(String),
}

/// Whether the process may intercept and inject input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Unknown,
}

/// The engine's capture state, derived on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    Inactive,
    Passthrough,
    Remapping,
}

impl CaptureState {
    fn encode(self) -> u8 {
        match self {
            CaptureState::Inactive => 0,
            CaptureState::Passthrough => 1,
            CaptureState::Remapping => 2,
        }
    }

    fn decode(raw: u8) -> Self {
        match raw {
            1 => CaptureState::Passthrough,
            2 => CaptureState::Remapping,
            _ => CaptureState::Inactive,
        }
    }
}

/// OS-specific half of a running tap session.
pub trait TapBackend: Send {
    /// Releases the hook and joins the tap thread.  Idempotent.
    fn stop(&mut self);
    /// Returns `false` once the tap has died on its own (device loss, OS revoke).
    fn is_alive(&self) -> bool;
}

/// One active interception handle.
///
/// Dropping the session stops it; after [`TapSession::stop`] returns no
/// further events are delivered to the handler.
pub struct TapSession {
    id: Uuid,
    backend: Option<Box<dyn TapBackend>>,
}

impl TapSession {
    pub fn new(backend: Box<dyn TapBackend>) -> Self {
        Self {
            id: Uuid::new_v4(),
            backend: Some(backend),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.backend.as_ref().is_some_and(|b| b.is_alive())
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.stop();
            info!(session = %self.id, "tap session stopped");
        }
    }
}

impl Drop for TapSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TapSession")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// OS-level interception of button events.
pub trait EventTap: Send + Sync {
    /// Reports whether a session could be started, without starting one.
    fn permission_status(&self) -> PermissionStatus;

    /// Starts intercepting; every button event is handed to `handler` until
    /// the returned session is stopped.
    ///
    /// # Errors
    ///
    /// [`TapError::PermissionDenied`] if the OS refuses, [`TapError::Creation`]
    /// for any other failure.  No session exists after an error.
    fn start(&self, handler: Arc<dyn TapHandler>) -> Result<TapSession, TapError>;
}

/// Starts, stops, and reports on the engine's tap session.
pub struct CaptureController {
    tap: Arc<dyn EventTap>,
    engine: Arc<RemapEngine>,
    session: Mutex<Option<TapSession>>,
    last_state: AtomicU8,
}

impl CaptureController {
    pub fn new(tap: Arc<dyn EventTap>, engine: Arc<RemapEngine>) -> Self {
        Self {
            tap,
            engine,
            session: Mutex::new(None),
            last_state: AtomicU8::new(CaptureState::Inactive.encode()),
        }
    }

    /// Starts capture if it is not already running.
    ///
    /// # Errors
    ///
    /// Propagates [`TapError`]; the engine stays `Inactive` and nothing is retried.
    pub fn start(&self) -> Result<CaptureState, TapError> {
        {
            let mut guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
            match guard.as_ref() {
                Some(session) if session.is_alive() => {}
                _ => {
                    // Clear a dead session before replacing it.
                    guard.take();
                    let handler: Arc<dyn TapHandler> = self.engine.clone();
                    match self.tap.start(handler) {
                        Ok(session) => {
                            info!(session = %session.id(), "tap session started");
                            *guard = Some(session);
                        }
                        Err(e @ TapError::PermissionDenied(_)) => {
                            warn!("{e}; events pass through untouched");
                            return Err(e);
                        }
                        Err(e) => {
                            error!("{e}");
                            return Err(e);
                        }
                    }
                }
            }
        }
        Ok(self.refresh_state())
    }

    /// Stops capture.  No-op when already stopped.
    pub fn stop(&self) {
        let session = self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(session) = session {
            session.stop();
        }
        self.refresh_state();
    }

    /// The current capture state.
    pub fn state(&self) -> CaptureState {
        let running = self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(TapSession::is_alive);
        if !running {
            CaptureState::Inactive
        } else if self.engine.is_remapping() {
            CaptureState::Remapping
        } else {
            CaptureState::Passthrough
        }
    }

    /// Recomputes the state and logs a transition if it changed.
    pub fn refresh_state(&self) -> CaptureState {
        let state = self.state();
        let previous =
            CaptureState::decode(self.last_state.swap(state.encode(), Ordering::AcqRel));
        if previous != state {
            info!(from = ?previous, to = ?state, "capture state changed");
        }
        state
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(TapSession::id)
    }

    pub fn permission_status(&self) -> PermissionStatus {
        self.tap.permission_status()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
