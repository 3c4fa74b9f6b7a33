//! Event tap implementations.
//!
//! On Linux the tap takes an exclusive evdev grab of every pointing device on
//! a dedicated thread and re-emits whatever the engine lets through via a
//! uinput forwarder.  Other platforms get [`UnsupportedEventTap`].
//!
//! # The tap boundary
//!
//! Every backend hands events to the engine through [`dispatch`], which
//!
//! - drops synthetic events before the engine ever sees them, and
//! - catches a panic inside the handler so that one bad event degrades to
//!   passthrough instead of tearing down the OS input path.
//!
//! # Testability
//!
//! [`mock::MockEventTap`] delivers injected events synchronously on the
//! caller's thread and returns the verdict.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use editmouse_core::ButtonEvent;
use tracing::error;

use crate::application::capture::{EventTap, PermissionStatus, TapError, TapSession};
use crate::application::remap_engine::{TapHandler, TapVerdict};

pub mod mock;

#[cfg(target_os = "linux")]
pub mod linux;

/// Hands one event to `handler`, containing panics and filtering synthetic events.
pub fn dispatch(handler: &dyn TapHandler, event: &ButtonEvent) -> TapVerdict {
    if event.synthetic {
        return TapVerdict::PassThrough;
    }
    match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
        Ok(verdict) => verdict,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(
                device = %event.device_id,
                button = %event.button,
                "tap handler panicked, passing event through: {message}"
            );
            TapVerdict::PassThrough
        }
    }
}

/// Tap for platforms without a backend; never grants a session.
#[derive(Debug, Default)]
pub struct UnsupportedEventTap;

impl EventTap for UnsupportedEventTap {
    fn permission_status(&self) -> PermissionStatus {
        PermissionStatus::Unknown
    }

    fn start(&self, _handler: Arc<dyn TapHandler>) -> Result<TapSession, TapError> {
        Err(TapError::Creation(format!(
            "no event tap backend for {}",
            std::env::consts::OS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use editmouse_core::{ButtonPhase, DeviceId, Location, SourceButton, Timestamp};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct PanickingHandler;

    impl TapHandler for PanickingHandler {
        fn handle(&self, _event: &ButtonEvent) -> TapVerdict {
            panic!("boom");
        }
    }

    #[derive(Default)]
    struct CountingHandler {
        calls: AtomicUsize,
    }

    impl TapHandler for CountingHandler {
        fn handle(&self, _event: &ButtonEvent) -> TapVerdict {
            self.calls.fetch_add(1, Ordering::SeqCst);
            TapVerdict::Consume
        }
    }

    fn press() -> ButtonEvent {
        ButtonEvent::physical(
            DeviceId::from("046d:c52b:A"),
            SourceButton::Left,
            ButtonPhase::Down,
            Timestamp(1),
            Location::default(),
        )
    }

    #[test]
    fn test_dispatch_contains_handler_panic() {
        assert_eq!(dispatch(&PanickingHandler, &press()), TapVerdict::PassThrough);
    }

    #[test]
    fn test_dispatch_skips_synthetic_events() {
        let handler = CountingHandler::default();

        let verdict = dispatch(&handler, &press().synthesized_as(SourceButton::Right));

        assert_eq!(verdict, TapVerdict::PassThrough);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dispatch_returns_handler_verdict() {
        let handler = CountingHandler::default();
        assert_eq!(dispatch(&handler, &press()), TapVerdict::Consume);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsupported_tap_never_starts() {
        let tap = UnsupportedEventTap;
        let result = tap.start(Arc::new(CountingHandler::default()));
        assert!(matches!(result, Err(TapError::Creation(_))));
        assert_eq!(tap.permission_status(), PermissionStatus::Unknown);
    }
}
