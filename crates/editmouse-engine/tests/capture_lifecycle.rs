//! Integration tests for the capture lifecycle.
//!
//! Covers the permission-denied mode, tap failure, the re-entrancy guard
//! against the engine's own injected events, and handler panic containment.

mod common;

use std::sync::Arc;

use common::{id_of, mx_master, physical, Harness};
use editmouse_core::{ButtonEvent, ButtonPhase, DeviceMapping, SourceButton, TargetAction};
use editmouse_engine::application::capture::{CaptureState, EventTap, PermissionStatus, TapError};
use editmouse_engine::application::remap_engine::{TapHandler, TapVerdict};
use editmouse_engine::infrastructure::event_tap::mock::MockEventTap;
use tokio_test::{assert_err, assert_ok};

fn swap_middle_right() -> DeviceMapping {
    DeviceMapping::identity()
        .with(SourceButton::Middle, TargetAction::Button(SourceButton::Right))
        .with(SourceButton::Right, TargetAction::Button(SourceButton::Middle))
}

// ── Permission-denied mode ────────────────────────────────────────────────────

#[test]
fn test_permission_denied_leaves_engine_inactive_and_input_untouched() {
    // Arrange
    let harness = Harness::with_tap(vec![mx_master()], MockEventTap::denying_permission());
    harness.state.registry.rescan().unwrap();
    let mx = id_of(&mx_master());
    harness.map(&mx, swap_middle_right());

    // Act
    let err = assert_err!(harness.state.capture.start());
    let verdicts = harness.click(&mx, SourceButton::Middle);

    // Assert
    assert!(matches!(err, TapError::PermissionDenied(_)));
    assert_eq!(harness.state.capture.state(), CaptureState::Inactive);
    assert_eq!(harness.state.capture.permission_status(), PermissionStatus::Denied);
    assert_eq!(verdicts, (None, None));
    assert_eq!(harness.synth.count(), 0);
}

#[test]
fn test_capture_starts_once_permission_is_granted() {
    let harness = Harness::with_tap(vec![mx_master()], MockEventTap::denying_permission());
    harness.state.registry.rescan().unwrap();
    assert!(!harness.state.start_capture().success);

    harness.tap.set_permission_denied(false);
    let status = harness.state.start_capture();

    assert!(status.success);
    assert_eq!(status.data.unwrap().state, CaptureState::Passthrough);
}

#[test]
fn test_creation_failure_leaves_engine_inactive() {
    let harness = Harness::with_tap(vec![mx_master()], MockEventTap::failing_creation());

    let err = assert_err!(harness.state.capture.start());

    assert!(matches!(err, TapError::Creation(_)));
    assert_eq!(harness.state.capture.state(), CaptureState::Inactive);
    assert_eq!(harness.state.capture.session_id(), None);
}

// ── Session lifecycle ─────────────────────────────────────────────────────────

#[test]
fn test_start_is_idempotent() {
    let harness = Harness::running(vec![mx_master()]);
    let first = harness.state.capture.session_id();

    assert_ok!(harness.state.capture.start());

    assert_eq!(harness.tap.start_count(), 1);
    assert_eq!(harness.state.capture.session_id(), first);
}

#[test]
fn test_mapping_changes_switch_state_without_restarting_tap() {
    // Arrange
    let harness = Harness::running(vec![mx_master()]);
    let mx = id_of(&mx_master());
    let session = harness.state.capture.session_id();

    // Act
    let before = harness.state.capture.refresh_state();
    harness.map(&mx, swap_middle_right());
    let during = harness.state.capture.refresh_state();
    harness.map(&mx, DeviceMapping::identity());
    let after = harness.state.capture.refresh_state();

    // Assert
    assert_eq!(before, CaptureState::Passthrough);
    assert_eq!(during, CaptureState::Remapping);
    assert_eq!(after, CaptureState::Passthrough);
    assert_eq!(harness.tap.start_count(), 1);
    assert_eq!(harness.state.capture.session_id(), session);
}

#[test]
fn test_mapping_for_absent_device_does_not_count_as_remapping() {
    let harness = Harness::running(vec![mx_master()]);
    let absent = id_of(&common::deathadder());

    harness.map(&absent, swap_middle_right());

    assert_eq!(harness.state.capture.state(), CaptureState::Passthrough);
}

#[test]
fn test_dead_session_reports_inactive_and_can_restart() {
    // Arrange
    let harness = Harness::running(vec![mx_master()]);
    let first = harness.state.capture.session_id();

    // Act
    harness.tap.fail_session();
    let dead = harness.state.capture.state();
    let restarted = assert_ok!(harness.state.capture.start());

    // Assert
    assert_eq!(dead, CaptureState::Inactive);
    assert_eq!(restarted, CaptureState::Passthrough);
    assert_eq!(harness.tap.start_count(), 2);
    assert_ne!(harness.state.capture.session_id(), first);
}

#[test]
fn test_no_events_are_delivered_after_stop() {
    let harness = Harness::running(vec![mx_master()]);
    let mx = id_of(&mx_master());
    harness.map(&mx, swap_middle_right());

    harness.state.capture.stop();

    assert_eq!(harness.press(&mx, SourceButton::Middle, ButtonPhase::Down), None);
    assert_eq!(harness.state.capture.state(), CaptureState::Inactive);
    assert!(!harness.tap.is_active());
    assert_eq!(harness.synth.count(), 0);
}

// ── Re-entrancy guard ─────────────────────────────────────────────────────────

#[test]
fn test_synthetic_events_never_reach_the_engine() {
    // Arrange: Middle and Right swapped, so a re-entered replacement would
    // bounce back and forth forever.
    let harness = Harness::running(vec![mx_master()]);
    let mx = id_of(&mx_master());
    harness.map(&mx, swap_middle_right());

    // Act
    harness.press(&mx, SourceButton::Middle, ButtonPhase::Down);
    let replacement = harness.synth.emitted()[0].clone();
    let echoed = physical(&mx, replacement.button, replacement.phase)
        .synthesized_as(replacement.button);
    let verdict = harness.tap.inject(&echoed);

    // Assert
    assert_eq!(verdict, Some(TapVerdict::PassThrough));
    assert_eq!(harness.synth.count(), 1);
    assert_eq!(harness.tap.delivered_count(), 1);
}

// ── Panic containment ─────────────────────────────────────────────────────────

struct ExplodingHandler;

impl TapHandler for ExplodingHandler {
    fn handle(&self, event: &ButtonEvent) -> TapVerdict {
        if event.button == SourceButton::Button5 {
            panic!("handler bug");
        }
        TapVerdict::Consume
    }
}

#[test]
fn test_handler_panic_degrades_to_passthrough_and_tap_survives() {
    // Arrange
    let tap = MockEventTap::new();
    let session = tap.start(Arc::new(ExplodingHandler)).unwrap();
    let mx = id_of(&mx_master());

    // Act
    let panicked = tap.inject(&physical(&mx, SourceButton::Button5, ButtonPhase::Down));
    let next = tap.inject(&physical(&mx, SourceButton::Left, ButtonPhase::Down));

    // Assert
    assert_eq!(panicked, Some(TapVerdict::PassThrough));
    assert_eq!(next, Some(TapVerdict::Consume));
    assert!(session.is_alive());
}
