//! evdev `BTN_*` code to [`SourceButton`] translation table for Linux.
//!
//! Codes are defined in `linux/input-event-codes.h`.
//!
//! # Side buttons on Linux (for beginners)
//!
//! The kernel has two naming schemes for the thumb buttons.  Most mice report
//! them as `BTN_SIDE` (back) and `BTN_EXTRA` (forward), but some report
//! `BTN_BACK` and `BTN_FORWARD` instead.  Both spellings are accepted on
//! input; on output the engine always emits `BTN_SIDE`/`BTN_EXTRA`, which is
//! what browsers and file managers listen for.

use crate::domain::button::SourceButton;

pub const BTN_LEFT: u16 = 0x110;
pub const BTN_RIGHT: u16 = 0x111;
pub const BTN_MIDDLE: u16 = 0x112;
pub const BTN_SIDE: u16 = 0x113;
pub const BTN_EXTRA: u16 = 0x114;
pub const BTN_FORWARD: u16 = 0x115;
pub const BTN_BACK: u16 = 0x116;

/// The codes the engine's virtual pointer must advertise.
pub const EMITTED_CODES: [u16; SourceButton::COUNT] =
    [BTN_LEFT, BTN_RIGHT, BTN_MIDDLE, BTN_SIDE, BTN_EXTRA];

/// Translates an evdev key code to a [`SourceButton`].
///
/// Returns `None` for codes that are not one of the five remappable buttons
/// (keyboard keys, `BTN_TASK`, touch codes, …).
pub fn evdev_to_button(code: u16) -> Option<SourceButton> {
    match code {
        BTN_LEFT => Some(SourceButton::Left),
        BTN_RIGHT => Some(SourceButton::Right),
        BTN_MIDDLE => Some(SourceButton::Middle),
        BTN_SIDE | BTN_BACK => Some(SourceButton::Button4),
        BTN_EXTRA | BTN_FORWARD => Some(SourceButton::Button5),
        _ => None,
    }
}

/// Translates a [`SourceButton`] to the evdev code the engine emits for it.
pub fn button_to_evdev(button: SourceButton) -> u16 {
    EMITTED_CODES[button.index()]
}
