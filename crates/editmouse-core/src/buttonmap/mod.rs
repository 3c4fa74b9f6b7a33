//! Button code translation tables.
//!
//! The canonical representation is [`SourceButton`].  Platform codes are
//! translated to/from it at the tap and synthesizer boundaries.

pub mod linux_evdev;

use crate::domain::button::SourceButton;

/// Unified button mapper providing all translation directions.
pub struct ButtonMapper;

impl ButtonMapper {
    /// Translates a Linux evdev key code to a [`SourceButton`].
    ///
    /// Returns `None` if `code` is not a remappable mouse button.
    pub fn evdev_to_button(code: u16) -> Option<SourceButton> {
        linux_evdev::evdev_to_button(code)
    }

    /// Translates a [`SourceButton`] to the Linux evdev key code to emit.
    pub fn button_to_evdev(button: SourceButton) -> u16 {
        linux_evdev::button_to_evdev(button)
    }

    /// Returns `true` if `code` is one of the remappable buttons.
    pub fn is_remappable_evdev(code: u16) -> bool {
        Self::evdev_to_button(code).is_some()
    }
}
