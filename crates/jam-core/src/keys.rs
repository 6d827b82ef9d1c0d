//! Global keyboard affordances
//!
//! A pure key-to-action mapping so the host decides how keys arrive
//! (terminal input, window events) while the bindings stay in one place.
//! Keys are ignored while a text-entry field has focus.

use crate::transport::SEEK_STEP_SECONDS;

/// Keys the player binds globally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Space,
    ArrowLeft,
    ArrowRight,
}

impl Key {
    /// Parse a host key name ("space", "left", "right")
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "space" | " " => Some(Key::Space),
            "left" => Some(Key::ArrowLeft),
            "right" => Some(Key::ArrowRight),
            _ => None,
        }
    }
}

/// Transport action bound to a key
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyAction {
    TogglePlay,
    /// Relative seek in seconds (negative = backwards), clamped by the
    /// transport to [0, duration]
    SeekBy(f64),
}

/// Map a key press to a transport action
///
/// Returns None while text entry has focus so typing never drives the
/// transport.
pub fn action_for_key(key: Key, text_entry_focused: bool) -> Option<KeyAction> {
    if text_entry_focused {
        return None;
    }
    match key {
        Key::Space => Some(KeyAction::TogglePlay),
        Key::ArrowLeft => Some(KeyAction::SeekBy(-SEEK_STEP_SECONDS)),
        Key::ArrowRight => Some(KeyAction::SeekBy(SEEK_STEP_SECONDS)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings() {
        assert_eq!(action_for_key(Key::Space, false), Some(KeyAction::TogglePlay));
        assert_eq!(
            action_for_key(Key::ArrowLeft, false),
            Some(KeyAction::SeekBy(-5.0))
        );
        assert_eq!(
            action_for_key(Key::ArrowRight, false),
            Some(KeyAction::SeekBy(5.0))
        );
    }

    #[test]
    fn test_text_entry_suppresses_keys() {
        assert_eq!(action_for_key(Key::Space, true), None);
        assert_eq!(action_for_key(Key::ArrowLeft, true), None);
    }

    #[test]
    fn test_key_names() {
        assert_eq!(Key::from_name("space"), Some(Key::Space));
        assert_eq!(Key::from_name(" "), Some(Key::Space));
        assert_eq!(Key::from_name("left"), Some(Key::ArrowLeft));
        assert_eq!(Key::from_name("escape"), None);
    }
}
