//! Key event dumping for `--dump`

use evdev::Key;

use crate::event::{InputEvent, KeyState};

/// One line describing a key event, or `None` for anything else.
pub fn describe(event: &InputEvent) -> Option<String> {
    let state = match event.key_state()? {
        KeyState::Press => "pressed",
        KeyState::Repeat => "autorepeat",
        KeyState::Release => "released",
    };

    Some(format!(
        "Key {} ({:?}) {}",
        event.code,
        Key::new(event.code),
        state
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_key_states() {
        let pressed = describe(&InputEvent::key(30, KeyState::Press)).unwrap();
        assert!(pressed.starts_with("Key 30 ("));
        assert!(pressed.ends_with(") pressed"));
        assert!(pressed.contains("KEY_A"));

        let repeat = describe(&InputEvent::key(30, KeyState::Repeat)).unwrap();
        assert!(repeat.ends_with(") autorepeat"));

        let released = describe(&InputEvent::key(58, KeyState::Release)).unwrap();
        assert!(released.starts_with("Key 58 ("));
        assert!(released.ends_with(") released"));
    }

    #[test]
    fn test_describe_ignores_other_events() {
        assert_eq!(describe(&InputEvent::sync()), None);

        let odd = InputEvent {
            value: 5,
            ..InputEvent::key(30, KeyState::Press)
        };
        assert_eq!(describe(&odd), None);
    }
}
