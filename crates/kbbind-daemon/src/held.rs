//! Held-key tracking

use kbbind_config::KeyId;

/// The keys currently held down, in the order they were pressed.
///
/// A key appears at most once. Releasing a key drops it together with every
/// key pressed after it, since a combination is identified by its complete
/// press order and anything pressed later belongs to the broken combination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeldKeys {
    keys: Vec<KeyId>,
}

impl HeldKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a press. Returns `false` if the key was already held, in
    /// which case the sequence is left unchanged.
    pub fn press(&mut self, key: KeyId) -> bool {
        if self.keys.contains(&key) {
            return false;
        }
        self.keys.push(key);
        true
    }

    /// Record a release, truncating the sequence at the key's position.
    /// Returns `false` if the key was not held.
    pub fn release(&mut self, key: KeyId) -> bool {
        match self.keys.iter().position(|&k| k == key) {
            Some(index) => {
                self.keys.truncate(index);
                true
            }
            None => false,
        }
    }

    pub fn as_slice(&self) -> &[KeyId] {
        &self.keys
    }

    pub fn contains(&self, key: KeyId) -> bool {
        self.keys.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_appends_in_order() {
        let mut held = HeldKeys::new();
        assert!(held.press(29));
        assert!(held.press(56));
        assert!(held.press(20));
        assert_eq!(held.as_slice(), &[29, 56, 20]);
    }

    #[test]
    fn test_press_ignores_already_held_key() {
        let mut held = HeldKeys::new();
        held.press(29);
        held.press(56);

        assert!(!held.press(29));
        assert_eq!(held.as_slice(), &[29, 56]);
    }

    #[test]
    fn test_release_last_key() {
        let mut held = HeldKeys::new();
        held.press(29);
        held.press(46);

        assert!(held.release(46));
        assert_eq!(held.as_slice(), &[29]);
    }

    #[test]
    fn test_release_truncates_later_keys() {
        let mut held = HeldKeys::new();
        for key in [1, 2, 3, 4] {
            held.press(key);
        }

        assert!(held.release(2));
        assert_eq!(held.as_slice(), &[1], "keys pressed after 2 must be dropped too");
        assert!(!held.contains(3));
        assert!(!held.contains(4));
    }

    #[test]
    fn test_release_unknown_key_is_noop() {
        let mut held = HeldKeys::new();
        held.press(1);

        assert!(!held.release(9));
        assert_eq!(held.as_slice(), &[1]);
    }

    #[test]
    fn test_release_first_key_empties() {
        let mut held = HeldKeys::new();
        held.press(1);
        held.press(2);

        held.release(1);
        assert!(held.is_empty());
        assert_eq!(held.len(), 0);
    }
}
