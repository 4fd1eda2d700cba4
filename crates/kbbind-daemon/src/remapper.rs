//! Key combination remapping
//!
//! # State
//!
//! The only state is [`HeldKeys`]: the keys currently down, in press order.
//! That sequence is the lookup key into both rule tables, so a rule matches
//! only when its trigger equals the complete held sequence.
//!
//! # Transitions
//!
//! ```text
//!  Press(k)    1. if held matches a multi-key output, release that output (reverse order)
//!              2. held.push(k)
//!              3. exec rule for held?  -> launch it
//!              4. remap rule for held? -> press output (forward order)
//!
//!  Repeat(k)   1. exec rule for held?  -> launch it again
//!              2. remap rule for held? -> repeat the last output key
//!
//!  Release(k)  1. remap rule for held? -> release output (reverse order)
//!              2. truncate held at k
//! ```
//!
//! A single-key output always carries the incoming state through unchanged.
//! An empty output (a drop rule) emits nothing. When nothing matches the
//! original event is forwarded, unless there are no remap rules at all or
//! sink mode is on, in which case it is swallowed.
//!
//! Step 1 of a press releases a multi-key output even when the new key goes
//! on to match another rule. Without it, releasing one trigger key after
//! pressing a further key would leave the output keys stuck down.

use kbbind_config::{KeyCombo, RuleTables};

use crate::event::{InputEvent, KeyState};
use crate::held::HeldKeys;

/// Something the event loop must do as a result of one input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Write this event to the virtual keyboard
    Emit(InputEvent),
    /// Launch this command without waiting for it
    Launch(String),
}

/// Remapper handles translating input events according to the rule tables
#[derive(Debug)]
pub struct Remapper {
    rules: RuleTables,
    held: HeldKeys,
    /// Swallow keys that match no rule instead of forwarding them
    sink_mode: bool,
}

impl Remapper {
    pub fn new(rules: RuleTables, sink_mode: bool) -> Self {
        Self {
            rules,
            held: HeldKeys::new(),
            sink_mode,
        }
    }

    /// The keys currently held, in press order.
    pub fn held(&self) -> &HeldKeys {
        &self.held
    }

    /// Whether an event matching no rule is forwarded as-is.
    fn passes_through(&self) -> bool {
        self.rules.has_remaps() && !self.sink_mode
    }

    /// Process an input event, returning the effects it produces in order.
    ///
    /// Anything other than a key press, release or repeat is ignored and
    /// leaves the held keys untouched.
    pub fn process(&mut self, event: InputEvent) -> Vec<Effect> {
        let Some(state) = event.key_state() else {
            return Vec::new();
        };

        let mut effects = Vec::new();

        match state {
            KeyState::Press => {
                self.release_active_output(&event, &mut effects);
                if !self.held.press(event.code) {
                    tracing::debug!("Key {} pressed while already held", event.code);
                }
                self.launch_bound_command(&mut effects);
                self.forward(&event, state, &mut effects);
            }
            KeyState::Repeat => {
                self.launch_bound_command(&mut effects);
                self.forward(&event, state, &mut effects);
            }
            KeyState::Release => {
                self.forward(&event, state, &mut effects);
                self.held.release(event.code);
            }
        }

        tracing::trace!(
            code = event.code,
            ?state,
            held = ?self.held.as_slice(),
            effects = effects.len(),
            "Processed key event"
        );

        effects
    }

    /// Release the keys of a multi-key output that the held keys currently match.
    fn release_active_output(&self, event: &InputEvent, effects: &mut Vec<Effect>) {
        if let Some(output) = self.rules.remap(self.held.as_slice()) {
            if output.len() > 1 {
                push_keys_reversed(output, event, KeyState::Release, effects);
            }
        }
    }

    fn launch_bound_command(&self, effects: &mut Vec<Effect>) {
        if let Some(command) = self.rules.exec(self.held.as_slice()) {
            effects.push(Effect::Launch(command.to_string()));
        }
    }

    /// Emit whatever the remap table says for the current held keys.
    fn forward(&self, event: &InputEvent, state: KeyState, effects: &mut Vec<Effect>) {
        let Some(output) = self.rules.remap(self.held.as_slice()) else {
            if self.passes_through() {
                effects.push(Effect::Emit(*event));
            }
            return;
        };

        if output.len() == 1 {
            effects.push(Effect::Emit(event.with_key(output.keys()[0], state)));
            return;
        }

        match state {
            KeyState::Press => {
                for &key in output.keys() {
                    effects.push(Effect::Emit(event.with_key(key, KeyState::Press)));
                }
            }
            KeyState::Repeat => {
                if let Some(key) = output.last() {
                    effects.push(Effect::Emit(event.with_key(key, KeyState::Repeat)));
                }
            }
            KeyState::Release => {
                push_keys_reversed(output, event, KeyState::Release, effects);
            }
        }
    }
}

fn push_keys_reversed(
    output: &KeyCombo,
    event: &InputEvent,
    state: KeyState,
    effects: &mut Vec<Effect>,
) {
    for &key in output.keys().iter().rev() {
        effects.push(Effect::Emit(event.with_key(key, state)));
    }
}
