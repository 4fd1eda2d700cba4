//! Named key combinations

use std::collections::HashMap;

use crate::model::KeyCombo;

/// Maps alias names to the key combinations they stand for.
///
/// Only consulted while rules are being compiled. Aliases are expanded in
/// place, so redefining one later never changes rules compiled before it.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    aliases: HashMap<String, KeyCombo>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `combo`, returning the binding it replaced, if any.
    pub fn define(&mut self, name: impl Into<String>, combo: KeyCombo) -> Option<KeyCombo> {
        self.aliases.insert(name.into(), combo)
    }

    /// Look up the current binding of `name`.
    pub fn resolve(&self, name: &str) -> Option<&KeyCombo> {
        self.aliases.get(name)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Iterate over all bindings in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyCombo)> {
        self.aliases.iter().map(|(name, combo)| (name.as_str(), combo))
    }
}
