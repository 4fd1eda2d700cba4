//! Rule data model

use std::borrow::Borrow;
use std::fmt;

use miette::SourceSpan;

/// Numeric code of a physical key, as carried in the `code` field of an input event.
pub type KeyId = u16;

/// Highest key code the kernel defines.
pub const KEY_MAX: KeyId = 0x2ff;

/// Separator between the keys of a combination specification (`29+46`).
pub const COMBO_SEPARATOR: char = '+';

/// An ordered sequence of keys.
///
/// Order is significant: a combo describes the order in which keys were
/// pressed (when used as a trigger) or the order in which they are pressed
/// on output. `[29, 46]` and `[46, 29]` are different combos.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCombo(Vec<KeyId>);

impl KeyCombo {
    /// Create an empty combo (the output of a `drop` rule).
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn keys(&self) -> &[KeyId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The last key of the combo, which is the one autorepeat applies to.
    pub fn last(&self) -> Option<KeyId> {
        self.0.last().copied()
    }

    pub fn push(&mut self, key: KeyId) {
        self.0.push(key);
    }

    /// Splice another combo onto the end of this one.
    pub fn extend_from(&mut self, other: &KeyCombo) {
        self.0.extend_from_slice(&other.0);
    }
}

impl From<Vec<KeyId>> for KeyCombo {
    fn from(keys: Vec<KeyId>) -> Self {
        Self(keys)
    }
}

impl<const N: usize> From<[KeyId; N]> for KeyCombo {
    fn from(keys: [KeyId; N]) -> Self {
        Self(keys.to_vec())
    }
}

impl FromIterator<KeyId> for KeyCombo {
    fn from_iter<I: IntoIterator<Item = KeyId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl AsRef<[KeyId]> for KeyCombo {
    fn as_ref(&self) -> &[KeyId] {
        &self.0
    }
}

// Lets the rule tables be queried with the held-key slice directly.
impl Borrow<[KeyId]> for KeyCombo {
    fn borrow(&self) -> &[KeyId] {
        &self.0
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(none)");
        }

        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", COMBO_SEPARATOR)?;
            }
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

/// A single configuration directive, already split into its arguments.
///
/// Key specifications are kept as raw strings; they are resolved against the
/// alias table by the rule compiler at the point the directive is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `alias <name> <spec>`
    DefineAlias { name: String, spec: String },
    /// `map <trigger> <output>`
    MapCombo { trigger: String, output: String },
    /// `drop <trigger>`
    DropCombo { trigger: String },
    /// `exec <trigger> <command>`
    ExecCombo { trigger: String, command: String },
}

impl Directive {
    /// The keyword this directive is written with.
    pub fn keyword(&self) -> &'static str {
        match self {
            Directive::DefineAlias { .. } => "alias",
            Directive::MapCombo { .. } => "map",
            Directive::DropCombo { .. } => "drop",
            Directive::ExecCombo { .. } => "exec",
        }
    }
}

/// A value tagged with the configuration line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located<T> {
    /// 1-based line number
    pub line: usize,
    /// Byte span of the line in the source text
    pub span: SourceSpan,
    pub item: T,
}

impl<T> Located<T> {
    /// Tag a value with a line number only, for directives that did not come from a file.
    pub fn new(line: usize, item: T) -> Self {
        Self {
            line,
            span: SourceSpan::from((0, 0)),
            item,
        }
    }

    pub fn with_span(line: usize, span: SourceSpan, item: T) -> Self {
        Self { line, span, item }
    }
}
