//! Rule compilation
//!
//! Turns a sequence of [`Directive`]s into the two lookup tables the remapper
//! runs against:
//!
//! - the remap table, trigger combo -> output combo (an empty output drops the trigger)
//! - the exec table, trigger combo -> shell command
//!
//! Directives are applied in order. A rejected directive is recorded as a
//! [`LineError`] and compilation carries on with the next one, so a single
//! pass reports every problem in a file. Callers must refuse to run with a
//! table that produced errors.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::alias::AliasTable;
use crate::error::{LineError, RuleError};
use crate::model::{Directive, KeyCombo, KeyId, Located, COMBO_SEPARATOR};

/// The compiled, read-only rule tables.
#[derive(Debug, Clone, Default)]
pub struct RuleTables {
    remap: HashMap<KeyCombo, KeyCombo>,
    exec: HashMap<KeyCombo, String>,
}

impl RuleTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output combo registered for exactly this held-key sequence.
    pub fn remap(&self, held: &[KeyId]) -> Option<&KeyCombo> {
        self.remap.get(held)
    }

    /// Command registered for exactly this held-key sequence.
    pub fn exec(&self, held: &[KeyId]) -> Option<&str> {
        self.exec.get(held).map(String::as_str)
    }

    /// Whether any map or drop rule exists.
    ///
    /// With no remap rules nothing is ever forwarded, so the virtual output
    /// device is not needed at all.
    pub fn has_remaps(&self) -> bool {
        !self.remap.is_empty()
    }

    pub fn remap_count(&self) -> usize {
        self.remap.len()
    }

    pub fn exec_count(&self) -> usize {
        self.exec.len()
    }

    pub fn remaps(&self) -> impl Iterator<Item = (&KeyCombo, &KeyCombo)> {
        self.remap.iter()
    }

    pub fn execs(&self) -> impl Iterator<Item = (&KeyCombo, &str)> {
        self.exec.iter().map(|(trigger, command)| (trigger, command.as_str()))
    }

    /// Register a remap rule. The first rule for a trigger wins.
    pub fn insert_remap(&mut self, trigger: KeyCombo, output: KeyCombo) -> Result<(), RuleError> {
        match self.remap.entry(trigger) {
            Entry::Occupied(entry) => Err(RuleError::ConflictingRemap {
                trigger: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(output);
                Ok(())
            }
        }
    }

    /// Register an exec rule. The first rule for a trigger wins.
    pub fn insert_exec(&mut self, trigger: KeyCombo, command: String) -> Result<(), RuleError> {
        match self.exec.entry(trigger) {
            Entry::Occupied(entry) => Err(RuleError::ConflictingExec {
                trigger: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(command);
                Ok(())
            }
        }
    }
}

/// Parse a key specification such as `29+46` or `ctrl+46` into a combo.
///
/// Each `+`-separated token is looked up as an alias first and spliced in
/// fully expanded; otherwise it must be a decimal key code.
pub fn parse_combo(spec: &str, aliases: &AliasTable) -> Result<KeyCombo, RuleError> {
    if spec.is_empty() {
        return Err(RuleError::EmptyCombo);
    }

    let mut combo = KeyCombo::new();

    for token in spec.split(COMBO_SEPARATOR) {
        if let Some(expansion) = aliases.resolve(token) {
            combo.extend_from(expansion);
            continue;
        }

        match parse_key_id(token) {
            Some(key) => combo.push(key),
            None => {
                return Err(RuleError::InvalidKey {
                    spec: spec.to_string(),
                })
            }
        }
    }

    if combo.is_empty() {
        return Err(RuleError::EmptyCombo);
    }

    Ok(combo)
}

fn parse_key_id(token: &str) -> Option<KeyId> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// The result of compiling a rule set.
#[derive(Debug, Clone, Default)]
pub struct Compiled {
    pub tables: RuleTables,
    /// Aliases as they stood after the last directive
    pub aliases: AliasTable,
    /// Every rejected directive, in line order
    pub errors: Vec<LineError>,
}

impl Compiled {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Applies directives one at a time, accumulating tables and errors.
#[derive(Debug, Default)]
pub struct RuleCompiler {
    aliases: AliasTable,
    tables: RuleTables,
    errors: Vec<LineError>,
}

impl RuleCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one directive. Failures are recorded, never returned.
    pub fn apply(&mut self, directive: Located<Directive>) {
        let Located { line, span, item } = directive;
        let keyword = item.keyword();

        if let Err(error) = self.apply_directive(item) {
            tracing::debug!("Rejected {} directive on line {}: {}", keyword, line, error);
            self.errors.push(LineError::new(line, span, error));
        }
    }

    /// Record an error found before the directive reached the compiler.
    pub fn reject(&mut self, error: LineError) {
        self.errors.push(error);
    }

    fn apply_directive(&mut self, directive: Directive) -> Result<(), RuleError> {
        match directive {
            Directive::DefineAlias { name, spec } => {
                if name.is_empty() {
                    return Err(RuleError::MissingArguments);
                }
                if name.contains(COMBO_SEPARATOR) {
                    return Err(RuleError::AliasContainsSeparator { name });
                }

                let combo = parse_combo(&spec, &self.aliases)?;
                tracing::debug!("Defined alias: {} = {}", name, combo);
                self.aliases.define(name, combo);
            }
            Directive::MapCombo { trigger, output } => {
                let trigger = parse_combo(&trigger, &self.aliases)?;
                let output = parse_combo(&output, &self.aliases)?;
                tracing::debug!("Registered map: {} -> {}", trigger, output);
                self.tables.insert_remap(trigger, output)?;
            }
            Directive::DropCombo { trigger } => {
                let trigger = parse_combo(&trigger, &self.aliases)?;
                tracing::debug!("Registered drop: {}", trigger);
                self.tables.insert_remap(trigger, KeyCombo::new())?;
            }
            Directive::ExecCombo { trigger, command } => {
                if command.is_empty() {
                    return Err(RuleError::MissingArguments);
                }

                let trigger = parse_combo(&trigger, &self.aliases)?;
                tracing::debug!("Registered exec: {} -> {}", trigger, command);
                self.tables.insert_exec(trigger, command)?;
            }
        }

        Ok(())
    }

    pub fn finish(mut self) -> Compiled {
        self.errors.sort_by_key(|e| e.line);

        Compiled {
            tables: self.tables,
            aliases: self.aliases,
            errors: self.errors,
        }
    }
}

/// Compile a sequence of directives in order.
pub fn compile<I>(directives: I) -> Compiled
where
    I: IntoIterator<Item = Located<Directive>>,
{
    let mut compiler = RuleCompiler::new();
    for directive in directives {
        compiler.apply(directive);
    }
    compiler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(line: usize, trigger: &str, output: &str) -> Located<Directive> {
        Located::new(
            line,
            Directive::MapCombo {
                trigger: trigger.to_string(),
                output: output.to_string(),
            },
        )
    }

    fn drop_combo(line: usize, trigger: &str) -> Located<Directive> {
        Located::new(
            line,
            Directive::DropCombo {
                trigger: trigger.to_string(),
            },
        )
    }

    fn exec(line: usize, trigger: &str, command: &str) -> Located<Directive> {
        Located::new(
            line,
            Directive::ExecCombo {
                trigger: trigger.to_string(),
                command: command.to_string(),
            },
        )
    }

    fn alias(line: usize, name: &str, spec: &str) -> Located<Directive> {
        Located::new(
            line,
            Directive::DefineAlias {
                name: name.to_string(),
                spec: spec.to_string(),
            },
        )
    }

    // ========================================================================
    // Combo parsing
    // ========================================================================

    #[test]
    fn test_parse_combo_numeric() {
        let aliases = AliasTable::new();
        assert_eq!(parse_combo("30", &aliases), Ok(KeyCombo::from([30])));
        assert_eq!(parse_combo("29+56+111", &aliases), Ok(KeyCombo::from([29, 56, 111])));
    }

    #[test]
    fn test_parse_combo_preserves_order() {
        let aliases = AliasTable::new();
        let forward = parse_combo("29+46", &aliases).unwrap();
        let backward = parse_combo("46+29", &aliases).unwrap();
        assert_ne!(forward, backward, "combos are ordered sequences, not sets");
    }

    #[test]
    fn test_parse_combo_splices_alias_in_place() {
        let mut aliases = AliasTable::new();
        aliases.define("ctrlalt", KeyCombo::from([29, 56]));

        let combo = parse_combo("1+ctrlalt+111", &aliases).unwrap();
        assert_eq!(combo, KeyCombo::from([1, 29, 56, 111]));
    }

    #[test]
    fn test_parse_combo_invalid_tokens() {
        let aliases = AliasTable::new();

        for spec in ["a", "30+b", "-1", "3x", "70000", "30++31", "+30", "30+", " 30"] {
            assert_eq!(
                parse_combo(spec, &aliases),
                Err(RuleError::InvalidKey {
                    spec: spec.to_string()
                }),
                "'{}' should be rejected",
                spec
            );
        }
    }

    #[test]
    fn test_parse_combo_empty() {
        let aliases = AliasTable::new();
        assert_eq!(parse_combo("", &aliases), Err(RuleError::EmptyCombo));
    }

    #[test]
    fn test_parse_combo_max_key_code() {
        let aliases = AliasTable::new();
        assert_eq!(parse_combo("65535", &aliases), Ok(KeyCombo::from([65535])));
        assert_eq!(parse_combo("0", &aliases), Ok(KeyCombo::from([0])));
    }

    // ========================================================================
    // Compilation
    // ========================================================================

    #[test]
    fn test_compile_round_trip() {
        let compiled = compile(vec![
            map(1, "58", "1"),
            map(2, "29+46", "125+46"),
            drop_combo(3, "99"),
            exec(4, "29+56+20", "xterm -e top"),
            exec(5, "58", "notify-send caps"),
        ]);

        assert!(compiled.is_ok(), "unexpected errors: {:?}", compiled.errors);

        let tables = &compiled.tables;
        assert_eq!(tables.remap(&[58]), Some(&KeyCombo::from([1])));
        assert_eq!(tables.remap(&[29, 46]), Some(&KeyCombo::from([125, 46])));
        assert_eq!(tables.remap(&[99]), Some(&KeyCombo::new()));
        assert_eq!(tables.exec(&[29, 56, 20]), Some("xterm -e top"));
        assert_eq!(tables.exec(&[58]), Some("notify-send caps"));

        // No cross-contamination between the tables
        assert_eq!(tables.remap(&[29, 56, 20]), None);
        assert_eq!(tables.exec(&[29, 46]), None);
        assert_eq!(tables.exec(&[99]), None);

        assert_eq!(tables.remap_count(), 3);
        assert_eq!(tables.exec_count(), 2);
    }

    #[test]
    fn test_compile_lookup_requires_exact_sequence() {
        let compiled = compile(vec![map(1, "29+46", "47")]);
        let tables = &compiled.tables;

        assert!(tables.remap(&[29]).is_none(), "prefix must not match");
        assert!(tables.remap(&[46, 29]).is_none(), "different order must not match");
        assert!(tables.remap(&[29, 46, 30]).is_none(), "superset must not match");
        assert!(tables.remap(&[29, 46]).is_some());
    }

    #[test]
    fn test_compile_duplicate_map_keeps_first() {
        let compiled = compile(vec![map(1, "30", "31"), map(2, "30", "32")]);

        assert_eq!(compiled.tables.remap(&[30]), Some(&KeyCombo::from([31])));
        assert_eq!(compiled.errors.len(), 1);
        assert_eq!(compiled.errors[0].line, 2);
        assert_eq!(
            compiled.errors[0].error,
            RuleError::ConflictingRemap {
                trigger: KeyCombo::from([30])
            }
        );
    }

    #[test]
    fn test_compile_drop_conflicts_with_map() {
        let compiled = compile(vec![drop_combo(1, "30"), map(2, "30", "31")]);

        assert_eq!(compiled.tables.remap(&[30]), Some(&KeyCombo::new()), "drop registered first wins");
        assert!(matches!(
            compiled.errors[0].error,
            RuleError::ConflictingRemap { .. }
        ));
    }

    #[test]
    fn test_compile_duplicate_exec_keeps_first() {
        let compiled = compile(vec![exec(1, "30", "first"), exec(2, "30", "second")]);

        assert_eq!(compiled.tables.exec(&[30]), Some("first"));
        assert_eq!(compiled.errors.len(), 1);
        assert!(matches!(
            compiled.errors[0].error,
            RuleError::ConflictingExec { .. }
        ));
    }

    #[test]
    fn test_compile_map_and_exec_share_trigger() {
        let compiled = compile(vec![map(1, "30", "31"), exec(2, "30", "true")]);

        assert!(compiled.is_ok());
        assert_eq!(compiled.tables.remap(&[30]), Some(&KeyCombo::from([31])));
        assert_eq!(compiled.tables.exec(&[30]), Some("true"));
    }

    #[test]
    fn test_compile_continues_after_errors() {
        let compiled = compile(vec![
            map(1, "nope", "31"),
            map(2, "30", "31"),
            map(3, "32", ""),
            exec(4, "33", ""),
            map(5, "34", "35"),
        ]);

        assert_eq!(compiled.tables.remap_count(), 2, "valid lines are still loaded");
        let lines: Vec<usize> = compiled.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![1, 3, 4]);
        assert_eq!(compiled.errors[1].error, RuleError::EmptyCombo);
        assert_eq!(compiled.errors[2].error, RuleError::MissingArguments);
        assert!(!compiled.is_ok());
    }

    #[test]
    fn test_compile_alias_expansion() {
        let compiled = compile(vec![
            alias(1, "ctrl", "29"),
            alias(2, "copy", "ctrl+46"),
            map(3, "copy", "125+46"),
        ]);

        assert!(compiled.is_ok());
        assert_eq!(compiled.tables.remap(&[29, 46]), Some(&KeyCombo::from([125, 46])));
        assert_eq!(compiled.aliases.resolve("copy"), Some(&KeyCombo::from([29, 46])));
    }

    #[test]
    fn test_compile_alias_redefinition_is_not_retroactive() {
        let compiled = compile(vec![
            alias(1, "x", "30"),
            map(2, "x", "31"),
            alias(3, "x", "40"),
            map(4, "x", "41"),
        ]);

        assert!(compiled.is_ok());
        assert_eq!(compiled.tables.remap(&[30]), Some(&KeyCombo::from([31])));
        assert_eq!(compiled.tables.remap(&[40]), Some(&KeyCombo::from([41])));
        assert_eq!(compiled.aliases.resolve("x"), Some(&KeyCombo::from([40])));
    }

    #[test]
    fn test_compile_alias_used_before_definition() {
        let compiled = compile(vec![map(1, "x", "31"), alias(2, "x", "30")]);

        assert_eq!(compiled.errors.len(), 1);
        assert_eq!(
            compiled.errors[0].error,
            RuleError::InvalidKey {
                spec: "x".to_string()
            }
        );
    }

    #[test]
    fn test_compile_alias_name_with_separator() {
        let compiled = compile(vec![alias(1, "a+b", "30")]);

        assert_eq!(
            compiled.errors[0].error,
            RuleError::AliasContainsSeparator {
                name: "a+b".to_string()
            }
        );
        assert!(compiled.aliases.is_empty());
    }

    #[test]
    fn test_compile_alias_shadows_numeric_code() {
        // Alias lookup happens before numeric parsing
        let compiled = compile(vec![alias(1, "30", "31+32"), map(2, "30", "1")]);

        assert!(compiled.is_ok());
        assert_eq!(compiled.tables.remap(&[31, 32]), Some(&KeyCombo::from([1])));
        assert_eq!(compiled.tables.remap(&[30]), None);
    }

    #[test]
    fn test_compile_errors_sorted_by_line() {
        let mut compiler = RuleCompiler::new();
        compiler.apply(map(5, "bad", "1"));
        compiler.reject(LineError::new(2, (0, 0).into(), RuleError::TooManyArguments));

        let compiled = compiler.finish();
        let lines: Vec<usize> = compiled.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![2, 5]);
    }
}
