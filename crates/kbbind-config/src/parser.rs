//! Configuration file parser
//!
//! The configuration is line oriented. Each non-blank line that does not
//! start with `#` holds one directive, with fields separated by spaces or tabs:
//!
//! ```text
//! # CapsLock -> Escape
//! map 58 1
//! alias ctrl 29
//! map ctrl+46 125+46
//! drop 99
//! exec ctrl+56+20 xterm -e top
//! ```
//!
//! `exec` takes the rest of the line verbatim as its command. Every other
//! directive takes a fixed number of fields.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use miette::{NamedSource, SourceSpan};

use crate::compiler::{Compiled, RuleCompiler};
use crate::error::{ConfigError, LineError, RuleError};
use crate::model::{Directive, Located};

/// Directives and line errors from one pass over a configuration text.
#[derive(Debug, Default)]
pub struct Parsed {
    pub directives: Vec<Located<Directive>>,
    pub errors: Vec<LineError>,
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Split off the first field, returning it and the remainder with leading blanks skipped.
fn next_field(s: &str) -> (&str, &str) {
    match s.find(is_blank) {
        Some(end) => (&s[..end], s[end..].trim_start_matches(is_blank)),
        None => (s, ""),
    }
}

/// Parse a single line. Returns `Ok(None)` for blank lines and comments.
pub fn parse_line(line: &str) -> Result<Option<Directive>, RuleError> {
    let line = line
        .trim_start_matches(is_blank)
        .trim_end_matches(|c: char| is_blank(c) || c == '\r');

    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (name, rest) = next_field(line);

    let directive = match name {
        "map" => {
            let (trigger, rest) = next_field(rest);
            let (output, rest) = next_field(rest);
            if output.is_empty() {
                return Err(RuleError::MissingArguments);
            }
            if !rest.is_empty() {
                return Err(RuleError::TooManyArguments);
            }
            Directive::MapCombo {
                trigger: trigger.to_string(),
                output: output.to_string(),
            }
        }
        "exec" => {
            let (trigger, command) = next_field(rest);
            if command.is_empty() {
                return Err(RuleError::MissingArguments);
            }
            Directive::ExecCombo {
                trigger: trigger.to_string(),
                command: command.to_string(),
            }
        }
        "drop" => {
            let (trigger, rest) = next_field(rest);
            if trigger.is_empty() {
                return Err(RuleError::MissingArguments);
            }
            if !rest.is_empty() {
                return Err(RuleError::TooManyArguments);
            }
            Directive::DropCombo {
                trigger: trigger.to_string(),
            }
        }
        "alias" => {
            let (alias_name, rest) = next_field(rest);
            let (spec, rest) = next_field(rest);
            if spec.is_empty() {
                return Err(RuleError::MissingArguments);
            }
            if !rest.is_empty() {
                return Err(RuleError::TooManyArguments);
            }
            Directive::DefineAlias {
                name: alias_name.to_string(),
                spec: spec.to_string(),
            }
        }
        other => {
            return Err(RuleError::UnknownDirective {
                name: other.to_string(),
            })
        }
    };

    Ok(Some(directive))
}

/// Parse a whole configuration text into located directives.
pub fn parse_str(source: &str) -> Parsed {
    let mut parsed = Parsed::default();
    let mut offset = 0;

    for (index, raw) in source.split_inclusive('\n').enumerate() {
        let line_number = index + 1;
        let content = raw.strip_suffix('\n').unwrap_or(raw);
        let span = SourceSpan::from((offset, content.len()));
        offset += raw.len();

        match parse_line(content) {
            Ok(Some(directive)) => parsed
                .directives
                .push(Located::with_span(line_number, span, directive)),
            Ok(None) => {}
            Err(error) => parsed.errors.push(LineError::new(line_number, span, error)),
        }
    }

    parsed
}

/// Parse and compile a configuration text.
///
/// Syntax errors and rule errors end up in the same list, ordered by line.
pub fn compile_str(source: &str) -> Compiled {
    let Parsed { directives, errors } = parse_str(source);

    let mut compiler = RuleCompiler::new();
    for error in errors {
        compiler.reject(error);
    }
    for directive in directives {
        compiler.apply(directive);
    }
    compiler.finish()
}

/// Load, parse and compile the configuration file at `path`.
///
/// Fails with [`ConfigError::Invalid`] if any line was rejected, carrying
/// every line error and the source text for rendering. Bytes that are not
/// UTF-8 are decoded as U+FFFD and only affect the lines they appear on.
pub fn load_rules(path: &Path) -> Result<Compiled, ConfigError> {
    let mut file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let source = String::from_utf8_lossy(&bytes).into_owned();

    let compiled = compile_str(&source);

    if !compiled.is_ok() {
        return Err(ConfigError::Invalid {
            path: path.to_path_buf(),
            src: NamedSource::new(path.display().to_string(), source),
            errors: compiled.errors,
        });
    }

    tracing::debug!(
        "Compiled {} remap rule(s), {} exec rule(s), {} alias(es) from {}",
        compiled.tables.remap_count(),
        compiled.tables.exec_count(),
        compiled.aliases.len(),
        path.display()
    );

    Ok(compiled)
}
