use std::path::PathBuf;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::model::KeyCombo;

/// A fatal configuration failure.
#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("Error opening config file {}: {source}", path.display())]
    #[diagnostic(code(kbbind::config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error reading config file {}: {source}", path.display())]
    #[diagnostic(code(kbbind::config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} error(s) in configuration file {}", .errors.len(), .path.display())]
    #[diagnostic(
        code(kbbind::config::invalid),
        help("every directive must be valid before kbbind will start")
    )]
    Invalid {
        path: PathBuf,
        #[source_code]
        src: NamedSource<String>,
        #[related]
        errors: Vec<LineError>,
    },
}

/// Why a single directive was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("Missing argument(s)")]
    MissingArguments,

    #[error("Too many arguments")]
    TooManyArguments,

    #[error("Unknown directive '{name}'")]
    UnknownDirective { name: String },

    #[error("Invalid key specified ({spec})")]
    InvalidKey { spec: String },

    #[error("Empty key combination")]
    EmptyCombo,

    #[error("Alias names cannot contain '+'")]
    AliasContainsSeparator { name: String },

    #[error("Conflicting map/drop directives for key(s) {trigger}")]
    ConflictingRemap { trigger: KeyCombo },

    #[error("Conflicting exec directives for key(s) {trigger}")]
    ConflictingExec { trigger: KeyCombo },
}

/// A rejected directive together with its position in the configuration file.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {error}")]
#[diagnostic(code(kbbind::config::directive))]
pub struct LineError {
    pub line: usize,
    #[label("here")]
    pub span: SourceSpan,
    pub error: RuleError,
}

impl LineError {
    pub fn new(line: usize, span: SourceSpan, error: RuleError) -> Self {
        Self { line, span, error }
    }
}
