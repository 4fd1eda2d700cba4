//! Rule tables for kbbind
//!
//! This crate turns kbbind configuration files into the immutable lookup
//! tables the remapping daemon runs against: alias resolution, combo
//! parsing, conflict detection and the line-oriented file syntax.

mod alias;
mod compiler;
mod error;
mod model;
mod parser;

pub use alias::AliasTable;
pub use compiler::{compile, parse_combo, Compiled, RuleCompiler, RuleTables};
pub use error::{ConfigError, LineError, RuleError};
pub use model::*;
pub use parser::{compile_str, load_rules, parse_line, parse_str, Parsed};
