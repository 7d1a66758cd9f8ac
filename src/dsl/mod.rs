//! Scripting language for exercising MCP servers.
//!
//! A script connects to a server over stdio, calls its tools, and checks the
//! results:
//!
//! ```text
//! connect "./bract"
//! call browser_list_tabs -> tabs
//! assert len(tabs) > 0, "no tabs"
//! ```

pub mod ast;
pub mod format;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod value;

pub use ast::Script;
pub use runtime::{ConnectSpec, Connector, Interpreter, ToolClient, ToolContent, ToolOutput};
pub use value::Value;

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DslError {
    #[error("{message} at line {line}, column {column}")]
    Lex {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("{message} at line {line}")]
    Parse { message: String, line: usize },

    #[error("{0}")]
    Runtime(String),

    #[error("assertion error: {0}")]
    Assertion(String),

    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("{kind} index out of bounds: {index}")]
    OutOfBounds { kind: &'static str, index: i64 },

    #[error("wait timeout: condition did not become true within {0:?}")]
    WaitTimeout(Duration),

    #[error("execution cancelled")]
    Cancelled,

    #[error("{0}")]
    Client(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DslError {
    /// Lex and parse failures, as opposed to failures while running.
    pub fn is_syntax(&self) -> bool {
        matches!(self, DslError::Lex { .. } | DslError::Parse { .. })
    }
}

pub type DslResult<T> = std::result::Result<T, DslError>;

pub fn parse(source: &str) -> DslResult<Script> {
    let tokens = lexer::tokenize(source)?;
    parser::parse_tokens(tokens)
}

/// Syntax check without running anything.
pub fn validate(source: &str) -> DslResult<()> {
    parse(source).map(|_| ())
}

/// Parse and reprint in canonical form.
pub fn format_source(source: &str) -> DslResult<String> {
    Ok(format::format_script(&parse(source)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_errors_classified() {
        assert!(parse("print \"x").unwrap_err().is_syntax());
        assert!(parse("print )").unwrap_err().is_syntax());
        assert!(!DslError::DivisionByZero.is_syntax());
    }

    #[test]
    fn validate_accepts_empty_script() {
        assert!(validate("").is_ok());
        assert!(validate("\n# only a comment\n").is_ok());
    }
}
