use std::error;
use std::fmt;

use crate::ast::nodes::{Expression, Statement, StatementKind};
use crate::ast::Position;
use crate::source::Handle;

/// A failed parser invocation. Positions are absolute: the parser is handed
/// the origin of the fragment so diagnostics line up with the enclosing
/// source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub position: Position,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: Position) -> Self {
        ParseError {
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.position)
    }
}

impl error::Error for ParseError {}

/// The external parser. Implementations must be reentrant: normalization
/// re-enters the parser for annotation strings and f-string fragments, with
/// `start` carrying the fragment's origin in the enclosing file.
pub trait Parse {
    fn parse(
        &self,
        text: &str,
        start: Position,
        handle: &Handle,
    ) -> Result<Vec<Statement>, ParseError>;

    /// Parse a fragment expected to hold exactly one expression.
    fn parse_expression(
        &self,
        text: &str,
        start: Position,
        handle: &Handle,
    ) -> Result<Expression, ParseError> {
        let mut statements = self.parse(text, start, handle)?;
        match (statements.pop(), statements.is_empty()) {
            (Some(statement), true) => match statement.node {
                StatementKind::Expression(expression) => Ok(expression),
                _ => Err(ParseError::new("expected an expression", start)),
            },
            _ => Err(ParseError::new("expected a single expression", start)),
        }
    }
}
