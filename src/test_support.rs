//! Tree builders and a fragment parser shared by the unit tests.

use std::cell::RefCell;

use num_bigint::BigInt;

use crate::ast::access::{Access, Argument, Element, Reference};
use crate::ast::location::{Location, Position};
use crate::ast::node::Node;
use crate::ast::nodes::{
    Assign, Class, Define, Expression, ExpressionKind, If, Import, ImportEntry, Parameter,
    ParameterData, Return, Statement, StatementKind, StringLiteral,
};
use crate::parser::{Parse, ParseError};
use crate::source::{Handle, Source};

pub fn node<T>(value: T) -> Node<T> {
    Node::new(Location::default(), value)
}

pub fn name(name: &str) -> Expression {
    node(ExpressionKind::Access(Access::from_name(name)))
}

pub fn call(target: &str, arguments: Vec<Argument>) -> Expression {
    let mut access = Access::from_name(target);
    access.push(Element::Call(node(arguments)));
    node(ExpressionKind::Access(access))
}

pub fn string(value: &str) -> Expression {
    node(ExpressionKind::String(StringLiteral::plain(value)))
}

pub fn integer(value: i64) -> Expression {
    node(ExpressionKind::Integer(BigInt::from(value)))
}

pub fn boolean(value: bool) -> Expression {
    node(ExpressionKind::Boolean(value))
}

pub fn ellipsis() -> Expression {
    node(ExpressionKind::Ellipsis)
}

pub fn tuple(elements: Vec<Expression>) -> Expression {
    node(ExpressionKind::Tuple(elements))
}

pub fn expression_statement(expression: Expression) -> Statement {
    node(StatementKind::Expression(expression))
}

pub fn assign(target: &str, value: Expression) -> Statement {
    node(StatementKind::Assign(Assign {
        target: name(target),
        annotation: None,
        value,
        parent: None,
    }))
}

pub fn annotated_assign(target: &str, annotation: Expression, value: Expression) -> Statement {
    node(StatementKind::Assign(Assign {
        target: name(target),
        annotation: Some(annotation),
        value,
        parent: None,
    }))
}

pub fn return_some(expression: Expression) -> Statement {
    node(StatementKind::Return(Return {
        expression: Some(expression),
        is_implicit: false,
    }))
}

pub fn implicit_return() -> Statement {
    node(StatementKind::Return(Return {
        expression: None,
        is_implicit: true,
    }))
}

pub fn pass() -> Statement {
    node(StatementKind::Pass)
}

pub fn parameter(name: &str) -> Parameter {
    node(ParameterData {
        name: name.to_string(),
        annotation: None,
        value: None,
    })
}

pub fn define(name: &str, parameters: Vec<Parameter>, body: Vec<Statement>) -> Statement {
    node(StatementKind::Define(Define {
        name: Reference::from_name(name),
        parameters,
        body,
        decorators: vec![],
        return_annotation: None,
        is_async: false,
        parent: None,
        docstring: None,
    }))
}

pub fn class(name: &str, bases: Vec<&str>, body: Vec<Statement>) -> Statement {
    node(StatementKind::Class(Class {
        name: Reference::from_name(name),
        bases: bases
            .into_iter()
            .map(|base| Argument::positional(self::name(base)))
            .collect(),
        body,
        decorators: vec![],
        docstring: None,
    }))
}

pub fn if_statement(test: Expression, body: Vec<Statement>, orelse: Vec<Statement>) -> Statement {
    node(StatementKind::If(If { test, body, orelse }))
}

pub fn import_from(module: &str, names: &[(&str, Option<&str>)]) -> Statement {
    node(StatementKind::Import(Import {
        from: Some(node(Reference::from_name(module))),
        level: 0,
        imports: names
            .iter()
            .map(|(name, alias)| ImportEntry {
                name: Reference::from_name(name),
                alias: alias.map(str::to_string),
            })
            .collect(),
    }))
}

pub fn import(names: &[(&str, Option<&str>)]) -> Statement {
    node(StatementKind::Import(Import {
        from: None,
        level: 0,
        imports: names
            .iter()
            .map(|(name, alias)| ImportEntry {
                name: Reference::from_name(name),
                alias: alias.map(str::to_string),
            })
            .collect(),
    }))
}

pub fn source(qualifier: &str, statements: Vec<Statement>) -> Source {
    let path = format!("{}.py", qualifier.replace('.', "/"));
    Source::new(Handle::new(path), Reference::from_name(qualifier), statements)
}

/// A parser good enough for re-parsed fragments in tests: dotted names,
/// integer literals, and single subscripts (`A[B, C]` lowering to an
/// `A.__getitem__((B, C))` access). Anything else fails. Records every
/// invocation with its origin.
#[derive(Default)]
pub struct FragmentParser {
    pub invocations: RefCell<Vec<(String, Position)>>,
}

impl FragmentParser {
    pub fn new() -> Self {
        FragmentParser::default()
    }

    fn parse_atom(text: &str) -> Option<ExpressionKind> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Ok(value) = text.parse::<i64>() {
            return Some(ExpressionKind::Integer(BigInt::from(value)));
        }
        if let Some(open) = text.find('[') {
            let close = text.rfind(']')?;
            if close != text.len() - 1 {
                return None;
            }
            let mut access = Self::parse_dotted(&text[..open])?;
            access.push(Element::Identifier("__getitem__".to_string()));
            let inner = &text[open + 1..close];
            let mut elements = Vec::new();
            for part in inner.split(',') {
                elements.push(node(Self::parse_atom(part)?));
            }
            let argument = if elements.len() == 1 {
                elements.pop().unwrap()
            } else {
                node(ExpressionKind::Tuple(elements))
            };
            access.push(Element::Call(node(vec![Argument::positional(argument)])));
            return Some(ExpressionKind::Access(access));
        }
        Self::parse_dotted(text).map(ExpressionKind::Access)
    }

    fn parse_dotted(text: &str) -> Option<Access> {
        let text = text.trim();
        let valid = !text.is_empty()
            && text.split('.').all(|part| {
                !part.is_empty()
                    && part
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
                    && !part.chars().next().unwrap().is_ascii_digit()
            });
        valid.then(|| Access::from_name(text))
    }
}

impl Parse for FragmentParser {
    fn parse(
        &self,
        text: &str,
        start: Position,
        _handle: &Handle,
    ) -> Result<Vec<Statement>, ParseError> {
        self.invocations
            .borrow_mut()
            .push((text.to_string(), start));
        let kind = Self::parse_atom(text)
            .ok_or_else(|| ParseError::new(format!("cannot parse fragment `{text}`"), start))?;
        let location = Location::new(0, start, start);
        Ok(vec![Node::new(
            location,
            StatementKind::Expression(Node::new(location, kind)),
        )])
    }
}
