//! Implicit-return insertion: after this pass every function body ends in a
//! `Return`, yields, ends in an infinite loop, or ends in a `try` whose
//! `finally` returns.

use crate::ast::node::Node;
use crate::ast::nodes::{Define, Expression, ExpressionKind, Return, Statement, StatementKind};
use crate::ast::transformer::{transform_statements, StatementTransformer};
use crate::ast::visitor::{walk_expression, walk_statement, Visitor};
use crate::source::Source;

struct YieldFinder {
    found: bool,
}

impl<'a> Visitor<'a> for YieldFinder {
    fn visit_statement(&mut self, statement: &'a Statement) {
        match &statement.node {
            // Yields in nested scopes make those scopes generators, not
            // this one.
            StatementKind::Define(_) | StatementKind::Class(_) => {}
            StatementKind::Yield(_) | StatementKind::YieldFrom(_) => self.found = true,
            _ => walk_statement(self, statement),
        }
    }

    fn visit_expression(&mut self, expression: &'a Expression) {
        match &expression.node {
            ExpressionKind::Yield(_) => self.found = true,
            ExpressionKind::Lambda { .. } => {}
            _ => walk_expression(self, expression),
        }
    }
}

fn is_generator(body: &[Statement]) -> bool {
    let mut finder = YieldFinder { found: false };
    for statement in body {
        finder.visit_statement(statement);
        if finder.found {
            return true;
        }
    }
    false
}

fn has_implicit_flow(body: &[Statement]) -> bool {
    match body.last().map(|statement| &statement.node) {
        Some(StatementKind::Return(_)) => false,
        // `while True:` never falls through.
        Some(StatementKind::While(while_)) => {
            !matches!(while_.test.node, ExpressionKind::Boolean(true))
        }
        Some(StatementKind::Try(try_)) => !matches!(
            try_.finally.last().map(|statement| &statement.node),
            Some(StatementKind::Return(_))
        ),
        _ => true,
    }
}

struct ExpandImplicitReturns;

impl StatementTransformer for ExpandImplicitReturns {
    fn statement(&mut self, statement: Statement) -> Vec<Statement> {
        let Node { location, id, node } = statement;
        let node = match node {
            StatementKind::Define(define) if has_implicit_flow(&define.body) && !is_generator(&define.body) => {
                let Define { body, .. } = &define;
                let location = body.last().map_or(location, |last| last.location);
                let mut define = define;
                define.body.push(Node::new(
                    location,
                    StatementKind::Return(Return {
                        expression: None,
                        is_implicit: true,
                    }),
                ));
                StatementKind::Define(define)
            }
            other => other,
        };
        vec![Node { location, id, node }]
    }
}

pub fn expand_implicit_returns(source: Source) -> Source {
    transform_statements(&mut ExpandImplicitReturns, source)
}
