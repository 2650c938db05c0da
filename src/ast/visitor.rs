use crate::ast::access::{Access, Argument, Element};
use crate::ast::nodes::{
    Comprehension, Expression, ExpressionKind, Parameter, Starred, Statement, StatementKind,
    StringKind,
};

/// Read-only traversal. Implementations override the hooks they care about
/// and delegate to the `walk_*` functions for the rest.
pub trait Visitor<'a> {
    fn visit_statement(&mut self, statement: &'a Statement) {
        walk_statement(self, statement);
    }

    fn visit_expression(&mut self, expression: &'a Expression) {
        walk_expression(self, expression);
    }
}

pub fn walk_statement<'a, V: Visitor<'a> + ?Sized>(visitor: &mut V, statement: &'a Statement) {
    fn body<'a, V: Visitor<'a> + ?Sized>(visitor: &mut V, statements: &'a [Statement]) {
        for statement in statements {
            visitor.visit_statement(statement);
        }
    }
    match &statement.node {
        StatementKind::Assign(assign) => {
            visitor.visit_expression(&assign.target);
            if let Some(annotation) = &assign.annotation {
                visitor.visit_expression(annotation);
            }
            visitor.visit_expression(&assign.value);
        }
        StatementKind::Assert { test, message } => {
            visitor.visit_expression(test);
            if let Some(message) = message {
                visitor.visit_expression(message);
            }
        }
        StatementKind::Class(class) => {
            for base in &class.bases {
                visitor.visit_expression(&base.value);
            }
            for decorator in &class.decorators {
                visitor.visit_expression(decorator);
            }
            body(visitor, &class.body);
        }
        StatementKind::Define(define) => {
            for parameter in &define.parameters {
                walk_parameter(visitor, parameter);
            }
            for decorator in &define.decorators {
                visitor.visit_expression(decorator);
            }
            if let Some(annotation) = &define.return_annotation {
                visitor.visit_expression(annotation);
            }
            body(visitor, &define.body);
        }
        StatementKind::Delete(expression)
        | StatementKind::Expression(expression)
        | StatementKind::Yield(expression)
        | StatementKind::YieldFrom(expression) => visitor.visit_expression(expression),
        StatementKind::For(for_) => {
            visitor.visit_expression(&for_.target);
            visitor.visit_expression(&for_.iterator);
            body(visitor, &for_.body);
            body(visitor, &for_.orelse);
        }
        StatementKind::If(if_) => {
            visitor.visit_expression(&if_.test);
            body(visitor, &if_.body);
            body(visitor, &if_.orelse);
        }
        StatementKind::Raise(expression) => {
            if let Some(expression) = expression {
                visitor.visit_expression(expression);
            }
        }
        StatementKind::Return(return_) => {
            if let Some(expression) = &return_.expression {
                visitor.visit_expression(expression);
            }
        }
        StatementKind::Try(try_) => {
            body(visitor, &try_.body);
            for handler in &try_.handlers {
                if let Some(kind) = &handler.kind {
                    visitor.visit_expression(kind);
                }
                body(visitor, &handler.body);
            }
            body(visitor, &try_.orelse);
            body(visitor, &try_.finally);
        }
        StatementKind::While(while_) => {
            visitor.visit_expression(&while_.test);
            body(visitor, &while_.body);
            body(visitor, &while_.orelse);
        }
        StatementKind::With(with) => {
            for (item, target) in &with.items {
                visitor.visit_expression(item);
                if let Some(target) = target {
                    visitor.visit_expression(target);
                }
            }
            body(visitor, &with.body);
        }
        StatementKind::Break
        | StatementKind::Continue
        | StatementKind::Global(_)
        | StatementKind::Import(_)
        | StatementKind::Nonlocal(_)
        | StatementKind::Pass => {}
    }
}

fn walk_parameter<'a, V: Visitor<'a> + ?Sized>(visitor: &mut V, parameter: &'a Parameter) {
    if let Some(annotation) = &parameter.node.annotation {
        visitor.visit_expression(annotation);
    }
    if let Some(value) = &parameter.node.value {
        visitor.visit_expression(value);
    }
}

fn walk_access<'a, V: Visitor<'a> + ?Sized>(visitor: &mut V, access: &'a Access) {
    for element in access.elements() {
        if let Element::Call(arguments) = element {
            for Argument { value, .. } in &arguments.node {
                visitor.visit_expression(value);
            }
        }
    }
}

fn walk_comprehensions<'a, V: Visitor<'a> + ?Sized>(
    visitor: &mut V,
    generators: &'a [Comprehension],
) {
    for generator in generators {
        visitor.visit_expression(&generator.target);
        visitor.visit_expression(&generator.iterator);
        for condition in &generator.conditions {
            visitor.visit_expression(condition);
        }
    }
}

pub fn walk_expression<'a, V: Visitor<'a> + ?Sized>(visitor: &mut V, expression: &'a Expression) {
    match &expression.node {
        ExpressionKind::Access(access) => walk_access(visitor, access),
        ExpressionKind::ExpressionAccess { expression, access } => {
            visitor.visit_expression(expression);
            walk_access(visitor, access);
        }
        ExpressionKind::Await(expression) => visitor.visit_expression(expression),
        ExpressionKind::BooleanOperator { left, right, .. }
        | ExpressionKind::ComparisonOperator { left, right, .. } => {
            visitor.visit_expression(left);
            visitor.visit_expression(right);
        }
        ExpressionKind::Dictionary { entries, keywords } => {
            for entry in entries {
                visitor.visit_expression(&entry.key);
                visitor.visit_expression(&entry.value);
            }
            for keyword in keywords {
                visitor.visit_expression(keyword);
            }
        }
        ExpressionKind::DictionaryComprehension {
            element,
            generators,
        } => {
            visitor.visit_expression(&element.key);
            visitor.visit_expression(&element.value);
            walk_comprehensions(visitor, generators);
        }
        ExpressionKind::Generator {
            element,
            generators,
        }
        | ExpressionKind::ListComprehension {
            element,
            generators,
        }
        | ExpressionKind::SetComprehension {
            element,
            generators,
        } => {
            visitor.visit_expression(element);
            walk_comprehensions(visitor, generators);
        }
        ExpressionKind::Lambda { parameters, body } => {
            for parameter in parameters {
                walk_parameter(visitor, parameter);
            }
            visitor.visit_expression(body);
        }
        ExpressionKind::List(elements)
        | ExpressionKind::Set(elements)
        | ExpressionKind::Tuple(elements) => {
            for element in elements {
                visitor.visit_expression(element);
            }
        }
        ExpressionKind::Starred(Starred::Once(expression))
        | ExpressionKind::Starred(Starred::Twice(expression)) => {
            visitor.visit_expression(expression);
        }
        ExpressionKind::String(literal) => {
            if let StringKind::Format(expressions) = &literal.kind {
                for expression in expressions {
                    visitor.visit_expression(expression);
                }
            }
        }
        ExpressionKind::Ternary {
            target,
            test,
            alternative,
        } => {
            visitor.visit_expression(target);
            visitor.visit_expression(test);
            visitor.visit_expression(alternative);
        }
        ExpressionKind::UnaryOperator { operand, .. } => visitor.visit_expression(operand),
        ExpressionKind::Yield(expression) => {
            if let Some(expression) = expression {
                visitor.visit_expression(expression);
            }
        }
        ExpressionKind::Boolean(_)
        | ExpressionKind::Complex(_)
        | ExpressionKind::Ellipsis
        | ExpressionKind::Float(_)
        | ExpressionKind::Integer(_) => {}
    }
}

/// The nested statement blocks of a statement, in source order.
pub fn nested_bodies(statement: &Statement) -> Vec<&[Statement]> {
    match &statement.node {
        StatementKind::Class(class) => vec![&class.body],
        StatementKind::Define(define) => vec![&define.body],
        StatementKind::For(for_) => vec![&for_.body, &for_.orelse],
        StatementKind::If(if_) => vec![&if_.body, &if_.orelse],
        StatementKind::Try(try_) => {
            let mut blocks: Vec<&[Statement]> = vec![&try_.body];
            for handler in &try_.handlers {
                blocks.push(&handler.body);
            }
            blocks.push(&try_.orelse);
            blocks.push(&try_.finally);
            blocks
        }
        StatementKind::While(while_) => vec![&while_.body, &while_.orelse],
        StatementKind::With(with) => vec![&with.body],
        _ => vec![],
    }
}

/// Lazy pre-order statement iterator with per-node descent pruning.
pub struct Statements<'a, P> {
    stack: Vec<&'a Statement>,
    prune: P,
}

impl<'a, P: FnMut(&Statement) -> bool> Iterator for Statements<'a, P> {
    type Item = &'a Statement;

    fn next(&mut self) -> Option<&'a Statement> {
        let statement = self.stack.pop()?;
        if !(self.prune)(statement) {
            for block in nested_bodies(statement).into_iter().rev() {
                for child in block.iter().rev() {
                    self.stack.push(child);
                }
            }
        }
        Some(statement)
    }
}

pub fn statements(body: &[Statement]) -> Statements<'_, fn(&Statement) -> bool> {
    statements_pruned(body, |_| false)
}

pub fn statements_pruned<P: FnMut(&Statement) -> bool>(
    body: &[Statement],
    prune: P,
) -> Statements<'_, P> {
    Statements {
        stack: body.iter().rev().collect(),
        prune,
    }
}
