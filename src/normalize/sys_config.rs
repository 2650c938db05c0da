//! Constant folding of `sys.platform` and `sys.version_info` conditionals.
//! The analysis targets one platform and the 3.x line; branches that cannot
//! be taken there are dropped before qualification.

use num_bigint::BigInt;

use crate::ast::location::Location;
use crate::ast::node::Node;
use crate::ast::nodes::{
    ComparisonOperator, Expression, ExpressionKind, If, Statement, StatementKind, StringKind,
};
use crate::ast::transformer::{transform_statements, StatementTransformer};
use crate::source::Source;

/// The platform the analysis models.
const PLATFORM: &str = "linux";

fn branch_or_pass(branch: Vec<Statement>, location: Location) -> Vec<Statement> {
    if branch.is_empty() {
        vec![Node::new(location, StatementKind::Pass)]
    } else {
        branch
    }
}

fn is_platform_access(expression: &Expression) -> bool {
    expression
        .node
        .as_access()
        .is_some_and(|access| access.is_named("sys.platform"))
}

fn string_value(expression: &Expression) -> Option<&str> {
    match &expression.node {
        ExpressionKind::String(literal) if matches!(literal.kind, StringKind::Raw) => {
            Some(&literal.value)
        }
        _ => None,
    }
}

struct ReplacePlatformSpecificCode;

impl StatementTransformer for ReplacePlatformSpecificCode {
    fn statement(&mut self, statement: Statement) -> Vec<Statement> {
        let Node { location, id, node } = statement;
        let node = match node {
            StatementKind::If(If { test, body, orelse }) => {
                let folded = match &test.node {
                    ExpressionKind::ComparisonOperator {
                        left,
                        operator,
                        right,
                    } if is_platform_access(left) => {
                        string_value(right).and_then(|value| match operator {
                            ComparisonOperator::Equals | ComparisonOperator::Is => {
                                Some(value == PLATFORM)
                            }
                            ComparisonOperator::NotEquals | ComparisonOperator::IsNot => {
                                Some(value != PLATFORM)
                            }
                            _ => None,
                        })
                    }
                    _ => None,
                };
                match folded {
                    Some(true) => return branch_or_pass(body, location),
                    Some(false) => return branch_or_pass(orelse, location),
                    None => StatementKind::If(If { test, body, orelse }),
                }
            }
            other => other,
        };
        vec![Node { location, id, node }]
    }
}

pub fn replace_platform_specific_code(source: Source) -> Source {
    transform_statements(&mut ReplacePlatformSpecificCode, source)
}

/// The `sys.version_info` operand of a version test: the full tuple or its
/// major component (`sys.version_info[0]`, lowered to a `__getitem__` call).
fn is_version_access(expression: &Expression) -> bool {
    let Some(access) = expression.node.as_access() else {
        return false;
    };
    if !access.starts_with(&["sys", "version_info"]) {
        return false;
    }
    match access.elements() {
        [_, _] => true,
        [_, _, getitem, call] => {
            getitem.as_identifier() == Some("__getitem__") && call.is_call()
        }
        _ => false,
    }
}

/// A literal `3`, or a tuple whose first element is a literal `3`.
fn is_major_version_literal(expression: &Expression) -> bool {
    fn is_three(expression: &Expression) -> bool {
        matches!(&expression.node, ExpressionKind::Integer(value) if *value == BigInt::from(3))
    }
    match &expression.node {
        ExpressionKind::Integer(_) => is_three(expression),
        ExpressionKind::Tuple(elements) => elements.first().is_some_and(is_three),
        _ => false,
    }
}

struct ReplaceVersionSpecificCode;

impl StatementTransformer for ReplaceVersionSpecificCode {
    fn statement(&mut self, statement: Statement) -> Vec<Statement> {
        let Node { location, id, node } = statement;
        let node = match node {
            StatementKind::If(If { test, body, orelse }) => {
                let folded = match &test.node {
                    ExpressionKind::ComparisonOperator {
                        left,
                        operator,
                        right,
                    } => {
                        // Normalize the ordering comparisons into a
                        // `(small, large)` pair, then decide which operand
                        // holds the runtime version.
                        let ordered = match operator {
                            ComparisonOperator::LessThan | ComparisonOperator::LessThanOrEquals => {
                                Some((&**left, &**right))
                            }
                            ComparisonOperator::GreaterThan
                            | ComparisonOperator::GreaterThanOrEquals => Some((&**right, &**left)),
                            _ => None,
                        };
                        match ordered {
                            Some((small, large))
                                if is_version_access(small)
                                    && is_major_version_literal(large) =>
                            {
                                // version_info < (3, …): the 2.x branch.
                                Some(false)
                            }
                            Some((small, large))
                                if is_major_version_literal(small)
                                    && is_version_access(large) =>
                            {
                                // (3, …) < version_info: the 3.x branch.
                                Some(true)
                            }
                            _ => match operator {
                                // Never pin the analysis to one runtime
                                // version.
                                ComparisonOperator::Equals
                                    if (is_version_access(left)
                                        && is_major_version_literal(right))
                                        || (is_major_version_literal(left)
                                            && is_version_access(right)) =>
                                {
                                    Some(false)
                                }
                                _ => None,
                            },
                        }
                    }
                    _ => None,
                };
                match folded {
                    Some(true) => return branch_or_pass(body, location),
                    Some(false) => return branch_or_pass(orelse, location),
                    None => StatementKind::If(If { test, body, orelse }),
                }
            }
            other => other,
        };
        vec![Node { location, id, node }]
    }
}

pub fn replace_version_specific_code(source: Source) -> Source {
    transform_statements(&mut ReplaceVersionSpecificCode, source)
}
