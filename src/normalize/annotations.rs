//! String-annotation expansion: annotations written as string literals are
//! re-parsed into expressions so later passes see one annotation shape.

use log::debug;

use crate::ast::access::{Access, Argument, Element};
use crate::ast::location::Location;
use crate::ast::node::Node;
use crate::ast::nodes::{
    Assign, Define, Expression, ExpressionKind, Parameter, ParameterData, Statement,
    StatementKind, StringKind,
};
use crate::ast::transformer::{transform, Transformer};
use crate::ast::Position;
use crate::parser::Parse;
use crate::source::{Handle, Source};

/// Sentinel replacing annotations whose text does not parse.
pub const UNPARSED_ANNOTATION: &str = "$unparsed_annotation";

struct ExpandStringAnnotations<'a> {
    parser: &'a dyn Parse,
    handle: Handle,
}

impl ExpandStringAnnotations<'_> {
    fn parse_string(&self, value: &str, location: Location) -> Expression {
        let origin = Position::new(location.start.line, location.start.column + 1);
        match self.parser.parse_expression(value, origin, &self.handle) {
            Ok(parsed) => parsed,
            Err(error) => {
                debug!("unable to parse annotation `{value}`: {error}");
                Node::new(
                    location,
                    ExpressionKind::Access(Access::from_name(UNPARSED_ANNOTATION)),
                )
            }
        }
    }

    /// Rewrite string literals in an annotation. Inside a `Literal[...]`
    /// subscript the arguments are values, not types; they stay strings.
    fn expand(&self, expression: Expression, in_literal: bool) -> Expression {
        let Node { location, id, node } = expression;
        let node = match node {
            ExpressionKind::String(literal)
                if !in_literal && matches!(literal.kind, StringKind::Raw) =>
            {
                return self.parse_string(&literal.value, location);
            }
            ExpressionKind::Access(access) => {
                ExpressionKind::Access(self.expand_access(access, in_literal))
            }
            ExpressionKind::Tuple(elements) => ExpressionKind::Tuple(
                elements
                    .into_iter()
                    .map(|element| self.expand(element, in_literal))
                    .collect(),
            ),
            ExpressionKind::List(elements) => ExpressionKind::List(
                elements
                    .into_iter()
                    .map(|element| self.expand(element, in_literal))
                    .collect(),
            ),
            other => other,
        };
        Node { location, id, node }
    }

    fn expand_access(&self, access: Access, in_literal: bool) -> Access {
        let mut elements = Vec::with_capacity(access.0.len());
        let mut literal_subscript = false;
        for element in access.0 {
            match element {
                Element::Identifier(name) => {
                    if name == "Literal" {
                        literal_subscript = true;
                    } else if name != "__getitem__" {
                        literal_subscript = false;
                    }
                    elements.push(Element::Identifier(name));
                }
                Element::Call(arguments) => {
                    if in_literal || literal_subscript {
                        elements.push(Element::Call(arguments));
                    } else {
                        elements.push(Element::Call(arguments.map(|arguments| {
                            arguments
                                .into_iter()
                                .map(|Argument { name, value }| Argument {
                                    name,
                                    value: self.expand(value, false),
                                })
                                .collect()
                        })));
                    }
                    literal_subscript = false;
                }
            }
        }
        Access(elements)
    }

    fn expand_parameter(&self, parameter: Parameter) -> Parameter {
        parameter.map(
            |ParameterData {
                 name,
                 annotation,
                 value,
             }| ParameterData {
                name,
                annotation: annotation.map(|annotation| self.expand(annotation, false)),
                value,
            },
        )
    }
}

impl Transformer for ExpandStringAnnotations<'_> {
    fn expression(&mut self, expression: Expression) -> Expression {
        // `cast(T, value)` carries its type argument first; expand it like
        // any other annotation.
        let Node { location, id, node } = expression;
        let node = match node {
            ExpressionKind::Access(access) => {
                let is_cast = match access.elements() {
                    [spine @ .., Element::Call(_)] => {
                        let spine = Access::new(spine.to_vec());
                        spine.is_named("cast") || spine.is_named("typing.cast")
                    }
                    _ => false,
                };
                if is_cast {
                    let mut elements = access.0;
                    let Some(Element::Call(arguments)) = elements.pop() else {
                        unreachable!("cast access ends in a call");
                    };
                    let arguments = arguments.map(|mut arguments| {
                        if let Some(first) = arguments.first_mut() {
                            let value =
                                std::mem::replace(&mut first.value, Node::new(location, ExpressionKind::Ellipsis));
                            first.value = self.expand(value, false);
                        }
                        arguments
                    });
                    elements.push(Element::Call(arguments));
                    ExpressionKind::Access(Access(elements))
                } else {
                    ExpressionKind::Access(access)
                }
            }
            other => other,
        };
        Node { location, id, node }
    }

    fn statement(&mut self, statement: Statement) -> Vec<Statement> {
        let Node { location, id, node } = statement;
        let node = match node {
            StatementKind::Assign(Assign {
                target,
                annotation,
                value,
                parent,
            }) => StatementKind::Assign(Assign {
                target,
                annotation: annotation.map(|annotation| self.expand(annotation, false)),
                value,
                parent,
            }),
            StatementKind::Define(Define {
                name,
                parameters,
                body,
                decorators,
                return_annotation,
                is_async,
                parent,
                docstring,
            }) => StatementKind::Define(Define {
                name,
                parameters: parameters
                    .into_iter()
                    .map(|parameter| self.expand_parameter(parameter))
                    .collect(),
                body,
                decorators,
                return_annotation: return_annotation
                    .map(|annotation| self.expand(annotation, false)),
                is_async,
                parent,
                docstring,
            }),
            other => other,
        };
        vec![Node { location, id, node }]
    }
}

pub fn expand_string_annotations(parser: &dyn Parse, source: Source) -> Source {
    let mut transformer = ExpandStringAnnotations {
        parser,
        handle: source.handle.clone(),
    };
    transform(&mut transformer, source)
}
