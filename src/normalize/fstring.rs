//! Format-string expansion: each format substring is scanned for
//! brace-delimited fragments, which are re-parsed at their source position.
//! The scan keeps the flat two-state shape of the original: braces inside
//! an expression are not tracked, so `f"{ {1: 2} }"` drops its fragment.

use log::debug;

use crate::ast::location::Location;
use crate::ast::node::Node;
use crate::ast::nodes::{Expression, ExpressionKind, StringKind, StringLiteral, Substring};
use crate::ast::transformer::{transform, Transformer};
use crate::ast::Position;
use crate::parser::Parse;
use crate::source::{Handle, Source};

enum State {
    Literal,
    Expression { position: usize, content: String },
}

struct ExpandFormatString<'a> {
    parser: &'a dyn Parse,
    handle: Handle,
}

impl ExpandFormatString<'_> {
    fn parse_fragment(
        &self,
        content: &str,
        position: usize,
        location: Location,
        expressions: &mut Vec<Expression>,
    ) {
        let origin = Position::new(
            location.start.line,
            location.start.column + position,
        );
        match self.parser.parse_expression(content, origin, &self.handle) {
            Ok(expression) => expressions.push(expression),
            Err(error) => debug!("dropped format-string fragment `{content}`: {error}"),
        }
    }

    fn scan(&self, text: &str, location: Location, expressions: &mut Vec<Expression>) {
        let mut state = State::Literal;
        for (index, character) in text.char_indices() {
            state = match (state, character) {
                // `{{` collapses back to literal text.
                (State::Expression { content, .. }, '{') if content.is_empty() => State::Literal,
                (State::Literal, '{') => State::Expression {
                    position: index + 1,
                    content: String::new(),
                },
                (State::Expression { position, content }, '}') => {
                    self.parse_fragment(&content, position, location, expressions);
                    State::Literal
                }
                (State::Expression { position, content }, ' ' | '\t') if content.is_empty() => {
                    State::Expression {
                        position: position + 1,
                        content,
                    }
                }
                (
                    State::Expression {
                        position,
                        mut content,
                    },
                    character,
                ) => {
                    content.push(character);
                    State::Expression { position, content }
                }
                (state, _) => state,
            };
        }
    }

    fn expand_substrings(
        &self,
        substrings: &[Node<Substring>],
    ) -> Vec<Expression> {
        let mut expressions = Vec::new();
        for substring in substrings {
            if let Substring::Format(text) = &substring.node {
                self.scan(text, substring.location, &mut expressions);
            }
        }
        expressions
    }
}

impl Transformer for ExpandFormatString<'_> {
    fn expression(&mut self, expression: Expression) -> Expression {
        let Node { location, id, node } = expression;
        let node = match node {
            ExpressionKind::String(StringLiteral {
                value,
                kind: StringKind::Mixed(substrings),
            }) => {
                let expressions = self.expand_substrings(&substrings);
                ExpressionKind::String(StringLiteral {
                    // The surface text stays around for diagnostics.
                    value,
                    kind: StringKind::Format(expressions),
                })
            }
            other => other,
        };
        Node { location, id, node }
    }
}

pub fn expand_format_string(parser: &dyn Parse, source: Source) -> Source {
    let mut transformer = ExpandFormatString {
        parser,
        handle: source.handle.clone(),
    };
    transform(&mut transformer, source)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ast::nodes::Statement;
    use crate::test_support::*;

    fn mixed(value: &str, substrings: Vec<Substring>) -> Expression {
        node(ExpressionKind::String(StringLiteral {
            value: value.to_string(),
            kind: StringKind::Mixed(substrings.into_iter().map(node).collect()),
        }))
    }

    fn format(value: &str, expressions: Vec<Expression>) -> Expression {
        node(ExpressionKind::String(StringLiteral {
            value: value.to_string(),
            kind: StringKind::Format(expressions),
        }))
    }

    fn expand(parser: &FragmentParser, expression: Expression) -> Vec<Statement> {
        let source = source("module", vec![expression_statement(expression)]);
        expand_format_string(parser, source).statements
    }

    #[test]
    fn fragments_are_parsed_in_order() {
        let parser = FragmentParser::new();
        let expanded = expand(
            &parser,
            mixed(
                "a {x} b {y.z}",
                vec![Substring::Format("a {x} b {y.z}".to_string())],
            ),
        );
        assert_eq!(
            expanded,
            vec![expression_statement(format(
                "a {x} b {y.z}",
                vec![name("x"), name("y.z")],
            ))]
        );
    }

    #[test]
    fn escaped_braces_stay_literal() {
        let parser = FragmentParser::new();
        let expanded = expand(
            &parser,
            mixed("{{x}} {y}", vec![Substring::Format("{{x}} {y}".to_string())]),
        );
        assert_eq!(
            expanded,
            vec![expression_statement(format("{{x}} {y}", vec![name("y")]))]
        );
    }

    #[test]
    fn leading_whitespace_is_stripped() {
        let parser = FragmentParser::new();
        let expanded = expand(
            &parser,
            mixed("{  x }", vec![Substring::Format("{  x }".to_string())]),
        );
        // Trailing space survives into the fragment text; the test parser
        // trims, mirroring the real parser accepting padded expressions.
        assert_eq!(
            expanded,
            vec![expression_statement(format("{  x }", vec![name("x")]))]
        );
    }

    #[test]
    fn unparsable_fragment_is_dropped() {
        let parser = FragmentParser::new();
        let expanded = expand(
            &parser,
            mixed("{?bad?} {x}", vec![Substring::Format("{?bad?} {x}".to_string())]),
        );
        assert_eq!(
            expanded,
            vec![expression_statement(format("{?bad?} {x}", vec![name("x")]))]
        );
    }

    #[test]
    fn braces_inside_expressions_are_not_tracked() {
        let parser = FragmentParser::new();
        let expanded = expand(
            &parser,
            mixed("{ {1: 2} }", vec![Substring::Format("{ {1: 2} }".to_string())]),
        );
        // The inner `{` collapses the empty expression back to literal
        // state, so no fragment survives.
        assert_eq!(
            expanded,
            vec![expression_statement(format("{ {1: 2} }", vec![]))]
        );
    }

    #[test]
    fn fragment_origin_offsets_into_the_substring() {
        let parser = FragmentParser::new();
        let substring = Node::new(
            Location::new(0, Position::new(2, 5), Position::new(2, 18)),
            Substring::Format("pre {x}".to_string()),
        );
        let expression = node(ExpressionKind::String(StringLiteral {
            value: "pre {x}".to_string(),
            kind: StringKind::Mixed(vec![substring]),
        }));
        expand(&parser, expression);
        assert_eq!(
            parser.invocations.borrow().as_slice(),
            &[("x".to_string(), Position::new(2, 10))]
        );
    }

    #[test]
    fn literal_substrings_contribute_nothing() {
        let parser = FragmentParser::new();
        let expanded = expand(
            &parser,
            mixed(
                "a{x}",
                vec![
                    Substring::Literal("a".to_string()),
                    Substring::Format("{x}".to_string()),
                ],
            ),
        );
        assert_eq!(
            expanded,
            vec![expression_statement(format("a{x}", vec![name("x")]))]
        );
    }
}
