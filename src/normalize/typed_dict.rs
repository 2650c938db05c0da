//! Canonicalization of typed-dictionary declarations: the stub's special
//! form and both surface declaration shapes collapse into one `Assign`
//! shape later phases can consume uniformly.

use crate::ast::access::{sanitize_identifier, Access, Argument, Element};
use crate::ast::location::Location;
use crate::ast::node::Node;
use crate::ast::nodes::{
    Assign, Class, Expression, ExpressionKind, Statement, StatementKind, StringKind,
    StringLiteral,
};
use crate::ast::transformer::{transform_statements, StatementTransformer};
use crate::source::Source;

struct ReplaceMypyExtensionsStub;

impl StatementTransformer for ReplaceMypyExtensionsStub {
    fn statement(&mut self, statement: Statement) -> Vec<Statement> {
        let Node { location, id, node } = statement;
        let node = match node {
            StatementKind::Define(define) if define.name.last() == Some("TypedDict") => {
                StatementKind::Assign(Assign {
                    target: Node::new(location, ExpressionKind::Access(define.name.clone().into())),
                    annotation: Some(Node::new(
                        location,
                        ExpressionKind::Access(Access::from_name("typing._SpecialForm")),
                    )),
                    value: Node::new(location, ExpressionKind::Ellipsis),
                    parent: define.parent,
                })
            }
            other => other,
        };
        vec![Node { location, id, node }]
    }
}

/// In the `mypy_extensions` stub itself, the `TypedDict` define becomes a
/// special-form binding.
pub fn replace_mypy_extensions_stub(source: Source) -> Source {
    if !source.handle.path().ends_with("mypy_extensions.pyi") {
        return source;
    }
    transform_statements(&mut ReplaceMypyExtensionsStub, source)
}

fn is_typed_dictionary(access: &Access) -> bool {
    access.is_named("mypy_extensions.TypedDict")
}

fn string_literal(expression: &Expression) -> Option<&str> {
    match &expression.node {
        ExpressionKind::String(literal) if matches!(literal.kind, StringKind::Raw) => {
            Some(&literal.value)
        }
        _ => None,
    }
}

fn plain_string(value: &str, location: Location) -> Expression {
    Node::new(
        location,
        ExpressionKind::String(StringLiteral::plain(value)),
    )
}

/// The canonical declaration: an assign whose value subscripts the special
/// form with `(name, total, (k1, v1), …, (kn, vn))` and whose annotation
/// wraps that subscript in `typing.Type`.
fn canonical_declaration(
    target: Expression,
    name: &str,
    total: bool,
    fields: Vec<(String, Expression)>,
    location: Location,
) -> StatementKind {
    let mut elements = vec![
        plain_string(name, location),
        Node::new(location, ExpressionKind::Boolean(total)),
    ];
    for (field, annotation) in fields {
        elements.push(Node::new(
            location,
            ExpressionKind::Tuple(vec![plain_string(&field, location), annotation]),
        ));
    }
    let arguments = Node::new(
        location,
        vec![Argument::positional(Node::new(
            location,
            ExpressionKind::Tuple(elements),
        ))],
    );
    let mut subscript = Access::from_name("mypy_extensions.TypedDict.__getitem__");
    subscript.push(Element::Call(arguments));
    let value = Node::new(location, ExpressionKind::Access(subscript));

    let mut annotation = Access::from_name("typing.Type.__getitem__");
    annotation.push(Element::Call(Node::new(
        location,
        vec![Argument::positional(value.clone())],
    )));

    StatementKind::Assign(Assign {
        target,
        annotation: Some(Node::new(location, ExpressionKind::Access(annotation))),
        value,
        parent: None,
    })
}

/// Totality keyword lookup; the keyword may carry a qualification wrapper
/// after the qualify pass.
fn totality(arguments: &[Argument]) -> bool {
    arguments
        .iter()
        .find(|argument| {
            argument
                .name
                .as_ref()
                .is_some_and(|name| sanitize_identifier(&name.node) == "total")
        })
        .and_then(|argument| match &argument.value.node {
            ExpressionKind::Boolean(value) => Some(*value),
            _ => None,
        })
        .unwrap_or(true)
}

struct ExpandTypedDictionaryDeclarations;

impl ExpandTypedDictionaryDeclarations {
    /// `D = mypy_extensions.TypedDict('D', {...}, total=...)`.
    fn expand_assign(assign: &Assign, location: Location) -> Option<StatementKind> {
        let access = assign.value.node.as_access()?;
        let (Element::Call(arguments), spine) = access.elements().split_last()? else {
            return None;
        };
        if !is_typed_dictionary(&Access::new(spine.to_vec())) {
            return None;
        }
        let arguments = &arguments.node;
        let name = string_literal(&arguments.first()?.value)?;
        let entries = match &arguments.get(1)?.value.node {
            ExpressionKind::Dictionary { entries, .. } => entries,
            _ => return None,
        };
        let fields = entries
            .iter()
            .filter_map(|entry| {
                string_literal(&entry.key)
                    .map(|field| (field.to_string(), entry.value.clone()))
            })
            .collect();
        Some(canonical_declaration(
            assign.target.clone(),
            name,
            totality(arguments),
            fields,
            location,
        ))
    }

    /// `class D(mypy_extensions.TypedDict, total=...): field: T`.
    fn expand_class(class: &Class, location: Location) -> Option<StatementKind> {
        if !class.bases.iter().any(|base| {
            base.value
                .node
                .as_access()
                .is_some_and(is_typed_dictionary)
        }) {
            return None;
        }
        let name = class.name.last()?;
        let mut fields = Vec::new();
        for statement in &class.body {
            let StatementKind::Assign(assign) = &statement.node else {
                continue;
            };
            let Some(annotation) = &assign.annotation else {
                continue;
            };
            let Some(field) = assign.target.node.as_access().and_then(Access::last_identifier)
            else {
                continue;
            };
            fields.push((field.to_string(), annotation.clone()));
        }
        let target = Node::new(
            location,
            ExpressionKind::Access(class.name.clone().into()),
        );
        Some(canonical_declaration(
            target,
            name,
            totality(&class.bases),
            fields,
            location,
        ))
    }
}

impl StatementTransformer for ExpandTypedDictionaryDeclarations {
    fn statement(&mut self, statement: Statement) -> Vec<Statement> {
        let Node { location, id, node } = statement;
        let replacement = match &node {
            StatementKind::Assign(assign) => Self::expand_assign(assign, location),
            StatementKind::Class(class) => Self::expand_class(class, location),
            _ => None,
        };
        let node = replacement.unwrap_or(node);
        vec![Node { location, id, node }]
    }
}

pub fn expand_typed_dictionary_declarations(source: Source) -> Source {
    transform_statements(&mut ExpandTypedDictionaryDeclarations, source)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ast::access::Reference;
    use crate::ast::nodes::DictionaryEntry;
    use crate::source::Handle;
    use crate::test_support::*;

    fn canonical(target: &str, name: &str, total: bool, fields: Vec<(&str, Expression)>) -> Statement {
        let kind = canonical_declaration(
            self::name(target),
            name,
            total,
            fields
                .into_iter()
                .map(|(field, annotation)| (field.to_string(), annotation))
                .collect(),
            Location::default(),
        );
        node(kind)
    }

    #[test]
    fn stub_typed_dict_define_becomes_a_special_form_binding() {
        let mut source = source(
            "mypy_extensions",
            vec![define("mypy_extensions.TypedDict", vec![], vec![pass()])],
        );
        source.handle = Handle::new("mypy_extensions.pyi");
        let expanded = replace_mypy_extensions_stub(source);
        let expected = node(StatementKind::Assign(Assign {
            target: name("mypy_extensions.TypedDict"),
            annotation: Some(name("typing._SpecialForm")),
            value: ellipsis(),
            parent: None,
        }));
        assert_eq!(expanded.statements, vec![expected]);
    }

    #[test]
    fn other_handles_are_untouched() {
        let statements = vec![define("module.TypedDict", vec![], vec![pass()])];
        let source = source("module", statements.clone());
        assert_eq!(replace_mypy_extensions_stub(source).statements, statements);
    }

    #[test]
    fn call_declaration_is_canonicalized() {
        let declaration = node(StatementKind::Assign(Assign {
            target: name("module.Movie"),
            annotation: None,
            value: call(
                "mypy_extensions.TypedDict",
                vec![
                    Argument::positional(string("Movie")),
                    Argument::positional(node(ExpressionKind::Dictionary {
                        entries: vec![
                            DictionaryEntry {
                                key: string("year"),
                                value: name("int"),
                            },
                            DictionaryEntry {
                                key: string("name"),
                                value: name("str"),
                            },
                        ],
                        keywords: vec![],
                    })),
                ],
            ),
            parent: None,
        }));
        let expanded =
            expand_typed_dictionary_declarations(source("module", vec![declaration]));
        assert_eq!(
            expanded.statements,
            vec![canonical(
                "module.Movie",
                "Movie",
                true,
                vec![("year", name("int")), ("name", name("str"))],
            )]
        );
    }

    #[test]
    fn explicit_totality_overrides_the_default() {
        let declaration = node(StatementKind::Assign(Assign {
            target: name("module.Movie"),
            annotation: None,
            value: call(
                "mypy_extensions.TypedDict",
                vec![
                    Argument::positional(string("Movie")),
                    Argument::positional(node(ExpressionKind::Dictionary {
                        entries: vec![],
                        keywords: vec![],
                    })),
                    Argument {
                        name: Some(node("$parameter$total".to_string())),
                        value: boolean(false),
                    },
                ],
            ),
            parent: None,
        }));
        let expanded =
            expand_typed_dictionary_declarations(source("module", vec![declaration]));
        assert_eq!(
            expanded.statements,
            vec![canonical("module.Movie", "Movie", false, vec![])]
        );
    }

    #[test]
    fn class_declaration_extracts_annotated_fields() {
        let body = vec![
            node(StatementKind::Assign(Assign {
                target: name("module.Movie.year"),
                annotation: Some(name("int")),
                value: ellipsis(),
                parent: Some(Reference::from_name("module.Movie")),
            })),
            pass(),
        ];
        let declaration = node(StatementKind::Class(Class {
            name: Reference::from_name("module.Movie"),
            bases: vec![Argument::positional(name("mypy_extensions.TypedDict"))],
            body,
            decorators: vec![],
            docstring: None,
        }));
        let expanded =
            expand_typed_dictionary_declarations(source("module", vec![declaration]));
        assert_eq!(
            expanded.statements,
            vec![canonical(
                "module.Movie",
                "Movie",
                true,
                vec![("year", name("int"))],
            )]
        );
    }

    #[test]
    fn canonical_form_is_stable_under_reexpansion() {
        let declaration = canonical("module.Movie", "Movie", true, vec![("year", name("int"))]);
        let expanded =
            expand_typed_dictionary_declarations(source("module", vec![declaration.clone()]));
        assert_eq!(expanded.statements, vec![declaration]);
    }

    #[test]
    fn unrelated_defines_survive() {
        let statements = vec![define("module.f", vec![], vec![pass()])];
        let expanded =
            expand_typed_dictionary_declarations(source("module", statements.clone()));
        assert_eq!(expanded.statements, statements);
    }
}
