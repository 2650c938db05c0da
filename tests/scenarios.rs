//! End-to-end scenarios: sources run through the full normalization
//! pipeline, a hand-populated resolution store stands in for the checker,
//! and the call-graph engine reads both.

use pretty_assertions::assert_eq;

use perch::ast::access::{Access, Argument, Element, Reference};
use perch::ast::location::{Location, Position};
use perch::ast::node::Node;
use perch::ast::nodes::{
    Class, ComparisonOperator, Define, Expression, ExpressionKind, If, Import, ImportEntry,
    Parameter, ParameterData, Return, Statement, StatementKind,
};
use perch::call_graph::{overrides_of_source, CallGraph, Edges};
use perch::environment::{Resolution, ResolutionKey, ResolutionTable, ResolvedElement, Signature};
use perch::normalize::Preprocessor;
use perch::parser::{Parse, ParseError};
use perch::source::{DefinesOptions, Handle, Source};
use perch::tables::ModuleTable;

/// Dotted names are all the pipeline re-parses in these scenarios.
struct DottedParser;

impl Parse for DottedParser {
    fn parse(
        &self,
        text: &str,
        start: Position,
        _handle: &Handle,
    ) -> Result<Vec<Statement>, ParseError> {
        let text = text.trim();
        let valid = !text.is_empty()
            && text.split('.').all(|part| {
                !part.is_empty()
                    && part
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
            });
        if !valid {
            return Err(ParseError::new("unsupported fragment", start));
        }
        let location = Location::new(0, start, start);
        Ok(vec![Node::new(
            location,
            StatementKind::Expression(Node::new(
                location,
                ExpressionKind::Access(Access::from_name(text)),
            )),
        )])
    }
}

fn node<T>(value: T) -> Node<T> {
    Node::new(Location::default(), value)
}

fn name(name: &str) -> Expression {
    node(ExpressionKind::Access(Access::from_name(name)))
}

fn call(target: &str, arguments: Vec<Argument>) -> Expression {
    let mut access = Access::from_name(target);
    access.push(Element::Call(node(arguments)));
    node(ExpressionKind::Access(access))
}

fn call_access(expression: &Expression) -> Access {
    match &expression.node {
        ExpressionKind::Access(access) => access.clone(),
        _ => panic!("expected an access"),
    }
}

fn expression_statement(expression: Expression) -> Statement {
    node(StatementKind::Expression(expression))
}

fn assign(target: &str, value: Expression) -> Statement {
    node(StatementKind::Assign(perch::ast::nodes::Assign {
        target: name(target),
        annotation: None,
        value,
        parent: None,
    }))
}

fn return_some(expression: Expression) -> Statement {
    node(StatementKind::Return(Return {
        expression: Some(expression),
        is_implicit: false,
    }))
}

fn parameter(name: &str) -> Parameter {
    node(ParameterData {
        name: name.to_string(),
        annotation: None,
        value: None,
    })
}

fn method(name: &str, body: Vec<Statement>) -> Statement {
    node(StatementKind::Define(Define {
        name: Reference::from_name(name),
        parameters: vec![parameter("self")],
        body,
        decorators: vec![],
        return_annotation: None,
        is_async: false,
        parent: None,
        docstring: None,
    }))
}

fn class(name: &str, body: Vec<Statement>) -> Statement {
    node(StatementKind::Class(Class {
        name: Reference::from_name(name),
        bases: vec![],
        body,
        decorators: vec![],
        docstring: None,
    }))
}

fn preprocess(qualifier: &str, statements: Vec<Statement>) -> Source {
    let handle = if qualifier.is_empty() {
        Handle::new("test.py")
    } else {
        Handle::new(format!("{}.py", qualifier.replace('.', "/")))
    };
    let source = Source::new(handle, Reference::from_name(qualifier), statements);
    let parser = DottedParser;
    let modules = ModuleTable::new();
    Preprocessor::new(&parser, &modules).preprocess(source)
}

fn define_named(source: &Source, name: &str) -> Node<Define> {
    source
        .defines(DefinesOptions {
            include_stubs: true,
            include_nested: true,
            extract_into_toplevel: false,
        })
        .into_iter()
        .find(|define| define.node.name.to_string() == name)
        .unwrap_or_else(|| panic!("no define named {name}"))
}

fn resolve_calls(
    environment: &mut ResolutionTable,
    define: &Node<Define>,
    resolutions: &[(usize, Access, &str)],
) {
    for (statement_index, access, callable) in resolutions {
        let mut resolution = Resolution::new();
        resolution.add(
            access.clone(),
            ResolvedElement::Signature(Signature::named(callable)),
        );
        environment.add_resolution(
            ResolutionKey {
                node_id: define.id,
                statement_index: *statement_index,
            },
            resolution,
        );
    }
}

fn edges(pairs: &[(&str, &[&str])]) -> Edges {
    let mut edges = Edges::default();
    for (caller, callees) in pairs {
        edges.insert(
            Reference::from_name(caller),
            callees
                .iter()
                .map(|callee| Reference::from_name(callee))
                .collect(),
        );
    }
    edges
}

#[test]
fn construction_edge() {
    // class Foo:
    //     def __init__(self): pass
    //     def bar(self): return 10
    //     def quux(self): return self.bar()
    let source = preprocess(
        "",
        vec![class(
            "Foo",
            vec![
                method("__init__", vec![node(StatementKind::Pass)]),
                method(
                    "bar",
                    vec![return_some(node(ExpressionKind::Integer(10.into())))],
                ),
                method("quux", vec![return_some(call("self.bar", vec![]))]),
            ],
        )],
    );
    let quux = define_named(&source, "Foo.quux");
    let mut environment = ResolutionTable::new();
    resolve_calls(
        &mut environment,
        &quux,
        &[(
            0,
            call_access(&call("$parameter$self.bar", vec![])),
            "Foo.bar",
        )],
    );
    assert_eq!(
        CallGraph::create(&environment, &source),
        edges(&[("Foo.quux", &["Foo.bar"])])
    );
}

#[test]
fn mutual_recursion_forms_one_component() {
    let source = preprocess(
        "",
        vec![class(
            "Foo",
            vec![
                method("bar", vec![return_some(call("self.quux", vec![]))]),
                method("quux", vec![return_some(call("self.bar", vec![]))]),
            ],
        )],
    );
    let bar = define_named(&source, "Foo.bar");
    let quux = define_named(&source, "Foo.quux");
    let mut environment = ResolutionTable::new();
    resolve_calls(
        &mut environment,
        &bar,
        &[(
            0,
            call_access(&call("$parameter$self.quux", vec![])),
            "Foo.quux",
        )],
    );
    resolve_calls(
        &mut environment,
        &quux,
        &[(
            0,
            call_access(&call("$parameter$self.bar", vec![])),
            "Foo.bar",
        )],
    );
    let graph = CallGraph::create(&environment, &source);
    assert_eq!(
        graph,
        edges(&[("Foo.bar", &["Foo.quux"]), ("Foo.quux", &["Foo.bar"])])
    );
    assert_eq!(
        CallGraph::partition(&graph),
        vec![vec![
            Reference::from_name("Foo.bar"),
            Reference::from_name("Foo.quux"),
        ]]
    );
}

#[test]
fn constructor_dependency() {
    // class A: def __init__(self) -> A: return self
    // class B: def __init__(self) -> A: return A()
    let source = preprocess(
        "",
        vec![
            class("A", vec![method("__init__", vec![return_some(name("self"))])]),
            class(
                "B",
                vec![method("__init__", vec![return_some(call("A", vec![]))])],
            ),
        ],
    );
    let init = define_named(&source, "B.__init__");
    let mut environment = ResolutionTable::new();
    resolve_calls(
        &mut environment,
        &init,
        &[(0, call_access(&call("A", vec![])), "A.__init__")],
    );
    assert_eq!(
        CallGraph::create(&environment, &source),
        edges(&[("B.__init__", &["A.__init__"])])
    );
}

#[test]
fn assignment_retypes_the_receiver() {
    // class X:
    //     def caller(self):
    //         a = A()
    //         a.foo()
    //         a = B()
    //         a.foo()
    let source = preprocess(
        "test1",
        vec![
            class("A", vec![method("foo", vec![return_some(name("self"))])]),
            class("B", vec![method("foo", vec![return_some(name("self"))])]),
            class(
                "X",
                vec![method(
                    "caller",
                    vec![
                        assign("a", call("A", vec![])),
                        expression_statement(call("a.foo", vec![])),
                        assign("a", call("B", vec![])),
                        expression_statement(call("a.foo", vec![])),
                    ],
                )],
            ),
        ],
    );
    let caller = define_named(&source, "test1.X.caller");
    let local = "$local_test1?X?caller$a";
    let receiver_call = call_access(&call(&format!("{local}.foo"), vec![]));
    let mut environment = ResolutionTable::new();
    resolve_calls(
        &mut environment,
        &caller,
        &[
            (1, receiver_call.clone(), "test1.A.foo"),
            (3, receiver_call.clone(), "test1.B.foo"),
        ],
    );
    // The local rebinding is visible in the normalized body.
    let StatementKind::Expression(second_call) = &caller.node.body[1].node else {
        panic!("expected an expression statement");
    };
    assert_eq!(call_access(second_call), receiver_call);
    assert_eq!(
        CallGraph::create(&environment, &source),
        edges(&[("test1.X.caller", &["test1.A.foo", "test1.B.foo"])])
    );
}

#[test]
fn chained_calls_resolve_the_terminal_method() {
    // B().foo() returns an A; the trailing call dispatches on the A.
    let source = preprocess(
        "test2",
        vec![
            class("A", vec![method("foo", vec![return_some(name("self"))])]),
            class("B", vec![method("foo", vec![return_some(call("A", vec![]))])]),
            node(StatementKind::Define(Define {
                name: Reference::from_name("caller"),
                parameters: vec![],
                body: vec![expression_statement({
                    let mut chain = Access::from_name("B");
                    chain.push(Element::Call(node(vec![])));
                    chain.push(Element::Identifier("foo".to_string()));
                    chain.push(Element::Call(node(vec![])));
                    node(ExpressionKind::Access(chain))
                })],
                decorators: vec![],
                return_annotation: None,
                is_async: false,
                parent: None,
                docstring: None,
            })),
        ],
    );
    let caller = define_named(&source, "test2.caller");
    let StatementKind::Expression(chain) = &caller.node.body[0].node else {
        panic!("expected an expression statement");
    };
    let chain_access = call_access(chain);
    let mut environment = ResolutionTable::new();
    resolve_calls(
        &mut environment,
        &caller,
        &[(0, chain_access, "test2.A.foo")],
    );
    assert_eq!(
        CallGraph::create(&environment, &source),
        edges(&[("test2.caller", &["test2.A.foo"])])
    );
}

#[test]
fn override_map_lists_direct_overrides() {
    let source = preprocess(
        "",
        vec![
            class("Foo", vec![method("foo", vec![node(StatementKind::Pass)])]),
            class("Bar", vec![method("foo", vec![node(StatementKind::Pass)])]),
            class("Quux", vec![method("foo", vec![node(StatementKind::Pass)])]),
            class("Baz", vec![method("foo", vec![node(StatementKind::Pass)])]),
        ],
    );
    let mut environment = ResolutionTable::new();
    let foo = Reference::from_name("Foo");
    let bar = Reference::from_name("Bar");
    let quux = Reference::from_name("Quux");
    let baz = Reference::from_name("Baz");
    environment.add_subclass(&foo, &bar);
    environment.add_subclass(&foo, &quux);
    environment.add_subclass(&bar, &baz);
    for class in [&bar, &quux, &baz] {
        environment.add_method(class, "foo");
    }
    let overrides = overrides_of_source(&environment, &source);
    assert_eq!(
        overrides.get(&Reference::from_name("Foo.foo")),
        Some(&vec![
            Reference::from_name("Bar.foo"),
            Reference::from_name("Quux.foo"),
        ])
    );
    assert_eq!(
        overrides.get(&Reference::from_name("Bar.foo")),
        Some(&vec![Reference::from_name("Baz.foo")])
    );
    assert_eq!(overrides.len(), 2);
}

#[test]
fn scc_partition_orders_leaves_of_the_reversed_relation_first() {
    let graph = edges(&[
        ("c1", &["c2"]),
        ("c2", &["c1"]),
        ("c3", &["c4", "c1"]),
        ("c4", &["c3"]),
        ("c5", &["c5"]),
    ]);
    assert_eq!(
        CallGraph::partition(&graph),
        vec![
            vec![Reference::from_name("c3"), Reference::from_name("c4")],
            vec![Reference::from_name("c1"), Reference::from_name("c2")],
            vec![Reference::from_name("c5")],
        ]
    );
}

#[test]
fn preprocessing_is_idempotent() {
    let statements = vec![
        node(StatementKind::Import(Import {
            from: Some(node(Reference::from_name("collections"))),
            level: 0,
            imports: vec![ImportEntry {
                name: Reference::from_name("OrderedDict"),
                alias: Some("OD".to_string()),
            }],
        })),
        node(StatementKind::If(If {
            test: node(ExpressionKind::ComparisonOperator {
                left: Box::new(name("sys.version_info")),
                operator: ComparisonOperator::GreaterThanOrEquals,
                right: Box::new(node(ExpressionKind::Tuple(vec![
                    node(ExpressionKind::Integer(3.into())),
                    node(ExpressionKind::Integer(6.into())),
                ]))),
            }),
            body: vec![assign("chosen", name("OD"))],
            orelse: vec![],
        })),
        class(
            "Widget",
            vec![
                assign("kind", name("chosen")),
                method("label", vec![return_some(call("self.render", vec![]))]),
            ],
        ),
        node(StatementKind::Define(Define {
            name: Reference::from_name("run"),
            parameters: vec![parameter("widget")],
            body: vec![assign("result", call("widget.label", vec![]))],
            decorators: vec![],
            return_annotation: None,
            is_async: false,
            parent: None,
            docstring: None,
        })),
    ];
    let once = preprocess("pkg.mod", statements);
    let parser = DottedParser;
    let modules = ModuleTable::new();
    let twice = Preprocessor::new(&parser, &modules).preprocess(once.clone());
    assert_eq!(once.statements, twice.statements);
}

#[test]
fn try_preprocess_defers_unindexed_wildcards() {
    let star = node(StatementKind::Import(Import {
        from: Some(node(Reference::from_name("missing"))),
        level: 0,
        imports: vec![ImportEntry {
            name: Reference::from_name("*"),
            alias: None,
        }],
    }));
    let source = Source::new(
        Handle::new("test.py"),
        Reference::from_name("test"),
        vec![star.clone()],
    );
    let parser = DottedParser;
    let modules = ModuleTable::new();
    let preprocessor = Preprocessor::new(&parser, &modules);
    assert_eq!(preprocessor.try_preprocess(source.clone()), None);
    // Forced preprocessing keeps the star in place.
    let forced = preprocessor.preprocess(source);
    assert_eq!(forced.statements, vec![star]);
}
