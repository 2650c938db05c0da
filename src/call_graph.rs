//! Call-graph construction over a normalized source: call sites resolve to
//! concrete callables through the per-statement resolutions the checker
//! published, overrides derive from the environment's class hierarchy, and
//! the edge set partitions into strongly-connected components for fixpoint
//! scheduling.

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::ast::access::{Access, Reference};
use crate::ast::node::Node;
use crate::ast::nodes::{Define, Expression, ExpressionKind, Statement, StatementKind};
use crate::ast::visitor::{statements_pruned, walk_expression, walk_statement, Visitor};
use crate::environment::{CallableKind, Environment, ResolutionKey, ResolvedElement};
use crate::source::{DefinesOptions, Source};

/// Caller to callees, in discovery order.
pub type Edges = IndexMap<Reference, Vec<Reference>>;

/// Accesses whose terminal element is a call, across one statement's own
/// expressions. Nested statements collect separately under their own
/// statement index.
struct CallSites<'a> {
    accesses: Vec<&'a Access>,
}

impl<'a> Visitor<'a> for CallSites<'a> {
    fn visit_statement(&mut self, _statement: &'a Statement) {}

    fn visit_expression(&mut self, expression: &'a Expression) {
        match &expression.node {
            ExpressionKind::Access(access)
                if access.last().is_some_and(|element| element.is_call()) =>
            {
                self.accesses.push(access);
            }
            ExpressionKind::ExpressionAccess { access, .. }
                if access.last().is_some_and(|element| element.is_call()) =>
            {
                self.accesses.push(access);
            }
            _ => {}
        }
        walk_expression(self, expression);
    }
}

fn call_sites(statement: &Statement) -> Vec<&Access> {
    let mut visitor = CallSites { accesses: vec![] };
    walk_statement(&mut visitor, statement);
    visitor.accesses
}

fn callees(environment: &dyn Environment, define: &Node<Define>) -> Vec<Reference> {
    let mut callees: Vec<Reference> = Vec::new();
    let statements = statements_pruned(&define.node.body, |statement| {
        matches!(
            statement.node,
            StatementKind::Define(_) | StatementKind::Class(_)
        )
    });
    for (statement_index, statement) in statements.enumerate() {
        let key = ResolutionKey {
            node_id: define.id,
            statement_index,
        };
        let Some(resolution) = environment.resolution(key) else {
            continue;
        };
        for access in call_sites(statement) {
            let Some(ResolvedElement::Signature(signature)) = resolution.last_element(access)
            else {
                continue;
            };
            if let CallableKind::Named(name) = &signature.callable.kind {
                if !callees.contains(name) {
                    callees.push(name.clone());
                }
            }
        }
    }
    callees
}

pub struct CallGraph;

impl CallGraph {
    /// One vertex per define with at least one resolvable call; one edge
    /// per (caller, callee) pair.
    pub fn create(environment: &dyn Environment, source: &Source) -> Edges {
        let defines = source.defines(DefinesOptions {
            include_stubs: true,
            include_nested: true,
            extract_into_toplevel: false,
        });
        let mut edges = Edges::default();
        for define in &defines {
            let callees = callees(environment, define);
            if !callees.is_empty() {
                edges.insert(define.node.name.clone(), callees);
            }
        }
        edges
    }

    /// Strongly-connected components of the edge set, leaves of the
    /// reversed call relation first; within a component, members keep the
    /// order the discovery walk first reached them in.
    pub fn partition(edges: &Edges) -> Vec<Vec<Reference>> {
        let mut graph: DiGraph<Reference, ()> = DiGraph::new();
        let mut indices: IndexMap<Reference, NodeIndex> = IndexMap::new();
        let mut index_of = |graph: &mut DiGraph<Reference, ()>, node: &Reference| {
            *indices
                .entry(node.clone())
                .or_insert_with(|| graph.add_node(node.clone()))
        };
        for (caller, callees) in edges {
            let caller = index_of(&mut graph, caller);
            for callee in callees {
                let callee = index_of(&mut graph, callee);
                // The partition orders callers ahead of their callees, so
                // the components are computed over the reversed relation.
                graph.add_edge(callee, caller, ());
            }
        }
        let mut walk = ComponentWalk::new(graph.node_count());
        for node in graph.node_indices() {
            if walk.discovery[node.index()].is_none() {
                walk.visit(&graph, node);
            }
        }
        walk.components
            .into_iter()
            .map(|component| {
                component
                    .into_iter()
                    .map(|index| graph[index].clone())
                    .collect()
            })
            .collect()
    }
}

/// Tarjan's walk with explicit discovery indices: components pop in
/// reverse topological order, and unwinding each component's stack slice
/// recovers the first-visit order of its members.
struct ComponentWalk {
    counter: usize,
    discovery: Vec<Option<usize>>,
    lowlinks: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<NodeIndex>,
    components: Vec<Vec<NodeIndex>>,
}

impl ComponentWalk {
    fn new(nodes: usize) -> Self {
        ComponentWalk {
            counter: 0,
            discovery: vec![None; nodes],
            lowlinks: vec![0; nodes],
            on_stack: vec![false; nodes],
            stack: Vec::new(),
            components: Vec::new(),
        }
    }

    fn visit(&mut self, graph: &DiGraph<Reference, ()>, node: NodeIndex) {
        let id = node.index();
        let discovered = self.counter;
        self.counter += 1;
        self.discovery[id] = Some(discovered);
        self.lowlinks[id] = discovered;
        self.stack.push(node);
        self.on_stack[id] = true;
        for neighbor in graph.neighbors(node) {
            let neighbor_id = neighbor.index();
            match self.discovery[neighbor_id] {
                None => {
                    self.visit(graph, neighbor);
                    self.lowlinks[id] = self.lowlinks[id].min(self.lowlinks[neighbor_id]);
                }
                Some(discovery) if self.on_stack[neighbor_id] => {
                    self.lowlinks[id] = self.lowlinks[id].min(discovery);
                }
                Some(_) => {}
            }
        }
        if self.lowlinks[id] == discovered {
            let mut component = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack[member.index()] = false;
                component.push(member);
                if member == node {
                    break;
                }
            }
            // Popping yields reverse discovery order.
            component.reverse();
            self.components.push(component);
        }
    }
}

/// For each method of each class in the source, the immediate subclass
/// methods overriding it.
pub fn overrides_of_source(
    environment: &dyn Environment,
    source: &Source,
) -> IndexMap<Reference, Vec<Reference>> {
    let mut overrides = IndexMap::new();
    for class in source.classes() {
        let subclasses = environment.subclasses(&class.node.name);
        if subclasses.is_empty() {
            continue;
        }
        for statement in &class.node.body {
            let StatementKind::Define(define) = &statement.node else {
                continue;
            };
            let Some(method) = define.name.last() else {
                continue;
            };
            let overriding: Vec<Reference> = subclasses
                .iter()
                .filter(|subclass| environment.defines_method(subclass, method))
                .map(|subclass| subclass.child(method))
                .collect();
            if !overriding.is_empty() {
                overrides.insert(class.node.name.child(method), overriding);
            }
        }
    }
    overrides
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::environment::{Resolution, ResolutionTable, Signature};
    use crate::test_support::*;

    fn reference(name: &str) -> Reference {
        Reference::from_name(name)
    }

    #[test]
    fn partition_groups_mutually_recursive_components() {
        let mut edges = Edges::default();
        edges.insert(reference("c1"), vec![reference("c2")]);
        edges.insert(reference("c2"), vec![reference("c1")]);
        edges.insert(reference("c3"), vec![reference("c4"), reference("c1")]);
        edges.insert(reference("c4"), vec![reference("c3")]);
        edges.insert(reference("c5"), vec![reference("c5")]);
        assert_eq!(
            CallGraph::partition(&edges),
            vec![
                vec![reference("c3"), reference("c4")],
                vec![reference("c1"), reference("c2")],
                vec![reference("c5")],
            ]
        );
    }

    #[test]
    fn partition_keeps_discovery_order_within_a_component() {
        let mut edges = Edges::default();
        edges.insert(reference("a"), vec![reference("b")]);
        edges.insert(reference("c"), vec![reference("a")]);
        edges.insert(reference("b"), vec![reference("c")]);
        // On the reversed relation the walk reaches a, then c, then b,
        // diverging from the a, b, c vertex-creation order.
        assert_eq!(
            CallGraph::partition(&edges),
            vec![vec![reference("a"), reference("c"), reference("b")]]
        );
    }

    #[test]
    fn partition_orders_callers_before_callees() {
        let mut edges = Edges::default();
        edges.insert(reference("a"), vec![reference("b")]);
        edges.insert(reference("b"), vec![reference("c")]);
        assert_eq!(
            CallGraph::partition(&edges),
            vec![
                vec![reference("a")],
                vec![reference("b")],
                vec![reference("c")],
            ]
        );
    }

    #[test]
    fn duplicate_call_sites_collapse_to_one_edge() {
        let body = vec![
            expression_statement(call("$parameter$self.bar", vec![])),
            expression_statement(call("$parameter$self.bar", vec![])),
        ];
        let source = source(
            "test",
            vec![class("Foo", vec![], vec![define("quux", vec![], body)])],
        );
        let defines = source.defines(DefinesOptions {
            include_stubs: true,
            include_nested: true,
            extract_into_toplevel: false,
        });
        let define = &defines[0];

        let mut environment = ResolutionTable::new();
        let call_access = match &call("$parameter$self.bar", vec![]).node {
            ExpressionKind::Access(access) => access.clone(),
            _ => unreachable!(),
        };
        for statement_index in 0..2 {
            let mut resolution = Resolution::new();
            resolution.add(
                call_access.clone(),
                ResolvedElement::Signature(Signature::named("Foo.bar")),
            );
            environment.add_resolution(
                ResolutionKey {
                    node_id: define.id,
                    statement_index,
                },
                resolution,
            );
        }

        let edges = CallGraph::create(&environment, &source);
        let mut expected = Edges::default();
        expected.insert(reference("quux"), vec![reference("Foo.bar")]);
        assert_eq!(edges, expected);
    }
}
