use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::access::{Access, Identifier, Reference};
use crate::ast::node::NodeId;

/// Key of a per-statement resolution: the define node holding the statement
/// and the statement's pre-order index within the define body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResolutionKey {
    pub node_id: NodeId,
    pub statement_index: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CallableKind {
    /// A callable with a known fully-qualified name; these become
    /// call-graph vertices.
    Named(Reference),
    Anonymous,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Callable {
    pub kind: CallableKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    pub callable: Callable,
}

impl Signature {
    pub fn named(name: &str) -> Self {
        Signature {
            callable: Callable {
                kind: CallableKind::Named(Reference::from_name(name)),
            },
        }
    }

    pub fn anonymous() -> Self {
        Signature {
            callable: Callable {
                kind: CallableKind::Anonymous,
            },
        }
    }
}

/// The resolved type of walking an access, as published by the checker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedElement {
    Signature(Signature),
    Attribute,
    Value,
}

/// Per-statement access-to-type map published by the type checker.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolution {
    access_types: FxHashMap<Access, ResolvedElement>,
}

impl Resolution {
    pub fn new() -> Self {
        Resolution::default()
    }

    pub fn add(&mut self, access: Access, element: ResolvedElement) {
        self.access_types.insert(access, element);
    }

    /// The type of the last element of the given access chain.
    pub fn last_element(&self, access: &Access) -> Option<&ResolvedElement> {
        self.access_types.get(access)
    }
}

/// Read-only view of the type environment consumed by the call-graph
/// engine. Populated by the checker before the engine runs on a source;
/// running both concurrently on one source is undefined.
pub trait Environment {
    fn resolution(&self, key: ResolutionKey) -> Option<&Resolution>;

    /// Immediate subclasses of a class, across all indexed sources.
    fn subclasses(&self, class: &Reference) -> Vec<Reference>;

    /// Whether the class body declares a method of the given name.
    fn defines_method(&self, class: &Reference, method: &str) -> bool;
}

/// In-memory environment with the populate-then-freeze lifecycle, usable by
/// hosts and tests.
#[derive(Clone, Debug, Default)]
pub struct ResolutionTable {
    resolutions: FxHashMap<ResolutionKey, Resolution>,
    subclasses: FxHashMap<Reference, Vec<Reference>>,
    methods: FxHashMap<Reference, FxHashSet<Identifier>>,
}

impl ResolutionTable {
    pub fn new() -> Self {
        ResolutionTable::default()
    }

    pub fn add_resolution(&mut self, key: ResolutionKey, resolution: Resolution) {
        self.resolutions.insert(key, resolution);
    }

    pub fn add_subclass(&mut self, class: &Reference, subclass: &Reference) {
        self.subclasses
            .entry(class.clone())
            .or_default()
            .push(subclass.clone());
    }

    pub fn add_method(&mut self, class: &Reference, method: &str) {
        self.methods
            .entry(class.clone())
            .or_default()
            .insert(method.to_string());
    }
}

impl Environment for ResolutionTable {
    fn resolution(&self, key: ResolutionKey) -> Option<&Resolution> {
        self.resolutions.get(&key)
    }

    fn subclasses(&self, class: &Reference) -> Vec<Reference> {
        self.subclasses.get(class).cloned().unwrap_or_default()
    }

    fn defines_method(&self, class: &Reference, method: &str) -> bool {
        self.methods
            .get(class)
            .is_some_and(|methods| methods.contains(method))
    }
}
