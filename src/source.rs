use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};

use crate::ast::access::{Identifier, Reference};
use crate::ast::location::HandleKey;
use crate::ast::node::Node;
use crate::ast::nodes::{Class, Define, Statement, StatementKind};
use crate::ast::visitor::{statements_pruned, Statements};

/// The relative path identifying a source file. Locations refer to handles
/// through a stable hash key; the `Handles` table maps keys back.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Handle(String);

impl Handle {
    pub fn new(path: impl Into<String>) -> Self {
        Handle(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    pub fn key(&self) -> HandleKey {
        let mut hasher = FxHasher::default();
        self.0.hash(&mut hasher);
        hasher.finish()
    }

    /// Stub files carry declarations only.
    pub fn is_stub(&self) -> bool {
        self.0.ends_with(".pyi")
    }

    /// Whether the handle names a package `__init__` module, in which case
    /// the source's qualifier is the package itself.
    pub fn is_init(&self) -> bool {
        let stem = self
            .0
            .rsplit('/')
            .next()
            .and_then(|name| name.split('.').next());
        stem == Some("__init__")
    }
}

/// Host-populated mode flags for a source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    pub autogenerated: bool,
    pub strict: bool,
    pub debug: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Source {
    pub handle: Handle,
    pub qualifier: Reference,
    pub statements: Vec<Statement>,
    pub metadata: Metadata,
}

/// Selection knobs for `Source::defines`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefinesOptions {
    /// Keep defines whose body is nothing but `pass`/`...`/`raise`.
    pub include_stubs: bool,
    /// Descend into function bodies for nested defines.
    pub include_nested: bool,
    /// Prepend a synthetic `$toplevel` define wrapping the module body.
    pub extract_into_toplevel: bool,
}

impl Source {
    pub fn new(handle: Handle, qualifier: Reference, statements: Vec<Statement>) -> Self {
        Source {
            handle,
            qualifier,
            statements,
            metadata: Metadata::default(),
        }
    }

    /// Lazy pre-order iterator over all statements, nested blocks included.
    pub fn all_statements(&self) -> Statements<'_, impl FnMut(&Statement) -> bool> {
        statements_pruned(&self.statements, |_| false)
    }

    /// All defines in the source. Methods are always included; descent into
    /// function bodies and stub filtering follow `options`.
    pub fn defines(&self, options: DefinesOptions) -> Vec<Node<Define>> {
        let mut defines: Vec<Node<Define>> = Vec::new();
        if options.extract_into_toplevel {
            defines.push(Node::new(
                Default::default(),
                Define {
                    name: self.qualifier.child("$toplevel"),
                    parameters: vec![],
                    body: self.statements.clone(),
                    decorators: vec![],
                    return_annotation: None,
                    is_async: false,
                    parent: None,
                    docstring: None,
                },
            ));
        }
        let statements = statements_pruned(&self.statements, |statement| {
            !options.include_nested && matches!(statement.node, StatementKind::Define(_))
        });
        for statement in statements {
            if let StatementKind::Define(define) = &statement.node {
                if options.include_stubs || !define.is_stub() {
                    defines.push(statement.clone().map(|node| match node {
                        StatementKind::Define(define) => define,
                        _ => unreachable!("filtered to defines"),
                    }));
                }
            }
        }
        defines
    }

    /// All class statements in the source, at any depth.
    pub fn classes(&self) -> Vec<Node<Class>> {
        self.all_statements()
            .filter(|statement| matches!(statement.node, StatementKind::Class(_)))
            .map(|statement| {
                statement.clone().map(|node| match node {
                    StatementKind::Class(class) => class,
                    _ => unreachable!("filtered to classes"),
                })
            })
            .collect()
    }

    /// Map from reversed qualified names to the local form the source
    /// imported them under; used to render qualified names back to the
    /// user's spelling. The source's own qualifier maps to the empty
    /// reference.
    pub fn dequalify_map(&self) -> FxHashMap<Reference, Reference> {
        let mut map = FxHashMap::default();
        map.insert(self.qualifier.reversed(), Reference::empty());
        for statement in self.all_statements() {
            let StatementKind::Import(import) = &statement.node else {
                continue;
            };
            if import.level > 0 {
                continue;
            }
            for entry in &import.imports {
                let qualified = match &import.from {
                    Some(from) => from.node.join(&entry.name),
                    None => entry.name.clone(),
                };
                let local: Reference = match (&entry.alias, &import.from) {
                    (Some(alias), _) => Reference::new(vec![alias.clone()]),
                    (None, Some(_)) => entry.name.clone(),
                    // `import a.b` keeps its dotted spelling.
                    (None, None) => continue,
                };
                map.insert(qualified.reversed(), local);
            }
        }
        map
    }
}

/// Exported names of a module, as published by the host's module indexer.
pub type Exports = Vec<Identifier>;
