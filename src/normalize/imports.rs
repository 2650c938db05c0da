//! Import-shape passes: relative-import resolution, `TYPE_CHECKING` block
//! splicing, and wildcard-import expansion against the module-export table.

use crate::ast::access::Reference;
use crate::ast::node::Node;
use crate::ast::nodes::{Import, ImportEntry, Statement, StatementKind};
use crate::ast::transformer::{transform_statements, StatementTransformer};
use crate::normalize::MissingWildcardImport;
use crate::source::Source;
use crate::tables::ModuleExports;

/// Modules whose imports stay untouched by import rewriting and alias
/// installation.
pub(crate) fn is_builtins(module: &Reference) -> bool {
    let components: Vec<&str> = module.components().iter().map(String::as_str).collect();
    components == ["builtins"] || components == ["future", "builtins"]
}

struct ExpandRelativeImports {
    qualifier: Reference,
    is_init: bool,
}

impl StatementTransformer for ExpandRelativeImports {
    fn statement(&mut self, statement: Statement) -> Vec<Statement> {
        let Node { location, id, node } = statement;
        let node = match node {
            StatementKind::Import(Import {
                from,
                level,
                imports,
            }) if level > 0 && !from.as_ref().is_some_and(|from| is_builtins(&from.node)) => {
                // One dot names the enclosing package; each further dot
                // climbs one level. For an `__init__` module the qualifier
                // already is the package.
                let drops = if self.is_init { level - 1 } else { level };
                let kept = self.qualifier.len().saturating_sub(drops);
                let mut module = Reference::new(self.qualifier.components()[..kept].to_vec());
                if let Some(from) = &from {
                    module = module.join(&from.node);
                }
                let module = match from {
                    Some(from) => from.map(|_| module),
                    None => Node::new(location, module),
                };
                StatementKind::Import(Import {
                    from: Some(module),
                    level: 0,
                    imports,
                })
            }
            other => other,
        };
        vec![Node { location, id, node }]
    }
}

pub fn expand_relative_imports(source: Source) -> Source {
    let mut transformer = ExpandRelativeImports {
        qualifier: source.qualifier.clone(),
        is_init: source.handle.is_init(),
    };
    transform_statements(&mut transformer, source)
}

struct ExpandTypeCheckingImports;

impl StatementTransformer for ExpandTypeCheckingImports {
    fn statement(&mut self, statement: Statement) -> Vec<Statement> {
        match statement.node {
            StatementKind::If(if_)
                if if_
                    .test
                    .node
                    .as_access()
                    .is_some_and(|access| {
                        access.is_named("TYPE_CHECKING") || access.is_named("typing.TYPE_CHECKING")
                    }) =>
            {
                if_.body
            }
            node => vec![Node {
                location: statement.location,
                id: statement.id,
                node,
            }],
        }
    }
}

pub fn expand_type_checking_imports(source: Source) -> Source {
    transform_statements(&mut ExpandTypeCheckingImports, source)
}

fn is_star(entry: &ImportEntry) -> bool {
    entry.name.components().len() == 1 && entry.name.components()[0] == "*"
}

struct ExpandWildcardImports<'a> {
    modules: &'a dyn ModuleExports,
    force: bool,
    missing: Option<Reference>,
}

impl StatementTransformer for ExpandWildcardImports<'_> {
    fn statement(&mut self, statement: Statement) -> Vec<Statement> {
        let Node { location, id, node } = statement;
        let node = match node {
            StatementKind::Import(import)
                if import.from.is_some() && import.imports.iter().any(is_star) =>
            {
                let from = import.from.as_ref().unwrap();
                match self.modules.exports(&from.node) {
                    Some(exports) => {
                        let imports = exports
                            .into_iter()
                            .map(|export| ImportEntry {
                                name: Reference::new(vec![export]),
                                alias: None,
                            })
                            .collect();
                        StatementKind::Import(Import {
                            from: import.from,
                            level: import.level,
                            imports,
                        })
                    }
                    None => {
                        if !self.force && self.missing.is_none() {
                            self.missing = Some(from.node.clone());
                        }
                        StatementKind::Import(import)
                    }
                }
            }
            other => other,
        };
        vec![Node { location, id, node }]
    }
}

/// Expand `from M import *` from the export table. An unindexed module
/// either keeps its star (`force`) or fails the whole pass so callers can
/// defer the source.
pub fn expand_wildcard_imports(
    modules: &dyn ModuleExports,
    source: Source,
    force: bool,
) -> Result<Source, MissingWildcardImport> {
    let mut transformer = ExpandWildcardImports {
        modules,
        force,
        missing: None,
    };
    let source = transform_statements(&mut transformer, source);
    match transformer.missing {
        Some(import) => Err(MissingWildcardImport { import }),
        None => Ok(source),
    }
}
