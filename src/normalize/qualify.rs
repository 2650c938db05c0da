//! The qualify pass: every name is rewritten to its fully-qualified form, a
//! synthetic `$local_…$`/`$parameter$`/`$target$` name, or left alone as a
//! built-in or unbound name. Each lexical block is processed in two phases:
//! an explore walk registering forward aliases for the block's classes,
//! defines, and special-form bindings, then a left-to-right fold in which
//! every statement may mutate the scope seen by the ones after it.

use log::debug;
use once_cell::sync::Lazy;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::access::{
    sanitize_identifier, strip_leading_underscores, Access, Argument, Element, Identifier,
    Reference,
};
use crate::ast::location::Location;
use crate::ast::node::Node;
use crate::ast::nodes::{
    Assign, Class, Comprehension, Define, DictionaryEntry, Expression, ExpressionKind, For,
    Handler, If, Import, ImportEntry, Parameter, ParameterData, Return, Starred, Statement,
    StatementKind, StringKind, StringLiteral, Try, While, With,
};
use crate::ast::visitor::nested_bodies;
use crate::ast::Position;
use crate::normalize::imports::is_builtins;
use crate::parser::Parse;
use crate::source::{Handle, Source};

/// Decorators that rewire attribute access; qualifying them would break
/// the checker's descriptor handling.
static PRESERVED_DECORATORS: Lazy<FxHashSet<&'static str>> =
    Lazy::new(|| ["staticmethod", "classmethod", "property"].into_iter().collect());

const PRESERVED_DECORATOR_SUFFIXES: [&str; 3] = ["getter", "setter", "deleter"];

/// The canonical form a name rewrites to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alias {
    pub access: Access,
    pub qualifier: Reference,
    pub is_forward_reference: bool,
}

/// Scope of one lexical block during qualification.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    pub qualifier: Reference,
    pub aliases: FxHashMap<Identifier, Alias>,
    pub immutables: FxHashSet<Identifier>,
    pub locals: FxHashSet<Identifier>,
    pub use_forward_references: bool,
    pub is_top_level: bool,
    pub skip: FxHashSet<Location>,
}

impl Scope {
    fn module(qualifier: Reference) -> Self {
        Scope {
            qualifier,
            use_forward_references: true,
            is_top_level: true,
            ..Scope::default()
        }
    }

    fn block(&self, qualifier: Reference, use_forward_references: bool) -> Self {
        Scope {
            qualifier,
            aliases: self.aliases.clone(),
            immutables: self.immutables.clone(),
            locals: FxHashSet::default(),
            use_forward_references,
            is_top_level: false,
            skip: self.skip.clone(),
        }
    }

    fn alias_for(&self, name: &str) -> Option<&Alias> {
        self.aliases
            .get(name)
            .filter(|alias| !alias.is_forward_reference || self.use_forward_references)
    }

    fn add_alias(&mut self, name: Identifier, access: Access) {
        let alias = Alias {
            access,
            qualifier: self.qualifier.clone(),
            is_forward_reference: false,
        };
        self.aliases.insert(name, alias);
    }

    fn add_forward(&mut self, name: &str) {
        let alias = Alias {
            access: self.qualifier.child(name).into(),
            qualifier: self.qualifier.clone(),
            is_forward_reference: true,
        };
        self.aliases.insert(name.to_string(), alias);
    }

    /// Union of the branch scopes after a control-flow split; the first
    /// branch wins alias collisions.
    fn join(branches: Vec<Scope>) -> Scope {
        let mut branches = branches.into_iter();
        let mut joined = branches.next().expect("joining at least one branch");
        for branch in branches {
            for (name, alias) in branch.aliases {
                joined.aliases.entry(name).or_insert(alias);
            }
            joined.immutables.extend(branch.immutables);
            joined.locals.extend(branch.locals);
            joined.skip.extend(branch.skip);
        }
        joined
    }
}

fn single_name(reference: &Reference) -> Option<&str> {
    match reference.components() {
        [name] => Some(name),
        _ => None,
    }
}

/// Register forward aliases for the block's own declarations. Recurses into
/// structural statements but never into nested defines or classes.
fn explore_block(scope: &mut Scope, statements: &[Statement]) {
    for statement in statements {
        match &statement.node {
            StatementKind::Class(class) => {
                if let Some(name) = single_name(&class.name) {
                    scope.add_forward(name);
                }
            }
            StatementKind::Define(define) => {
                if let Some(name) = single_name(&define.name) {
                    scope.add_forward(name);
                }
            }
            StatementKind::Assign(assign) => {
                let is_special_form = assign.annotation.as_ref().is_some_and(|annotation| {
                    annotation
                        .node
                        .as_access()
                        .and_then(Access::last_identifier)
                        == Some("_SpecialForm")
                });
                if is_special_form {
                    if let Some(name) = assign
                        .target
                        .node
                        .as_access()
                        .filter(|access| access.elements().len() == 1)
                        .and_then(Access::last_identifier)
                    {
                        scope.add_forward(name);
                    }
                }
            }
            StatementKind::Global(names) => {
                scope.immutables.extend(names.iter().cloned());
            }
            StatementKind::For(_)
            | StatementKind::If(_)
            | StatementKind::Try(_)
            | StatementKind::While(_)
            | StatementKind::With(_) => {
                for block in nested_bodies(statement) {
                    explore_block(scope, block);
                }
            }
            _ => {}
        }
    }
}

struct QualifyContext<'a> {
    parser: &'a dyn Parse,
    handle: Handle,
}

pub fn qualify(parser: &dyn Parse, source: Source) -> Source {
    let Source {
        handle,
        qualifier,
        statements,
        metadata,
    } = source;
    let context = QualifyContext {
        parser,
        handle: handle.clone(),
    };
    let mut scope = Scope::module(qualifier.clone());
    explore_block(&mut scope, &statements);
    let statements = context.qualify_block(&mut scope, statements, None);
    Source {
        handle,
        qualifier,
        statements,
        metadata,
    }
}

impl QualifyContext<'_> {
    fn qualify_block(
        &self,
        scope: &mut Scope,
        statements: Vec<Statement>,
        class_parent: Option<&Reference>,
    ) -> Vec<Statement> {
        statements
            .into_iter()
            .map(|statement| self.qualify_statement(scope, statement, class_parent))
            .collect()
    }

    fn qualify_statement(
        &self,
        scope: &mut Scope,
        statement: Statement,
        class_parent: Option<&Reference>,
    ) -> Statement {
        let Node { location, id, node } = statement;
        let node = match node {
            StatementKind::Assign(Assign {
                target,
                annotation,
                value,
                parent,
            }) => {
                // The value sees the scope before the target rebinds it.
                let annotation = annotation.map(|annotation| self.qualify_annotation(scope, annotation));
                let value = self.qualify_expression(scope, value);
                let target = self.qualify_target(scope, target, class_parent);
                StatementKind::Assign(Assign {
                    target,
                    annotation,
                    value,
                    parent: class_parent.cloned().or(parent),
                })
            }
            StatementKind::Assert { test, message } => StatementKind::Assert {
                test: self.qualify_expression(scope, test),
                message: message.map(|message| self.qualify_expression(scope, message)),
            },
            StatementKind::Class(class) => StatementKind::Class(self.qualify_class(scope, class)),
            StatementKind::Define(define) => {
                StatementKind::Define(self.qualify_define(scope, define, class_parent))
            }
            StatementKind::Delete(expression) => {
                StatementKind::Delete(self.qualify_expression(scope, expression))
            }
            StatementKind::Expression(expression) => {
                StatementKind::Expression(self.qualify_expression(scope, expression))
            }
            StatementKind::For(For {
                target,
                iterator,
                body,
                orelse,
                is_async,
            }) => {
                let iterator = self.qualify_expression(scope, iterator);
                // Loop targets outlive the loop.
                let target = self.qualify_target(scope, target, None);
                let mut body_scope = scope.clone();
                let body = self.qualify_block(&mut body_scope, body, class_parent);
                let mut orelse_scope = scope.clone();
                let orelse = self.qualify_block(&mut orelse_scope, orelse, class_parent);
                *scope = Scope::join(vec![body_scope, orelse_scope]);
                StatementKind::For(For {
                    target,
                    iterator,
                    body,
                    orelse,
                    is_async,
                })
            }
            StatementKind::If(If { test, body, orelse }) => {
                let test = self.qualify_expression(scope, test);
                let mut body_scope = scope.clone();
                let body = self.qualify_block(&mut body_scope, body, class_parent);
                let mut orelse_scope = scope.clone();
                let orelse = self.qualify_block(&mut orelse_scope, orelse, class_parent);
                *scope = Scope::join(vec![body_scope, orelse_scope]);
                StatementKind::If(If { test, body, orelse })
            }
            StatementKind::Import(import) => {
                self.install_import_aliases(scope, &import);
                StatementKind::Import(import)
            }
            StatementKind::Nonlocal(names) => {
                scope.immutables.extend(names.iter().cloned());
                StatementKind::Nonlocal(names)
            }
            StatementKind::Raise(expression) => StatementKind::Raise(
                expression.map(|expression| self.qualify_expression(scope, expression)),
            ),
            StatementKind::Return(Return {
                expression,
                is_implicit,
            }) => StatementKind::Return(Return {
                expression: expression.map(|expression| self.qualify_expression(scope, expression)),
                is_implicit,
            }),
            StatementKind::Try(Try {
                body,
                handlers,
                orelse,
                finally,
            }) => {
                let mut body_scope = scope.clone();
                let body = self.qualify_block(&mut body_scope, body, class_parent);
                let mut branch_scopes = Vec::new();
                let mut qualified_handlers = Vec::with_capacity(handlers.len());
                for Handler { kind, name, body } in handlers {
                    let kind = kind.map(|kind| self.qualify_expression(scope, kind));
                    let mut handler_scope = scope.clone();
                    let name = name.map(|name| {
                        let sanitized = sanitize_identifier(&name);
                        let renamed = format!("$target${sanitized}");
                        handler_scope.add_alias(sanitized, Access::from_name(&renamed));
                        renamed
                    });
                    let body = self.qualify_block(&mut handler_scope, body, class_parent);
                    branch_scopes.push(handler_scope);
                    qualified_handlers.push(Handler { kind, name, body });
                }
                let mut orelse_scope = body_scope.clone();
                let orelse = self.qualify_block(&mut orelse_scope, orelse, class_parent);
                let mut finally_scope = scope.clone();
                let finally = self.qualify_block(&mut finally_scope, finally, class_parent);
                let mut scopes = vec![body_scope];
                scopes.extend(branch_scopes);
                scopes.push(orelse_scope);
                scopes.push(finally_scope);
                *scope = Scope::join(scopes);
                StatementKind::Try(Try {
                    body,
                    handlers: qualified_handlers,
                    orelse,
                    finally,
                })
            }
            StatementKind::While(While { test, body, orelse }) => {
                let test = self.qualify_expression(scope, test);
                let mut body_scope = scope.clone();
                let body = self.qualify_block(&mut body_scope, body, class_parent);
                let mut orelse_scope = scope.clone();
                let orelse = self.qualify_block(&mut orelse_scope, orelse, class_parent);
                *scope = Scope::join(vec![body_scope, orelse_scope]);
                StatementKind::While(While { test, body, orelse })
            }
            StatementKind::With(With {
                items,
                body,
                is_async,
            }) => {
                let mut qualified_items = Vec::with_capacity(items.len());
                for (item, target) in items {
                    let item = self.qualify_expression(scope, item);
                    let target = target.map(|target| self.qualify_target(scope, target, None));
                    qualified_items.push((item, target));
                }
                let body = self.qualify_block(scope, body, class_parent);
                StatementKind::With(With {
                    items: qualified_items,
                    body,
                    is_async,
                })
            }
            StatementKind::Yield(expression) => {
                StatementKind::Yield(self.qualify_expression(scope, expression))
            }
            StatementKind::YieldFrom(expression) => {
                StatementKind::YieldFrom(self.qualify_expression(scope, expression))
            }
            other @ (StatementKind::Break
            | StatementKind::Continue
            | StatementKind::Global(_)
            | StatementKind::Pass) => other,
        };
        Node { location, id, node }
    }

    /// Imports are kept verbatim; they only install aliases.
    fn install_import_aliases(&self, scope: &mut Scope, import: &Import) {
        match &import.from {
            Some(from) => {
                if is_builtins(&from.node) {
                    return;
                }
                for ImportEntry { name, alias } in &import.imports {
                    if name.components() == ["*"] {
                        continue;
                    }
                    let key = match alias {
                        Some(alias) => alias.clone(),
                        None => match single_name(name) {
                            Some(single) => single.to_string(),
                            None => continue,
                        },
                    };
                    scope.add_alias(key, from.node.join(name).into());
                }
            }
            None => {
                for ImportEntry { name, alias } in &import.imports {
                    if let Some(alias) = alias {
                        scope.add_alias(alias.clone(), name.clone().into());
                    }
                }
            }
        }
    }

    fn qualify_class(&self, scope: &mut Scope, class: Class) -> Class {
        let Class {
            name,
            bases,
            body,
            decorators,
            docstring,
        } = class;
        let qualified = match single_name(&name) {
            Some(single) => {
                let qualified = scope.qualifier.child(single);
                scope.add_alias(single.to_string(), qualified.clone().into());
                qualified
            }
            None => name,
        };
        let mut qualified_bases = Vec::with_capacity(bases.len());
        for Argument { name, value } in bases {
            qualified_bases.push(Argument {
                name,
                value: self.qualify_expression(scope, value),
            });
        }
        let decorators = decorators
            .into_iter()
            .map(|decorator| self.qualify_decorator(scope, decorator))
            .collect();
        let mut inner = scope.block(qualified.clone(), true);
        explore_block(&mut inner, &body);
        let body = self.qualify_block(&mut inner, body, Some(&qualified));
        Class {
            name: qualified,
            bases: qualified_bases,
            body,
            decorators,
            docstring,
        }
    }

    fn qualify_define(
        &self,
        scope: &mut Scope,
        define: Define,
        class_parent: Option<&Reference>,
    ) -> Define {
        let Define {
            name,
            parameters,
            body,
            decorators,
            return_annotation,
            is_async,
            parent,
            docstring,
        } = define;
        let qualified = match single_name(&name) {
            Some(single) => {
                let qualified = scope.qualifier.child(single);
                scope.add_alias(single.to_string(), qualified.clone().into());
                qualified
            }
            None => name,
        };
        let decorators = decorators
            .into_iter()
            .map(|decorator| self.qualify_decorator(scope, decorator))
            .collect();
        let return_annotation =
            return_annotation.map(|annotation| self.qualify_annotation(scope, annotation));
        let mut inner = scope.block(qualified.clone(), false);
        let parameters = parameters
            .into_iter()
            .map(|parameter| self.qualify_parameter(scope, &mut inner, parameter))
            .collect();
        explore_block(&mut inner, &body);
        let body = self.qualify_block(&mut inner, body, None);
        Define {
            name: qualified,
            parameters,
            body,
            decorators,
            return_annotation,
            is_async,
            parent: class_parent.cloned().or(parent),
            docstring,
        }
    }

    /// Parameter names gain the `$parameter$` wrapper behind their stars;
    /// annotations and defaults are evaluated in the enclosing scope.
    fn qualify_parameter(
        &self,
        outer: &mut Scope,
        inner: &mut Scope,
        parameter: Parameter,
    ) -> Parameter {
        let Node {
            location,
            id,
            node:
                ParameterData {
                    name,
                    annotation,
                    value,
                },
        } = parameter;
        let sanitized = sanitize_identifier(&name);
        let stars_end = sanitized.chars().take_while(|&c| c == '*').count();
        let (stars, base) = sanitized.split_at(stars_end);
        if base.is_empty() {
            // A bare `*` keyword-only marker binds nothing.
            return Node {
                location,
                id,
                node: ParameterData {
                    name,
                    annotation: annotation
                        .map(|annotation| self.qualify_annotation(outer, annotation)),
                    value: value.map(|value| self.qualify_expression(outer, value)),
                },
            };
        }
        let renamed = format!("{stars}$parameter${base}");
        inner.add_alias(
            base.to_string(),
            Access::from_name(&format!("$parameter${base}")),
        );
        inner.locals.insert(base.to_string());
        Node {
            location,
            id,
            node: ParameterData {
                name: renamed,
                annotation: annotation.map(|annotation| self.qualify_annotation(outer, annotation)),
                value: value.map(|value| self.qualify_expression(outer, value)),
            },
        }
    }

    fn qualify_decorator(&self, scope: &mut Scope, decorator: Expression) -> Expression {
        if is_preserved_decorator(&decorator) {
            return decorator;
        }
        let saved = scope.use_forward_references;
        scope.use_forward_references = true;
        let decorator = self.qualify_expression(scope, decorator);
        scope.use_forward_references = saved;
        decorator
    }

    /// Assignment targets bind names; everything else qualifies as an
    /// ordinary expression.
    fn qualify_target(
        &self,
        scope: &mut Scope,
        target: Expression,
        class_parent: Option<&Reference>,
    ) -> Expression {
        let Node { location, id, node } = target;
        let node = match node {
            ExpressionKind::Access(access) if access.elements().len() == 1 => {
                let identifier = access.elements()[0]
                    .as_identifier()
                    .map(sanitize_identifier);
                match identifier {
                    Some(name) => {
                        ExpressionKind::Access(self.bind_name(scope, name, class_parent))
                    }
                    None => ExpressionKind::Access(self.qualify_access(scope, access, false)),
                }
            }
            ExpressionKind::Tuple(elements) => ExpressionKind::Tuple(
                elements
                    .into_iter()
                    .map(|element| self.qualify_target(scope, element, class_parent))
                    .collect(),
            ),
            ExpressionKind::List(elements) => ExpressionKind::List(
                elements
                    .into_iter()
                    .map(|element| self.qualify_target(scope, element, class_parent))
                    .collect(),
            ),
            ExpressionKind::Starred(Starred::Once(element)) => ExpressionKind::Starred(
                Starred::Once(Box::new(self.qualify_target(scope, *element, class_parent))),
            ),
            other => {
                let expression = Node {
                    location,
                    id,
                    node: other,
                };
                return self.qualify_expression(scope, expression);
            }
        };
        Node { location, id, node }
    }

    fn bind_name(
        &self,
        scope: &mut Scope,
        name: String,
        class_parent: Option<&Reference>,
    ) -> Access {
        if let Some(class_qualifier) = class_parent {
            // Class-body targets promote to class attributes.
            let stripped = strip_leading_underscores(&name);
            let attribute = if stripped.is_empty() { &name } else { stripped };
            let qualified = class_qualifier.child(attribute);
            scope.add_alias(name.clone(), qualified.clone().into());
            qualified.into()
        } else if scope.immutables.contains(&name) || scope.locals.contains(&name) {
            // Globals and already-bound locals rebind their existing form.
            match scope.alias_for(&name) {
                Some(alias) => alias.access.clone(),
                None => Access::from_name(&name),
            }
        } else {
            let local = format!(
                "$local_{}${}",
                scope.qualifier.components().join("?"),
                name
            );
            scope.add_alias(name.clone(), Access::from_name(&local));
            scope.locals.insert(name);
            Access::from_name(&local)
        }
    }

    fn qualify_expression(&self, scope: &mut Scope, expression: Expression) -> Expression {
        self.qualify_expression_inner(scope, expression, false)
    }

    /// Type positions qualify with `qualify_strings`: leftover string
    /// literals re-enter the parser and synthetic aliases are suppressed.
    fn qualify_annotation(&self, scope: &mut Scope, expression: Expression) -> Expression {
        self.qualify_expression_inner(scope, expression, true)
    }

    fn qualify_expression_inner(
        &self,
        scope: &mut Scope,
        expression: Expression,
        qualify_strings: bool,
    ) -> Expression {
        let Node { location, id, node } = expression;
        let node = match node {
            ExpressionKind::Access(access) => {
                ExpressionKind::Access(self.qualify_access(scope, access, qualify_strings))
            }
            ExpressionKind::ExpressionAccess { expression, access } => {
                let expression =
                    Box::new(self.qualify_expression_inner(scope, *expression, qualify_strings));
                let mut elements = Vec::with_capacity(access.elements().len());
                self.qualify_elements(scope, access.0, qualify_strings, &mut elements);
                ExpressionKind::ExpressionAccess {
                    expression,
                    access: Access(elements),
                }
            }
            ExpressionKind::String(literal) => {
                let string = Node {
                    location,
                    id,
                    node: ExpressionKind::String(literal),
                };
                return self.qualify_string(scope, string, qualify_strings);
            }
            ExpressionKind::Await(expression) => ExpressionKind::Await(Box::new(
                self.qualify_expression_inner(scope, *expression, qualify_strings),
            )),
            ExpressionKind::BooleanOperator {
                left,
                operator,
                right,
            } => ExpressionKind::BooleanOperator {
                left: Box::new(self.qualify_expression_inner(scope, *left, qualify_strings)),
                operator,
                right: Box::new(self.qualify_expression_inner(scope, *right, qualify_strings)),
            },
            ExpressionKind::ComparisonOperator {
                left,
                operator,
                right,
            } => ExpressionKind::ComparisonOperator {
                left: Box::new(self.qualify_expression_inner(scope, *left, qualify_strings)),
                operator,
                right: Box::new(self.qualify_expression_inner(scope, *right, qualify_strings)),
            },
            ExpressionKind::Dictionary { entries, keywords } => {
                let mut qualified = Vec::with_capacity(entries.len());
                for DictionaryEntry { key, value } in entries {
                    qualified.push(DictionaryEntry {
                        key: self.qualify_expression_inner(scope, key, qualify_strings),
                        value: self.qualify_expression_inner(scope, value, qualify_strings),
                    });
                }
                ExpressionKind::Dictionary {
                    entries: qualified,
                    keywords: keywords
                        .into_iter()
                        .map(|keyword| self.qualify_expression_inner(scope, keyword, qualify_strings))
                        .collect(),
                }
            }
            ExpressionKind::DictionaryComprehension {
                element,
                generators,
            } => {
                let mut inner = scope.clone();
                let generators = self.qualify_generators(&mut inner, generators);
                ExpressionKind::DictionaryComprehension {
                    element: Box::new(DictionaryEntry {
                        key: self.qualify_expression(&mut inner, element.key),
                        value: self.qualify_expression(&mut inner, element.value),
                    }),
                    generators,
                }
            }
            ExpressionKind::Generator {
                element,
                generators,
            } => {
                let mut inner = scope.clone();
                let generators = self.qualify_generators(&mut inner, generators);
                ExpressionKind::Generator {
                    element: Box::new(self.qualify_expression(&mut inner, *element)),
                    generators,
                }
            }
            ExpressionKind::ListComprehension {
                element,
                generators,
            } => {
                let mut inner = scope.clone();
                let generators = self.qualify_generators(&mut inner, generators);
                ExpressionKind::ListComprehension {
                    element: Box::new(self.qualify_expression(&mut inner, *element)),
                    generators,
                }
            }
            ExpressionKind::SetComprehension {
                element,
                generators,
            } => {
                let mut inner = scope.clone();
                let generators = self.qualify_generators(&mut inner, generators);
                ExpressionKind::SetComprehension {
                    element: Box::new(self.qualify_expression(&mut inner, *element)),
                    generators,
                }
            }
            ExpressionKind::Lambda { parameters, body } => {
                // Lambda parameters bind like define parameters but the
                // qualifier stays put.
                let mut inner = scope.clone();
                let mut qualified = Vec::with_capacity(parameters.len());
                for parameter in parameters {
                    qualified.push(self.qualify_parameter(scope, &mut inner, parameter));
                }
                ExpressionKind::Lambda {
                    parameters: qualified,
                    body: Box::new(self.qualify_expression(&mut inner, *body)),
                }
            }
            ExpressionKind::List(elements) => ExpressionKind::List(
                elements
                    .into_iter()
                    .map(|element| self.qualify_expression_inner(scope, element, qualify_strings))
                    .collect(),
            ),
            ExpressionKind::Set(elements) => ExpressionKind::Set(
                elements
                    .into_iter()
                    .map(|element| self.qualify_expression_inner(scope, element, qualify_strings))
                    .collect(),
            ),
            ExpressionKind::Starred(Starred::Once(expression)) => ExpressionKind::Starred(
                Starred::Once(Box::new(self.qualify_expression_inner(
                    scope,
                    *expression,
                    qualify_strings,
                ))),
            ),
            ExpressionKind::Starred(Starred::Twice(expression)) => ExpressionKind::Starred(
                Starred::Twice(Box::new(self.qualify_expression_inner(
                    scope,
                    *expression,
                    qualify_strings,
                ))),
            ),
            ExpressionKind::Ternary {
                target,
                test,
                alternative,
            } => ExpressionKind::Ternary {
                target: Box::new(self.qualify_expression_inner(scope, *target, qualify_strings)),
                test: Box::new(self.qualify_expression_inner(scope, *test, qualify_strings)),
                alternative: Box::new(self.qualify_expression_inner(
                    scope,
                    *alternative,
                    qualify_strings,
                )),
            },
            ExpressionKind::Tuple(elements) => ExpressionKind::Tuple(
                elements
                    .into_iter()
                    .map(|element| self.qualify_expression_inner(scope, element, qualify_strings))
                    .collect(),
            ),
            ExpressionKind::UnaryOperator { operator, operand } => ExpressionKind::UnaryOperator {
                operator,
                operand: Box::new(self.qualify_expression_inner(scope, *operand, qualify_strings)),
            },
            ExpressionKind::Yield(expression) => ExpressionKind::Yield(expression.map(
                |expression| {
                    Box::new(self.qualify_expression_inner(scope, *expression, qualify_strings))
                },
            )),
            leaf @ (ExpressionKind::Boolean(_)
            | ExpressionKind::Complex(_)
            | ExpressionKind::Ellipsis
            | ExpressionKind::Float(_)
            | ExpressionKind::Integer(_)) => leaf,
        };
        Node { location, id, node }
    }

    fn qualify_generators(
        &self,
        inner: &mut Scope,
        generators: Vec<Comprehension>,
    ) -> Vec<Comprehension> {
        let mut qualified = Vec::with_capacity(generators.len());
        for Comprehension {
            target,
            iterator,
            conditions,
        } in generators
        {
            let iterator = self.qualify_expression(inner, iterator);
            let target = self.qualify_target(inner, target, None);
            let conditions = conditions
                .into_iter()
                .map(|condition| self.qualify_expression(inner, condition))
                .collect();
            qualified.push(Comprehension {
                target,
                iterator,
                conditions,
            });
        }
        qualified
    }

    fn qualify_string(
        &self,
        scope: &mut Scope,
        expression: Expression,
        qualify_strings: bool,
    ) -> Expression {
        let Node { location, id, node } = expression;
        let ExpressionKind::String(StringLiteral { value, kind }) = node else {
            unreachable!("qualify_string takes string literals");
        };
        match kind {
            StringKind::Raw if qualify_strings && !scope.skip.contains(&location) => {
                let origin = Position::new(location.start.line, location.start.column + 1);
                match self.parser.parse_expression(&value, origin, &self.handle) {
                    Ok(parsed) => {
                        let qualified = self.qualify_expression_inner(scope, parsed, true);
                        Node {
                            location,
                            id,
                            node: qualified.node,
                        }
                    }
                    Err(error) => {
                        debug!("unable to qualify string annotation `{value}`: {error}");
                        Node {
                            location,
                            id,
                            node: ExpressionKind::String(StringLiteral {
                                value,
                                kind: StringKind::Raw,
                            }),
                        }
                    }
                }
            }
            StringKind::Format(expressions) => Node {
                location,
                id,
                node: ExpressionKind::String(StringLiteral {
                    value,
                    kind: StringKind::Format(
                        expressions
                            .into_iter()
                            .map(|expression| self.qualify_expression(scope, expression))
                            .collect(),
                    ),
                }),
            },
            kind => Node {
                location,
                id,
                node: ExpressionKind::String(StringLiteral { value, kind }),
            },
        }
    }

    fn qualify_access(
        &self,
        scope: &mut Scope,
        access: Access,
        qualify_strings: bool,
    ) -> Access {
        let mut elements = access.0.into_iter();
        let mut result: Vec<Element> = Vec::new();
        match elements.next() {
            Some(Element::Identifier(head)) => {
                let replacement = scope
                    .alias_for(&head)
                    .map(|alias| (alias.access.clone(), alias.qualifier.clone()));
                match replacement {
                    Some((access, qualifier)) => {
                        let synthetic = access
                            .head()
                            .and_then(Element::as_identifier)
                            .is_some_and(|name| name.starts_with('$'));
                        if qualify_strings && synthetic {
                            // Synthetic names have no meaning in type
                            // positions; fall back to the binding scope's
                            // qualified spelling.
                            result.extend(Access::from(qualifier).0);
                            result.push(Element::Identifier(head));
                        } else {
                            result.extend(access.0);
                        }
                    }
                    None => result.push(Element::Identifier(head)),
                }
            }
            Some(call) => {
                self.qualify_elements(scope, vec![call], qualify_strings, &mut result);
            }
            None => {}
        }
        self.qualify_elements(scope, elements.collect(), qualify_strings, &mut result);
        Access(result)
    }

    /// Qualify trailing access elements: member names pass through, call
    /// arguments recurse. Keyword names gain the `$parameter$` wrapper.
    fn qualify_elements(
        &self,
        scope: &mut Scope,
        elements: Vec<Element>,
        qualify_strings: bool,
        result: &mut Vec<Element>,
    ) {
        for element in elements {
            match element {
                Element::Identifier(name) => result.push(Element::Identifier(name)),
                Element::Call(arguments) => {
                    let is_type_variable =
                        Access::new(result.clone()).is_named("typing.TypeVar");
                    let arguments = arguments.map(|arguments| {
                        let mut qualified = Vec::with_capacity(arguments.len());
                        for (index, Argument { name, value }) in
                            arguments.into_iter().enumerate()
                        {
                            if is_type_variable
                                && index == 0
                                && name.is_none()
                                && matches!(
                                    &value.node,
                                    ExpressionKind::String(StringLiteral {
                                        kind: StringKind::Raw,
                                        ..
                                    })
                                )
                            {
                                // The first argument is the variable's own
                                // name, not an annotation.
                                scope.skip.insert(value.location);
                            }
                            let name = name.map(|name| {
                                name.map(|name| {
                                    format!("$parameter${}", sanitize_identifier(&name))
                                })
                            });
                            let value = self.qualify_expression_inner(
                                scope,
                                value,
                                qualify_strings || is_type_variable,
                            );
                            qualified.push(Argument { name, value });
                        }
                        qualified
                    });
                    result.push(Element::Call(arguments));
                }
            }
        }
    }
}

fn is_preserved_decorator(decorator: &Expression) -> bool {
    let Some(access) = decorator.node.as_access() else {
        return false;
    };
    let spine: Vec<&str> = access
        .elements()
        .iter()
        .filter_map(Element::as_identifier)
        .collect();
    match spine.as_slice() {
        [name] => PRESERVED_DECORATORS.contains(name),
        [.., last] => PRESERVED_DECORATOR_SUFFIXES.contains(last),
        [] => false,
    }
}
