use crate::ast::access::{Access, Argument, Element};
use crate::ast::node::Node;
use crate::ast::nodes::{
    Assign, Class, Comprehension, Define, DictionaryEntry, Expression, ExpressionKind, For,
    Handler, If, Parameter, ParameterData, Return, Starred, Statement, StatementKind, StringKind,
    StringLiteral, Try, While, With,
};
use crate::source::Source;

type ExpressionMap<'f> = dyn FnMut(Expression) -> Expression + 'f;
type BlockMap<'f> = dyn FnMut(Vec<Statement>) -> Vec<Statement> + 'f;

/// Statement-only rewriting: the hook sees each statement after its nested
/// blocks have been rebuilt (post-order emission) and returns zero or more
/// replacements. State lives on the transformer value.
pub trait StatementTransformer {
    fn statement(&mut self, statement: Statement) -> Vec<Statement>;
}

pub fn transform_statements<T: StatementTransformer + ?Sized>(
    transformer: &mut T,
    source: Source,
) -> Source {
    let Source {
        handle,
        qualifier,
        statements,
        metadata,
    } = source;
    Source {
        handle,
        qualifier,
        statements: transform_statement_block(transformer, statements),
        metadata,
    }
}

pub fn transform_statement_block<T: StatementTransformer + ?Sized>(
    transformer: &mut T,
    body: Vec<Statement>,
) -> Vec<Statement> {
    let mut result = Vec::with_capacity(body.len());
    for statement in body {
        let Node { location, id, node } = statement;
        let node = rebuild_nested(node, &mut |body| transform_statement_block(transformer, body));
        result.extend(transformer.statement(Node { location, id, node }));
    }
    result
}

/// Full rewriting: statement replacement plus bottom-up expression
/// rewriting, with a predicate to prune descent per statement.
pub trait Transformer {
    fn expression(&mut self, expression: Expression) -> Expression {
        expression
    }

    fn transform_children(&mut self, _statement: &Statement) -> bool {
        true
    }

    fn statement(&mut self, statement: Statement) -> Vec<Statement> {
        vec![statement]
    }
}

pub fn transform<T: Transformer + ?Sized>(transformer: &mut T, source: Source) -> Source {
    let Source {
        handle,
        qualifier,
        statements,
        metadata,
    } = source;
    Source {
        handle,
        qualifier,
        statements: transform_block(transformer, statements),
        metadata,
    }
}

pub fn transform_block<T: Transformer + ?Sized>(
    transformer: &mut T,
    body: Vec<Statement>,
) -> Vec<Statement> {
    let mut result = Vec::with_capacity(body.len());
    for statement in body {
        let descend = transformer.transform_children(&statement);
        let Node { location, id, node } = statement;
        let node = if descend {
            let node = rebuild_nested(node, &mut |body| transform_block(transformer, body));
            map_statement_expressions(node, &mut |expression| {
                transform_expression(transformer, expression)
            })
        } else {
            node
        };
        result.extend(transformer.statement(Node { location, id, node }));
    }
    result
}

pub fn transform_expression<T: Transformer + ?Sized>(
    transformer: &mut T,
    expression: Expression,
) -> Expression {
    let Node { location, id, node } = expression;
    let node = map_expression_children(node, &mut |expression| {
        transform_expression(transformer, expression)
    });
    transformer.expression(Node { location, id, node })
}

/// Rebuild each nested statement block of a statement kind through `f`.
fn rebuild_nested(node: StatementKind, f: &mut BlockMap) -> StatementKind {
    match node {
        StatementKind::Class(Class {
            name,
            bases,
            body,
            decorators,
            docstring,
        }) => StatementKind::Class(Class {
            name,
            bases,
            body: f(body),
            decorators,
            docstring,
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
            parameters,
            body: f(body),
            decorators,
            return_annotation,
            is_async,
            parent,
            docstring,
        }),
        StatementKind::For(For {
            target,
            iterator,
            body,
            orelse,
            is_async,
        }) => StatementKind::For(For {
            target,
            iterator,
            body: f(body),
            orelse: f(orelse),
            is_async,
        }),
        StatementKind::If(If { test, body, orelse }) => StatementKind::If(If {
            test,
            body: f(body),
            orelse: f(orelse),
        }),
        StatementKind::Try(Try {
            body,
            handlers,
            orelse,
            finally,
        }) => {
            let body = f(body);
            let mut rebuilt = Vec::with_capacity(handlers.len());
            for Handler { kind, name, body } in handlers {
                rebuilt.push(Handler {
                    kind,
                    name,
                    body: f(body),
                });
            }
            StatementKind::Try(Try {
                body,
                handlers: rebuilt,
                orelse: f(orelse),
                finally: f(finally),
            })
        }
        StatementKind::While(While { test, body, orelse }) => StatementKind::While(While {
            test,
            body: f(body),
            orelse: f(orelse),
        }),
        StatementKind::With(With {
            items,
            body,
            is_async,
        }) => StatementKind::With(With {
            items,
            body: f(body),
            is_async,
        }),
        other => other,
    }
}

/// Map every direct expression position of a statement kind through `f`.
/// Nested statement blocks are untouched; `rebuild_nested` owns those.
fn map_statement_expressions(node: StatementKind, f: &mut ExpressionMap) -> StatementKind {
    match node {
        StatementKind::Assign(Assign {
            target,
            annotation,
            value,
            parent,
        }) => StatementKind::Assign(Assign {
            target: f(target),
            annotation: annotation.map(&mut *f),
            value: f(value),
            parent,
        }),
        StatementKind::Assert { test, message } => StatementKind::Assert {
            test: f(test),
            message: message.map(&mut *f),
        },
        StatementKind::Class(Class {
            name,
            bases,
            body,
            decorators,
            docstring,
        }) => {
            let mut mapped = Vec::with_capacity(bases.len());
            for Argument { name, value } in bases {
                mapped.push(Argument {
                    name,
                    value: f(value),
                });
            }
            StatementKind::Class(Class {
                name,
                bases: mapped,
                body,
                decorators: decorators.into_iter().map(&mut *f).collect(),
                docstring,
            })
        }
        StatementKind::Define(Define {
            name,
            parameters,
            body,
            decorators,
            return_annotation,
            is_async,
            parent,
            docstring,
        }) => {
            let mut mapped = Vec::with_capacity(parameters.len());
            for parameter in parameters {
                mapped.push(map_parameter(parameter, &mut *f));
            }
            StatementKind::Define(Define {
                name,
                parameters: mapped,
                body,
                decorators: decorators.into_iter().map(&mut *f).collect(),
                return_annotation: return_annotation.map(&mut *f),
                is_async,
                parent,
                docstring,
            })
        }
        StatementKind::Delete(expression) => StatementKind::Delete(f(expression)),
        StatementKind::Expression(expression) => StatementKind::Expression(f(expression)),
        StatementKind::For(For {
            target,
            iterator,
            body,
            orelse,
            is_async,
        }) => StatementKind::For(For {
            target: f(target),
            iterator: f(iterator),
            body,
            orelse,
            is_async,
        }),
        StatementKind::If(If { test, body, orelse }) => StatementKind::If(If {
            test: f(test),
            body,
            orelse,
        }),
        StatementKind::Raise(expression) => StatementKind::Raise(expression.map(&mut *f)),
        StatementKind::Return(Return {
            expression,
            is_implicit,
        }) => StatementKind::Return(Return {
            expression: expression.map(&mut *f),
            is_implicit,
        }),
        StatementKind::Try(Try {
            body,
            handlers,
            orelse,
            finally,
        }) => {
            let mut mapped = Vec::with_capacity(handlers.len());
            for Handler { kind, name, body } in handlers {
                mapped.push(Handler {
                    kind: kind.map(&mut *f),
                    name,
                    body,
                });
            }
            StatementKind::Try(Try {
                body,
                handlers: mapped,
                orelse,
                finally,
            })
        }
        StatementKind::While(While { test, body, orelse }) => StatementKind::While(While {
            test: f(test),
            body,
            orelse,
        }),
        StatementKind::With(With {
            items,
            body,
            is_async,
        }) => {
            let mut mapped = Vec::with_capacity(items.len());
            for (item, target) in items {
                mapped.push((f(item), target.map(&mut *f)));
            }
            StatementKind::With(With {
                items: mapped,
                body,
                is_async,
            })
        }
        StatementKind::Yield(expression) => StatementKind::Yield(f(expression)),
        StatementKind::YieldFrom(expression) => StatementKind::YieldFrom(f(expression)),
        other @ (StatementKind::Break
        | StatementKind::Continue
        | StatementKind::Global(_)
        | StatementKind::Import(_)
        | StatementKind::Nonlocal(_)
        | StatementKind::Pass) => other,
    }
}

fn map_parameter(parameter: Parameter, f: &mut ExpressionMap) -> Parameter {
    parameter.map(
        |ParameterData {
             name,
             annotation,
             value,
         }| ParameterData {
            name,
            annotation: annotation.map(&mut *f),
            value: value.map(&mut *f),
        },
    )
}

fn map_access(access: Access, f: &mut ExpressionMap) -> Access {
    let mut elements = Vec::with_capacity(access.0.len());
    for element in access.0 {
        match element {
            Element::Call(arguments) => {
                elements.push(Element::Call(arguments.map(|arguments| {
                    let mut mapped = Vec::with_capacity(arguments.len());
                    for Argument { name, value } in arguments {
                        mapped.push(Argument {
                            name,
                            value: f(value),
                        });
                    }
                    mapped
                })));
            }
            identifier => elements.push(identifier),
        }
    }
    Access(elements)
}

fn map_comprehensions(
    generators: Vec<Comprehension>,
    f: &mut ExpressionMap,
) -> Vec<Comprehension> {
    let mut mapped = Vec::with_capacity(generators.len());
    for Comprehension {
        target,
        iterator,
        conditions,
    } in generators
    {
        mapped.push(Comprehension {
            target: f(target),
            iterator: f(iterator),
            conditions: conditions.into_iter().map(&mut *f).collect(),
        });
    }
    mapped
}

fn map_boxed(expression: Box<Expression>, f: &mut ExpressionMap) -> Box<Expression> {
    Box::new(f(*expression))
}

fn map_expression_children(node: ExpressionKind, f: &mut ExpressionMap) -> ExpressionKind {
    match node {
        ExpressionKind::Access(access) => ExpressionKind::Access(map_access(access, f)),
        ExpressionKind::ExpressionAccess { expression, access } => {
            ExpressionKind::ExpressionAccess {
                expression: map_boxed(expression, &mut *f),
                access: map_access(access, &mut *f),
            }
        }
        ExpressionKind::Await(expression) => ExpressionKind::Await(map_boxed(expression, f)),
        ExpressionKind::BooleanOperator {
            left,
            operator,
            right,
        } => ExpressionKind::BooleanOperator {
            left: map_boxed(left, &mut *f),
            operator,
            right: map_boxed(right, &mut *f),
        },
        ExpressionKind::ComparisonOperator {
            left,
            operator,
            right,
        } => ExpressionKind::ComparisonOperator {
            left: map_boxed(left, &mut *f),
            operator,
            right: map_boxed(right, &mut *f),
        },
        ExpressionKind::Dictionary { entries, keywords } => {
            let mut mapped = Vec::with_capacity(entries.len());
            for DictionaryEntry { key, value } in entries {
                mapped.push(DictionaryEntry {
                    key: f(key),
                    value: f(value),
                });
            }
            ExpressionKind::Dictionary {
                entries: mapped,
                keywords: keywords.into_iter().map(&mut *f).collect(),
            }
        }
        ExpressionKind::DictionaryComprehension {
            element,
            generators,
        } => ExpressionKind::DictionaryComprehension {
            element: Box::new(DictionaryEntry {
                key: f(element.key),
                value: f(element.value),
            }),
            generators: map_comprehensions(generators, &mut *f),
        },
        ExpressionKind::Generator {
            element,
            generators,
        } => ExpressionKind::Generator {
            element: map_boxed(element, &mut *f),
            generators: map_comprehensions(generators, &mut *f),
        },
        ExpressionKind::Lambda { parameters, body } => {
            let mut mapped = Vec::with_capacity(parameters.len());
            for parameter in parameters {
                mapped.push(map_parameter(parameter, &mut *f));
            }
            ExpressionKind::Lambda {
                parameters: mapped,
                body: map_boxed(body, &mut *f),
            }
        }
        ExpressionKind::List(elements) => {
            ExpressionKind::List(elements.into_iter().map(&mut *f).collect())
        }
        ExpressionKind::ListComprehension {
            element,
            generators,
        } => ExpressionKind::ListComprehension {
            element: map_boxed(element, &mut *f),
            generators: map_comprehensions(generators, &mut *f),
        },
        ExpressionKind::Set(elements) => {
            ExpressionKind::Set(elements.into_iter().map(&mut *f).collect())
        }
        ExpressionKind::SetComprehension {
            element,
            generators,
        } => ExpressionKind::SetComprehension {
            element: map_boxed(element, &mut *f),
            generators: map_comprehensions(generators, &mut *f),
        },
        ExpressionKind::Starred(Starred::Once(expression)) => {
            ExpressionKind::Starred(Starred::Once(map_boxed(expression, f)))
        }
        ExpressionKind::Starred(Starred::Twice(expression)) => {
            ExpressionKind::Starred(Starred::Twice(map_boxed(expression, f)))
        }
        ExpressionKind::String(StringLiteral { value, kind }) => {
            ExpressionKind::String(StringLiteral {
                value,
                kind: match kind {
                    StringKind::Format(expressions) => {
                        StringKind::Format(expressions.into_iter().map(&mut *f).collect())
                    }
                    kind => kind,
                },
            })
        }
        ExpressionKind::Ternary {
            target,
            test,
            alternative,
        } => ExpressionKind::Ternary {
            target: map_boxed(target, &mut *f),
            test: map_boxed(test, &mut *f),
            alternative: map_boxed(alternative, &mut *f),
        },
        ExpressionKind::Tuple(elements) => {
            ExpressionKind::Tuple(elements.into_iter().map(&mut *f).collect())
        }
        ExpressionKind::UnaryOperator { operator, operand } => ExpressionKind::UnaryOperator {
            operator,
            operand: map_boxed(operand, f),
        },
        ExpressionKind::Yield(expression) => {
            ExpressionKind::Yield(expression.map(|expression| map_boxed(expression, &mut *f)))
        }
        leaf @ (ExpressionKind::Boolean(_)
        | ExpressionKind::Complex(_)
        | ExpressionKind::Ellipsis
        | ExpressionKind::Float(_)
        | ExpressionKind::Integer(_)) => leaf,
    }
}
