//! Core of a static-analysis front-end for a dynamically-typed,
//! indentation-delimited language: the AST normalization pipeline that
//! rewrites permissive surface syntax into a canonical, fully-qualified,
//! alias-free form, and the inter-procedural call-graph engine built on the
//! type resolutions the checker publishes per statement.
//!
//! The parser, the type checker, and the shared lookup tables are external
//! collaborators; this crate defines their interfaces and performs lookups
//! only.

pub mod ast;
pub mod call_graph;
pub mod environment;
pub mod error;
pub mod normalize;
pub mod parser;
pub mod source;
pub mod tables;

#[cfg(test)]
pub(crate) mod test_support;
