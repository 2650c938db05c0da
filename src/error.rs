//! The generic analysis-error record: a location, a kind, and the
//! enclosing define, rendered textually for terminals and structurally for
//! on-disk caches.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use itertools::Itertools;
use serde_json::{json, Value};

use crate::ast::access::sanitize_identifier;
use crate::ast::location::InstantiatedLocation;
use crate::ast::node::Node;
use crate::ast::nodes::Define;

/// What a family of errors knows about itself. The checker defines one
/// kind type per analysis; the record below is generic over it.
pub trait ErrorKind {
    fn code(&self) -> u16;

    fn name(&self) -> &'static str;

    /// Human-readable messages, most important first. `concise` asks for
    /// the single-line form.
    fn messages(
        &self,
        concise: bool,
        define: &Node<Define>,
        location: &InstantiatedLocation,
    ) -> Vec<String>;

    /// Structured payload for clients that consume inference results.
    fn inference_information(&self, _define: &Node<Define>) -> Value {
        Value::Null
    }
}

#[derive(Clone, Debug)]
pub struct Error<K> {
    location: InstantiatedLocation,
    kind: K,
    define: Node<Define>,
}

impl<K: ErrorKind> Error<K> {
    pub fn new(location: InstantiatedLocation, kind: K, define: Node<Define>) -> Self {
        Error {
            location,
            kind,
            define,
        }
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn path(&self) -> &str {
        &self.location.path
    }

    pub fn location(&self) -> &InstantiatedLocation {
        &self.location
    }

    pub fn code(&self) -> u16 {
        self.kind.code()
    }

    /// Deduplication key: the location collapsed to its (path, line)
    /// bucket.
    pub fn key(&self) -> InstantiatedLocation {
        self.location.line_bucket()
    }

    /// `<name> [<code>]: <message>`; with traces enabled every message is
    /// joined by `separator`.
    pub fn description(&self, concise: bool, separator: &str, show_error_traces: bool) -> String {
        let messages = self.kind.messages(concise, &self.define, &self.location);
        let message = if show_error_traces {
            messages.iter().join(separator)
        } else {
            messages.into_iter().next().unwrap_or_default()
        };
        format!("{} [{}]: {}", self.kind.name(), self.kind.code(), message)
    }

    /// The sanitized dotted name of the enclosing define.
    fn define_name(&self) -> String {
        self.define
            .node
            .name
            .components()
            .iter()
            .map(|component| sanitize_identifier(component))
            .join(".")
    }

    pub fn to_json(&self, show_error_traces: bool) -> Value {
        json!({
            "line": self.location.start.line,
            "column": self.location.start.column,
            "path": self.path(),
            "code": self.kind.code(),
            "name": self.kind.name(),
            "description": self.description(false, " ", show_error_traces),
            "long_description": self.description(false, "\n", true),
            "concise_description": self.description(true, "\n", false),
            "inference": self.kind.inference_information(&self.define),
            "define": self.define_name(),
        })
    }
}

// Identity is (location, kind); the define is context, not identity.
impl<K: PartialEq> PartialEq for Error<K> {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location && self.kind == other.kind
    }
}

impl<K: Eq> Eq for Error<K> {}

impl<K: Hash> Hash for Error<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location.hash(state);
        self.kind.hash(state);
    }
}

impl<K: ErrorKind + PartialEq> PartialOrd for Error<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(
            self.location
                .cmp(&other.location)
                .then_with(|| self.code().cmp(&other.code())),
        )
    }
}

impl<K: ErrorKind + Eq> Ord for Error<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.location
            .cmp(&other.location)
            .then_with(|| self.code().cmp(&other.code()))
    }
}
