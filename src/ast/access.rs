use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::node::Node;
use crate::ast::nodes::Expression;

pub type Identifier = String;

/// One argument of a call element; the name is present for keyword arguments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Argument {
    pub name: Option<Node<Identifier>>,
    pub value: Expression,
}

impl Argument {
    pub fn positional(value: Expression) -> Self {
        Argument { name: None, value }
    }
}

/// One element of an access chain.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Element {
    Identifier(Identifier),
    Call(Node<Vec<Argument>>),
}

impl Element {
    pub fn is_call(&self) -> bool {
        matches!(self, Element::Call(_))
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Element::Identifier(name) => Some(name),
            Element::Call(_) => None,
        }
    }
}

/// An ordered sequence of identifier and call elements. Qualified names,
/// member selections, subscripts (lowered to `__getitem__` calls), and call
/// chains are all represented this way.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Access(pub Vec<Element>);

impl Access {
    pub fn new(elements: Vec<Element>) -> Self {
        Access(elements)
    }

    /// Build an identifier-only access from a dotted name.
    pub fn from_name(name: &str) -> Self {
        Access(
            name.split('.')
                .filter(|part| !part.is_empty())
                .map(|part| Element::Identifier(part.to_string()))
                .collect(),
        )
    }

    pub fn elements(&self) -> &[Element] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn head(&self) -> Option<&Element> {
        self.0.first()
    }

    pub fn last(&self) -> Option<&Element> {
        self.0.last()
    }

    /// The trailing identifier, skipping any final call elements. For
    /// `a.foo()` this is `foo`.
    pub fn last_identifier(&self) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find_map(|element| element.as_identifier())
    }

    pub fn push(&mut self, element: Element) {
        self.0.push(element);
    }

    pub fn extend(&mut self, other: Access) {
        self.0.extend(other.0);
    }

    /// Concatenate, yielding a new access.
    pub fn join(&self, other: &Access) -> Access {
        let mut elements = self.0.clone();
        elements.extend(other.0.iter().cloned());
        Access(elements)
    }

    /// Whether every element is an identifier.
    pub fn is_identifiers(&self) -> bool {
        self.0.iter().all(|element| !element.is_call())
    }

    /// Identifier-prefix comparison; call elements never match.
    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        prefix.len() <= self.0.len()
            && prefix
                .iter()
                .zip(&self.0)
                .all(|(expected, element)| element.as_identifier() == Some(*expected))
    }

    /// Whether the identifier spine equals the dotted `name`, ignoring call
    /// elements (so `a.b()` still matches `a.b`).
    pub fn is_named(&self, name: &str) -> bool {
        let spine: Vec<&str> = self
            .0
            .iter()
            .filter_map(|element| element.as_identifier())
            .collect();
        spine == name.split('.').collect::<Vec<_>>()
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (index, element) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, ".")?;
            }
            match element {
                Element::Identifier(name) => write!(f, "{name}")?,
                Element::Call(_) => write!(f, "(...)")?,
            }
        }
        Ok(())
    }
}

impl From<Reference> for Access {
    fn from(reference: Reference) -> Access {
        Access(reference.0.into_iter().map(Element::Identifier).collect())
    }
}

/// An access restricted to identifiers, used for declared names.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference(pub Vec<Identifier>);

impl Reference {
    pub fn new(components: Vec<Identifier>) -> Self {
        Reference(components)
    }

    pub fn from_name(name: &str) -> Self {
        Reference(
            name.split('.')
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn empty() -> Self {
        Reference(Vec::new())
    }

    pub fn components(&self) -> &[Identifier] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Extend with a single component.
    pub fn child(&self, name: &str) -> Reference {
        let mut components = self.0.clone();
        components.push(name.to_string());
        Reference(components)
    }

    /// Extend with all components of `other`.
    pub fn join(&self, other: &Reference) -> Reference {
        let mut components = self.0.clone();
        components.extend(other.0.iter().cloned());
        Reference(components)
    }

    /// Drop the last component; empty stays empty.
    pub fn prefix(&self) -> Reference {
        let mut components = self.0.clone();
        components.pop();
        Reference(components)
    }

    pub fn reversed(&self) -> Reference {
        Reference(self.0.iter().rev().cloned().collect())
    }

    /// Convert an identifier-only access; calls yield `None`.
    pub fn from_access(access: &Access) -> Option<Reference> {
        access
            .elements()
            .iter()
            .map(|element| element.as_identifier().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(Reference)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Strip a synthetic qualification wrapper from an identifier, keeping any
/// leading stars: `*$parameter$args` yields `*args`, `$local_m?f$x` yields
/// `x`. Identifiers without a wrapper pass through.
pub fn sanitize_identifier(name: &str) -> String {
    let stars: String = name.chars().take_while(|&c| c == '*').collect();
    let stripped = &name[stars.len()..];
    let sanitized = if stripped.starts_with("$local_")
        || stripped.starts_with("$parameter$")
        || stripped.starts_with("$target$")
    {
        stripped
            .rsplit_once('$')
            .map_or(stripped, |(_, suffix)| suffix)
    } else {
        stripped
    };
    format!("{stars}{sanitized}")
}

pub fn strip_leading_underscores(name: &str) -> &str {
    name.trim_start_matches('_')
}
