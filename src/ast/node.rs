use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::ast::location::Location;

pub type NodeId = usize;

fn next_id() -> NodeId {
    static COUNTER: AtomicUsize = AtomicUsize::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A located tree node. The id identifies the node to collaborators that key
/// per-node data (the type-resolution store); it survives in-place rebuilds
/// but not reconstruction.
#[derive(Clone, Debug)]
pub struct Node<T> {
    pub location: Location,
    pub id: NodeId,
    pub node: T,
}

impl<T> Node<T> {
    pub fn new(location: Location, node: T) -> Self {
        Node {
            location,
            id: next_id(),
            node,
        }
    }

    /// Replace the payload, keeping location and identity.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Node<U> {
        Node {
            location: self.location,
            id: self.id,
            node: f(self.node),
        }
    }
}

// Equality and hashing are structural. Locations and ids are diagnostic
// payload; two nodes spelling the same tree compare equal.
impl<T: PartialEq> PartialEq for Node<T> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl<T: Eq> Eq for Node<T> {}

impl<T: Hash> Hash for Node<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.hash(state);
    }
}
