pub mod access;
pub mod location;
pub mod node;
pub mod nodes;
pub mod transformer;
pub mod visitor;

pub use access::{
    sanitize_identifier, strip_leading_underscores, Access, Argument, Element, Identifier,
    Reference,
};
pub use location::{HandleKey, InstantiatedLocation, Location, Position};
pub use node::{Node, NodeId};
pub use nodes::*;
