//! Typed tree intermediate representation for XPath/XSLT queries.
//!
//! The IR is an arena of tagged nodes, each carrying a static type. Trees are
//! built through the typed factory on [`IrGraph`] or read from the nested
//! JSON form in [`tree`].

pub mod builder;
pub mod graph;
pub mod literal;
pub mod names;
pub mod node;
pub mod tree;
pub mod types;

pub use graph::{IrGraph, NodeData, NodeId, Payload, SourceSpan};
pub use literal::Literal;
pub use names::QName;
pub use node::{Arity, NodeGroup, NodeType};
pub use tree::{IrTree, TreeError};
pub use types::{AtomicType, Cardinality, ItemType, NodeKinds, XmlType};
