//! Arena holding the IR of one query.
//!
//! Nodes are addressed by [`NodeId`]. A child slot either owns its node or,
//! for iterators and functions outside their binding position, refers back to
//! a node owned elsewhere in the tree.

use crate::literal::Literal;
use crate::names::QName;
use crate::node::NodeType;
use crate::types::XmlType;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source location used for debug sequence points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

/// Non-child data attached to a node.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    None,
    Literal(Literal),
    /// Debug name of an iterator or global.
    Name(QName),
    SortKey { descending: bool },
    Function { name: QName, side_effects: bool },
    ExternalMethod { type_name: CompactString, method: CompactString },
}

#[derive(Debug, Clone)]
pub struct NodeData {
    pub node_type: NodeType,
    pub xml_type: XmlType,
    pub children: SmallVec<[NodeId; 4]>,
    pub payload: Payload,
    pub span: Option<SourceSpan>,
}

/// Child positions of the `QilExpression` root.
pub mod qil {
    pub const FUNCTIONS: usize = 0;
    pub const GLOBALS: usize = 1;
    pub const PARAMS: usize = 2;
    pub const ROOT: usize = 3;
}

#[derive(Debug, Clone, Default)]
pub struct IrGraph {
    nodes: Vec<NodeData>,
    entry: Option<NodeId>,
}

impl IrGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add(
        &mut self,
        node_type: NodeType,
        xml_type: XmlType,
        children: &[NodeId],
        payload: Payload,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData {
            node_type,
            xml_type,
            children: SmallVec::from_slice(children),
            payload,
            span: None,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.index()]
    }

    pub fn node_type(&self, id: NodeId) -> NodeType {
        self.node(id).node_type
    }

    pub fn xml_type(&self, id: NodeId) -> XmlType {
        self.node(id).xml_type
    }

    pub fn set_type(&mut self, id: NodeId, ty: XmlType) {
        self.node_mut(id).xml_type = ty;
    }

    pub fn set_span(&mut self, id: NodeId, span: SourceSpan) {
        self.node_mut(id).span = Some(span);
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn child(&self, id: NodeId, index: usize) -> NodeId {
        self.node(id).children[index]
    }

    pub fn set_child(&mut self, id: NodeId, index: usize, child: NodeId) {
        self.node_mut(id).children[index] = child;
    }

    pub fn push_child(&mut self, id: NodeId, child: NodeId) {
        self.node_mut(id).children.push(child);
    }

    pub fn entry(&self) -> Option<NodeId> {
        self.entry
    }

    pub fn set_entry(&mut self, id: NodeId) {
        self.entry = Some(id);
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn literal(&self, id: NodeId) -> Option<&Literal> {
        match &self.node(id).payload {
            Payload::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn name(&self, id: NodeId) -> Option<&QName> {
        match &self.node(id).payload {
            Payload::Name(name) | Payload::Function { name, .. } => Some(name),
            Payload::Literal(Literal::QName(name)) => Some(name),
            _ => None,
        }
    }

    /// Whether the child slot `index` of a node of type `parent` declares the
    /// iterator or function stored there.
    pub fn is_binding_position(parent: NodeType, index: usize) -> bool {
        match parent {
            NodeType::Loop | NodeType::Filter | NodeType::Sort => index == 0,
            NodeType::FunctionList
            | NodeType::GlobalVariableList
            | NodeType::GlobalParameterList
            | NodeType::FormalParameterList => true,
            _ => false,
        }
    }

    /// Whether the child at `index` of `parent` is a back-reference.
    pub fn is_reference(&self, parent: NodeId, index: usize) -> bool {
        let child = self.child(parent, index);
        let child_type = self.node_type(child);
        let bindable = child_type.is_iterator() || child_type == NodeType::Function;
        bindable && !Self::is_binding_position(self.node_type(parent), index)
    }

    /// Iterators and functions referenced from within the subtree at `root`.
    pub fn references_in(&self, root: NodeId) -> HashSet<NodeId> {
        let mut found = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            for (index, &child) in self.children(id).iter().enumerate() {
                if self.is_reference(id, index) {
                    found.insert(child);
                } else {
                    stack.push(child);
                }
            }
        }
        found
    }

    /// Owned nodes of the subtree at `root` in pre-order, not following
    /// references.
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            let children = self.children(id);
            for index in (0..children.len()).rev() {
                if !self.is_reference(id, index) {
                    stack.push(children[index]);
                }
            }
        }
        out
    }

    /// Copy a childless node (a literal, typically) into a fresh slot.
    pub fn duplicate_leaf(&mut self, id: NodeId) -> NodeId {
        let data = self.node(id).clone();
        debug_assert!(data.children.is_empty(), "duplicate_leaf on {}", data.node_type);
        let copy = self.add(data.node_type, data.xml_type, &[], data.payload);
        self.node_mut(copy).span = data.span;
        copy
    }

    fn qil_child(&self, index: usize) -> Option<NodeId> {
        let entry = self.entry?;
        (self.node_type(entry) == NodeType::QilExpression).then(|| self.child(entry, index))
    }

    pub fn functions(&self) -> Option<NodeId> {
        self.qil_child(qil::FUNCTIONS)
    }

    pub fn globals(&self) -> Option<NodeId> {
        self.qil_child(qil::GLOBALS)
    }

    pub fn global_params(&self) -> Option<NodeId> {
        self.qil_child(qil::PARAMS)
    }

    pub fn root_expr(&self) -> Option<NodeId> {
        self.qil_child(qil::ROOT)
    }
}
