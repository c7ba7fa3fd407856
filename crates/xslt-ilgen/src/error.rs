use xslt_ir::{NodeId, NodeType};

/// Rejection of an input tree before optimization starts.
///
/// Trees that pass validation and still violate an invariant later are a
/// front-end defect; those abort with a panic instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("the graph has no entry node")]
    NoEntry,
    #[error("entry node must be QilExpression, found {0}")]
    BadEntry(NodeType),
    #[error("malformed {node_type} at {node}: {reason}")]
    Malformed { node: NodeId, node_type: NodeType, reason: String },
}

impl CompileError {
    pub(crate) fn malformed(node: NodeId, node_type: NodeType, reason: impl Into<String>) -> Self {
        Self::Malformed { node, node_type, reason: reason.into() }
    }
}
