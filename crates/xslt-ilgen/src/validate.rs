//! Shape checks run once before optimization.

use crate::error::CompileError;
use std::collections::HashSet;
use xslt_ir::{IrGraph, NodeId, NodeType, Payload};

/// Check child arity, binding positions and literal payloads of every node
/// reachable from the entry, and that every reference targets a node bound
/// somewhere in the tree.
pub fn validate(graph: &IrGraph) -> Result<(), CompileError> {
    let entry = graph.entry().ok_or(CompileError::NoEntry)?;
    if graph.node_type(entry) != NodeType::QilExpression {
        return Err(CompileError::BadEntry(graph.node_type(entry)));
    }
    let owned = graph.subtree(entry);
    let bound: HashSet<NodeId> = owned
        .iter()
        .copied()
        .filter(|&id| {
            let t = graph.node_type(id);
            t.is_iterator() || t == NodeType::Function
        })
        .collect();

    for &id in &owned {
        let t = graph.node_type(id);
        let children = graph.children(id);
        if !t.arity().accepts(children.len()) {
            return Err(CompileError::malformed(id, t, format!("unexpected child count {}", children.len())));
        }
        if t.is_literal() && !matches!(t, NodeType::True | NodeType::False) && graph.literal(id).is_none() {
            return Err(CompileError::malformed(id, t, "literal without value"));
        }
        match t {
            NodeType::Loop | NodeType::Filter | NodeType::Sort => {
                let iter = graph.node_type(children[0]);
                let ok = match t {
                    NodeType::Loop => matches!(iter, NodeType::For | NodeType::Let),
                    _ => iter == NodeType::For,
                };
                if !ok {
                    return Err(CompileError::malformed(id, t, format!("cannot bind {iter}")));
                }
            }
            NodeType::Invoke if graph.node_type(children[0]) != NodeType::Function => {
                return Err(CompileError::malformed(id, t, "callee is not a function"));
            }
            NodeType::PositionOf if graph.node_type(children[0]) != NodeType::For => {
                return Err(CompileError::malformed(id, t, "position of a non-For iterator"));
            }
            NodeType::FunctionList if children.iter().any(|&c| graph.node_type(c) != NodeType::Function) => {
                return Err(CompileError::malformed(id, t, "non-function in function list"));
            }
            NodeType::GlobalVariableList if children.iter().any(|&c| graph.node_type(c) != NodeType::Let) => {
                return Err(CompileError::malformed(id, t, "globals must be Let nodes"));
            }
            NodeType::GlobalParameterList | NodeType::FormalParameterList
                if children.iter().any(|&c| graph.node_type(c) != NodeType::Parameter) =>
            {
                return Err(CompileError::malformed(id, t, "expected Parameter nodes"));
            }
            NodeType::Function if !matches!(graph.node(id).payload, Payload::Function { .. }) => {
                return Err(CompileError::malformed(id, t, "function without name"));
            }
            NodeType::SortKey if graph.node_type(children[1]) != NodeType::LiteralString => {
                return Err(CompileError::malformed(id, t, "collation must be a string literal"));
            }
            NodeType::TypeAssert | NodeType::IsType | NodeType::XsltConvert
                if graph.node_type(children[1]) != NodeType::LiteralType =>
            {
                return Err(CompileError::malformed(id, t, "target type must be a type literal"));
            }
            _ => {}
        }
        for (index, &child) in children.iter().enumerate() {
            if graph.is_reference(id, index) && !bound.contains(&child) {
                return Err(CompileError::malformed(id, t, format!("reference to unbound {child}")));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn accepts_built_tree() {
        let mut g = IrGraph::new();
        let ctx = g.xml_context();
        let it = g.for_(ctx);
        let body = g.text(it);
        let lp = g.loop_(it, body);
        g.qil_expression(&[], &[], &[], lp);
        assert_eq!(validate(&g), Ok(()));
    }

    #[rstest]
    fn rejects_let_under_filter() {
        let mut g = IrGraph::new();
        let ctx = g.xml_context();
        let it = g.let_(ctx);
        let t = g.true_();
        let f = g.filter(it, t);
        g.qil_expression(&[], &[], &[], f);
        assert!(matches!(validate(&g), Err(CompileError::Malformed { node_type: NodeType::Filter, .. })));
    }

    #[rstest]
    fn rejects_missing_entry() {
        assert_eq!(validate(&IrGraph::new()), Err(CompileError::NoEntry));
    }
}
