//! Nested JSON form of the IR.
//!
//! Iterators and functions declare an `id` where they are bound; every other
//! occurrence is written as `{"op": "ref", "id": N}`. This is the exchange
//! format between a front end and the compiler.

use crate::graph::{IrGraph, NodeId, Payload, SourceSpan};
use crate::literal::Literal;
use crate::names::QName;
use crate::node::{Arity, NodeType};
use crate::types::XmlType;
use chrono::DateTime;
use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrTree {
    pub op: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<IrTree>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descending: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_effects: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
}

#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("unknown operator `{0}`")]
    UnknownOp(String),
    #[error("`{op}` expects {expected} children, found {found}")]
    Arity { op: NodeType, expected: u8, found: usize },
    #[error("`{op}` requires a `value`")]
    MissingValue { op: NodeType },
    #[error("invalid value for `{op}`: {reason}")]
    BadValue { op: NodeType, reason: String },
    #[error("invalid type `{0}`")]
    BadType(String),
    #[error("id {0} is declared twice")]
    DuplicateId(u32),
    #[error("reference to undeclared id {0}")]
    UnresolvedRef(u32),
    #[error("`ref` must carry an `id`")]
    RefWithoutId,
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

enum Built {
    Node(NodeId),
    Ref(u32),
}

#[derive(Default)]
struct Reader {
    graph: IrGraph,
    declared: HashMap<u32, NodeId>,
    pending: Vec<(NodeId, usize, u32)>,
    explicit: HashSet<NodeId>,
}

impl IrTree {
    pub fn from_json(text: &str) -> Result<Self, TreeError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, TreeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn leaf(op: NodeType) -> Self {
        IrTree {
            op: op.name().to_string(),
            args: Vec::new(),
            value: None,
            name: None,
            id: None,
            ty: None,
            descending: None,
            side_effects: None,
            span: None,
        }
    }

    /// Build an arena graph. A root that is not a `QilExpression` is wrapped
    /// in one with empty function, global and parameter lists.
    pub fn to_graph(&self) -> Result<IrGraph, TreeError> {
        let mut reader = Reader::default();
        let root = match reader.build(self)? {
            Built::Node(id) => id,
            Built::Ref(id) => return Err(TreeError::UnresolvedRef(id)),
        };
        for (parent, index, id) in std::mem::take(&mut reader.pending) {
            let target = *reader.declared.get(&id).ok_or(TreeError::UnresolvedRef(id))?;
            reader.graph.set_child(parent, index, target);
        }
        // Forward references were placeholders while their parents were
        // typed; children always precede parents in the arena.
        let ids: Vec<NodeId> = reader.graph.ids().collect();
        for id in ids {
            if !reader.explicit.contains(&id) {
                reader.graph.retype(id);
            }
        }
        let mut graph = reader.graph;
        if graph.node_type(root) == NodeType::QilExpression {
            graph.set_entry(root);
        } else {
            graph.qil_expression(&[], &[], &[], root);
        }
        Ok(graph)
    }

    /// Nested form of `graph` starting at its entry node.
    pub fn from_graph(graph: &IrGraph, with_types: bool) -> Option<Self> {
        let entry = graph.entry()?;
        Some(Self::write(graph, entry, false, with_types))
    }

    fn write(graph: &IrGraph, id: NodeId, as_ref: bool, with_types: bool) -> Self {
        if as_ref {
            let mut out = IrTree::leaf(NodeType::Nop);
            out.op = "ref".to_string();
            out.id = Some(id.0);
            return out;
        }
        let data = graph.node(id);
        let mut out = IrTree::leaf(data.node_type);
        out.span = data.span;
        let t = data.node_type;
        if t.is_iterator() || t == NodeType::Function {
            out.id = Some(id.0);
        }
        let explicit = matches!(
            t,
            NodeType::Parameter | NodeType::Function | NodeType::Unknown | NodeType::XsltInvokeEarlyBound
        );
        if with_types || explicit {
            out.ty = Some(data.xml_type.to_string());
        }
        match &data.payload {
            Payload::None => {}
            Payload::Literal(lit) => out.value = Some(literal_json(lit)),
            Payload::Name(name) => out.name = Some(name.to_string()),
            Payload::SortKey { descending } => out.descending = Some(*descending),
            Payload::Function { name, side_effects } => {
                out.name = Some(name.to_string());
                out.side_effects = Some(*side_effects);
            }
            Payload::ExternalMethod { type_name, method } => {
                out.name = Some(format!("{type_name}::{method}"));
            }
        }
        out.args = data
            .children
            .iter()
            .enumerate()
            .map(|(i, &c)| Self::write(graph, c, graph.is_reference(id, i), with_types))
            .collect();
        out
    }
}

fn literal_json(lit: &Literal) -> Value {
    match lit {
        Literal::String(s) => Value::from(s.as_str()),
        Literal::Int32(v) => Value::from(*v),
        Literal::Int64(v) => Value::from(*v),
        Literal::Double(v) => Value::from(*v),
        Literal::Decimal(v) => Value::from(v.to_string()),
        Literal::QName(q) => Value::from(q.to_string()),
        Literal::Type(t) => Value::from(t.to_string()),
        Literal::DateTime(d) => Value::from(d.to_rfc3339()),
    }
}

impl Reader {
    fn build(&mut self, tree: &IrTree) -> Result<Built, TreeError> {
        if tree.op == "ref" {
            let id = tree.id.ok_or(TreeError::RefWithoutId)?;
            return Ok(match self.declared.get(&id) {
                Some(&node) => Built::Node(node),
                None => Built::Ref(id),
            });
        }
        let op = NodeType::from_str(&tree.op).map_err(|_| TreeError::UnknownOp(tree.op.clone()))?;

        let mut children = Vec::with_capacity(tree.args.len());
        let mut forward = Vec::new();
        for (index, arg) in tree.args.iter().enumerate() {
            match self.build(arg)? {
                Built::Node(id) => children.push(id),
                Built::Ref(target) => {
                    children.push(self.graph.unknown(XmlType::ITEM_S));
                    forward.push((index, target));
                }
            }
        }
        if op == NodeType::Parameter && children.is_empty() {
            children.push(self.graph.unknown(XmlType::EMPTY));
        }
        if let Arity::Fixed(n) = op.arity()
            && children.len() != n as usize
        {
            return Err(TreeError::Arity { op, expected: n, found: children.len() });
        }

        let payload = self.payload(op, tree)?;
        let explicit_type = match &tree.ty {
            Some(text) => Some(XmlType::from_str(text).map_err(|_| TreeError::BadType(text.clone()))?),
            None => None,
        };
        let inferred = self.graph.infer_type(op, &children);
        let ty = explicit_type.or(inferred).unwrap_or(XmlType::ITEM_S);
        let id = self.graph.add(op, ty, &children, payload);
        if explicit_type.is_some() || inferred.is_none() {
            self.explicit.insert(id);
        }
        if let Some(span) = tree.span {
            self.graph.set_span(id, span);
        }
        for (index, target) in forward {
            self.pending.push((id, index, target));
        }
        if let Some(decl) = tree.id {
            if self.declared.insert(decl, id).is_some() {
                return Err(TreeError::DuplicateId(decl));
            }
        }
        Ok(Built::Node(id))
    }

    fn payload(&self, op: NodeType, tree: &IrTree) -> Result<Payload, TreeError> {
        let bad = |reason: &str| TreeError::BadValue { op, reason: reason.to_string() };
        let value = || tree.value.as_ref().ok_or(TreeError::MissingValue { op });
        let text = || value().and_then(|v| v.as_str().ok_or_else(|| bad("expected a string")));
        let lit = match op {
            NodeType::LiteralString => Literal::String(CompactString::from(text()?)),
            NodeType::LiteralInt32 => {
                let v = value()?.as_i64().ok_or_else(|| bad("expected an integer"))?;
                Literal::Int32(i32::try_from(v).map_err(|_| bad("out of 32-bit range"))?)
            }
            NodeType::LiteralInt64 => Literal::Int64(value()?.as_i64().ok_or_else(|| bad("expected an integer"))?),
            NodeType::LiteralDouble => Literal::Double(value()?.as_f64().ok_or_else(|| bad("expected a number"))?),
            NodeType::LiteralDecimal => {
                Literal::Decimal(Decimal::from_str(text()?).map_err(|e| bad(&e.to_string()))?)
            }
            NodeType::LiteralQName => Literal::QName(QName::parse(text()?)),
            NodeType::LiteralType => {
                let t = text()?;
                Literal::Type(XmlType::from_str(t).map_err(|_| TreeError::BadType(t.to_string()))?)
            }
            NodeType::LiteralDateTime => Literal::DateTime(
                DateTime::parse_from_rfc3339(text()?).map_err(|e| bad(&e.to_string()))?,
            ),
            NodeType::SortKey => {
                return Ok(Payload::SortKey { descending: tree.descending.unwrap_or(false) });
            }
            NodeType::Function => {
                return Ok(Payload::Function {
                    name: QName::parse(tree.name.as_deref().unwrap_or("")),
                    side_effects: tree.side_effects.unwrap_or(false),
                });
            }
            NodeType::XsltInvokeEarlyBound => {
                let full = tree.name.as_deref().ok_or_else(|| bad("expected `Type::method` name"))?;
                let (type_name, method) = full.rsplit_once("::").ok_or_else(|| bad("expected `Type::method` name"))?;
                return Ok(Payload::ExternalMethod {
                    type_name: CompactString::from(type_name),
                    method: CompactString::from(method),
                });
            }
            _ => {
                return Ok(match &tree.name {
                    Some(name) => Payload::Name(QName::parse(name)),
                    None => Payload::None,
                });
            }
        };
        Ok(Payload::Literal(lit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn non_root_is_wrapped() {
        let tree = IrTree::from_json(
            r#"{"op":"Add","args":[{"op":"LiteralInt32","value":2},{"op":"LiteralInt32","value":3}]}"#,
        )
        .expect("json");
        let g = tree.to_graph().expect("graph");
        let root = g.root_expr().expect("root");
        assert_eq!(g.node_type(root), NodeType::Add);
        assert_eq!(g.xml_type(root), XmlType::INT);
    }

    #[rstest]
    fn references_resolve_to_binding() {
        let tree = IrTree::from_json(
            r#"{"op":"Loop","args":[
                {"op":"For","id":1,"args":[{"op":"Content","args":[{"op":"XmlContext"}]}]},
                {"op":"TextCtor","args":[{"op":"XPathNodeValue","args":[{"op":"ref","id":1}]}]}
            ]}"#,
        )
        .expect("json");
        let g = tree.to_graph().expect("graph");
        let lp = g.root_expr().expect("root");
        let it = g.child(lp, 0);
        let value = g.child(g.child(lp, 1), 0);
        assert_eq!(g.child(value, 0), it);
        assert!(g.is_reference(value, 0));
    }

    #[rstest]
    fn forward_function_reference_is_patched() {
        let tree = IrTree::from_json(
            r#"{"op":"QilExpression","args":[
                {"op":"FunctionList","args":[
                    {"op":"Function","id":1,"name":"f","type":"element","args":[
                        {"op":"FormalParameterList"},
                        {"op":"Invoke","args":[{"op":"ref","id":2},{"op":"ActualParameterList"}]}
                    ]},
                    {"op":"Function","id":2,"name":"g","type":"element","args":[
                        {"op":"FormalParameterList"},
                        {"op":"ElementCtor","args":[{"op":"LiteralQName","value":"a"},{"op":"Sequence"}]}
                    ]}
                ]},
                {"op":"GlobalVariableList"},
                {"op":"GlobalParameterList"},
                {"op":"Invoke","args":[{"op":"ref","id":1},{"op":"ActualParameterList"}]}
            ]}"#,
        )
        .expect("json");
        let g = tree.to_graph().expect("graph");
        let funcs = g.functions().expect("functions");
        let f = g.child(funcs, 0);
        let inner = g.child(f, 1);
        assert_eq!(g.child(inner, 0), g.child(funcs, 1));
        assert_eq!(g.xml_type(inner), XmlType::ELEMENT);
    }

    #[rstest]
    #[case(r#"{"op":"Frobnicate"}"#)]
    #[case(r#"{"op":"Add","args":[{"op":"True"}]}"#)]
    #[case(r#"{"op":"ref","id":9}"#)]
    #[case(r#"{"op":"LiteralInt32","value":"x"}"#)]
    fn rejects_malformed(#[case] text: &str) {
        let tree = IrTree::from_json(text).expect("json");
        assert!(tree.to_graph().is_err());
    }

    #[rstest]
    fn writes_back_with_refs() {
        let mut g = IrGraph::new();
        let ctx = g.xml_context();
        let it = g.for_(ctx);
        let body = g.text(it);
        let lp = g.loop_(it, body);
        g.qil_expression(&[], &[], &[], lp);
        let tree = IrTree::from_graph(&g, false).expect("entry");
        let reread = tree.to_graph().expect("graph");
        let lp2 = reread.root_expr().expect("root");
        assert_eq!(reread.node_type(lp2), NodeType::Loop);
        let text = reread.child(lp2, 1);
        assert_eq!(reread.child(text, 0), reread.child(lp2, 0));
    }
}
