//! Attribute and namespace facts of element constructors.

use super::state::is_combinator;
use crate::annotation::Annotations;
use std::collections::HashSet;
use xslt_ir::{IrGraph, NodeId, NodeKinds, NodeType, QName};

#[derive(Debug, Default)]
struct ElementFacts {
    attributes: bool,
    duplicates: bool,
    namespaces: bool,
    namespaces_after_attributes: bool,
    seen_attribute: bool,
    names: HashSet<QName>,
}

impl ElementFacts {
    /// Content that may hold any attribute or namespace node.
    fn unknown(&mut self, kinds: NodeKinds) {
        if kinds.intersects(NodeKinds::ATTRIBUTE) {
            self.attributes = true;
            self.duplicates = true;
            self.seen_attribute = true;
        }
        if kinds.intersects(NodeKinds::NAMESPACE) {
            self.namespaces = true;
            self.namespaces_after_attributes |= self.seen_attribute;
        }
    }
}

struct Walker<'a> {
    graph: &'a IrGraph,
    writers: &'a HashSet<NodeId>,
}

impl Walker<'_> {
    fn walk(&self, id: NodeId, repeated: bool, facts: &mut ElementFacts) {
        use NodeType as N;
        let graph = self.graph;
        let children = graph.children(id);
        match graph.node_type(id) {
            N::AttributeCtor => {
                facts.attributes = true;
                match graph.name(children[0]) {
                    Some(name) if graph.node_type(children[0]) == N::LiteralQName => {
                        facts.duplicates |= repeated || !facts.names.insert(name.clone());
                    }
                    _ => facts.duplicates = true,
                }
                facts.seen_attribute = true;
            }
            N::NamespaceDecl => {
                facts.namespaces = true;
                facts.namespaces_after_attributes |= facts.seen_attribute;
            }
            N::Conditional | N::Choice => {
                let arms: Vec<NodeId> = match graph.node_type(id) {
                    N::Conditional => children[1..].to_vec(),
                    _ => graph.children(children[1]).to_vec(),
                };
                let before = std::mem::take(&mut facts.names);
                let seen_before = facts.seen_attribute;
                let mut names = before.clone();
                let mut seen = seen_before;
                for arm in arms {
                    facts.names = before.clone();
                    facts.seen_attribute = seen_before;
                    self.walk(arm, repeated, facts);
                    names.extend(facts.names.drain());
                    seen |= facts.seen_attribute;
                }
                facts.names = names;
                facts.seen_attribute = seen;
            }
            N::Loop => {
                let source = graph.xml_type(graph.child(children[0], 0));
                let again = repeated || (graph.node_type(children[0]) == N::For && source.maybe_many());
                self.walk(children[1], again, facts);
            }
            t if is_combinator(t) => {
                for &c in children {
                    self.walk(c, repeated, facts);
                }
            }
            N::ElementCtor | N::TextCtor | N::RawTextCtor | N::CommentCtor | N::PICtor | N::Error | N::Warning => {}
            N::Invoke if self.writers.contains(&children[0]) => facts.unknown(NodeKinds::ATTR_OR_NS),
            N::XsltCopy => facts.unknown(graph.xml_type(children[0]).kinds()),
            _ => {
                let ty = graph.xml_type(id);
                if !ty.is_atomic() && !ty.is_empty() {
                    facts.unknown(ty.kinds());
                }
            }
        }
    }
}

/// Record attribute, duplicate and namespace facts on every element
/// constructor.
pub(crate) fn analyze(graph: &IrGraph, ann: &mut Annotations, writers: &HashSet<NodeId>) {
    let Some(entry) = graph.entry() else {
        return;
    };
    let walker = Walker { graph, writers };
    for id in graph.subtree(entry) {
        if graph.node_type(id) != NodeType::ElementCtor {
            continue;
        }
        let mut facts = ElementFacts::default();
        walker.walk(graph.child(id, 1), false, &mut facts);
        let info = ann.construct_mut(id);
        info.might_have_attributes = facts.attributes;
        info.might_have_duplicate_attributes = facts.duplicates;
        info.might_have_namespaces = facts.namespaces;
        info.might_have_namespaces_after_attributes = facts.namespaces_after_attributes;
        tracing::trace!(
            node = %id,
            attributes = facts.attributes,
            duplicates = facts.duplicates,
            namespaces = facts.namespaces,
            "element content"
        );
    }
}
