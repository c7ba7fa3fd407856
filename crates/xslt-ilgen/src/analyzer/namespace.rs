//! Statically known namespace declarations along output content.
//!
//! Namespace declarations whose mapping is already in scope are flagged so
//! the writer call can be omitted. Computed names remember the mappings in
//! scope so their prefixes can be resolved at run time.

use crate::annotation::{Annotations, ScopeMappings};
use string_cache::DefaultAtom;
use xslt_ir::names::XML_NS;
use xslt_ir::{IrGraph, Literal, NodeId, NodeType};

type Scope = Vec<(DefaultAtom, DefaultAtom)>;

fn base_scope() -> Scope {
    vec![(DefaultAtom::from("xml"), DefaultAtom::from(XML_NS))]
}

fn declare(scope: &mut Scope, prefix: DefaultAtom, ns: DefaultAtom) {
    scope.retain(|(p, _)| *p != prefix);
    scope.push((prefix, ns));
}

fn in_scope(scope: &Scope, prefix: &DefaultAtom, ns: &DefaultAtom) -> bool {
    scope.iter().rev().find(|(p, _)| p == prefix).is_some_and(|(_, n)| n == ns)
}

struct NamespaceWalker<'a> {
    graph: &'a IrGraph,
    ann: &'a mut Annotations,
    elided: usize,
}

impl NamespaceWalker<'_> {
    fn record(&mut self, id: NodeId, scope: &Scope) {
        self.ann.get_mut(id).scope = Some(scope.iter().cloned().collect::<ScopeMappings>());
    }

    /// Walk the owned children of `id` as values, each starting from the
    /// base scope.
    fn values(&mut self, id: NodeId) {
        for index in 0..self.graph.children(id).len() {
            if !self.graph.is_reference(id, index) {
                self.walk(self.graph.child(id, index), &mut base_scope());
            }
        }
    }

    fn walk(&mut self, id: NodeId, scope: &mut Scope) {
        use NodeType as N;
        let graph = self.graph;
        let children = graph.children(id);
        match graph.node_type(id) {
            N::Sequence | N::Nop => {
                for &c in children {
                    self.walk(c, scope);
                }
            }
            N::Conditional => {
                self.walk(children[0], &mut base_scope());
                for &arm in &children[1..] {
                    self.walk(arm, &mut scope.clone());
                }
            }
            N::Choice => {
                self.walk(children[0], &mut base_scope());
                for &arm in graph.children(children[1]) {
                    self.walk(arm, &mut scope.clone());
                }
            }
            N::Loop => {
                self.walk(children[0], &mut base_scope());
                self.walk(children[1], &mut scope.clone());
            }
            N::ElementCtor => {
                let (name, content) = (children[0], children[1]);
                self.walk(name, &mut scope.clone());
                let mut inner = match graph.literal(name).and_then(Literal::as_qname) {
                    Some(q) => {
                        let mut inner = scope.clone();
                        declare(&mut inner, q.prefix.clone(), q.ns.clone());
                        inner
                    }
                    None => {
                        self.record(id, scope);
                        base_scope()
                    }
                };
                self.walk(content, &mut inner);
            }
            N::AttributeCtor => {
                let (name, value) = (children[0], children[1]);
                self.walk(name, &mut scope.clone());
                match graph.literal(name).and_then(Literal::as_qname) {
                    Some(q) if !q.prefix.is_empty() => declare(scope, q.prefix.clone(), q.ns.clone()),
                    Some(_) => {}
                    None => self.record(id, scope),
                }
                self.walk(value, &mut base_scope());
            }
            N::NamespaceDecl => {
                let prefix = graph.literal(children[0]).and_then(Literal::as_str).map(DefaultAtom::from);
                let uri = graph.literal(children[1]).and_then(Literal::as_str).map(DefaultAtom::from);
                if let (Some(prefix), Some(uri)) = (prefix, uri) {
                    if in_scope(scope, &prefix, &uri) {
                        self.ann.construct_mut(id).is_namespace_in_scope = true;
                        self.elided += 1;
                    } else {
                        declare(scope, prefix, uri);
                    }
                }
            }
            N::StrParseQName => {
                self.record(id, scope);
                self.values(id);
            }
            _ => self.values(id),
        }
    }
}

pub(crate) fn analyze(graph: &IrGraph, ann: &mut Annotations) {
    let Some(entry) = graph.entry() else {
        return;
    };
    let mut walker = NamespaceWalker { graph, ann, elided: 0 };
    walker.walk(entry, &mut base_scope());
    tracing::debug!(elided = walker.elided, "namespace declarations already in scope");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use xslt_ir::QName;

    #[rstest]
    fn redundant_declaration_is_flagged() {
        let mut g = IrGraph::new();
        let inner_decl = g.namespace_decl("p", "urn:p");
        let inner = g.element(QName::new("p", "child", "urn:p"), inner_decl);
        let outer_decl = g.namespace_decl("q", "urn:q");
        let content = g.sequence(&[outer_decl, inner]);
        let outer = g.element(QName::local("root"), content);
        g.qil_expression(&[], &[], &[], outer);

        let mut ann = Annotations::new();
        analyze(&g, &mut ann);
        assert!(ann.construct(inner_decl).is_some_and(|c| c.is_namespace_in_scope));
        assert!(ann.construct(outer_decl).is_none_or(|c| !c.is_namespace_in_scope));
    }

    #[rstest]
    fn computed_name_keeps_scope() {
        let mut g = IrGraph::new();
        let text = g.string("p:x");
        let ns = g.string("");
        let parsed = g.binary(NodeType::StrParseQName, text, ns);
        let empty = g.sequence(&[]);
        let computed = g.make(NodeType::ElementCtor, &[parsed, empty]);
        let outer = g.element(QName::new("p", "root", "urn:p"), computed);
        g.qil_expression(&[], &[], &[], outer);

        let mut ann = Annotations::new();
        analyze(&g, &mut ann);
        let scope = ann.get(computed).and_then(|a| a.scope.clone()).expect("scope");
        assert!(scope.iter().any(|(p, n)| &**p == "p" && &**n == "urn:p"));
        assert!(ann.get(parsed).and_then(|a| a.scope.as_ref()).is_some());
    }
}
