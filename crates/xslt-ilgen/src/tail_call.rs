//! Marks calls in tail position of writer functions.

use crate::annotation::Annotations;
use crate::construct::ConstructMethod;
use crate::patterns::Pattern;
use xslt_ir::{IrGraph, NodeId, NodeType};

fn is_writer(ann: &Annotations, id: NodeId) -> bool {
    ann.construct(id).is_some_and(|c| c.method == ConstructMethod::Writer)
}

/// Mark the last writer-mode call on every control path through `id`.
fn mark(graph: &IrGraph, ann: &mut Annotations, id: NodeId) -> usize {
    let children = graph.children(id);
    match graph.node_type(id) {
        NodeType::Sequence => children.last().map_or(0, |&last| mark(graph, ann, last)),
        NodeType::Conditional => mark(graph, ann, children[1]) + mark(graph, ann, children[2]),
        NodeType::Choice => graph.children(children[1]).iter().map(|&arm| mark(graph, ann, arm)).sum(),
        NodeType::Invoke if is_writer(ann, id) && is_writer(ann, children[0]) => {
            ann.add(graph, id, Pattern::TailCall);
            1
        }
        _ => 0,
    }
}

pub fn analyze(graph: &IrGraph, ann: &mut Annotations) {
    let Some(functions) = graph.functions() else {
        return;
    };
    let mut marked = 0;
    for &f in graph.children(functions) {
        if is_writer(ann, f) {
            marked += mark(graph, ann, graph.child(f, 1));
        }
    }
    tracing::debug!(tail_calls = marked, "tail-call analysis finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CompilerOptions;
    use rstest::rstest;
    use xslt_ir::{QName, XmlType};

    #[rstest]
    fn last_call_in_writer_function_is_tail() {
        let mut g = IrGraph::new();
        let f = g.function(QName::local("emit"), &[], XmlType::ELEMENT_S, false);
        let empty = g.sequence(&[]);
        let element = g.element(QName::local("e"), empty);
        let first = g.invoke(f, &[]);
        let last = g.invoke(f, &[]);
        let body = g.sequence(&[element, first, last]);
        g.set_function_body(f, body);
        let root = g.invoke(f, &[]);
        g.qil_expression(&[f], &[], &[], root);

        let mut ann = Annotations::new();
        crate::analyzer::analyze(&g, &mut ann, &CompilerOptions::default());
        analyze(&g, &mut ann);
        assert!(ann.matches(&g, last, Pattern::TailCall));
        assert!(!ann.matches(&g, first, Pattern::TailCall));
        assert!(!ann.matches(&g, root, Pattern::TailCall));
    }
}
