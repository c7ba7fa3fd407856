//! Construction methods and the abstract output state before and after
//! every node that writes to the output.

use crate::annotation::Annotations;
use crate::construct::{ConstructMethod, XmlState};
use std::collections::HashSet;
use xslt_ir::{IrGraph, NodeId, NodeKinds, NodeType, XmlType};

/// Functions whose body pushes constructed content to the output: their
/// result type is node-kind and their content tree reaches a constructor,
/// directly or through a call to another such function.
pub(crate) fn writer_functions(graph: &IrGraph) -> HashSet<NodeId> {
    let functions: Vec<NodeId> = graph.functions().map(|list| graph.children(list).to_vec()).unwrap_or_default();
    let mut writers = HashSet::new();
    loop {
        let mut grew = false;
        for &f in &functions {
            if !writers.contains(&f)
                && graph.xml_type(f).is_node()
                && reaches_constructor(graph, graph.child(f, 1), &writers)
            {
                writers.insert(f);
                grew = true;
            }
        }
        if !grew {
            return writers;
        }
    }
}

fn reaches_constructor(graph: &IrGraph, id: NodeId, writers: &HashSet<NodeId>) -> bool {
    use NodeType as N;
    let children = graph.children(id);
    match graph.node_type(id) {
        N::ElementCtor
        | N::AttributeCtor
        | N::TextCtor
        | N::RawTextCtor
        | N::CommentCtor
        | N::PICtor
        | N::NamespaceDecl
        | N::DocumentCtor
        | N::XsltCopy => true,
        N::Sequence => children.iter().any(|&c| reaches_constructor(graph, c, writers)),
        N::Conditional => children[1..].iter().any(|&c| reaches_constructor(graph, c, writers)),
        N::Choice => graph.children(children[1]).iter().any(|&c| reaches_constructor(graph, c, writers)),
        N::Loop => reaches_constructor(graph, children[1], writers),
        N::Nop => reaches_constructor(graph, children[0], writers),
        N::Invoke => writers.contains(&children[0]),
        _ => false,
    }
}

/// Tree nodes that only sequence their children's output.
pub(crate) fn is_combinator(t: NodeType) -> bool {
    matches!(t, NodeType::Sequence | NodeType::Conditional | NodeType::Choice | NodeType::Loop | NodeType::Nop)
}

/// State after writing a node that becomes element content.
fn after_content(state: XmlState) -> XmlState {
    match state {
        XmlState::EnumAttrs | XmlState::WithinContent => XmlState::WithinContent,
        XmlState::WithinSequence => XmlState::WithinSequence,
        _ => XmlState::Any,
    }
}

fn after_attribute(state: XmlState) -> XmlState {
    match state {
        XmlState::EnumAttrs | XmlState::WithinSequence => state,
        _ => XmlState::Any,
    }
}

fn after_text(state: XmlState) -> XmlState {
    match state {
        XmlState::WithinAttr | XmlState::WithinComment | XmlState::WithinPI => state,
        other => after_content(other),
    }
}

/// State after copying a value of type `ty` to the output.
pub(crate) fn after_copy(state: XmlState, ty: &XmlType) -> XmlState {
    if ty.is_empty() || ty.is_none() {
        return state;
    }
    let kinds = if ty.is_atomic() { NodeKinds::TEXT } else { ty.kinds() };
    let attrs = kinds.intersects(NodeKinds::ATTR_OR_NS);
    let content = kinds.intersects(NodeKinds::CONTENT | NodeKinds::DOCUMENT);
    match (attrs, content) {
        (true, false) => after_attribute(state),
        (false, true) if kinds == NodeKinds::TEXT => after_text(state),
        (false, true) => after_content(state),
        _ if state == XmlState::WithinSequence => state,
        _ => XmlState::Any,
    }
}

pub(crate) struct StateAnalyzer<'a> {
    graph: &'a IrGraph,
    ann: &'a mut Annotations,
    writers: &'a HashSet<NodeId>,
}

impl<'a> StateAnalyzer<'a> {
    pub(crate) fn new(graph: &'a IrGraph, ann: &'a mut Annotations, writers: &'a HashSet<NodeId>) -> Self {
        Self { graph, ann, writers }
    }

    pub(crate) fn run(&mut self, root_output: bool) {
        if root_output && let Some(root) = self.graph.root_expr() {
            self.content(root, XmlState::WithinSequence);
        }
        // Standalone constructors may call writer functions too; their bodies
        // are analyzed again until no caller state grows.
        loop {
            self.writer_function_bodies();
            let before = self.caller_states();
            self.standalone_constructors();
            if self.caller_states() == before {
                break;
            }
        }
    }

    fn writer_list(&self) -> Vec<NodeId> {
        self.graph
            .functions()
            .map(|list| self.graph.children(list).iter().copied().filter(|f| self.writers.contains(f)).collect())
            .unwrap_or_default()
    }

    fn caller_states(&self) -> Vec<XmlState> {
        self.writer_list()
            .into_iter()
            .map(|f| self.ann.construct(f).map_or(XmlState::None, |c| c.caller_states))
            .collect()
    }

    /// Analyze every writer function in the join of its callers' states,
    /// again whenever that join grows.
    fn writer_function_bodies(&mut self) {
        let functions = self.writer_list();
        for &f in &functions {
            self.ann.construct_mut(f).method = ConstructMethod::Writer;
        }
        loop {
            let mut changed = false;
            for &f in &functions {
                let initial = match self.ann.construct(f).map_or(XmlState::None, |c| c.caller_states) {
                    XmlState::None => XmlState::Any,
                    s => s,
                };
                let body = self.graph.child(f, 1);
                if self.ann.construct(body).is_some_and(|c| c.initial == initial) {
                    continue;
                }
                self.content(body, initial);
                changed = true;
            }
            if !changed {
                break;
            }
        }
    }

    /// Constructors reached from iterator-mode code build their content in
    /// a fresh sequence writer.
    fn standalone_constructors(&mut self) {
        let Some(entry) = self.graph.entry() else {
            return;
        };
        for id in self.graph.subtree(entry) {
            if self.graph.node_type(id).is_constructor() && self.ann.construct(id).is_none() {
                self.content(id, XmlState::WithinSequence);
                self.ann.construct_mut(id).method = ConstructMethod::WriterThenIterator;
            }
        }
    }

    /// Analyze `id` as output content starting in `state`; returns the state
    /// after it.
    fn content(&mut self, id: NodeId, state: XmlState) -> XmlState {
        use NodeType as N;
        let graph = self.graph;
        let children = graph.children(id);
        let mut loop_states = None;
        let (method, end) = match graph.node_type(id) {
            N::Sequence => {
                let end = children.iter().fold(state, |s, &c| self.content(c, s));
                (ConstructMethod::Writer, end)
            }
            N::Nop | N::Error | N::Warning => (ConstructMethod::Writer, state),
            N::Conditional => {
                let arms = [children[1], children[2]];
                (ConstructMethod::Writer, self.join_arms(&arms, state))
            }
            N::Choice => {
                let arms = graph.children(children[1]).to_vec();
                (ConstructMethod::Writer, self.join_arms(&arms, state))
            }
            N::Loop => {
                let (iter, body) = (children[0], children[1]);
                let source = graph.xml_type(graph.child(iter, 0));
                let is_for = graph.node_type(iter) == N::For;
                let mut begin = state;
                let mut end = self.content(body, begin);
                if is_for && source.maybe_many() && end != begin {
                    begin = XmlState::Any;
                    end = self.content(body, begin);
                }
                loop_states = Some((begin, end));
                let end = if is_for && source.maybe_empty() { state.join(end) } else { end };
                (ConstructMethod::Writer, end)
            }
            N::ElementCtor => {
                self.content(children[1], XmlState::EnumAttrs);
                (ConstructMethod::Writer, after_content(state))
            }
            N::AttributeCtor => {
                self.content(children[1], XmlState::WithinAttr);
                (ConstructMethod::Writer, after_attribute(state))
            }
            N::NamespaceDecl => (ConstructMethod::Writer, after_attribute(state)),
            N::TextCtor | N::RawTextCtor => (ConstructMethod::Writer, after_text(state)),
            N::CommentCtor => {
                self.content(children[0], XmlState::WithinComment);
                (ConstructMethod::Writer, after_content(state))
            }
            N::PICtor => {
                self.content(children[1], XmlState::WithinPI);
                (ConstructMethod::Writer, after_content(state))
            }
            N::DocumentCtor | N::RtfCtor => {
                self.content(children[0], XmlState::WithinContent);
                (ConstructMethod::Writer, after_content(state))
            }
            N::XsltCopy => {
                let node = graph.xml_type(children[0]);
                let inner = if node.kinds() == NodeKinds::ELEMENT { XmlState::EnumAttrs } else { XmlState::Any };
                self.content(children[1], inner);
                (ConstructMethod::Writer, after_copy(state, &node))
            }
            N::Invoke if self.writers.contains(&children[0]) => {
                let callee = self.ann.construct_mut(children[0]);
                callee.caller_states = callee.caller_states.join(state);
                (ConstructMethod::Writer, XmlState::Any)
            }
            _ => (ConstructMethod::IteratorThenWriter, after_copy(state, &graph.xml_type(id))),
        };
        let info = self.ann.construct_mut(id);
        info.method = method;
        info.initial = state;
        info.final_state = end;
        if let Some((begin, end_loop)) = loop_states {
            info.begin_loop = begin;
            info.end_loop = end_loop;
        }
        tracing::trace!(node = %id, ?method, from = %state, to = %end, "output state");
        end
    }

    /// Join of the states after each arm; arms that never return do not
    /// contribute.
    fn join_arms(&mut self, arms: &[NodeId], state: XmlState) -> XmlState {
        let mut joined = XmlState::None;
        for &arm in arms {
            let end = self.content(arm, state);
            if !self.graph.xml_type(arm).is_none() {
                joined = joined.join(end);
            }
        }
        if joined == XmlState::None { state } else { joined }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(XmlState::EnumAttrs, XmlType::ATTRIBUTE, XmlState::EnumAttrs)]
    #[case(XmlState::WithinContent, XmlType::ATTRIBUTE, XmlState::Any)]
    #[case(XmlState::EnumAttrs, XmlType::ELEMENT_S, XmlState::WithinContent)]
    #[case(XmlState::WithinSequence, XmlType::ELEMENT_S, XmlState::WithinSequence)]
    #[case(XmlState::WithinAttr, XmlType::STRING, XmlState::WithinAttr)]
    #[case(XmlState::WithinAttr, XmlType::ELEMENT, XmlState::Any)]
    #[case(XmlState::WithinContent, XmlType::NODE_S, XmlState::Any)]
    #[case(XmlState::WithinSequence, XmlType::ITEM_S, XmlState::WithinSequence)]
    #[case(XmlState::WithinComment, XmlType::EMPTY, XmlState::WithinComment)]
    fn copy_transitions(#[case] from: XmlState, #[case] ty: XmlType, #[case] expected: XmlState) {
        assert_eq!(after_copy(from, &ty), expected);
    }
}
