//! Pattern facts for navigation, filters and positional predicates.

use super::Optimizer;
use crate::patterns::{
    DOD_STEP, ELEMENT_QNAME, INDEXED_NODES, KEY_EXPRESSION, KIND_TEST_TYPE, LOOKUP_VALUE, MAX_POSITION, Pattern,
    PatternArg, POSITION_VALUE, RTF_TEXT, STEP_INPUT, STEP_NODE,
};
use std::collections::HashSet;
use xslt_ir::{Literal, NodeId, NodeKinds, NodeType, XmlType};

impl Optimizer<'_> {
    pub(super) fn annotate_axis(&mut self, id: NodeId) {
        self.ann.add(self.graph, id, Pattern::Axis);
    }

    /// Children are visited first, so every axis below has its fact.
    fn is_axis_node(&self, id: NodeId) -> bool {
        self.ann.matches(self.graph, id, Pattern::Axis)
    }

    /// The axis a navigation step applies to `iter`, looking through a
    /// recognized kind or name filter.
    fn step_axis(&self, body: NodeId, iter: NodeId) -> Option<NodeId> {
        let axis = match self.nt(body) {
            NodeType::Filter => {
                let facts = self.ann.read(self.graph, body);
                let shaped = facts.matches(Pattern::FilterElements)
                    || facts.matches(Pattern::FilterContentKind)
                    || facts.matches(Pattern::FilterAttributeKind);
                if !shaped {
                    return None;
                }
                self.child(self.child(body, 0), 0)
            }
            _ if self.is_axis_node(body) => body,
            _ => return None,
        };
        (self.is_axis_node(axis) && self.graph.children(axis).first() == Some(&iter)).then_some(axis)
    }

    pub(super) fn annotate_loop(&mut self, id: NodeId) {
        let (iter, body) = (self.child(id, 0), self.child(id, 1));
        if self.nt(iter) != NodeType::For {
            return;
        }
        let Some(axis) = self.step_axis(body, iter) else {
            return;
        };
        let input = self.child(iter, 0);
        let facts = self.ann.write(self.graph, id);
        facts.add(Pattern::Step);
        facts.set_arg(STEP_NODE, PatternArg::Node(body));
        facts.set_arg(STEP_INPUT, PatternArg::Node(input));

        let input_facts = self.ann.read(self.graph, input);
        let ordered_input = input_facts.matches(Pattern::IsDocOrderDistinct);
        let same_depth = input_facts.matches(Pattern::SameDepth);
        if !(ordered_input && same_depth) {
            return;
        }
        match self.nt(axis) {
            NodeType::Content | NodeType::Attribute => {
                self.ann.add(self.graph, id, Pattern::IsDocOrderDistinct);
                self.ann.add(self.graph, id, Pattern::SameDepth);
            }
            NodeType::Descendant | NodeType::DescendantOrSelf => {
                self.ann.add(self.graph, id, Pattern::IsDocOrderDistinct);
            }
            _ => {}
        }
    }

    pub(super) fn annotate_filter(&mut self, id: NodeId) {
        let (iter, predicate) = (self.child(id, 0), self.child(id, 1));
        let source = self.child(iter, 0);
        for pattern in [Pattern::IsDocOrderDistinct, Pattern::SameDepth] {
            self.ann.inherit(self.graph, source, id, pattern);
        }
        self.annotate_filter_shape(id, iter, predicate);
        self.annotate_position(id, iter, source, predicate);
        self.annotate_equality_index(id, iter, source, predicate);
    }

    fn annotate_filter_shape(&mut self, id: NodeId, iter: NodeId, predicate: NodeId) {
        match self.nt(predicate) {
            NodeType::IsType if self.child(predicate, 0) == iter => {
                let Some(test) = self.lit(self.child(predicate, 1)).and_then(Literal::as_type) else {
                    return;
                };
                if !test.is_node() || !test.is_singleton() {
                    return;
                }
                let pattern = if test.kinds() == NodeKinds::ATTRIBUTE {
                    Pattern::FilterAttributeKind
                } else if NodeKinds::CONTENT.contains(test.kinds()) {
                    Pattern::FilterContentKind
                } else {
                    return;
                };
                let facts = self.ann.write(self.graph, id);
                facts.add(pattern);
                facts.set_arg(KIND_TEST_TYPE, PatternArg::Type(test));
            }
            NodeType::And => {
                let (kind, name) = (self.child(predicate, 0), self.child(predicate, 1));
                let element_test = self.nt(kind) == NodeType::IsType
                    && self.child(kind, 0) == iter
                    && self.lit(self.child(kind, 1)).and_then(Literal::as_type) == Some(XmlType::ELEMENT);
                if !element_test || self.nt(name) != NodeType::Eq {
                    return;
                }
                let (name_of, qname) = (self.child(name, 0), self.child(name, 1));
                if self.nt(name_of) != NodeType::NameOf || self.child(name_of, 0) != iter {
                    return;
                }
                let Some(qname) = self.lit(qname).and_then(Literal::as_qname).cloned() else {
                    return;
                };
                let facts = self.ann.write(self.graph, id);
                facts.add(Pattern::FilterElements);
                facts.set_arg(ELEMENT_QNAME, PatternArg::Name(qname));
            }
            _ => {}
        }
    }

    /// `PositionOf($j) op <literal>` where `$j` is the filter iterator.
    fn position_test(&self, predicate: NodeId, iter: NodeId) -> Option<(NodeType, NodeId)> {
        let t = self.nt(predicate);
        if !t.is_comparison() {
            return None;
        }
        let position = self.child(predicate, 0);
        (self.nt(position) == NodeType::PositionOf && self.child(position, 0) == iter)
            .then(|| (t, self.child(predicate, 1)))
    }

    fn max_position(&self, predicate: NodeId, iter: NodeId) -> Option<i64> {
        if self.nt(predicate) == NodeType::And {
            return self.max_position(self.child(predicate, 0), iter);
        }
        let (op, value) = self.position_test(predicate, iter)?;
        let n = self.lit(value).and_then(Literal::as_i64)?;
        match op {
            NodeType::Lt => n.checked_sub(1),
            NodeType::Le | NodeType::Eq => Some(n),
            _ => None,
        }
    }

    fn annotate_position(&mut self, id: NodeId, iter: NodeId, source: NodeId, predicate: NodeId) {
        if let Some((NodeType::Eq, value)) = self.position_test(predicate, iter) {
            if let Some(n) = self.lit(value).and_then(Literal::as_i64) {
                let facts = self.ann.write(self.graph, id);
                facts.add(Pattern::FilterPosition);
                facts.set_arg(POSITION_VALUE, PatternArg::Int(n));
            } else if self.nt(value) == NodeType::Length
                && self.child(value, 0) == source
                && self.nt(source).is_iterator()
            {
                self.ann.add(self.graph, id, Pattern::FilterLast);
            }
        }
        if let Some(max) = self.max_position(predicate, iter) {
            let facts = self.ann.write(self.graph, id);
            facts.add(Pattern::MaxPosition);
            facts.set_arg(MAX_POSITION, PatternArg::Int(max));
        }
    }

    fn global_declarations(&self) -> HashSet<NodeId> {
        [self.graph.globals(), self.graph.global_params()]
            .into_iter()
            .flatten()
            .flat_map(|list| self.graph.children(list).iter().copied())
            .collect()
    }

    /// `Filter($j in X, K = V)` with string keys, where `K` depends only on
    /// `$j`, `V` not on `$j`, and `X` only on globals: the node set can be
    /// indexed by `K` once and looked up with `V`.
    fn annotate_equality_index(&mut self, id: NodeId, iter: NodeId, source: NodeId, predicate: NodeId) {
        if self.nt(predicate) != NodeType::Eq || !self.ty(source).is_node() || self.has_side_effects(source) {
            return;
        }
        let is_string = |opt: &Self, n: NodeId| opt.ty(n).is_subtype_of(&XmlType::STRING);
        let (a, b) = (self.child(predicate, 0), self.child(predicate, 1));
        let key_only_on_iter = |opt: &Self, k: NodeId| {
            k != iter && opt.graph.references_in(k).iter().all(|r| *r == iter)
        };
        let (key, value) = if key_only_on_iter(self, a) && !self.depends_on(b, iter) {
            (a, b)
        } else if key_only_on_iter(self, b) && !self.depends_on(a, iter) {
            (b, a)
        } else {
            return;
        };
        if !is_string(self, key) || !is_string(self, value) {
            return;
        }
        let globals = self.global_declarations();
        let source_refs = if self.nt(source).is_iterator() {
            HashSet::from([source])
        } else {
            self.graph.references_in(source)
        };
        if !source_refs.iter().all(|r| globals.contains(r)) {
            return;
        }
        let facts = self.ann.write(self.graph, id);
        facts.add(Pattern::EqualityIndex);
        facts.set_arg(INDEXED_NODES, PatternArg::Node(source));
        facts.set_arg(KEY_EXPRESSION, PatternArg::Node(key));
        facts.set_arg(LOOKUP_VALUE, PatternArg::Node(value));
    }

    pub(super) fn annotate_doc_order(&mut self, id: NodeId) {
        let input = self.child(id, 0);
        if self.nt(input) == NodeType::Loop && self.ann.matches(self.graph, input, Pattern::Step) {
            let facts = self.ann.read(self.graph, input);
            let (Some(step), Some(step_input)) = (facts.node_arg(STEP_NODE), facts.node_arg(STEP_INPUT)) else {
                return;
            };
            let axis = if self.nt(step) == NodeType::Filter { self.child(self.child(step, 0), 0) } else { step };
            let mergeable = matches!(self.nt(axis), NodeType::Content | NodeType::Descendant | NodeType::DescendantOrSelf);
            if mergeable && self.ann.matches(self.graph, step_input, Pattern::IsDocOrderDistinct) {
                let facts = self.ann.write(self.graph, id);
                facts.add(Pattern::JoinAndDod);
                facts.set_arg(DOD_STEP, PatternArg::Node(step));
            }
            return;
        }
        let axis = if self.nt(input) == NodeType::Filter { self.child(self.child(input, 0), 0) } else { input };
        let reverse = self.nt(axis).is_reverse_axis()
            && self.graph.children(axis).first().is_some_and(|&ctx| self.ty(ctx).is_singleton());
        if reverse {
            let facts = self.ann.write(self.graph, id);
            facts.add(Pattern::DodReverse);
            facts.set_arg(DOD_STEP, PatternArg::Node(input));
        }
    }

    pub(super) fn annotate_rtf(&mut self, id: NodeId) {
        let content = self.child(id, 0);
        if self.nt(content) == NodeType::TextCtor {
            let text = self.child(content, 0);
            let facts = self.ann.write(self.graph, id);
            facts.add(Pattern::SingleTextRtf);
            facts.set_arg(RTF_TEXT, PatternArg::Node(text));
        }
    }
}
