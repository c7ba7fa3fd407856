//! Sequence, set-operation and loop eliminations.

use super::Optimizer;
use crate::patterns::Pattern;
use xslt_ir::{Literal, NodeId, NodeType};

impl Optimizer<'_> {
    fn droppable_empty(&self, id: NodeId) -> bool {
        self.ty(id).is_empty() && !self.has_side_effects(id)
    }

    pub(super) fn rewrite_set_op(&mut self, id: NodeId) -> Option<NodeId> {
        let t = self.nt(id);
        let (left, right) = (self.child(id, 0), self.child(id, 1));
        if left == right {
            self.applied("set-op-self", id);
            return Some(match t {
                NodeType::Difference => self.empty(),
                _ => self.graph.doc_order_distinct(left),
            });
        }
        let empties = match t {
            NodeType::Intersection => self.droppable_empty(left) || self.droppable_empty(right),
            NodeType::Difference => self.droppable_empty(left),
            _ => false,
        };
        if empties && !self.has_side_effects(left) && !self.has_side_effects(right) {
            self.applied("set-op-empty", id);
            return Some(self.empty());
        }
        let kept = match t {
            NodeType::Union if self.droppable_empty(left) => right,
            NodeType::Union | NodeType::Difference if self.droppable_empty(right) => left,
            _ => return None,
        };
        self.applied("set-op-identity", id);
        Some(self.graph.doc_order_distinct(kept))
    }

    pub(super) fn rewrite_doc_order(&mut self, id: NodeId) -> Option<NodeId> {
        let input = self.child(id, 0);
        if self.ty(input).dod || self.ann.matches(self.graph, input, Pattern::IsDocOrderDistinct) {
            self.applied("dod-eliminate", id);
            return Some(input);
        }
        None
    }

    pub(super) fn rewrite_length(&mut self, id: NodeId) -> Option<NodeId> {
        let input = self.child(id, 0);
        if self.has_side_effects(input) {
            return None;
        }
        let card = self.ty(input).card;
        let length = if card.is_zero() {
            0
        } else if card.is_one() {
            1
        } else {
            return None;
        };
        self.applied("length-static", id);
        Some(self.graph.int32(length))
    }

    pub(super) fn rewrite_is_empty(&mut self, id: NodeId) -> Option<NodeId> {
        let input = self.child(id, 0);
        if self.has_side_effects(input) {
            return None;
        }
        let card = self.ty(input).card;
        let outcome = if card.is_zero() {
            true
        } else if card.never_empty() {
            false
        } else {
            return None;
        };
        self.applied("is-empty-static", id);
        Some(self.graph.boolean(outcome))
    }

    pub(super) fn rewrite_sequence(&mut self, id: NodeId) -> Option<NodeId> {
        let items = self.graph.children(id).to_vec();
        if items.len() == 1 {
            self.applied("sequence-unwrap", id);
            return Some(items[0]);
        }
        if !items.iter().any(|&item| self.nt(item) == NodeType::Sequence) {
            return None;
        }
        let flat: Vec<NodeId> = items
            .iter()
            .flat_map(|&item| match self.nt(item) {
                NodeType::Sequence => self.graph.children(item).to_vec(),
                _ => vec![item],
            })
            .collect();
        self.applied("sequence-flatten", id);
        Some(self.graph.sequence(&flat))
    }

    pub(super) fn rewrite_loop(&mut self, id: NodeId) -> Option<NodeId> {
        let (iter, body) = (self.child(id, 0), self.child(id, 1));
        let source = self.child(iter, 0);
        let is_for = self.nt(iter) == NodeType::For;

        if is_for && self.droppable_empty(source) {
            self.applied("loop-empty-source", id);
            return Some(self.empty());
        }
        if is_for && body == iter {
            self.applied("loop-identity", id);
            return Some(source);
        }
        let invariant = !self.depends_on(body, iter);
        if invariant && !self.has_side_effects(source) {
            if !is_for {
                self.applied("loop-unreferenced-let", id);
                return Some(body);
            }
            if self.ty(source).is_singleton() {
                self.applied("loop-invariant-body", id);
                return Some(body);
            }
        }
        None
    }

    pub(super) fn rewrite_filter(&mut self, id: NodeId) -> Option<NodeId> {
        let (iter, predicate) = (self.child(id, 0), self.child(id, 1));
        let source = self.child(iter, 0);
        match self.bool_literal(predicate)? {
            true => {
                self.applied("filter-true", id);
                Some(source)
            }
            false if !self.has_side_effects(source) => {
                self.applied("filter-false", id);
                Some(self.empty())
            }
            false => None,
        }
    }

    /// `Length(Union(a, b)) = 1` where one side is exactly one node: every
    /// node of the other side must be that node.
    pub(super) fn rewrite_muenchian(&mut self, id: NodeId) -> Option<NodeId> {
        let (left, right) = (self.child(id, 0), self.child(id, 1));
        if self.nt(left) != NodeType::Length || self.lit(right).and_then(Literal::as_i64) != Some(1) {
            return None;
        }
        let union = self.child(left, 0);
        if self.nt(union) != NodeType::Union || self.has_side_effects(union) {
            return None;
        }
        let (a, b) = (self.child(union, 0), self.child(union, 1));
        let is_single = |opt: &Self, n: NodeId| opt.ty(n).is_node() && opt.ty(n).is_singleton();
        let (single, other) = if is_single(self, a) {
            (a, b)
        } else if is_single(self, b) {
            (b, a)
        } else {
            return None;
        };
        self.applied("muenchian", id);
        let j = self.graph.for_(other);
        let same = self.graph.binary(NodeType::Is, j, single);
        let differs = self.graph.unary(NodeType::Not, same);
        let strays = self.graph.filter(j, differs);
        Some(self.graph.unary(NodeType::IsEmpty, strays))
    }
}
