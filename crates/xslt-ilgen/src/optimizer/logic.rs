//! Boolean algebra, control flow, type operators and string folding.

use super::Optimizer;
use super::fold::fold_conversion;
use compact_str::CompactString;
use itertools::Itertools;
use xslt_ir::{Literal, NodeId, NodeType, XmlType};

impl Optimizer<'_> {
    pub(super) fn rewrite_and_or(&mut self, id: NodeId) -> Option<NodeId> {
        let is_and = self.nt(id) == NodeType::And;
        let (left, right) = (self.child(id, 0), self.child(id, 1));
        // the value that decides the outcome on its own: false for And, true for Or
        let short = !is_and;
        if let Some(value) = self.bool_literal(left) {
            self.applied("logic-literal-left", id);
            return Some(if value == short { left } else { right });
        }
        match self.bool_literal(right) {
            Some(value) if value != short => {
                self.applied("logic-identity-right", id);
                Some(left)
            }
            Some(_) if !self.has_side_effects(left) => {
                self.applied("logic-absorb-right", id);
                Some(right)
            }
            _ => None,
        }
    }

    pub(super) fn rewrite_not(&mut self, id: NodeId) -> Option<NodeId> {
        let operand = self.child(id, 0);
        if let Some(value) = self.bool_literal(operand) {
            self.applied("not-literal", id);
            return Some(self.graph.boolean(!value));
        }
        match self.nt(operand) {
            NodeType::Not => {
                self.applied("not-not", id);
                Some(self.child(operand, 0))
            }
            t @ (NodeType::Eq | NodeType::Ne) => {
                let (a, b) = (self.child(operand, 0), self.child(operand, 1));
                if !(self.ty(a).is_singleton() && self.ty(b).is_singleton()) {
                    return None;
                }
                let negated = t.negated()?;
                self.applied("not-comparison", id);
                Some(self.graph.binary(negated, a, b))
            }
            _ => None,
        }
    }

    pub(super) fn rewrite_conditional(&mut self, id: NodeId) -> Option<NodeId> {
        let (cond, then, otherwise) = (self.child(id, 0), self.child(id, 1), self.child(id, 2));
        if let Some(value) = self.bool_literal(cond) {
            self.applied("conditional-literal", id);
            return Some(if value { then } else { otherwise });
        }
        match (self.bool_literal(then), self.bool_literal(otherwise)) {
            (Some(true), Some(false)) => {
                self.applied("conditional-identity", id);
                return Some(cond);
            }
            (Some(false), Some(true)) => {
                self.applied("conditional-negate", id);
                return Some(self.graph.unary(NodeType::Not, cond));
            }
            (Some(true), None) if self.ty(otherwise).is_subtype_of(&XmlType::BOOLEAN) => {
                self.applied("conditional-or", id);
                return Some(self.graph.binary(NodeType::Or, cond, otherwise));
            }
            (None, Some(false)) if self.ty(then).is_subtype_of(&XmlType::BOOLEAN) => {
                self.applied("conditional-and", id);
                return Some(self.graph.binary(NodeType::And, cond, then));
            }
            _ => {}
        }
        if self.nt(cond) == NodeType::Not {
            self.applied("conditional-swap", id);
            let inner = self.child(cond, 0);
            return Some(self.graph.conditional(inner, otherwise, then));
        }
        None
    }

    pub(super) fn rewrite_choice(&mut self, id: NodeId) -> Option<NodeId> {
        let (selector, branches) = (self.child(id, 0), self.child(id, 1));
        let count = self.graph.children(branches).len();
        if let Some(index) = self.lit(selector).and_then(Literal::as_i64) {
            let index = usize::try_from(index).ok().filter(|i| *i < count)?;
            self.applied("choice-literal", id);
            return Some(self.child(branches, index));
        }
        if count == 1 && !self.has_side_effects(selector) {
            self.applied("choice-single", id);
            return Some(self.child(branches, 0));
        }
        None
    }

    fn type_operand(&self, id: NodeId) -> Option<XmlType> {
        self.lit(self.child(id, 1)).and_then(Literal::as_type)
    }

    pub(super) fn rewrite_type_op(&mut self, id: NodeId) -> Option<NodeId> {
        let value = self.child(id, 0);
        let target = self.type_operand(id)?;
        let actual = self.ty(value);
        match self.nt(id) {
            NodeType::TypeAssert if actual.is_subtype_of(&target) => {
                self.applied("type-assert-redundant", id);
                Some(value)
            }
            NodeType::IsType if !self.has_side_effects(value) => {
                let outcome = if actual.is_subtype_of(&target) {
                    true
                } else if actual.never_subtype_of(&target) {
                    false
                } else {
                    return None;
                };
                self.applied("is-type-static", id);
                Some(self.graph.boolean(outcome))
            }
            _ => None,
        }
    }

    pub(super) fn rewrite_convert(&mut self, id: NodeId) -> Option<NodeId> {
        let value = self.child(id, 0);
        let target = self.type_operand(id)?;
        if self.ty(value).is_subtype_of(&target) {
            self.applied("convert-redundant", id);
            return Some(value);
        }
        let folded = self.lit(value).and_then(|lit| fold_conversion(lit, target))?;
        self.applied("convert-literal", id);
        Some(self.graph.literal_value(folded))
    }

    /// Literal strings of `values`: one literal or a sequence of them.
    fn literal_strings(&self, values: NodeId) -> Option<Vec<CompactString>> {
        let items: Vec<NodeId> = match self.nt(values) {
            NodeType::Sequence => self.graph.children(values).to_vec(),
            _ => vec![values],
        };
        items
            .into_iter()
            .map(|item| self.lit(item).and_then(Literal::as_str).map(CompactString::from))
            .collect()
    }

    pub(super) fn rewrite_string(&mut self, id: NodeId) -> Option<NodeId> {
        match self.nt(id) {
            NodeType::StrLength => {
                let s = self.lit(self.child(id, 0)).and_then(Literal::as_str)?;
                let length = i32::try_from(s.encode_utf16().count()).ok()?;
                self.applied("fold-string-length", id);
                Some(self.graph.int32(length))
            }
            NodeType::StrConcat => {
                let delimiter = self.lit(self.child(id, 0)).and_then(Literal::as_str)?.to_owned();
                let parts = self.literal_strings(self.child(id, 1))?;
                let joined = parts.iter().join(&delimiter);
                self.applied("fold-string-concat", id);
                Some(self.graph.string(&joined))
            }
            _ => None,
        }
    }
}
