//! Pattern-driven tree optimizer.
//!
//! One recursive post-order visit. For every node the per-tag rewrites are
//! tried in a fixed order; the first that applies replaces the node and the
//! replacement is visited again. Nodes no rewrite applies to get their
//! pattern facts recorded. Every rewrite shrinks the tree or turns an
//! operator into a literal, so the visit terminates.

mod fold;
mod logic;
mod paths;
mod refs;
mod sets;

pub use fold::{fold_arithmetic, fold_comparison, fold_conversion, fold_negate};

use crate::annotation::Annotations;
use crate::options::CompilerOptions;
use crate::patterns::Pattern;
use xslt_ir::{IrGraph, Literal, NodeId, NodeType, Payload, XmlType};

/// Run the optimizer and its sub-analyses over the whole graph. Returns the
/// number of rewrites applied.
pub fn optimize(graph: &mut IrGraph, ann: &mut Annotations, options: &CompilerOptions) -> usize {
    let Some(entry) = graph.entry() else {
        return 0;
    };
    let rewrites = {
        let mut opt = Optimizer::new(graph, ann, options.speculative);
        opt.visit(entry);
        opt.rewrites
    };
    crate::analyzer::analyze(graph, ann, options);
    crate::tail_call::analyze(graph, ann);
    refs::prune(graph, ann);
    tracing::debug!(rewrites, speculative = options.speculative, "optimizer finished");
    rewrites
}

pub(crate) struct Optimizer<'a> {
    pub(crate) graph: &'a mut IrGraph,
    pub(crate) ann: &'a mut Annotations,
    speculative: bool,
    pub(crate) rewrites: usize,
}

impl<'a> Optimizer<'a> {
    pub(crate) fn new(graph: &'a mut IrGraph, ann: &'a mut Annotations, speculative: bool) -> Self {
        Self { graph, ann, speculative, rewrites: 0 }
    }

    /// Optimize the subtree at `id` and return the node that replaces it.
    pub(crate) fn visit(&mut self, id: NodeId) -> NodeId {
        let mut changed = false;
        for index in 0..self.graph.children(id).len() {
            let child = self.graph.child(id, index);
            if self.graph.is_reference(id, index) {
                changed |= self.visit_reference(id, index, child);
            } else {
                let before = self.ty(child);
                let replaced = self.visit(child);
                if replaced != child || self.ty(replaced) != before {
                    self.graph.set_child(id, index, replaced);
                    changed = true;
                }
            }
        }
        if changed {
            self.graph.retype(id);
        }
        self.propagate_side_effects(id);

        if self.speculative
            && let Some(replacement) = self.rewrite(id)
        {
            self.rewrites += 1;
            return self.visit(replacement);
        }
        self.annotate(id);
        id
    }

    fn rewrite(&mut self, id: NodeId) -> Option<NodeId> {
        use NodeType as N;
        if let Some(r) = self.fold_none(id) {
            return Some(r);
        }
        match self.nt(id) {
            N::And | N::Or => self.rewrite_and_or(id),
            N::Not => self.rewrite_not(id),
            N::Conditional => self.rewrite_conditional(id),
            N::Choice => self.rewrite_choice(id),
            N::Nop => self.rewrite_nop(id),
            N::Negate => self.rewrite_negate(id),
            N::Add | N::Subtract | N::Multiply | N::Divide | N::Modulo => self.rewrite_arithmetic(id),
            N::Eq | N::Ne | N::Lt | N::Le | N::Gt | N::Ge => self.rewrite_comparison(id),
            N::Union | N::Intersection | N::Difference => self.rewrite_set_op(id),
            N::DocOrderDistinct => self.rewrite_doc_order(id),
            N::Length => self.rewrite_length(id),
            N::IsEmpty => self.rewrite_is_empty(id),
            N::Sequence => self.rewrite_sequence(id),
            N::Loop => self.rewrite_loop(id),
            N::Filter => self.rewrite_filter(id),
            N::IsType | N::TypeAssert => self.rewrite_type_op(id),
            N::XsltConvert => self.rewrite_convert(id),
            N::StrLength | N::StrConcat => self.rewrite_string(id),
            _ => None,
        }
    }

    fn annotate(&mut self, id: NodeId) {
        use NodeType as N;
        match self.nt(id) {
            t if t.is_axis() => self.annotate_axis(id),
            N::PositionOf => {
                let iter = self.child(id, 0);
                self.ann.add(self.graph, iter, Pattern::IsPositional);
            }
            N::Filter => self.annotate_filter(id),
            N::Loop => self.annotate_loop(id),
            N::DocOrderDistinct => self.annotate_doc_order(id),
            N::RtfCtor => self.annotate_rtf(id),
            _ => {}
        }
    }

    fn propagate_side_effects(&mut self, id: NodeId) {
        let own = match self.nt(id) {
            NodeType::XsltInvokeEarlyBound | NodeType::XsltInvokeLateBound | NodeType::Error | NodeType::Warning => true,
            NodeType::Invoke => {
                let callee = self.child(id, 0);
                matches!(self.graph.node(callee).payload, Payload::Function { side_effects: true, .. })
            }
            _ => false,
        };
        let inherited = (0..self.graph.children(id).len()).any(|index| {
            !self.graph.is_reference(id, index) && self.has_side_effects(self.child(id, index))
        });
        if own || inherited {
            self.ann.add(self.graph, id, Pattern::MaybeSideEffects);
        }
    }

    pub(crate) fn applied(&self, rule: &'static str, id: NodeId) {
        tracing::trace!(rule, node = %id, node_type = %self.nt(id), "rewrite applied");
    }

    pub(crate) fn nt(&self, id: NodeId) -> NodeType {
        self.graph.node_type(id)
    }

    pub(crate) fn ty(&self, id: NodeId) -> XmlType {
        self.graph.xml_type(id)
    }

    pub(crate) fn child(&self, id: NodeId, index: usize) -> NodeId {
        self.graph.child(id, index)
    }

    pub(crate) fn lit(&self, id: NodeId) -> Option<&Literal> {
        self.graph.literal(id)
    }

    pub(crate) fn is_literal(&self, id: NodeId) -> bool {
        self.nt(id).is_literal()
    }

    pub(crate) fn bool_literal(&self, id: NodeId) -> Option<bool> {
        match self.nt(id) {
            NodeType::True => Some(true),
            NodeType::False => Some(false),
            _ => None,
        }
    }

    pub(crate) fn has_side_effects(&self, id: NodeId) -> bool {
        self.ann.matches(self.graph, id, Pattern::MaybeSideEffects)
    }

    /// `expr` is, or refers to, the iterator `iter`.
    pub(crate) fn depends_on(&self, expr: NodeId, iter: NodeId) -> bool {
        expr == iter || self.graph.references_in(expr).contains(&iter)
    }

    pub(crate) fn empty(&mut self) -> NodeId {
        self.graph.sequence(&[])
    }
}

#[cfg(test)]
mod tests;
