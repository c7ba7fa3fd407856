//! Iterator references and pruning of unreachable globals and functions.

use super::Optimizer;
use crate::annotation::Annotations;
use crate::patterns::Pattern;
use std::collections::HashSet;
use xslt_ir::graph::qil;
use xslt_ir::{IrGraph, NodeId, NodeType};

impl Optimizer<'_> {
    /// Handle the back-reference to `target` stored at child `index` of
    /// `parent`. A `Let` bound to a literal is replaced by a copy of the
    /// literal; otherwise the target is marked as referenced.
    pub(super) fn visit_reference(&mut self, parent: NodeId, index: usize, target: NodeId) -> bool {
        if self.speculative && self.nt(target) == NodeType::Let {
            let value = self.child(target, 0);
            if self.is_literal(value) {
                let copy = self.graph.duplicate_leaf(value);
                self.graph.set_child(parent, index, copy);
                self.rewrites += 1;
                self.applied("let-literal", target);
                return true;
            }
        }
        self.ann.add(self.graph, target, Pattern::IsReferenced);
        false
    }
}

/// Drop functions nobody calls and globals nobody reads. Global parameters
/// and side-effecting globals are always kept.
pub(super) fn prune(graph: &mut IrGraph, ann: &Annotations) {
    let (Some(entry), Some(functions), Some(globals), Some(params), Some(root)) =
        (graph.entry(), graph.functions(), graph.globals(), graph.global_params(), graph.root_expr())
    else {
        return;
    };
    let global_ids: HashSet<NodeId> = graph.children(globals).iter().copied().collect();
    let mut live: HashSet<NodeId> = HashSet::new();
    let mut work = vec![root];
    for &seed in graph.children(params).iter().chain(graph.children(globals)) {
        if !global_ids.contains(&seed) || ann.matches(graph, seed, Pattern::MaybeSideEffects) {
            live.insert(seed);
            work.push(seed);
        }
    }
    while let Some(id) = work.pop() {
        for target in graph.references_in(id) {
            let tracked = global_ids.contains(&target) || graph.node_type(target) == NodeType::Function;
            if tracked && live.insert(target) {
                work.push(target);
            }
        }
    }

    let mut pruned = 0;
    for (list, slot) in [(functions, qil::FUNCTIONS), (globals, qil::GLOBALS)] {
        let items = graph.children(list);
        let kept: Vec<NodeId> = items.iter().copied().filter(|id| live.contains(id)).collect();
        if kept.len() == items.len() {
            continue;
        }
        for &dropped in items.iter().filter(|id| !live.contains(id)) {
            tracing::debug!(node = %dropped, node_type = %graph.node_type(dropped), "pruned unreachable declaration");
        }
        pruned += items.len() - kept.len();
        let list_type = graph.node_type(list);
        let replacement = graph.list(list_type, &kept);
        graph.set_child(entry, slot, replacement);
    }
    if pruned > 0 {
        tracing::debug!(pruned, "pruned globals and functions");
    }
}
