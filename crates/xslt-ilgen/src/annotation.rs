//! Per-node side table.
//!
//! One [`Annotation`] per node, indexed by [`NodeId`]. The pattern registry
//! lives here: [`Annotations::read`] hands out shared defaults for nodes
//! without facts and [`Annotations::write`] promotes to a private record.

use crate::codegen::instr::{LocalSlot, MethodId};
use crate::codegen::storage::Storage;
use crate::construct::ConstructInfo;
use crate::patterns::{Pattern, PatternFacts};
use smallvec::SmallVec;
use string_cache::DefaultAtom;
use xslt_ir::{IrGraph, NodeId};

/// Where codegen left the value bound by an iterator.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub storage: Storage,
    pub position: Option<LocalSlot>,
}

/// Prefix-to-namespace mappings in scope at a node.
pub type ScopeMappings = SmallVec<[(DefaultAtom, DefaultAtom); 4]>;

#[derive(Debug, Clone, Default)]
pub struct Annotation {
    pub patterns: Option<Box<PatternFacts>>,
    pub construct: Option<ConstructInfo>,
    pub binding: Option<Binding>,
    pub function: Option<MethodId>,
    pub arg_position: Option<u16>,
    pub scope: Option<ScopeMappings>,
}

#[derive(Debug, Clone, Default)]
pub struct Annotations {
    slots: Vec<Annotation>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&Annotation> {
        self.slots.get(id.index())
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Annotation {
        let index = id.index();
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, Annotation::default);
        }
        &mut self.slots[index]
    }

    /// Pattern facts of `id`; a shared default derived from the node's type
    /// when none were recorded.
    pub fn read<'a>(&'a self, graph: &IrGraph, id: NodeId) -> &'a PatternFacts {
        match self.get(id).and_then(|a| a.patterns.as_deref()) {
            Some(facts) => facts,
            None => PatternFacts::defaults_for(&graph.node(id).xml_type),
        }
    }

    /// Private facts record of `id`, created from the default on first use.
    pub fn write(&mut self, graph: &IrGraph, id: NodeId) -> &mut PatternFacts {
        let default = PatternFacts::defaults_for(&graph.node(id).xml_type);
        self.get_mut(id).patterns.get_or_insert_with(|| Box::new(default.clone()))
    }

    pub fn matches(&self, graph: &IrGraph, id: NodeId, pattern: Pattern) -> bool {
        self.read(graph, id).matches(pattern)
    }

    pub fn add(&mut self, graph: &IrGraph, id: NodeId, pattern: Pattern) {
        self.write(graph, id).add(pattern);
    }

    /// Copy `pattern` and its arguments from `src` to `dst` if `src` has it.
    pub fn inherit(&mut self, graph: &IrGraph, src: NodeId, dst: NodeId, pattern: Pattern) {
        let source = self.read(graph, src);
        if !source.matches(pattern) {
            return;
        }
        let source = source.clone();
        self.write(graph, dst).inherit_from(&source, pattern);
    }

    pub fn construct(&self, id: NodeId) -> Option<&ConstructInfo> {
        self.get(id).and_then(|a| a.construct.as_ref())
    }

    pub fn construct_mut(&mut self, id: NodeId) -> &mut ConstructInfo {
        self.get_mut(id).construct.get_or_insert_with(ConstructInfo::default)
    }

    pub fn binding(&self, id: NodeId) -> Option<&Binding> {
        self.get(id).and_then(|a| a.binding.as_ref())
    }

    pub fn function(&self, id: NodeId) -> Option<MethodId> {
        self.get(id).and_then(|a| a.function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn write_never_touches_shared_default() {
        let mut g = IrGraph::new();
        let ctx = g.xml_context();
        let other = g.xml_context();
        let mut ann = Annotations::new();
        ann.add(&g, ctx, Pattern::MaybeSideEffects);
        assert!(ann.matches(&g, ctx, Pattern::MaybeSideEffects));
        assert!(ann.matches(&g, ctx, Pattern::SameDepth));
        assert!(!ann.matches(&g, other, Pattern::MaybeSideEffects));
    }

    #[rstest]
    fn inherit_requires_source_fact() {
        let mut g = IrGraph::new();
        let a = g.xml_context();
        let b = g.string("x");
        let mut ann = Annotations::new();
        ann.inherit(&g, b, a, Pattern::IsPositional);
        assert!(ann.get(a).is_none_or(|x| x.patterns.is_none()));
        ann.inherit(&g, a, b, Pattern::IsDocOrderDistinct);
        assert!(ann.matches(&g, b, Pattern::IsDocOrderDistinct));
    }
}
