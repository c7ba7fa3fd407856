//! Whole-graph analyses run after the optimizer visit: construction method
//! and output-state flow, element attribute facts and namespace scope.

mod element;
mod namespace;
mod state;

pub(crate) use state::{after_copy, is_combinator};

use crate::annotation::Annotations;
use crate::options::CompilerOptions;
use xslt_ir::IrGraph;

pub fn analyze(graph: &IrGraph, ann: &mut Annotations, options: &CompilerOptions) {
    let writers = state::writer_functions(graph);
    state::StateAnalyzer::new(graph, ann, &writers).run(options.root_output);
    element::analyze(graph, ann, &writers);
    namespace::analyze(graph, ann);
    tracing::debug!(writer_functions = writers.len(), root_output = options.root_output, "construction analysis finished");
}
