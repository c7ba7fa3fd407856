//! Optimizer and stack-machine code generator for the XSLT/XPath query IR.
//!
//! [`compile`] validates an [`IrGraph`], rewrites it with the pattern-driven
//! optimizer, runs the output-state analyses and lowers the result to an
//! instruction [`Program`] plus the [`StaticData`] tables it references.

pub mod analyzer;
pub mod annotation;
pub mod codegen;
pub mod construct;
pub mod error;
pub mod optimizer;
pub mod options;
pub mod patterns;
pub mod static_data;
pub mod tail_call;
pub mod validate;

pub use annotation::Annotations;
pub use codegen::instr::{InstructionSink, MethodId, Program, ProgramBuilder};
pub use construct::{ConstructInfo, ConstructMethod, XmlState};
pub use error::CompileError;
pub use options::CompilerOptions;
pub use patterns::{Pattern, PatternFacts};
pub use static_data::StaticData;

use xslt_ir::IrGraph;

/// Everything one compilation produces.
#[derive(Debug)]
pub struct Compilation {
    pub program: Program,
    pub static_data: StaticData,
    /// The optimized graph the program was generated from.
    pub graph: IrGraph,
    pub annotations: Annotations,
    /// Number of optimizer rewrites applied.
    pub rewrites: usize,
    pub root: MethodId,
}

/// Compile `graph` into a recorded [`Program`].
pub fn compile(graph: IrGraph, options: &CompilerOptions) -> Result<Compilation, CompileError> {
    let mut builder = ProgramBuilder::new();
    let mut compilation = compile_into(graph, options, &mut builder)?;
    compilation.program = builder.finish();
    Ok(compilation)
}

/// Compile `graph`, emitting instructions into `sink`. The returned
/// [`Compilation::program`] is empty; the instructions live in the sink.
pub fn compile_into<S: InstructionSink>(
    mut graph: IrGraph,
    options: &CompilerOptions,
    sink: &mut S,
) -> Result<Compilation, CompileError> {
    validate::validate(&graph)?;
    let mut annotations = Annotations::new();
    let rewrites = optimizer::optimize(&mut graph, &mut annotations, options);
    let mut static_data = StaticData::new();
    let root = codegen::generate(&graph, &mut annotations, &mut static_data, options, sink);
    tracing::debug!(nodes = graph.len(), rewrites, names = static_data.names.len(), "compilation finished");
    Ok(Compilation { program: Program::default(), static_data, graph, annotations, rewrites, root })
}
