//! Lowering of the annotated IR to stack-machine instructions.
//!
//! Every node is lowered in one of four shapes:
//!
//! * [`Generator::gen_iterate`] pulls the items of a node one at a time.
//!   Control falls through with the current item in the frame's storage;
//!   jumping to the frame's next label pulls another item and exhausting the
//!   node jumps to the caller's end label.
//! * [`Generator::gen_value`] leaves the whole value in a storage location,
//!   materializing sequences into a cache.
//! * [`Generator::gen_branch`] evaluates a boolean as control flow.
//! * [`Generator::gen_writer`] pushes the node's content to the output sink.

pub mod context;
pub mod instr;
pub mod runtime;
pub mod storage;

mod construct;
mod functions;
mod paths;
mod sequences;
mod values;

use crate::annotation::{Annotations, Binding};
use crate::codegen::context::{BranchTarget, FrameStack, IteratorFrame};
use crate::codegen::instr::{Constant, Instr, InstructionSink, ItemRepr, Label, LocalSlot, MethodId};
use crate::codegen::runtime::{IteratorKind, RuntimeFn};
use crate::codegen::storage::{Location, Storage, repr_of};
use crate::construct::ConstructMethod;
use crate::options::CompilerOptions;
use crate::patterns::Pattern;
use crate::static_data::StaticData;
use xslt_ir::{IrGraph, Literal, NodeId, NodeType, XmlType};

pub struct Generator<'a, S: InstructionSink> {
    pub(crate) graph: &'a IrGraph,
    pub(crate) ann: &'a mut Annotations,
    pub(crate) data: &'a mut StaticData,
    pub(crate) options: &'a CompilerOptions,
    pub(crate) sink: &'a mut S,
    pub(crate) frames: FrameStack,
    globals: Vec<functions::GlobalMethods>,
}

/// Lower the whole query: one method per user function, an accessor and an
/// initializer per global value, and the root method.
pub fn generate<S: InstructionSink>(
    graph: &IrGraph,
    ann: &mut Annotations,
    data: &mut StaticData,
    options: &CompilerOptions,
    sink: &mut S,
) -> MethodId {
    let mut generator = Generator::new(graph, ann, data, options, sink);
    generator.declare_functions();
    generator.declare_globals();
    let root = generator.sink.declare_method("root", 0);
    generator.emit_functions();
    generator.emit_globals();
    generator.emit_root(root);
    root
}

impl<'a, S: InstructionSink> Generator<'a, S> {
    pub fn new(
        graph: &'a IrGraph,
        ann: &'a mut Annotations,
        data: &'a mut StaticData,
        options: &'a CompilerOptions,
        sink: &'a mut S,
    ) -> Self {
        Self { graph, ann, data, options, sink, frames: FrameStack::default(), globals: Vec::new() }
    }

    pub(crate) fn emit(&mut self, instr: Instr) {
        self.sink.emit(instr);
    }

    pub(crate) fn call(&mut self, f: RuntimeFn) {
        self.sink.emit(Instr::call(f));
    }

    pub(crate) fn label(&mut self) -> Label {
        self.sink.define_label()
    }

    pub(crate) fn mark(&mut self, label: Label) {
        self.sink.mark_label(label);
    }

    pub(crate) fn local(&mut self, repr: ItemRepr) -> LocalSlot {
        self.sink.declare_local(repr, false)
    }

    pub(crate) fn ldc_i32(&mut self, value: i32) {
        self.emit(Instr::Ldc(Constant::Int32(value)));
    }

    /// Load a static-table index.
    pub(crate) fn ldc_index(&mut self, index: u32) {
        self.emit(Instr::Ldc(Constant::Int32(i32::try_from(index).unwrap_or(i32::MAX))));
    }

    pub(crate) fn ldc_str(&mut self, value: &str) {
        self.emit(Instr::Ldc(Constant::String(value.into())));
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

    pub(crate) fn lit(&self, id: NodeId) -> Option<&'a Literal> {
        self.graph.literal(id)
    }

    pub(crate) fn matches(&self, id: NodeId, pattern: Pattern) -> bool {
        self.ann.matches(self.graph, id, pattern)
    }

    pub(crate) fn method_kind(&self, id: NodeId) -> ConstructMethod {
        self.ann.construct(id).map_or(ConstructMethod::Iterator, |c| c.method)
    }

    /// A call to a function whose body pushes to the output.
    pub(crate) fn is_writer_call(&self, id: NodeId) -> bool {
        self.nt(id) == NodeType::Invoke && self.method_kind(self.child(id, 0)) == ConstructMethod::Writer
    }

    pub(crate) fn method_of(&self, id: NodeId) -> MethodId {
        self.ann.function(id).unwrap_or_else(|| panic!("no method declared for {id}"))
    }

    fn sequence_point(&mut self, id: NodeId) {
        if self.options.debug
            && let Some(span) = self.graph.node(id).span
        {
            self.emit(Instr::SequencePoint(span));
        }
    }

    /// Record where the value bound by iterator `iter` lives.
    pub(crate) fn bind(&mut self, iter: NodeId, storage: Storage, position: Option<LocalSlot>) {
        self.ann.get_mut(iter).binding = Some(Binding { storage, position });
    }

    pub(crate) fn binding(&self, iter: NodeId) -> Binding {
        self.ann.binding(iter).cloned().unwrap_or_else(|| panic!("reference to unbound iterator {iter}"))
    }

    /// Keep a value readable for as long as the iterator bound to it is in
    /// scope.
    pub(crate) fn pin(&mut self, storage: Storage) -> Storage {
        if storage.is_stack() { self.ensure_local(storage) } else { storage }
    }

    /// Position counter for `iter` when something reads its position.
    pub(crate) fn position_counter(&mut self, iter: NodeId, force: bool) -> Option<LocalSlot> {
        if !force && !self.matches(iter, Pattern::IsPositional) {
            return None;
        }
        let slot = self.local(ItemRepr::Int32);
        self.ldc_i32(0);
        self.emit(Instr::Stloc(slot));
        Some(slot)
    }

    pub(crate) fn increment(&mut self, slot: LocalSlot) {
        self.emit(Instr::Ldloc(slot));
        self.ldc_i32(1);
        self.emit(Instr::Add(ItemRepr::Int32));
        self.emit(Instr::Stloc(slot));
    }

    /// Report the current item of the frame being lowered.
    pub(crate) fn produce(&mut self, storage: Storage, next: Option<Label>) {
        let frame = self.frames.top_mut();
        frame.storage = storage;
        frame.label_next = next;
    }

    pub(crate) fn on_end(&self) -> Label {
        self.frames.top().on_end
    }

    /// Lower `id` as a pull iteration ending at `on_end`.
    pub(crate) fn gen_iterate(&mut self, id: NodeId, on_end: Label) -> IteratorFrame {
        self.sequence_point(id);
        self.frames.push(IteratorFrame::new(id, on_end));
        self.iterate(id);
        let frame = self.frames.pop();
        tracing::trace!(node = %id, depth = self.frames.depth(), next = ?frame.label_next, "iterated");
        frame
    }

    fn iterate(&mut self, id: NodeId) {
        use NodeType as N;
        let ty = self.ty(id);
        if self.method_kind(id) == ConstructMethod::WriterThenIterator || self.is_writer_call(id) {
            let cached = self.gen_value(id);
            return self.iterate_storage(cached);
        }
        if ty.is_empty() && !self.matches(id, Pattern::MaybeSideEffects) {
            self.emit(Instr::Br(self.on_end()));
            return self.produce(Storage::none(), None);
        }
        match self.nt(id) {
            N::Warning | N::Error => {
                let value = self.gen_value(id);
                self.discard(value);
                self.emit(Instr::Br(self.on_end()));
                self.produce(Storage::none(), None);
            }
            N::Nop | N::OptimizeBarrier | N::XsltCopyOf => {
                let inner = self.gen_iterate(self.child(id, 0), self.on_end());
                self.produce(inner.storage, inner.label_next);
            }
            N::Sequence => self.iterate_sequence(id),
            N::Conditional => self.iterate_conditional(id),
            N::Choice => self.iterate_choice(id),
            N::Loop => self.iterate_loop(id),
            N::Filter => self.iterate_filter(id),
            N::Union | N::Intersection | N::Difference => self.iterate_set_op(id),
            N::DocOrderDistinct => self.iterate_doc_order(id),
            N::For | N::Let | N::Parameter => {
                let binding = self.binding(id);
                self.iterate_storage(binding.storage);
            }
            t if t.is_axis() && ty.maybe_many() => self.iterate_axis(id),
            _ if ty.is_singleton() || ty.is_none() => {
                let value = self.gen_value(id);
                self.produce(value, None);
            }
            N::Attribute | N::Parent | N::DataSource => {
                let value = self.gen_value_nullable(id);
                self.iterate_nullable(value);
            }
            N::Average | N::Minimum | N::Maximum => self.iterate_aggregate(id),
            _ => {
                let cached = self.gen_value(id);
                self.iterate_storage(cached);
            }
        }
    }

    /// Iterate over a value already lowered: a cached sequence or a single
    /// item.
    pub(crate) fn iterate_storage(&mut self, storage: Storage) {
        if !storage.cached {
            return self.produce(storage, None);
        }
        self.ensure_stack(storage);
        self.call(RuntimeFn::IterCreate(IteratorKind::Cached));
        let iterator = self.local(ItemRepr::Object);
        self.emit(Instr::Stloc(iterator));
        self.iterate_runtime(iterator, IteratorKind::Cached, storage.repr);
    }

    /// Pull loop over a runtime iterator held in `iterator`.
    pub(crate) fn iterate_runtime(&mut self, iterator: LocalSlot, kind: IteratorKind, repr: ItemRepr) {
        let next = self.label();
        self.mark(next);
        self.emit(Instr::Ldloc(iterator));
        self.call(RuntimeFn::IterAdvance(kind));
        self.emit(Instr::BrFalse(self.on_end()));
        self.produce(Storage::current(iterator, kind, repr), Some(next));
    }

    /// A single node that may be absent; a null reference ends the
    /// iteration.
    fn iterate_nullable(&mut self, value: Storage) {
        let value = self.ensure_local(value);
        self.ensure_stack(value);
        self.emit(Instr::BrFalse(self.on_end()));
        self.produce(value, None);
    }

    /// Lower `id` to a value. Sequences that may hold other than one item
    /// come back as cached sequences.
    pub(crate) fn gen_value(&mut self, id: NodeId) -> Storage {
        self.sequence_point(id);
        if self.method_kind(id) == ConstructMethod::WriterThenIterator || self.is_writer_call(id) {
            return self.construct_sequence(id);
        }
        let ty = self.ty(id);
        if let Some(storage) = self.value_native(id) {
            return storage;
        }
        if ty.is_singleton() || ty.is_none() {
            return self.value(id);
        }
        self.cache(id)
    }

    /// Materialize the items of `id` into a fresh cache.
    pub(crate) fn cache(&mut self, id: NodeId) -> Storage {
        let repr = repr_of(&self.ty(id));
        self.call(RuntimeFn::SeqCreate(repr));
        let seq = self.sink.declare_local(repr, true);
        self.emit(Instr::Stloc(seq));
        let done = self.label();
        let frame = self.gen_iterate(id, done);
        if frame.storage.location != Location::None {
            self.emit(Instr::Ldloc(seq));
            self.ensure_item(frame.storage, repr);
            self.call(RuntimeFn::SeqAdd(repr));
            self.emit(Instr::Br(frame.next()));
        }
        self.mark(done);
        Storage::local(seq, repr, true)
    }

    /// Lower `id` as control flow jumping to `target` when the condition
    /// equals `target.jump_if`, falling through otherwise.
    pub(crate) fn gen_branch(&mut self, id: NodeId, target: BranchTarget) {
        self.sequence_point(id);
        self.frames.push(IteratorFrame { branch: Some(target), ..IteratorFrame::new(id, target.label) });
        self.branch(id, target);
        self.frames.pop();
    }

    /// Boolean value on the stack through [`Generator::gen_branch`].
    pub(crate) fn branch_to_value(&mut self, id: NodeId) -> Storage {
        let (on_false, done) = (self.label(), self.label());
        self.gen_branch(id, BranchTarget { label: on_false, jump_if: false });
        self.emit(Instr::Ldc(Constant::Bool(true)));
        self.emit(Instr::Br(done));
        self.mark(on_false);
        self.emit(Instr::Ldc(Constant::Bool(false)));
        self.mark(done);
        Storage::stack(ItemRepr::Bool)
    }

    /// Push the content of `id` to the output sink.
    pub(crate) fn gen_writer(&mut self, id: NodeId) {
        self.sequence_point(id);
        match self.method_kind(id) {
            ConstructMethod::Writer | ConstructMethod::WriterThenIterator => self.write(id),
            ConstructMethod::Iterator | ConstructMethod::IteratorThenWriter => self.copy_items(id),
        }
    }
}
