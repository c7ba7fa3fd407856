//! Methods: user functions, lazily computed globals and the root.

use crate::codegen::Generator;
use crate::codegen::instr::{Callee, Constant, Instr, InstructionSink, ItemRepr, MethodId};
use crate::codegen::runtime::{Check, RuntimeFn, WriterOp};
use crate::codegen::storage::{Location, Storage, repr_of};
use crate::patterns::Pattern;
use xslt_ir::{Literal, NodeId, NodeType, Payload};

/// Methods generated for one global variable or parameter.
#[derive(Debug, Clone, Copy)]
pub(super) struct GlobalMethods {
    node: NodeId,
    accessor: MethodId,
    /// Computes and stores the value; parameters are computed inline.
    init: Option<MethodId>,
    slot: u32,
}

fn param_count(count: usize) -> u16 {
    u16::try_from(count).unwrap_or_else(|_| panic!("{count} parameters do not fit a method signature"))
}

impl<S: InstructionSink> Generator<'_, S> {
    fn list_items(&self, list: Option<NodeId>) -> Vec<NodeId> {
        list.map(|l| self.graph.children(l).to_vec()).unwrap_or_default()
    }

    fn display_name(&self, id: NodeId, kind: &str) -> String {
        self.graph.name(id).map_or_else(|| format!("{kind}{id}"), ToString::to_string)
    }

    pub(super) fn declare_functions(&mut self) {
        for f in self.list_items(self.graph.functions()) {
            let name = self.display_name(f, "function");
            let params = self.graph.children(self.child(f, 0)).len();
            let method = self.sink.declare_method(&name, param_count(params));
            self.ann.get_mut(f).function = Some(method);
        }
    }

    pub(super) fn declare_globals(&mut self) {
        let lets = self.list_items(self.graph.globals());
        let params = self.list_items(self.graph.global_params());
        for global in lets.into_iter().chain(params) {
            let name = self.display_name(global, "global");
            let accessor = self.sink.declare_method(&name, 0);
            let init = (self.nt(global) != NodeType::Parameter)
                .then(|| self.sink.declare_method(&format!("{name}$init"), 0));
            let slot = self.data.global_slot();
            self.ann.get_mut(global).function = Some(accessor);
            let ty = self.ty(global);
            let storage = Storage { location: Location::Global(accessor), repr: repr_of(&ty), cached: !ty.is_singleton() };
            self.bind(global, storage, None);
            self.globals.push(GlobalMethods { node: global, accessor, init, slot });
        }
    }

    pub(super) fn emit_functions(&mut self) {
        for f in self.list_items(self.graph.functions()) {
            let method = self.method_of(f);
            self.sink.begin_method(method);
            let params: Vec<NodeId> = self.graph.children(self.child(f, 0)).to_vec();
            for (index, &param) in params.iter().enumerate() {
                let ty = self.ty(param);
                let storage = Storage {
                    location: Location::Parameter(param_count(index)),
                    repr: repr_of(&ty),
                    cached: !ty.is_singleton(),
                };
                self.bind(param, storage, None);
            }
            let body = self.child(f, 1);
            if self.method_kind(f).pushes_to_writer() {
                self.gen_writer(body);
            } else {
                let value = self.gen_value(body);
                self.return_value(value);
            }
            self.emit(Instr::Ret);
            self.sink.end_method();
            tracing::debug!(function = %self.display_name(f, "function"), writer = self.method_kind(f).pushes_to_writer(), "generated function");
        }
    }

    /// Leave a value on the stack for the caller; absent values become the
    /// empty sequence.
    fn return_value(&mut self, value: Storage) {
        if value.location == Location::None {
            self.call(RuntimeFn::SeqCreate(ItemRepr::Item));
        } else {
            self.ensure_stack(value);
        }
    }

    pub(super) fn emit_globals(&mut self) {
        let globals = std::mem::take(&mut self.globals);
        for g in &globals {
            self.sink.begin_method(g.accessor);
            let ready = self.label();
            self.ldc_index(g.slot);
            self.call(RuntimeFn::IsGlobalComputed);
            self.emit(Instr::BrTrue(ready));
            match g.init {
                Some(init) => self.emit(Instr::Call(Callee::Method(init))),
                None => self.compute_parameter(g),
            }
            self.mark(ready);
            self.ldc_index(g.slot);
            self.call(RuntimeFn::GetGlobalValue);
            self.emit(Instr::Ret);
            self.sink.end_method();

            if let Some(init) = g.init {
                self.sink.begin_method(init);
                let value = self.gen_value(self.child(g.node, 0));
                let value = self.to_cached_or_item(value);
                self.ensure_stack(value);
                self.ldc_index(g.slot);
                self.call(RuntimeFn::SetGlobalValue);
                self.emit(Instr::Ret);
                self.sink.end_method();
            }
            tracing::debug!(global = %self.display_name(g.node, "global"), slot = g.slot, "generated global");
        }
        self.globals = globals;
    }

    fn to_cached_or_item(&mut self, value: Storage) -> Storage {
        if value.location == Location::None {
            self.call(RuntimeFn::SeqCreate(ItemRepr::Item));
            return Storage::stack_cached(ItemRepr::Item);
        }
        value
    }

    /// Read an external parameter value, falling back to the default.
    fn compute_parameter(&mut self, g: &GlobalMethods) {
        let name = self.graph.name(g.node).cloned().unwrap_or_else(|| panic!("unnamed global parameter {}", g.node));
        let index = self.data.name(&name);
        let store = self.label();
        self.emit(Instr::Ldc(Constant::Name(index)));
        self.call(RuntimeFn::GetParameter);
        self.emit(Instr::Dup);
        self.emit(Instr::BrTrue(store));
        self.emit(Instr::Pop);
        let default = self.child(g.node, 0);
        let value = self.gen_value(default);
        let value = self.to_cached_or_item(value);
        let repr = repr_of(&self.ty(g.node));
        if self.ty(g.node).is_singleton() {
            self.ensure_item(value, repr);
        } else {
            self.to_cached(value);
        }
        self.mark(store);
        self.ldc_index(g.slot);
        self.call(RuntimeFn::SetGlobalValue);
    }

    pub(super) fn emit_root(&mut self, root: MethodId) {
        self.sink.begin_method(root);
        let globals = self.globals.clone();
        for g in globals {
            let has_effects = g.init.is_some() && self.matches(self.child(g.node, 0), Pattern::MaybeSideEffects);
            if has_effects {
                self.emit(Instr::Call(Callee::Method(g.accessor)));
                self.emit(Instr::Pop);
            }
        }
        if let Some(expr) = self.graph.root_expr() {
            if self.options.root_output {
                self.call(RuntimeFn::Write(WriterOp::StartTree, Check::Unchecked));
                self.gen_writer(expr);
                self.call(RuntimeFn::Write(WriterOp::EndTree, Check::Unchecked));
            } else {
                let value = self.gen_value(expr);
                self.return_value(value);
            }
        }
        self.emit(Instr::Ret);
        self.sink.end_method();
        tracing::debug!(root_output = self.options.root_output, "generated root method");
    }

    /// Push call arguments, each as its parameter's representation.
    fn push_arguments(&mut self, params: &[NodeId], args: &[NodeId]) {
        for (&param, &arg) in params.iter().zip(args) {
            let ty = self.ty(param);
            let value = self.gen_value(arg);
            let value = self.to_cached_or_item(value);
            if ty.is_singleton() {
                self.ensure_item(value, repr_of(&ty));
            } else {
                self.to_cached(value);
            }
        }
    }

    fn invoke_operands(&self, id: NodeId) -> (NodeId, Vec<NodeId>, Vec<NodeId>) {
        let function = self.child(id, 0);
        let params = self.graph.children(self.child(function, 0)).to_vec();
        let args = self.graph.children(self.child(id, 1)).to_vec();
        (function, params, args)
    }

    /// Call of a non-writer function in value position.
    pub(super) fn invoke(&mut self, id: NodeId) -> Storage {
        let (function, params, args) = self.invoke_operands(id);
        self.push_arguments(&params, &args);
        let method = self.method_of(function);
        self.emit(Instr::Call(Callee::Method(method)));
        let ty = self.ty(id);
        Storage { location: Location::Stack, repr: repr_of(&ty), cached: !ty.is_singleton() }
    }

    /// Call of a writer function from writer-mode code. The last call of a
    /// writer function body becomes a tail call.
    pub(super) fn call_writer(&mut self, id: NodeId) {
        let (function, params, args) = self.invoke_operands(id);
        self.push_arguments(&params, &args);
        let method = self.method_of(function);
        if self.matches(id, Pattern::TailCall) {
            self.emit(Instr::TailCall(method));
            self.emit(Instr::Ret);
        } else {
            self.emit(Instr::Call(Callee::Method(method)));
        }
    }

    pub(super) fn invoke_external(&mut self, id: NodeId) -> Storage {
        let args: Vec<NodeId> = self.graph.children(self.child(id, 1)).to_vec();
        let ty = self.ty(id);
        if self.nt(id) == NodeType::XsltInvokeEarlyBound {
            let graph = self.graph;
            let Payload::ExternalMethod { type_name, method } = &graph.node(id).payload else {
                panic!("early-bound call {id} without a target method");
            };
            for &arg in &args {
                let value = self.gen_value(arg);
                let repr = repr_of(&self.ty(arg));
                if self.ty(arg).is_singleton() {
                    self.ensure_item(value, repr);
                } else {
                    self.to_cached(value);
                }
            }
            let type_index = self.data.early_bound_type(type_name);
            self.emit(Instr::Call(Callee::External { type_index, method: method.clone() }));
            return Storage { location: Location::Stack, repr: repr_of(&ty), cached: !ty.is_singleton() };
        }
        match self.lit(self.child(id, 0)).and_then(Literal::as_qname) {
            Some(name) => {
                let index = self.data.name(name);
                self.emit(Instr::Ldc(Constant::Name(index)));
            }
            None => {
                let name = self.gen_value(self.child(id, 0));
                self.ensure_item(name, ItemRepr::QName);
            }
        }
        for &arg in &args {
            let value = self.gen_value(arg);
            let value = self.to_cached_or_item(value);
            self.to_cached(value);
        }
        self.ldc_i32(i32::from(param_count(args.len())));
        self.call(RuntimeFn::InvokeLateBound);
        Storage::stack_cached(ItemRepr::Item)
    }
}
