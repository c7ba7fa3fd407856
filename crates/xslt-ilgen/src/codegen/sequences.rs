//! Sequences, branches, loops, sorting and set operations.

use crate::codegen::Generator;
use crate::codegen::context::{BranchTarget, IteratorFrame};
use crate::codegen::instr::{Constant, Instr, InstructionSink, ItemRepr, Label, LocalSlot};
use crate::codegen::runtime::{IteratorKind, RuntimeFn};
use crate::codegen::storage::{Location, Storage, repr_of};
use crate::patterns::Pattern;
use xslt_ir::{NodeId, NodeType, Payload};

/// Shared result slot of a node whose items come from several parts.
#[derive(Debug, Clone, Copy)]
struct Dispatch {
    result: LocalSlot,
    which: LocalSlot,
    repr: ItemRepr,
    have: Label,
    next: Label,
}

impl<S: InstructionSink> Generator<'_, S> {
    fn dispatch(&mut self, id: NodeId) -> Dispatch {
        let repr = repr_of(&self.ty(id));
        let result = self.local(repr);
        let which = self.local(ItemRepr::Int32);
        Dispatch { result, which, repr, have: self.label(), next: self.label() }
    }

    /// Store the item of part `index` and continue at the shared point.
    /// Returns the label resuming that part.
    fn store_part(&mut self, d: Dispatch, index: usize, frame: &IteratorFrame) -> Label {
        if frame.storage.location == Location::None {
            return frame.next();
        }
        self.ensure_item(frame.storage, d.repr);
        self.emit(Instr::Stloc(d.result));
        self.ldc_i32(i32::try_from(index).unwrap_or(i32::MAX));
        self.emit(Instr::Stloc(d.which));
        self.emit(Instr::Br(d.have));
        frame.next()
    }

    /// Re-entry point: jump back into the part that produced the last item.
    fn finish_dispatch(&mut self, d: Dispatch, resumes: Vec<Label>) {
        self.mark(d.next);
        self.emit(Instr::Ldloc(d.which));
        self.emit(Instr::Switch(resumes));
        self.emit(Instr::Br(self.on_end()));
        self.mark(d.have);
        self.produce(Storage::local(d.result, d.repr, false), Some(d.next));
    }

    pub(super) fn iterate_sequence(&mut self, id: NodeId) {
        if self.ty(id).is_singleton() {
            let value = self.value(id);
            return self.produce(value, None);
        }
        let parts: Vec<NodeId> = self
            .graph
            .children(id)
            .iter()
            .copied()
            .filter(|&p| !self.ty(p).is_empty() || self.matches(p, Pattern::MaybeSideEffects))
            .collect();
        if let &[only] = parts.as_slice() {
            let inner = self.gen_iterate(only, self.on_end());
            return self.produce(inner.storage, inner.label_next);
        }
        let d = self.dispatch(id);
        let mut resumes = Vec::with_capacity(parts.len());
        for (index, &part) in parts.iter().enumerate() {
            let last = index + 1 == parts.len();
            let part_end = if last { self.on_end() } else { self.label() };
            let frame = self.gen_iterate(part, part_end);
            resumes.push(self.store_part(d, index, &frame));
            if !last {
                self.mark(part_end);
            }
        }
        if parts.is_empty() {
            self.emit(Instr::Br(self.on_end()));
        }
        self.finish_dispatch(d, resumes);
    }

    pub(super) fn iterate_conditional(&mut self, id: NodeId) {
        if self.ty(id).is_singleton() {
            let value = self.value(id);
            return self.produce(value, None);
        }
        let d = self.dispatch(id);
        let on_false = self.label();
        self.gen_branch(self.child(id, 0), BranchTarget { label: on_false, jump_if: false });
        let then = self.gen_iterate(self.child(id, 1), self.on_end());
        let mut resumes = vec![self.store_part(d, 0, &then)];
        self.mark(on_false);
        let otherwise = self.gen_iterate(self.child(id, 2), self.on_end());
        resumes.push(self.store_part(d, 1, &otherwise));
        self.finish_dispatch(d, resumes);
    }

    pub(super) fn iterate_choice(&mut self, id: NodeId) {
        if self.ty(id).is_singleton() {
            let value = self.value(id);
            return self.produce(value, None);
        }
        let branches: Vec<NodeId> = self.graph.children(self.child(id, 1)).to_vec();
        let d = self.dispatch(id);
        let selector = self.gen_value(self.child(id, 0));
        self.ensure_item(selector, ItemRepr::Int32);
        let starts: Vec<Label> = branches.iter().map(|_| self.label()).collect();
        self.emit(Instr::Switch(starts.clone()));
        match starts.last() {
            Some(&last) => self.emit(Instr::Br(last)),
            None => self.emit(Instr::Br(self.on_end())),
        }
        let mut resumes = Vec::with_capacity(branches.len());
        for (index, (&branch, &start)) in branches.iter().zip(&starts).enumerate() {
            self.mark(start);
            let frame = self.gen_iterate(branch, self.on_end());
            resumes.push(self.store_part(d, index, &frame));
        }
        self.finish_dispatch(d, resumes);
    }

    pub(crate) fn bind_let(&mut self, iter: NodeId) {
        let value = self.gen_value(self.child(iter, 0));
        let value = self.pin(value);
        self.bind(iter, value, None);
    }

    pub(super) fn iterate_loop(&mut self, id: NodeId) {
        let (iter, body) = (self.child(id, 0), self.child(id, 1));
        if self.nt(iter) == NodeType::Let {
            self.bind_let(iter);
            let inner = self.gen_iterate(body, self.on_end());
            return self.produce(inner.storage, inner.label_next);
        }
        let Some(source) = self.bind_for(iter, self.on_end(), false) else {
            return self.produce(Storage::none(), None);
        };
        let inner = self.gen_iterate(body, source.next());
        self.produce(inner.storage, Some(inner.next()));
    }

    /// Pull the source of `iter` and bind each item to it. `None` when the
    /// source never yields.
    pub(super) fn bind_for(&mut self, iter: NodeId, on_end: Label, force_position: bool) -> Option<IteratorFrame> {
        let position = self.position_counter(iter, force_position);
        self.frames.top_mut().position = position;
        let source = self.gen_iterate(self.child(iter, 0), on_end);
        if source.storage.location == Location::None {
            return None;
        }
        let item = self.pin(source.storage);
        if let Some(slot) = position {
            self.increment(slot);
        }
        self.bind(iter, item, position);
        Some(IteratorFrame { storage: item, ..source })
    }

    /// Cache the source while accumulating one row of sort keys per item,
    /// then sort the cache by the keys.
    pub(super) fn sort(&mut self, id: NodeId) -> Storage {
        let iter = self.child(id, 0);
        let keys: Vec<NodeId> = self.graph.children(self.child(id, 1)).to_vec();
        let repr = repr_of(&self.ty(id));
        self.call(RuntimeFn::SeqCreate(repr));
        let seq = self.sink.declare_local(repr, true);
        self.emit(Instr::Stloc(seq));
        self.call(RuntimeFn::SortKeysCreate);
        let rows = self.local(ItemRepr::Object);
        self.emit(Instr::Stloc(rows));

        let done = self.label();
        self.frames.push(IteratorFrame::new(id, done));
        if let Some(source) = self.bind_for(iter, done, false) {
            self.emit(Instr::Ldloc(seq));
            self.ensure_item(source.storage, repr);
            self.call(RuntimeFn::SeqAdd(repr));
            for &key in &keys {
                let expr = self.child(key, 0);
                let key_repr = repr_of(&self.ty(expr));
                self.emit(Instr::Ldloc(rows));
                let value = self.gen_value(expr);
                self.ensure_item(value, key_repr);
                let collation = self.lit(self.child(key, 1)).and_then(|l| l.as_str()).unwrap_or_default();
                let index = self.data.collation(collation);
                self.ldc_index(index);
                let descending = matches!(self.graph.node(key).payload, Payload::SortKey { descending: true });
                self.emit(Instr::Ldc(Constant::Bool(descending)));
                self.call(RuntimeFn::SortKeyAdd(key_repr));
            }
            self.emit(Instr::Ldloc(rows));
            self.call(RuntimeFn::SortKeysFinishRow);
            self.emit(Instr::Br(source.next()));
        }
        self.frames.pop();
        self.mark(done);
        self.emit(Instr::Ldloc(seq));
        self.emit(Instr::Ldloc(rows));
        self.call(RuntimeFn::SeqSortByKeys);
        Storage::local(seq, repr, true)
    }

    /// Feed one operand of a merge iterator, starting it on first request
    /// and resuming it afterwards.
    pub(super) fn feed_operand(&mut self, operand: NodeId, node: LocalSlot, started: Option<LocalSlot>, merge_next: Label) -> Label {
        let exhausted = self.label();
        let resume = self.label();
        if let Some(flag) = started {
            self.emit(Instr::Ldloc(flag));
            self.emit(Instr::BrTrue(resume));
            self.emit(Instr::Ldc(Constant::Bool(true)));
            self.emit(Instr::Stloc(flag));
        }
        let frame = self.gen_iterate(operand, exhausted);
        if frame.storage.location != Location::None {
            self.ensure_item(frame.storage, ItemRepr::Node);
            self.emit(Instr::Stloc(node));
            self.emit(Instr::Br(merge_next));
        }
        self.mark(resume);
        self.emit(Instr::Br(frame.next()));
        self.mark(exhausted);
        self.emit(Instr::Ldc(Constant::Null));
        self.emit(Instr::Stloc(node));
        self.emit(Instr::Br(merge_next));
        frame.next()
    }

    /// Advance a merge iterator and dispatch on its request.
    /// `arms` are the labels for `InitRightIterator`, `NeedLeftNode` and
    /// `NeedRightNode`.
    pub(super) fn merge_loop(&mut self, iterator: LocalSlot, kind: IteratorKind, node: LocalSlot, next: Label, arms: [Label; 3]) -> Label {
        let have = self.label();
        self.mark(next);
        self.emit(Instr::Ldloc(iterator));
        self.emit(Instr::Ldloc(node));
        self.call(RuntimeFn::IterAdvance(kind));
        let [init_right, need_left, need_right] = arms;
        self.emit(Instr::Switch(vec![self.on_end(), init_right, need_left, need_right]));
        self.emit(Instr::Br(have));
        have
    }

    pub(super) fn iterate_set_op(&mut self, id: NodeId) {
        let kind = match self.nt(id) {
            NodeType::Union => IteratorKind::Union,
            NodeType::Intersection => IteratorKind::Intersect,
            _ => IteratorKind::Difference,
        };
        let (left, right) = (self.child(id, 0), self.child(id, 1));
        self.call(RuntimeFn::IterCreate(kind));
        let iterator = self.local(ItemRepr::Object);
        self.emit(Instr::Stloc(iterator));
        let node = self.local(ItemRepr::Node);
        self.emit(Instr::Ldc(Constant::Null));
        self.emit(Instr::Stloc(node));
        let started = self.local(ItemRepr::Bool);
        self.emit(Instr::Ldc(Constant::Bool(false)));
        self.emit(Instr::Stloc(started));

        let next = self.label();
        let (init_right, need_left, need_right) = (self.label(), self.label(), self.label());
        let have = self.merge_loop(iterator, kind, node, next, [init_right, need_left, need_right]);

        self.mark(need_left);
        self.feed_operand(left, node, Some(started), next);
        self.mark(init_right);
        let right_next = self.feed_operand(right, node, None, next);
        self.mark(need_right);
        self.emit(Instr::Br(right_next));

        self.mark(have);
        self.produce(Storage::current(iterator, kind, ItemRepr::Node), Some(next));
    }
}
