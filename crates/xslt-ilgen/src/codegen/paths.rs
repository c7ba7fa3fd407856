//! Navigation: axis iterators, recognized filter shapes, equality indexes
//! and document-order merging.
//!
//! Runtime iterators are created from their arguments on the stack:
//!
//! | kind | arguments |
//! |------|-----------|
//! | plain axes, `Attribute`, `Namespace` | context |
//! | `Ancestor`, `AncestorDocOrder` | context, or-self flag |
//! | `ElementContent` / `NodeKindContent` | context, name filter / kind type |
//! | `ElementDescendant` / `NodeKindDescendant` | context, or-self flag, name filter / kind type |
//! | `NodeRange` | start, end |
//! | `Id` | context, cached id values |
//! | `ContentMerge` | name filter, kind type |
//! | `DescendantMerge` | or-self flag, name filter, kind type |
//! | `Union`, `Intersect`, `Difference` | nothing |
//!
//! Filter and type arguments are static-table indexes, `-1` for no test.

use crate::codegen::Generator;
use crate::codegen::context::{BranchTarget, IteratorFrame};
use crate::codegen::instr::{CmpOp, Constant, Instr, InstructionSink, ItemRepr, Label, LocalSlot};
use crate::codegen::runtime::{IteratorKind, RuntimeFn};
use crate::codegen::storage::{Location, Storage};
use crate::patterns::{
    DOD_STEP, ELEMENT_QNAME, INDEXED_NODES, KEY_EXPRESSION, KIND_TEST_TYPE, LOOKUP_VALUE, MAX_POSITION, Pattern,
};
use xslt_ir::{NodeId, NodeType};

/// Name or kind test folded into an iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepTest {
    name_filter: i32,
    kind_type: i32,
}

impl StepTest {
    const NONE: StepTest = StepTest { name_filter: -1, kind_type: -1 };
}

fn plain_kind(axis: NodeType) -> Option<IteratorKind> {
    Some(match axis {
        NodeType::Content => IteratorKind::AttributeContent,
        NodeType::Descendant => IteratorKind::Descendant,
        NodeType::DescendantOrSelf => IteratorKind::DescendantOrSelf,
        NodeType::Ancestor | NodeType::AncestorOrSelf => IteratorKind::Ancestor,
        NodeType::Preceding => IteratorKind::Preceding,
        NodeType::FollowingSibling => IteratorKind::FollowingSibling,
        NodeType::PrecedingSibling => IteratorKind::PrecedingSibling,
        NodeType::XPathFollowing => IteratorKind::XPathFollowing,
        NodeType::XPathPreceding => IteratorKind::XPathPreceding,
        NodeType::XPathNamespace => IteratorKind::Namespace,
        NodeType::NodeRange => IteratorKind::NodeRange,
        NodeType::Deref => IteratorKind::Id,
        _ => return None,
    })
}

/// Variant of a reverse axis that yields document order.
fn doc_order_kind(axis: NodeType) -> Option<IteratorKind> {
    Some(match axis {
        NodeType::Ancestor | NodeType::AncestorOrSelf => IteratorKind::AncestorDocOrder,
        NodeType::Preceding => IteratorKind::PrecedingDocOrder,
        NodeType::PrecedingSibling => IteratorKind::PrecedingSiblingDocOrder,
        NodeType::XPathPreceding => IteratorKind::XPathPrecedingDocOrder,
        _ => return None,
    })
}

impl<S: InstructionSink> Generator<'_, S> {
    fn open_iterator(&mut self, kind: IteratorKind) -> LocalSlot {
        self.call(RuntimeFn::IterCreate(kind));
        let iterator = self.local(ItemRepr::Object);
        self.emit(Instr::Stloc(iterator));
        iterator
    }

    fn ldc_bool(&mut self, value: bool) {
        self.emit(Instr::Ldc(Constant::Bool(value)));
    }

    /// Create the iterator of `kind` over the axis node `axis`.
    fn create_axis(&mut self, axis: NodeId, kind: IteratorKind) -> LocalSlot {
        match self.nt(axis) {
            NodeType::NodeRange => {
                self.node_value(self.child(axis, 0));
                self.node_value(self.child(axis, 1));
            }
            NodeType::Deref => {
                self.node_value(self.child(axis, 0));
                let ids = self.gen_value(self.child(axis, 1));
                self.to_cached(ids);
            }
            t => {
                self.node_value(self.child(axis, 0));
                if matches!(t, NodeType::Ancestor | NodeType::AncestorOrSelf) {
                    self.ldc_bool(t == NodeType::AncestorOrSelf);
                }
            }
        }
        self.open_iterator(kind)
    }

    pub(super) fn iterate_axis(&mut self, id: NodeId) {
        let kind = plain_kind(self.nt(id)).unwrap_or_else(|| panic!("no iterator for axis {}", self.nt(id)));
        let iterator = self.create_axis(id, kind);
        self.iterate_runtime(iterator, kind, ItemRepr::Node);
    }

    /// Name or kind test a shaped filter applies to its iterator.
    fn step_test(&mut self, filter: NodeId) -> Option<StepTest> {
        let facts = self.ann.read(self.graph, filter).clone();
        if facts.matches(Pattern::FilterElements) {
            let name = facts.name_arg(ELEMENT_QNAME)?;
            let index = self.data.name_filter(Some(&*name.local), Some(&*name.ns));
            return Some(StepTest { name_filter: i32::try_from(index).ok()?, kind_type: -1 });
        }
        if facts.matches(Pattern::FilterContentKind) || facts.matches(Pattern::FilterAttributeKind) {
            let ty = facts.type_arg(KIND_TEST_TYPE)?;
            let index = self.data.xml_type(ty);
            return Some(StepTest { name_filter: -1, kind_type: i32::try_from(index).ok()? });
        }
        None
    }

    /// A shaped filter directly over a content or descendant axis becomes one
    /// specialized iterator.
    fn iterate_shaped(&mut self, id: NodeId) -> bool {
        let iter = self.child(id, 0);
        let axis = self.child(iter, 0);
        let facts = self.ann.read(self.graph, id);
        let attributes = facts.matches(Pattern::FilterAttributeKind);
        let named = facts.matches(Pattern::FilterElements);
        if !(named || attributes || facts.matches(Pattern::FilterContentKind)) {
            return false;
        }
        let or_self = self.nt(axis) == NodeType::DescendantOrSelf;
        let kind = match (self.nt(axis), named) {
            (NodeType::Content, _) if attributes => IteratorKind::Attribute,
            (NodeType::Content, true) => IteratorKind::ElementContent,
            (NodeType::Content, false) => IteratorKind::NodeKindContent,
            (NodeType::Descendant | NodeType::DescendantOrSelf, _) if attributes => return false,
            (NodeType::Descendant | NodeType::DescendantOrSelf, true) => IteratorKind::ElementDescendant,
            (NodeType::Descendant | NodeType::DescendantOrSelf, false) => IteratorKind::NodeKindDescendant,
            _ => return false,
        };
        // the static tables only grow once the shape is accepted
        let Some(test) = self.step_test(id) else {
            return false;
        };
        self.node_value(self.child(axis, 0));
        if matches!(kind, IteratorKind::ElementDescendant | IteratorKind::NodeKindDescendant) {
            self.ldc_bool(or_self);
        }
        match kind {
            IteratorKind::ElementContent | IteratorKind::ElementDescendant => self.ldc_i32(test.name_filter),
            IteratorKind::NodeKindContent | IteratorKind::NodeKindDescendant => self.ldc_i32(test.kind_type),
            _ => {}
        }
        let iterator = self.open_iterator(kind);
        self.iterate_runtime(iterator, kind, ItemRepr::Node);
        true
    }

    pub(super) fn iterate_filter(&mut self, id: NodeId) {
        if self.matches(id, Pattern::EqualityIndex) {
            return self.iterate_index(id);
        }
        if self.iterate_shaped(id) {
            return;
        }
        if self.matches(id, Pattern::FilterLast) && self.iterate_last(id) {
            return;
        }
        self.iterate_predicate(id, None);
    }

    /// Generic filter: pull the source, test the predicate, and stop early
    /// once a known maximum position has been passed. `source_kind`
    /// replaces the source axis iterator when set.
    fn iterate_predicate(&mut self, id: NodeId, source_kind: Option<IteratorKind>) {
        let (iter, predicate) = (self.child(id, 0), self.child(id, 1));
        let max = if self.matches(id, Pattern::MaxPosition) {
            self.ann.read(self.graph, id).int_arg(MAX_POSITION)
        } else {
            None
        };
        let source = match source_kind {
            Some(kind) => {
                let position = self.position_counter(iter, max.is_some());
                self.frames.top_mut().position = position;
                let iterator = self.create_axis(self.child(iter, 0), kind);
                let next = self.label();
                self.mark(next);
                self.emit(Instr::Ldloc(iterator));
                self.call(RuntimeFn::IterAdvance(kind));
                self.emit(Instr::BrFalse(self.on_end()));
                if let Some(slot) = position {
                    self.increment(slot);
                }
                let item = Storage::current(iterator, kind, ItemRepr::Node);
                self.bind(iter, item, position);
                Some((item, next))
            }
            None => self.bind_for(iter, self.on_end(), max.is_some()).map(|f| (f.storage, f.next())),
        };
        let Some((item, next)) = source else {
            return self.produce(Storage::none(), None);
        };
        if let Some(max) = max
            && let Some(position) = self.frames.position_of(id)
        {
            self.emit(Instr::Ldloc(position));
            self.ldc_i32(i32::try_from(max).unwrap_or(if max < 0 { i32::MIN } else { i32::MAX }));
            self.emit(Instr::Cmp(CmpOp::Gt, ItemRepr::Int32));
            self.emit(Instr::BrTrue(self.on_end()));
        }
        self.gen_branch(predicate, BranchTarget { label: next, jump_if: false });
        self.produce(item, Some(next));
    }

    /// `$x[last()]` over a cached binding reads the final item directly.
    fn iterate_last(&mut self, id: NodeId) -> bool {
        let source = self.child(self.child(id, 0), 0);
        let storage = self.binding(source).storage;
        if !storage.cached {
            return false;
        }
        let count = self.local(ItemRepr::Int32);
        self.ensure_stack(storage);
        self.call(RuntimeFn::SeqCount);
        self.emit(Instr::Stloc(count));
        self.emit(Instr::Ldloc(count));
        self.emit(Instr::BrFalse(self.on_end()));
        self.ensure_stack(storage);
        self.emit(Instr::Ldloc(count));
        self.ldc_i32(1);
        self.emit(Instr::Sub(ItemRepr::Int32));
        self.call(RuntimeFn::SeqItem(storage.repr));
        self.produce(Storage::stack(storage.repr), None);
        true
    }

    /// Build the key index over the filtered nodes once per run, then query
    /// it with the lookup value.
    fn iterate_index(&mut self, id: NodeId) {
        let iter = self.child(id, 0);
        let facts = self.ann.read(self.graph, id).clone();
        let (Some(nodes), Some(key), Some(lookup)) =
            (facts.node_arg(INDEXED_NODES), facts.node_arg(KEY_EXPRESSION), facts.node_arg(LOOKUP_VALUE))
        else {
            return self.iterate_predicate(id, None);
        };
        let index_id = self.data.index_id();
        let index = self.local(ItemRepr::Object);
        self.ldc_index(index_id);
        self.call(RuntimeFn::IndexFind);
        self.emit(Instr::Stloc(index));
        let built = self.label();
        self.emit(Instr::Ldloc(index));
        self.emit(Instr::BrTrue(built));
        self.call(RuntimeFn::IndexCreate);
        self.emit(Instr::Stloc(index));

        let done = self.label();
        let frame = self.gen_iterate(nodes, done);
        if frame.storage.location != Location::None {
            let item = self.pin(frame.storage);
            self.bind(iter, item, None);
            self.emit(Instr::Ldloc(index));
            self.string_value(key);
            self.ensure_item(item, ItemRepr::Node);
            self.call(RuntimeFn::IndexAdd);
            self.emit(Instr::Br(frame.next()));
        }
        self.mark(done);
        self.emit(Instr::Ldloc(index));
        self.ldc_index(index_id);
        self.call(RuntimeFn::IndexRegister);

        self.mark(built);
        self.emit(Instr::Ldloc(index));
        self.string_value(lookup);
        self.call(RuntimeFn::IndexLookup);
        self.iterate_storage(Storage::stack_cached(ItemRepr::Node));
    }

    pub(super) fn iterate_doc_order(&mut self, id: NodeId) {
        let input = self.child(id, 0);
        if self.matches(id, Pattern::JoinAndDod) && self.iterate_join(id) {
            return;
        }
        if self.matches(id, Pattern::DodReverse) && self.iterate_reverse(id) {
            return;
        }
        if self.matches(input, Pattern::IsDocOrderDistinct) {
            let inner = self.gen_iterate(input, self.on_end());
            return self.produce(inner.storage, inner.label_next);
        }
        let cached = self.cache(input);
        self.ensure_stack(cached);
        self.call(RuntimeFn::SeqDocOrderDistinct);
        self.iterate_storage(Storage::stack_cached(ItemRepr::Node));
    }

    /// Step over a distinct, ordered input: a merge iterator applies the
    /// axis to each fed input node and yields document order without
    /// sorting.
    fn iterate_join(&mut self, id: NodeId) -> bool {
        let Some(step) = self.ann.read(self.graph, id).node_arg(DOD_STEP) else {
            return false;
        };
        let iter = self.child(self.child(id, 0), 0);
        let (axis, filter) = if self.nt(step) == NodeType::Filter {
            (self.child(self.child(step, 0), 0), Some(step))
        } else {
            (step, None)
        };
        let kind = match self.nt(axis) {
            NodeType::Content => IteratorKind::ContentMerge,
            NodeType::Descendant | NodeType::DescendantOrSelf => IteratorKind::DescendantMerge,
            _ => return false,
        };
        let test = match filter {
            Some(filter) => match self.step_test(filter) {
                Some(test) => test,
                None => return false,
            },
            None => StepTest::NONE,
        };
        if kind == IteratorKind::DescendantMerge {
            self.ldc_bool(self.nt(axis) == NodeType::DescendantOrSelf);
        }
        self.ldc_i32(test.name_filter);
        self.ldc_i32(test.kind_type);
        let iterator = self.open_iterator(kind);
        let node = self.local(ItemRepr::Node);
        self.emit(Instr::Ldc(Constant::Null));
        self.emit(Instr::Stloc(node));
        let started = self.local(ItemRepr::Bool);
        self.ldc_bool(false);
        self.emit(Instr::Stloc(started));

        let next = self.label();
        let need_input = self.label();
        let have = self.merge_loop(iterator, kind, node, next, [self.on_end(), need_input, self.on_end()]);
        self.mark(need_input);
        self.feed_operand(self.child(iter, 0), node, Some(started), next);
        self.mark(have);
        self.produce(Storage::current(iterator, kind, ItemRepr::Node), Some(next));
        true
    }

    /// Reverse axis from a single context node: iterate its document-order
    /// variant instead of sorting. Positional filters keep reverse order and
    /// fall back to sorting.
    fn iterate_reverse(&mut self, id: NodeId) -> bool {
        let Some(input) = self.ann.read(self.graph, id).node_arg(DOD_STEP) else {
            return false;
        };
        if self.nt(input) == NodeType::Filter {
            let iter = self.child(input, 0);
            let axis = self.child(iter, 0);
            let Some(kind) = doc_order_kind(self.nt(axis)) else {
                return false;
            };
            if self.matches(iter, Pattern::IsPositional) {
                return false;
            }
            self.frames.push(IteratorFrame::new(input, self.on_end()));
            self.iterate_predicate(input, Some(kind));
            let frame = self.frames.pop();
            self.produce(frame.storage, frame.label_next);
            return true;
        }
        let Some(kind) = doc_order_kind(self.nt(input)) else {
            return false;
        };
        let iterator = self.create_axis(input, kind);
        self.iterate_runtime(iterator, kind, ItemRepr::Node);
        true
    }
}
