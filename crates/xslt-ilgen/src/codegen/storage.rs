//! Compile-time tracking of where a value lives.

use crate::codegen::Generator;
use crate::codegen::instr::{Callee, Constant, Instr, InstructionSink, ItemRepr, LocalSlot, MethodId};
use crate::codegen::runtime::{IteratorKind, RuntimeFn};
use xslt_ir::{AtomicType, ItemType, XmlType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// No value (the expression is empty or never returns).
    None,
    Stack,
    Local(LocalSlot),
    Parameter(u16),
    /// Current item of an open runtime iterator held in a local.
    Current { iterator: LocalSlot, kind: IteratorKind },
    /// Lazily computed global, read through its accessor method.
    Global(MethodId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Storage {
    pub location: Location,
    pub repr: ItemRepr,
    /// A materialized sequence rather than a single item.
    pub cached: bool,
}

impl Storage {
    pub fn none() -> Self {
        Self { location: Location::None, repr: ItemRepr::Item, cached: false }
    }

    pub fn stack(repr: ItemRepr) -> Self {
        Self { location: Location::Stack, repr, cached: false }
    }

    pub fn stack_cached(repr: ItemRepr) -> Self {
        Self { location: Location::Stack, repr, cached: true }
    }

    pub fn local(slot: LocalSlot, repr: ItemRepr, cached: bool) -> Self {
        Self { location: Location::Local(slot), repr, cached }
    }

    pub fn current(iterator: LocalSlot, kind: IteratorKind, repr: ItemRepr) -> Self {
        Self { location: Location::Current { iterator, kind }, repr, cached: false }
    }

    pub fn is_stack(&self) -> bool {
        self.location == Location::Stack
    }
}

/// Single-item representation of values of type `ty`.
pub fn repr_of(ty: &XmlType) -> ItemRepr {
    match ty.item {
        ItemType::Node(_) => ItemRepr::Node,
        ItemType::Atomic(t) => match t {
            AtomicType::String | AtomicType::Untyped => ItemRepr::String,
            AtomicType::Boolean => ItemRepr::Bool,
            AtomicType::Int => ItemRepr::Int32,
            AtomicType::Integer => ItemRepr::Int64,
            AtomicType::Double => ItemRepr::Double,
            AtomicType::Decimal => ItemRepr::Decimal,
            AtomicType::QName => ItemRepr::QName,
            AtomicType::DateTime => ItemRepr::DateTime,
            AtomicType::Any => ItemRepr::Item,
        },
        ItemType::Item | ItemType::None => ItemRepr::Item,
    }
}

impl<S: InstructionSink> Generator<'_, S> {
    /// Move the value onto the operand stack.
    pub(crate) fn ensure_stack(&mut self, storage: Storage) -> Storage {
        match storage.location {
            Location::Stack => {}
            Location::None => panic!("no value to load"),
            Location::Local(slot) => self.emit(Instr::Ldloc(slot)),
            Location::Parameter(index) => self.emit(Instr::Ldarg(index)),
            Location::Current { iterator, kind } => {
                self.emit(Instr::Ldloc(iterator));
                self.call(RuntimeFn::IterCurrent(kind));
            }
            Location::Global(accessor) => self.emit(Instr::Call(Callee::Method(accessor))),
        }
        Storage { location: Location::Stack, ..storage }
    }

    /// Make the value re-readable; only stack values need a new slot.
    pub(crate) fn ensure_local(&mut self, storage: Storage) -> Storage {
        match storage.location {
            Location::Stack => {
                let slot = self.sink.declare_local(storage.repr, storage.cached);
                self.emit(Instr::Stloc(slot));
                Storage { location: Location::Local(slot), ..storage }
            }
            Location::Current { .. } => {
                // the iterator moves on, so pin the current item
                let s = self.ensure_stack(storage);
                self.ensure_local(s)
            }
            _ => storage,
        }
    }

    /// Turn a cached sequence known to hold one item into that item, on the
    /// stack.
    pub(crate) fn ensure_no_cache(&mut self, storage: Storage) -> Storage {
        if !storage.cached {
            return self.ensure_stack(storage);
        }
        self.ensure_stack(storage);
        self.emit(Instr::Ldc(Constant::Int32(0)));
        self.call(RuntimeFn::SeqItem(storage.repr));
        Storage::stack(storage.repr)
    }

    /// Load a single item on the stack in representation `repr`.
    pub(crate) fn ensure_item(&mut self, storage: Storage, repr: ItemRepr) -> Storage {
        let s = self.ensure_no_cache(storage);
        self.convert_repr(s.repr, repr);
        Storage::stack(repr)
    }

    /// Convert the single item on top of the stack.
    pub(crate) fn convert_repr(&mut self, from: ItemRepr, to: ItemRepr) {
        use ItemRepr as R;
        if from == to {
            return;
        }
        match (from, to) {
            (_, R::Item) => self.call(RuntimeFn::ToItem(from)),
            (R::Item, _) => self.call(RuntimeFn::ItemTo(to)),
            (R::Int32, R::Int64 | R::Double) | (R::Int64, R::Double | R::Int32) | (R::Double, R::Int32 | R::Int64) => {
                self.emit(Instr::Conv(from, to));
            }
            (_, R::Decimal) => self.call(RuntimeFn::ToDecimal(from)),
            (_, R::String) => self.call(RuntimeFn::ToString(from)),
            (_, R::Double) => self.call(RuntimeFn::ToDouble(from)),
            _ => {
                self.call(RuntimeFn::ToItem(from));
                self.call(RuntimeFn::ItemTo(to));
            }
        }
    }

    /// Drop a value nobody consumes.
    pub(crate) fn discard(&mut self, storage: Storage) {
        if storage.is_stack() {
            self.emit(Instr::Pop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(XmlType::ELEMENT_S, ItemRepr::Node)]
    #[case(XmlType::INT, ItemRepr::Int32)]
    #[case(XmlType::INTEGER, ItemRepr::Int64)]
    #[case(XmlType::ITEM_S, ItemRepr::Item)]
    #[case(XmlType::ATOMIC, ItemRepr::Item)]
    fn repr_follows_prime_type(#[case] ty: XmlType, #[case] expected: ItemRepr) {
        assert_eq!(repr_of(&ty), expected);
    }
}
