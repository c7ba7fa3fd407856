//! Scalar values and boolean control flow.

use crate::codegen::Generator;
use crate::codegen::context::BranchTarget;
use crate::codegen::instr::{CmpOp, Constant, Instr, InstructionSink, ItemRepr, LocalSlot};
use crate::codegen::runtime::RuntimeFn;
use crate::codegen::storage::{Location, Storage, repr_of};
use xslt_ir::{Literal, NodeId, NodeType};

fn cmp_op(t: NodeType) -> CmpOp {
    match t {
        NodeType::Eq => CmpOp::Eq,
        NodeType::Ne => CmpOp::Ne,
        NodeType::Lt => CmpOp::Lt,
        NodeType::Le => CmpOp::Le,
        NodeType::Gt => CmpOp::Gt,
        NodeType::Ge => CmpOp::Ge,
        other => panic!("{other} is not a value comparison"),
    }
}

fn numeric_rank(repr: ItemRepr) -> Option<u8> {
    match repr {
        ItemRepr::Int32 => Some(0),
        ItemRepr::Int64 => Some(1),
        ItemRepr::Decimal => Some(2),
        ItemRepr::Double => Some(3),
        _ => None,
    }
}

/// Representation both operands of a comparison are converted to.
fn comparison_repr(a: ItemRepr, b: ItemRepr) -> ItemRepr {
    use ItemRepr as R;
    if a == b && !matches!(a, R::Item | R::Node | R::Object) {
        return a;
    }
    match (numeric_rank(a), numeric_rank(b)) {
        (Some(x), Some(y)) => match x.max(y) {
            3 => R::Double,
            2 => R::Decimal,
            _ => R::Int64,
        },
        (Some(_), None) | (None, Some(_)) => R::Double,
        _ if a == R::Bool || b == R::Bool => R::Bool,
        _ => R::String,
    }
}

/// Representation arithmetic is carried out in.
fn arithmetic_repr(repr: ItemRepr) -> ItemRepr {
    match repr {
        ItemRepr::Int32 | ItemRepr::Int64 | ItemRepr::Double | ItemRepr::Decimal => repr,
        _ => ItemRepr::Double,
    }
}

impl<S: InstructionSink> Generator<'_, S> {
    /// Values with a natural lowering whatever their cardinality.
    pub(super) fn value_native(&mut self, id: NodeId) -> Option<Storage> {
        use NodeType as N;
        Some(match self.nt(id) {
            N::For | N::Let | N::Parameter => self.binding(id).storage,
            N::Nop | N::OptimizeBarrier | N::XsltCopyOf => self.gen_value(self.child(id, 0)),
            N::Sort => self.sort(id),
            N::Invoke => self.invoke(id),
            N::XsltInvokeEarlyBound | N::XsltInvokeLateBound => self.invoke_external(id),
            N::Sequence if self.graph.children(id).is_empty() => {
                self.call(RuntimeFn::SeqCreate(ItemRepr::Item));
                Storage::stack_cached(ItemRepr::Item)
            }
            N::Warning => {
                self.string_value(self.child(id, 0));
                self.call(RuntimeFn::SendMessage);
                self.call(RuntimeFn::SeqCreate(ItemRepr::Item));
                Storage::stack_cached(ItemRepr::Item)
            }
            N::TypeAssert | N::XsltConvert if !self.ty(id).is_singleton() => {
                let value = self.gen_value(self.child(id, 0));
                let value = self.to_cached(value);
                let index = self.data.xml_type(self.ty(id));
                self.ldc_index(index);
                self.call(RuntimeFn::TypeAssert);
                Storage::stack_cached(value.repr)
            }
            _ => return None,
        })
    }

    /// Single-item value of `id`.
    pub(super) fn value(&mut self, id: NodeId) -> Storage {
        use NodeType as N;
        let repr = repr_of(&self.ty(id));
        match self.nt(id) {
            t if t.is_literal() => self.literal(id),
            N::And | N::Or | N::Not | N::IsEmpty | N::IsType | N::Is | N::Before | N::After => self.branch_to_value(id),
            t if t.is_comparison() => self.branch_to_value(id),
            t if t.is_arithmetic() => self.arithmetic(id),
            N::Length => self.count(self.child(id, 0)),
            N::Sum | N::Average | N::Minimum | N::Maximum => {
                let aggregate = self.aggregate(self.child(id, 0));
                self.emit(Instr::Ldloc(aggregate));
                self.aggregate_result(id);
                Storage::stack(repr)
            }
            N::StrLength => {
                self.string_value(self.child(id, 0));
                self.call(RuntimeFn::StrLength);
                Storage::stack(ItemRepr::Int32)
            }
            N::StrConcat => self.concat(id),
            N::StrParseQName => {
                self.string_value(self.child(id, 0));
                self.string_value(self.child(id, 1));
                let group = self.scope_group(id);
                self.ldc_index(group);
                self.call(RuntimeFn::ParseQName);
                Storage::stack(ItemRepr::QName)
            }
            N::Conditional => {
                let (on_false, done) = (self.label(), self.label());
                self.gen_branch(self.child(id, 0), BranchTarget { label: on_false, jump_if: false });
                let then = self.gen_value(self.child(id, 1));
                self.ensure_item(then, repr);
                self.emit(Instr::Br(done));
                self.mark(on_false);
                let otherwise = self.gen_value(self.child(id, 2));
                self.ensure_item(otherwise, repr);
                self.mark(done);
                Storage::stack(repr)
            }
            N::Choice => self.choice_value(id, repr),
            N::PositionOf => {
                let iter = self.child(id, 0);
                let slot = self.binding(iter).position.unwrap_or_else(|| panic!("{iter} keeps no position"));
                Storage::local(slot, ItemRepr::Int32, false)
            }
            N::XmlContext => {
                self.call(RuntimeFn::ContextNode);
                Storage::stack(ItemRepr::Node)
            }
            N::Root | N::NameOf | N::LocalNameOf | N::NamespaceUriOf | N::PrefixOf | N::XPathNodeValue | N::XsltGenerateId => {
                self.node_value(self.child(id, 0));
                self.call(match self.nt(id) {
                    N::Root => RuntimeFn::Root,
                    N::NameOf => RuntimeFn::NameOf,
                    N::LocalNameOf => RuntimeFn::LocalNameOf,
                    N::NamespaceUriOf => RuntimeFn::NamespaceUriOf,
                    N::PrefixOf => RuntimeFn::PrefixOf,
                    N::XPathNodeValue => RuntimeFn::NodeValue,
                    _ => RuntimeFn::GenerateId,
                });
                Storage::stack(repr)
            }
            N::TypeAssert => {
                let value = self.gen_value(self.child(id, 0));
                self.ensure_item(value, ItemRepr::Item);
                let index = self.data.xml_type(self.ty(id));
                self.ldc_index(index);
                self.call(RuntimeFn::TypeAssert);
                self.convert_repr(ItemRepr::Item, repr);
                Storage::stack(repr)
            }
            N::XsltConvert => {
                let value = self.gen_value(self.child(id, 0));
                let value = self.ensure_no_cache(value);
                self.convert_repr(value.repr, repr);
                Storage::stack(repr)
            }
            N::Error => {
                self.string_value(self.child(id, 0));
                self.call(RuntimeFn::ThrowError);
                self.emit(Instr::Ldc(Constant::Null));
                Storage::stack(ItemRepr::Item)
            }
            N::Sequence => {
                let mut result = None;
                for &part in self.graph.children(id) {
                    let value = self.gen_value(part);
                    if self.ty(part).is_empty() {
                        self.discard(value);
                    } else {
                        result = Some(self.pin(value));
                    }
                }
                result.unwrap_or_else(|| panic!("singleton sequence {id} without item"))
            }
            N::Loop if self.nt(self.child(id, 0)) == N::Let => {
                self.bind_let(self.child(id, 0));
                self.gen_value(self.child(id, 1))
            }
            N::DocOrderDistinct => self.gen_value(self.child(id, 0)),
            N::Loop | N::Filter | N::Union | N::Intersection | N::Difference => {
                let cached = self.cache(id);
                self.ensure_no_cache(cached)
            }
            N::Unknown => panic!("unresolved Unknown node {id} reached code generation"),
            other => panic!("no value lowering for {other} at {id}"),
        }
    }

    fn literal(&mut self, id: NodeId) -> Storage {
        let constant = match self.nt(id) {
            NodeType::True => Constant::Bool(true),
            NodeType::False => Constant::Bool(false),
            _ => match self.lit(id).unwrap_or_else(|| panic!("literal {id} without value")) {
                Literal::String(s) => Constant::String(s.clone()),
                Literal::Int32(v) => Constant::Int32(*v),
                Literal::Int64(v) => Constant::Int64(*v),
                Literal::Double(v) => Constant::Double(*v),
                Literal::Decimal(v) => Constant::Decimal(*v),
                Literal::QName(q) => Constant::Name(self.data.name(q)),
                Literal::Type(t) => Constant::Int32(i32::try_from(self.data.xml_type(*t)).unwrap_or(i32::MAX)),
                Literal::DateTime(d) => {
                    self.ldc_str(&d.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true));
                    self.convert_repr(ItemRepr::String, ItemRepr::DateTime);
                    return Storage::stack(ItemRepr::DateTime);
                }
            },
        };
        let repr = match constant {
            Constant::Name(_) => ItemRepr::QName,
            _ => repr_of(&self.ty(id)),
        };
        self.emit(Instr::Ldc(constant));
        Storage::stack(repr)
    }

    /// Value of `id` as a string on the stack.
    pub(crate) fn string_value(&mut self, id: NodeId) {
        let value = self.gen_value(id);
        self.ensure_item(value, ItemRepr::String);
    }

    /// Value of `id` as a single node on the stack.
    pub(crate) fn node_value(&mut self, id: NodeId) {
        let value = self.gen_value(id);
        self.ensure_item(value, ItemRepr::Node);
    }

    /// Single nodes that may be absent, as a node or null reference.
    pub(super) fn gen_value_nullable(&mut self, id: NodeId) -> Storage {
        match self.nt(id) {
            NodeType::Attribute => {
                self.node_value(self.child(id, 0));
                let name = self.lit(self.child(id, 1)).and_then(Literal::as_qname);
                match name {
                    Some(q) => {
                        let index = self.data.name(q);
                        self.emit(Instr::Ldc(Constant::Name(index)));
                    }
                    None => {
                        let name = self.gen_value(self.child(id, 1));
                        self.ensure_item(name, ItemRepr::QName);
                    }
                }
                self.call(RuntimeFn::AttributeByName);
            }
            NodeType::Parent => {
                self.node_value(self.child(id, 0));
                self.call(RuntimeFn::Parent);
            }
            NodeType::DataSource => {
                self.string_value(self.child(id, 0));
                self.string_value(self.child(id, 1));
                self.call(RuntimeFn::DataSource);
            }
            other => panic!("{other} is not a nullable node lowering"),
        }
        Storage::stack(ItemRepr::Node)
    }

    /// Turn a value into a cached sequence on the stack.
    pub(crate) fn to_cached(&mut self, storage: Storage) -> Storage {
        if storage.cached {
            return self.ensure_stack(storage);
        }
        let item = self.ensure_local(storage);
        self.call(RuntimeFn::SeqCreate(item.repr));
        self.emit(Instr::Dup);
        self.ensure_stack(item);
        self.call(RuntimeFn::SeqAdd(item.repr));
        Storage::stack_cached(item.repr)
    }

    fn arithmetic(&mut self, id: NodeId) -> Storage {
        let result = repr_of(&self.ty(id));
        let repr = arithmetic_repr(result);
        let operands: Vec<NodeId> = self.graph.children(id).to_vec();
        for &operand in &operands {
            let value = self.gen_value(operand);
            self.ensure_item(value, repr);
        }
        let t = self.nt(id);
        if repr == ItemRepr::Decimal {
            self.call(match t {
                NodeType::Negate => RuntimeFn::DecimalNeg,
                NodeType::Add => RuntimeFn::DecimalAdd,
                NodeType::Subtract => RuntimeFn::DecimalSub,
                NodeType::Multiply => RuntimeFn::DecimalMul,
                NodeType::Divide => RuntimeFn::DecimalDiv,
                _ => RuntimeFn::DecimalRem,
            });
        } else {
            self.emit(match t {
                NodeType::Negate => Instr::Neg(repr),
                NodeType::Add => Instr::Add(repr),
                NodeType::Subtract => Instr::Sub(repr),
                NodeType::Multiply => Instr::Mul(repr),
                NodeType::Divide => Instr::Div(repr),
                _ => Instr::Rem(repr),
            });
        }
        self.convert_repr(repr, result);
        Storage::stack(result)
    }

    /// Number of items of `id`.
    fn count(&mut self, id: NodeId) -> Storage {
        if self.nt(id).is_iterator() && self.binding(id).storage.cached {
            let storage = self.binding(id).storage;
            self.ensure_stack(storage);
            self.call(RuntimeFn::SeqCount);
            return Storage::stack(ItemRepr::Int32);
        }
        let counter = self.local(ItemRepr::Int32);
        self.ldc_i32(0);
        self.emit(Instr::Stloc(counter));
        let done = self.label();
        let frame = self.gen_iterate(id, done);
        if frame.storage.location != Location::None {
            self.increment(counter);
            self.emit(Instr::Br(frame.next()));
        }
        self.mark(done);
        Storage::local(counter, ItemRepr::Int32, false)
    }

    /// Accumulate the items of `id` into a fresh aggregate object.
    pub(super) fn aggregate(&mut self, id: NodeId) -> LocalSlot {
        let repr = arithmetic_repr(repr_of(&self.ty(id)));
        self.call(RuntimeFn::AggregateCreate(repr));
        let aggregate = self.local(ItemRepr::Object);
        self.emit(Instr::Stloc(aggregate));
        let done = self.label();
        let frame = self.gen_iterate(id, done);
        if frame.storage.location != Location::None {
            self.emit(Instr::Ldloc(aggregate));
            self.ensure_item(frame.storage, repr);
            self.call(RuntimeFn::AggregateAdd(repr));
            self.emit(Instr::Br(frame.next()));
        }
        self.mark(done);
        aggregate
    }

    /// Read the result of aggregate node `id` from the aggregate on the
    /// stack.
    pub(super) fn aggregate_result(&mut self, id: NodeId) {
        let repr = arithmetic_repr(repr_of(&self.ty(self.child(id, 0))));
        self.call(match self.nt(id) {
            NodeType::Sum => RuntimeFn::AggregateSum(repr),
            NodeType::Average => RuntimeFn::AggregateAverage(repr),
            NodeType::Minimum => RuntimeFn::AggregateMinimum(repr),
            _ => RuntimeFn::AggregateMaximum(repr),
        });
        self.convert_repr(repr, repr_of(&self.ty(id)));
    }

    /// Average, minimum and maximum of a possibly empty sequence.
    pub(super) fn iterate_aggregate(&mut self, id: NodeId) {
        let aggregate = self.aggregate(self.child(id, 0));
        self.emit(Instr::Ldloc(aggregate));
        self.call(RuntimeFn::AggregateIsEmpty);
        self.emit(Instr::BrTrue(self.on_end()));
        self.emit(Instr::Ldloc(aggregate));
        self.aggregate_result(id);
        self.produce(Storage::stack(repr_of(&self.ty(id))), None);
    }

    fn concat(&mut self, id: NodeId) -> Storage {
        let (delimiter, values) = (self.child(id, 0), self.child(id, 1));
        self.call(RuntimeFn::StrConcatCreate);
        let builder = self.local(ItemRepr::Object);
        self.emit(Instr::Stloc(builder));
        if self.lit(delimiter).and_then(Literal::as_str) != Some("") {
            self.emit(Instr::Ldloc(builder));
            self.string_value(delimiter);
            self.call(RuntimeFn::StrConcatDelimiter);
        }
        let done = self.label();
        let frame = self.gen_iterate(values, done);
        if frame.storage.location != Location::None {
            self.emit(Instr::Ldloc(builder));
            self.ensure_item(frame.storage, ItemRepr::String);
            self.call(RuntimeFn::StrConcatAdd);
            self.emit(Instr::Br(frame.next()));
        }
        self.mark(done);
        self.emit(Instr::Ldloc(builder));
        self.call(RuntimeFn::StrConcatResult);
        Storage::stack(ItemRepr::String)
    }

    fn choice_value(&mut self, id: NodeId, repr: ItemRepr) -> Storage {
        let branches: Vec<NodeId> = self.graph.children(self.child(id, 1)).to_vec();
        let selector = self.gen_value(self.child(id, 0));
        self.ensure_item(selector, ItemRepr::Int32);
        let labels: Vec<_> = branches.iter().map(|_| self.label()).collect();
        let done = self.label();
        self.emit(Instr::Switch(labels.clone()));
        if let Some(&last) = labels.last() {
            self.emit(Instr::Br(last));
        }
        for (&branch, &label) in branches.iter().zip(&labels) {
            self.mark(label);
            let value = self.gen_value(branch);
            self.ensure_item(value, repr);
            self.emit(Instr::Br(done));
        }
        self.mark(done);
        Storage::stack(repr)
    }

    /// Prefix-mapping group recorded for a computed name.
    pub(crate) fn scope_group(&mut self, id: NodeId) -> u32 {
        let scope = self.ann.get(id).and_then(|a| a.scope.clone()).unwrap_or_default();
        self.data.prefix_mappings(scope.iter().map(|(p, n)| (&**p, &**n)))
    }

    pub(super) fn branch(&mut self, id: NodeId, target: BranchTarget) {
        use NodeType as N;
        let jump = |jump_if: bool| if jump_if { Instr::BrTrue(target.label) } else { Instr::BrFalse(target.label) };
        match self.nt(id) {
            N::True | N::False => {
                if (self.nt(id) == N::True) == target.jump_if {
                    self.emit(Instr::Br(target.label));
                }
            }
            N::Not => self.gen_branch(self.child(id, 0), BranchTarget { jump_if: !target.jump_if, ..target }),
            N::And | N::Or => {
                let (a, b) = (self.child(id, 0), self.child(id, 1));
                // `and` jumping on false and `or` jumping on true short-circuit
                // straight to the target
                let short = (self.nt(id) == N::Or) == target.jump_if;
                if short {
                    self.gen_branch(a, target);
                    self.gen_branch(b, target);
                } else {
                    let skip = self.label();
                    self.gen_branch(a, BranchTarget { label: skip, jump_if: !target.jump_if });
                    self.gen_branch(b, target);
                    self.mark(skip);
                }
            }
            N::IsEmpty => {
                let (empty, skip) = (self.label(), self.label());
                let frame = self.gen_iterate(self.child(id, 0), empty);
                self.discard(frame.storage);
                if target.jump_if {
                    self.emit(Instr::Br(skip));
                    self.mark(empty);
                    self.emit(Instr::Br(target.label));
                } else {
                    self.emit(Instr::Br(target.label));
                    self.mark(empty);
                    self.emit(Instr::Br(skip));
                }
                self.mark(skip);
            }
            N::IsType => {
                let value = self.gen_value(self.child(id, 0));
                self.ensure_stack(value);
                if !value.cached {
                    self.convert_repr(value.repr, ItemRepr::Item);
                }
                let ty = self.lit(self.child(id, 1)).and_then(Literal::as_type).unwrap_or_else(|| panic!("IsType {id} without type"));
                let index = self.data.xml_type(ty);
                self.ldc_index(index);
                self.call(RuntimeFn::MatchesType);
                self.emit(jump(target.jump_if));
            }
            N::Is => {
                self.node_value(self.child(id, 0));
                self.node_value(self.child(id, 1));
                self.call(RuntimeFn::IsSameNode);
                self.emit(jump(target.jump_if));
            }
            N::Before | N::After => {
                self.node_value(self.child(id, 0));
                self.node_value(self.child(id, 1));
                self.call(RuntimeFn::ComparePosition);
                self.ldc_i32(0);
                let op = if self.nt(id) == N::Before { CmpOp::Lt } else { CmpOp::Gt };
                self.emit(Instr::Cmp(op, ItemRepr::Int32));
                self.emit(jump(target.jump_if));
            }
            t if t.is_comparison() => {
                self.compare(id, t);
                self.emit(jump(target.jump_if));
            }
            _ => {
                let value = self.gen_value(id);
                self.ensure_item(value, ItemRepr::Bool);
                self.emit(jump(target.jump_if));
            }
        }
    }

    /// Boolean outcome of a value comparison on the stack.
    fn compare(&mut self, id: NodeId, t: NodeType) {
        let (a, b) = (self.child(id, 0), self.child(id, 1));
        let repr = comparison_repr(repr_of(&self.ty(a)), repr_of(&self.ty(b)));
        for operand in [a, b] {
            let value = self.gen_value(operand);
            self.ensure_item(value, repr);
        }
        let op = cmp_op(t);
        let ordinal = match repr {
            ItemRepr::String => Some(RuntimeFn::StringCompare),
            ItemRepr::Decimal => Some(RuntimeFn::DecimalCompare),
            ItemRepr::DateTime => Some(RuntimeFn::DateTimeCompare),
            ItemRepr::QName => {
                self.call(RuntimeFn::QNameEqual);
                if op == CmpOp::Ne {
                    self.emit(Instr::Not);
                }
                return;
            }
            _ => None,
        };
        match ordinal {
            Some(f) => {
                self.call(f);
                self.ldc_i32(0);
                self.emit(Instr::Cmp(op, ItemRepr::Int32));
            }
            None => self.emit(Instr::Cmp(op, repr)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ItemRepr::Int32, ItemRepr::Int32, ItemRepr::Int32)]
    #[case(ItemRepr::Int32, ItemRepr::Int64, ItemRepr::Int64)]
    #[case(ItemRepr::Int64, ItemRepr::Decimal, ItemRepr::Decimal)]
    #[case(ItemRepr::Decimal, ItemRepr::Double, ItemRepr::Double)]
    #[case(ItemRepr::Node, ItemRepr::String, ItemRepr::String)]
    #[case(ItemRepr::Node, ItemRepr::Node, ItemRepr::String)]
    #[case(ItemRepr::Int32, ItemRepr::Item, ItemRepr::Double)]
    fn comparison_operands_promote(#[case] a: ItemRepr, #[case] b: ItemRepr, #[case] expected: ItemRepr) {
        assert_eq!(comparison_repr(a, b), expected);
    }
}
