//! Stack-machine instructions and the sink they are emitted into.

use crate::codegen::runtime::RuntimeFn;
use compact_str::CompactString;
use core::fmt;
use rust_decimal::Decimal;
use serde::Serialize;
use xslt_ir::SourceSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Label(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LocalSlot(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MethodId(pub u32);

/// Representation of a single item on the stack or in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ItemRepr {
    Item,
    Node,
    String,
    Bool,
    Int32,
    Int64,
    Double,
    Decimal,
    QName,
    DateTime,
    /// Opaque runtime object (iterators, caches, writers).
    Object,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Constant {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Decimal(Decimal),
    String(CompactString),
    /// Index into the static name table.
    Name(u32),
    Null,
}

/// Numeric comparison producing a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Callee {
    Runtime(RuntimeFn),
    Method(MethodId),
    /// Early-bound extension method; `type_index` points into the static
    /// early-bound type table.
    External { type_index: u32, method: CompactString },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Instr {
    Ldc(Constant),
    Ldloc(LocalSlot),
    Stloc(LocalSlot),
    Ldarg(u16),
    Pop,
    Dup,
    Br(Label),
    BrTrue(Label),
    BrFalse(Label),
    /// Pops an int index and jumps to the matching label; falls through when
    /// out of range.
    Switch(Vec<Label>),
    Add(ItemRepr),
    Sub(ItemRepr),
    Mul(ItemRepr),
    Div(ItemRepr),
    Rem(ItemRepr),
    Neg(ItemRepr),
    Cmp(CmpOp, ItemRepr),
    /// Boolean negation of the top of stack.
    Not,
    Conv(ItemRepr, ItemRepr),
    Call(Callee),
    TailCall(MethodId),
    Ret,
    SequencePoint(SourceSpan),
}

impl Instr {
    pub fn call(f: RuntimeFn) -> Self {
        Instr::Call(Callee::Runtime(f))
    }

    pub fn label(&self) -> Option<Label> {
        match self {
            Instr::Br(l) | Instr::BrTrue(l) | Instr::BrFalse(l) => Some(*l),
            _ => None,
        }
    }
}

/// Target of code generation.
pub trait InstructionSink {
    /// Reserve a method id so calls can be emitted before the body exists.
    fn declare_method(&mut self, name: &str, params: u16) -> MethodId;
    fn begin_method(&mut self, method: MethodId);
    fn end_method(&mut self);
    fn declare_local(&mut self, repr: ItemRepr, cached: bool) -> LocalSlot;
    fn define_label(&mut self) -> Label;
    fn mark_label(&mut self, label: Label);
    fn emit(&mut self, instr: Instr);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalDecl {
    pub repr: ItemRepr,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodBody {
    pub id: MethodId,
    pub name: CompactString,
    pub params: u16,
    pub locals: Vec<LocalDecl>,
    pub code: Vec<Instr>,
    /// Instruction offset of every label defined while this method was open.
    pub labels: Vec<(Label, usize)>,
}

impl MethodBody {
    pub fn label_offset(&self, label: Label) -> Option<usize> {
        self.labels.iter().find(|(l, _)| *l == label).map(|(_, at)| *at)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Program {
    pub methods: Vec<MethodBody>,
}

impl Program {
    pub fn method(&self, id: MethodId) -> Option<&MethodBody> {
        self.methods.iter().find(|m| m.id == id)
    }

    pub fn method_named(&self, name: &str) -> Option<&MethodBody> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instr> {
        self.methods.iter().flat_map(|m| m.code.iter())
    }
}

/// Recording sink producing a [`Program`].
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    declared: Vec<(CompactString, u16)>,
    finished: Vec<MethodBody>,
    open: Vec<MethodBody>,
    next_label: u32,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&mut self) -> &mut MethodBody {
        self.open.last_mut().unwrap_or_else(|| panic!("no method body is open"))
    }

    pub fn finish(mut self) -> Program {
        assert!(self.open.is_empty(), "method bodies left open");
        self.finished.sort_by_key(|m| m.id.0);
        Program { methods: self.finished }
    }
}

impl InstructionSink for ProgramBuilder {
    fn declare_method(&mut self, name: &str, params: u16) -> MethodId {
        self.declared.push((CompactString::from(name), params));
        MethodId(self.declared.len() as u32 - 1)
    }

    fn begin_method(&mut self, method: MethodId) {
        let (name, params) = self.declared[method.0 as usize].clone();
        self.open.push(MethodBody { id: method, name, params, locals: Vec::new(), code: Vec::new(), labels: Vec::new() });
    }

    fn end_method(&mut self) {
        let body = self.open.pop().unwrap_or_else(|| panic!("end_method without begin_method"));
        self.finished.push(body);
    }

    fn declare_local(&mut self, repr: ItemRepr, cached: bool) -> LocalSlot {
        let body = self.current();
        body.locals.push(LocalDecl { repr, cached });
        LocalSlot(body.locals.len() as u32 - 1)
    }

    fn define_label(&mut self) -> Label {
        self.next_label += 1;
        Label(self.next_label - 1)
    }

    fn mark_label(&mut self, label: Label) {
        let body = self.current();
        let at = body.code.len();
        body.labels.push((label, at));
    }

    fn emit(&mut self, instr: Instr) {
        self.current().code.push(instr);
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Bool(v) => write!(f, "{v}"),
            Constant::Int32(v) => write!(f, "{v}"),
            Constant::Int64(v) => write!(f, "{v}L"),
            Constant::Double(v) => write!(f, "{v:?}"),
            Constant::Decimal(v) => write!(f, "{v}m"),
            Constant::String(s) => write!(f, "{s:?}"),
            Constant::Name(i) => write!(f, "name#{i}"),
            Constant::Null => write!(f, "null"),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Ldc(c) => write!(f, "ldc {c}"),
            Instr::Ldloc(l) => write!(f, "ldloc {}", l.0),
            Instr::Stloc(l) => write!(f, "stloc {}", l.0),
            Instr::Ldarg(i) => write!(f, "ldarg {i}"),
            Instr::Pop => write!(f, "pop"),
            Instr::Dup => write!(f, "dup"),
            Instr::Br(l) => write!(f, "br L{}", l.0),
            Instr::BrTrue(l) => write!(f, "brtrue L{}", l.0),
            Instr::BrFalse(l) => write!(f, "brfalse L{}", l.0),
            Instr::Switch(ls) => {
                write!(f, "switch (")?;
                for (i, l) in ls.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "L{}", l.0)?;
                }
                write!(f, ")")
            }
            Instr::Add(r) => write!(f, "add.{r:?}"),
            Instr::Sub(r) => write!(f, "sub.{r:?}"),
            Instr::Mul(r) => write!(f, "mul.{r:?}"),
            Instr::Div(r) => write!(f, "div.{r:?}"),
            Instr::Rem(r) => write!(f, "rem.{r:?}"),
            Instr::Neg(r) => write!(f, "neg.{r:?}"),
            Instr::Cmp(op, r) => write!(f, "cmp.{op:?}.{r:?}"),
            Instr::Not => write!(f, "not"),
            Instr::Conv(a, b) => write!(f, "conv {a:?}->{b:?}"),
            Instr::Call(Callee::Runtime(rf)) => write!(f, "call {rf}"),
            Instr::Call(Callee::Method(m)) => write!(f, "call M{}", m.0),
            Instr::Call(Callee::External { type_index, method }) => write!(f, "call ext#{type_index}::{method}"),
            Instr::TailCall(m) => write!(f, "tail.call M{}", m.0),
            Instr::Ret => write!(f, "ret"),
            Instr::SequencePoint(s) => {
                write!(f, ".line {}:{}-{}:{}", s.start_line, s.start_col, s.end_line, s.end_col)
            }
        }
    }
}

impl fmt::Display for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ".method M{} {} (params {})", self.id.0, self.name, self.params)?;
        for (i, local) in self.locals.iter().enumerate() {
            let cached = if local.cached { "[]" } else { "" };
            writeln!(f, "  .local {i}: {:?}{cached}", local.repr)?;
        }
        for (at, instr) in self.code.iter().enumerate() {
            for (label, _) in self.labels.iter().filter(|(_, pos)| *pos == at) {
                writeln!(f, "L{}:", label.0)?;
            }
            writeln!(f, "  {instr}")?;
        }
        for (label, _) in self.labels.iter().filter(|(_, pos)| *pos == self.code.len()) {
            writeln!(f, "L{}:", label.0)?;
        }
        Ok(())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, method) in self.methods.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{method}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn builder_records_labels_and_locals() {
        let mut b = ProgramBuilder::new();
        let m = b.declare_method("main", 0);
        b.begin_method(m);
        let slot = b.declare_local(ItemRepr::Int32, false);
        let l = b.define_label();
        b.emit(Instr::Ldc(Constant::Int32(1)));
        b.mark_label(l);
        b.emit(Instr::Stloc(slot));
        b.emit(Instr::Ret);
        b.end_method();
        let p = b.finish();
        let body = p.method(m).expect("method");
        assert_eq!(body.label_offset(l), Some(1));
        assert!(body.to_string().contains("L0:\n  stloc 0"));
    }
}
