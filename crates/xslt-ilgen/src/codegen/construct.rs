//! Writer-mode lowering: constructors and control flow pushing content to
//! the output sink.
//!
//! Each sink call is checked or unchecked depending on whether the output
//! state before the node is statically known to allow it.

use crate::codegen::Generator;
use crate::codegen::context::{BranchTarget, IteratorFrame};
use crate::codegen::instr::{Constant, Instr, InstructionSink, ItemRepr, Label};
use crate::codegen::runtime::{Check, RuntimeFn, WriterOp};
use crate::codegen::storage::{Location, Storage};
use crate::construct::{ConstructInfo, XmlState};
use crate::patterns::{Pattern, RTF_TEXT};
use xslt_ir::{Literal, NodeId, NodeType};

impl<S: InstructionSink> Generator<'_, S> {
    fn construct_info(&self, id: NodeId) -> ConstructInfo {
        self.ann.construct(id).cloned().unwrap_or_default()
    }

    fn write_op(&mut self, op: WriterOp, checked: bool) {
        self.call(RuntimeFn::Write(op, Check::from_needed(checked)));
    }

    /// Unchecked content written right after a start tag has to close the
    /// tag first.
    fn close_start_tag(&mut self, info: &ConstructInfo, checked: bool) {
        if !checked && info.initial == XmlState::EnumAttrs {
            self.write_op(WriterOp::StartElementContent, false);
        }
    }

    /// Push the content of a writer-mode node to the output.
    pub(super) fn write(&mut self, id: NodeId) {
        use NodeType as N;
        match self.nt(id) {
            N::Sequence => {
                let children: Vec<NodeId> = self.graph.children(id).to_vec();
                for child in children {
                    self.gen_writer(child);
                }
            }
            N::Nop => self.gen_writer(self.child(id, 0)),
            N::Error | N::Warning => {
                let value = self.gen_value(id);
                self.discard(value);
            }
            N::Conditional => {
                let (otherwise, done) = (self.label(), self.label());
                self.gen_branch(self.child(id, 0), BranchTarget { label: otherwise, jump_if: false });
                self.gen_writer(self.child(id, 1));
                self.emit(Instr::Br(done));
                self.mark(otherwise);
                self.gen_writer(self.child(id, 2));
                self.mark(done);
            }
            N::Choice => self.write_choice(id),
            N::Loop => self.write_loop(id),
            N::ElementCtor => self.write_element(id),
            N::AttributeCtor => self.write_attribute(id),
            N::NamespaceDecl => {
                let info = self.construct_info(id);
                if info.is_namespace_in_scope {
                    return;
                }
                self.string_value(self.child(id, 0));
                self.string_value(self.child(id, 1));
                self.write_op(WriterOp::NamespaceDeclaration, info.needs_attribute_check());
            }
            t @ (N::TextCtor | N::RawTextCtor) => {
                let info = self.construct_info(id);
                let checked = info.needs_text_check();
                self.close_start_tag(&info, checked);
                self.string_value(self.child(id, 0));
                let op = if t == N::TextCtor { WriterOp::String } else { WriterOp::RawString };
                self.write_op(op, checked);
            }
            N::CommentCtor => {
                let info = self.construct_info(id);
                let checked = info.needs_content_check();
                self.close_start_tag(&info, checked);
                self.write_op(WriterOp::StartComment, checked);
                self.gen_writer(self.child(id, 0));
                self.write_op(WriterOp::EndComment, false);
            }
            N::PICtor => {
                let info = self.construct_info(id);
                let checked = info.needs_content_check();
                self.close_start_tag(&info, checked);
                self.string_value(self.child(id, 0));
                self.write_op(WriterOp::StartPI, checked);
                self.gen_writer(self.child(id, 1));
                self.write_op(WriterOp::EndPI, false);
            }
            N::DocumentCtor | N::RtfCtor => {
                let checked = self.construct_info(id).needs_content_check();
                self.write_op(WriterOp::StartRoot, checked);
                self.gen_writer(self.child(id, 0));
                self.write_op(WriterOp::EndRoot, false);
            }
            N::XsltCopy => self.write_copy(id),
            N::Invoke if self.is_writer_call(id) => self.call_writer(id),
            _ => self.copy_items(id),
        }
    }

    fn write_choice(&mut self, id: NodeId) {
        let branches: Vec<NodeId> = self.graph.children(self.child(id, 1)).to_vec();
        let selector = self.gen_value(self.child(id, 0));
        self.ensure_item(selector, ItemRepr::Int32);
        let starts: Vec<Label> = branches.iter().map(|_| self.label()).collect();
        let done = self.label();
        self.emit(Instr::Switch(starts.clone()));
        self.emit(Instr::Br(starts.last().copied().unwrap_or(done)));
        for (&branch, &start) in branches.iter().zip(&starts) {
            self.mark(start);
            self.gen_writer(branch);
            self.emit(Instr::Br(done));
        }
        self.mark(done);
    }

    fn write_loop(&mut self, id: NodeId) {
        let (iter, body) = (self.child(id, 0), self.child(id, 1));
        if self.nt(iter) == NodeType::Let {
            self.bind_let(iter);
            return self.gen_writer(body);
        }
        let done = self.label();
        self.frames.push(IteratorFrame::new(id, done));
        if let Some(source) = self.bind_for(iter, done, false) {
            self.gen_writer(body);
            self.emit(Instr::Br(source.next()));
        }
        self.frames.pop();
        self.mark(done);
    }

    fn write_element(&mut self, id: NodeId) {
        let info = self.construct_info(id);
        let checked = info.needs_content_check();
        self.close_start_tag(&info, checked);
        let (name, content) = (self.child(id, 0), self.child(id, 1));
        match self.lit(name).and_then(Literal::as_qname) {
            Some(q) if info.needs_attribute_cache() => {
                let index = self.data.name(q);
                self.emit(Instr::Ldc(Constant::Name(index)));
                self.write_op(WriterOp::StartElementCached, checked);
            }
            Some(q) if q.prefix.is_empty() && q.ns.is_empty() => {
                self.ldc_str(&q.local);
                self.write_op(WriterOp::StartElementLocalName, checked);
            }
            Some(q) => {
                let index = self.data.name(q);
                self.emit(Instr::Ldc(Constant::Name(index)));
                self.write_op(WriterOp::StartElement, checked);
            }
            None => {
                let value = self.gen_value(name);
                self.ensure_item(value, ItemRepr::QName);
                let group = self.scope_group(id);
                self.ldc_index(group);
                self.write_op(WriterOp::StartElementComputed, checked);
            }
        }
        self.gen_writer(content);
        let end = self.construct_info(content).final_state;
        if end == XmlState::EnumAttrs {
            self.write_op(WriterOp::StartElementContent, false);
        }
        let checked_end = !matches!(end, XmlState::EnumAttrs | XmlState::WithinContent);
        self.write_op(WriterOp::EndElement, checked_end);
    }

    fn write_attribute(&mut self, id: NodeId) {
        let info = self.construct_info(id);
        let checked = info.needs_attribute_check();
        let (name, value) = (self.child(id, 0), self.child(id, 1));
        match self.lit(name).and_then(Literal::as_qname) {
            Some(q) => {
                let index = self.data.name(q);
                self.emit(Instr::Ldc(Constant::Name(index)));
                self.write_op(WriterOp::StartAttribute, checked);
            }
            None => {
                let name = self.gen_value(name);
                self.ensure_item(name, ItemRepr::QName);
                let group = self.scope_group(id);
                self.ldc_index(group);
                self.write_op(WriterOp::StartAttributeComputed, checked);
            }
        }
        self.gen_writer(value);
        self.write_op(WriterOp::EndAttribute, false);
    }

    /// Shallow copy of a node; content is written only when the copy opened
    /// an element or document.
    fn write_copy(&mut self, id: NodeId) {
        let info = self.construct_info(id);
        let checked = info.initial != XmlState::WithinSequence;
        let node = self.gen_value(self.child(id, 0));
        let node = self.ensure_item(node, ItemRepr::Node);
        let node = self.ensure_local(node);
        let skip = self.label();
        self.ensure_stack(node);
        self.write_op(WriterOp::StartCopy, checked);
        self.emit(Instr::BrFalse(skip));
        self.gen_writer(self.child(id, 1));
        self.ensure_stack(node);
        self.write_op(WriterOp::EndCopy, false);
        self.mark(skip);
    }

    /// Copy every item of an iterator-mode node to the output: nodes by deep
    /// copy, atomic values as text.
    pub(super) fn copy_items(&mut self, id: NodeId) {
        let info = self.construct_info(id);
        let ty = self.ty(id);
        let checked = match info.initial {
            XmlState::WithinSequence => false,
            XmlState::WithinAttr | XmlState::WithinComment | XmlState::WithinPI => !ty.is_atomic(),
            _ => true,
        };
        let done = self.label();
        let frame = self.gen_iterate(id, done);
        if frame.storage.location != Location::None {
            if ty.is_atomic() {
                self.ensure_item(frame.storage, ItemRepr::String);
                self.write_op(WriterOp::String, checked);
            } else {
                self.ensure_item(frame.storage, ItemRepr::Item);
                self.write_op(WriterOp::CopyOf, checked);
            }
            self.emit(Instr::Br(frame.next()));
        }
        self.mark(done);
    }

    /// Build the content of a writer-mode node into a fresh sequence (or
    /// tree fragment) and return it as a value.
    pub(super) fn construct_sequence(&mut self, id: NodeId) -> Storage {
        if self.nt(id) == NodeType::RtfCtor {
            let text = self.ann.read(self.graph, id).node_arg(RTF_TEXT);
            match text {
                Some(text) if self.matches(id, Pattern::SingleTextRtf) => {
                    self.string_value(text);
                    self.string_value(self.child(id, 1));
                    self.call(RuntimeFn::TextRtf);
                }
                _ => {
                    self.string_value(self.child(id, 1));
                    self.write_op(WriterOp::StartRtfConstruction, false);
                    self.gen_writer(self.child(id, 0));
                    self.write_op(WriterOp::EndRtfConstruction, false);
                }
            }
            return Storage::stack(ItemRepr::Node);
        }
        self.write_op(WriterOp::StartSequenceConstruction, false);
        self.write(id);
        self.write_op(WriterOp::EndSequenceConstruction, false);
        Storage::stack_cached(ItemRepr::Node)
    }
}
