//! Iterator frames: one per node being lowered, kept on an explicit stack
//! that mirrors the lowering recursion.

use crate::codegen::instr::{Label, LocalSlot};
use crate::codegen::storage::Storage;
use xslt_ir::NodeId;

/// Conditional jump requested from a boolean lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchTarget {
    pub label: Label,
    /// Jump when the condition evaluates to this value.
    pub jump_if: bool,
}

#[derive(Debug, Clone)]
pub struct IteratorFrame {
    pub node: NodeId,
    /// Where control goes once the node has no (more) items.
    pub on_end: Label,
    /// Jump here to pull the next item; `None` means the node yields at most
    /// one item and the next pull ends the sequence.
    pub label_next: Option<Label>,
    pub position: Option<LocalSlot>,
    pub branch: Option<BranchTarget>,
    pub storage: Storage,
}

impl IteratorFrame {
    pub fn new(node: NodeId, on_end: Label) -> Self {
        Self { node, on_end, label_next: None, position: None, branch: None, storage: Storage::none() }
    }

    /// Label resuming the iteration: the explicit next label or the end.
    pub fn next(&self) -> Label {
        self.label_next.unwrap_or(self.on_end)
    }
}

#[derive(Debug, Default)]
pub struct FrameStack {
    frames: Vec<IteratorFrame>,
}

impl FrameStack {
    pub fn push(&mut self, frame: IteratorFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> IteratorFrame {
        self.frames.pop().unwrap_or_else(|| panic!("iterator frame stack underflow"))
    }

    pub fn top(&self) -> &IteratorFrame {
        self.frames.last().unwrap_or_else(|| panic!("no iterator frame is open"))
    }

    pub fn top_mut(&mut self) -> &mut IteratorFrame {
        self.frames.last_mut().unwrap_or_else(|| panic!("no iterator frame is open"))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Position counter maintained for `iterator` by an enclosing frame.
    pub fn position_of(&self, iterator: NodeId) -> Option<LocalSlot> {
        self.frames.iter().rev().find(|f| f.node == iterator).and_then(|f| f.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::instr::Label;
    use rstest::rstest;

    #[rstest]
    fn next_defaults_to_end() {
        let mut frame = IteratorFrame::new(NodeId(0), Label(3));
        assert_eq!(frame.next(), Label(3));
        frame.label_next = Some(Label(7));
        assert_eq!(frame.next(), Label(7));
    }

    #[rstest]
    fn frames_nest() {
        let mut stack = FrameStack::default();
        stack.push(IteratorFrame::new(NodeId(1), Label(0)));
        stack.push(IteratorFrame::new(NodeId(2), Label(1)));
        stack.top_mut().position = Some(LocalSlot(4));
        assert_eq!(stack.position_of(NodeId(2)), Some(LocalSlot(4)));
        assert_eq!(stack.pop().node, NodeId(2));
        assert_eq!(stack.depth(), 1);
    }
}
