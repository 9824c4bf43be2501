//! Two-pass program assembly: the compiler emits against symbolic `Label`s
//! and `ProgramBuilder::finish` backpatches every jump operand to a
//! concrete address once the whole program is known, spec §4.6's "labels
//! resolved to addresses after emission".
//!
//! Grounded on the teacher's `vdbe/aux.rs` `VdbeBuilder`/`Label` pair,
//! generalized to the new `Opcode`/`VdbeOp` set.

use std::collections::HashMap;

use crate::vdbe::opcode::{Opcode, VdbeOp, P4};

/// A symbolic jump target. Opaque; compare only via `==`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

/// Which jump operand(s) of an instruction a label, once resolved, should be
/// written into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JumpSlot {
    P2,
}

struct PendingJump {
    op_index: usize,
    slot: JumpSlot,
    label: Label,
}

/// The finished, immutable bytecode program a `Vdbe` executes.
#[derive(Debug, Clone)]
pub struct Program {
    pub ops: Vec<VdbeOp>,
    pub num_registers: usize,
    pub num_cursors: usize,
}

/// Assembles a `Program` against symbolic labels, spec §4.6.
pub struct ProgramBuilder {
    ops: Vec<VdbeOp>,
    next_label: u32,
    label_addrs: HashMap<Label, usize>,
    pending: Vec<PendingJump>,
    next_register: i32,
    next_cursor: i32,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        ProgramBuilder {
            ops: Vec::new(),
            next_label: 0,
            label_addrs: HashMap::new(),
            pending: Vec::new(),
            next_register: 1,
            next_cursor: 0,
        }
    }

    /// Allocate a fresh symbolic label, not yet bound to an address.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Bind `label` to the address of the *next* instruction emitted.
    pub fn resolve_label(&mut self, label: Label) {
        self.label_addrs.insert(label, self.ops.len());
    }

    /// Allocate the next unused register.
    pub fn alloc_register(&mut self) -> i32 {
        let r = self.next_register;
        self.next_register += 1;
        r
    }

    /// Allocate `n` contiguous registers, returning the first.
    pub fn alloc_registers(&mut self, n: i32) -> i32 {
        let r = self.next_register;
        self.next_register += n;
        r
    }

    /// Allocate the next unused cursor number.
    pub fn alloc_cursor(&mut self) -> i32 {
        let c = self.next_cursor;
        self.next_cursor += 1;
        c
    }

    /// Emit an instruction, returning its address.
    pub fn emit(&mut self, op: VdbeOp) -> usize {
        let addr = self.ops.len();
        self.ops.push(op);
        addr
    }

    /// Emit a jump instruction whose `p2` targets `label`, resolved once the
    /// whole program is assembled.
    pub fn emit_jump(&mut self, opcode: Opcode, p1: i32, label: Label, p3: i32) -> usize {
        let addr = self.emit(VdbeOp::new(opcode, p1, -1, p3));
        self.pending.push(PendingJump { op_index: addr, slot: JumpSlot::P2, label });
        addr
    }

    /// Patch `op_index`'s `p2` to jump to `label` once resolved (for
    /// instructions emitted via `emit` before their target label existed).
    pub fn patch_jump(&mut self, op_index: usize, label: Label) {
        self.pending.push(PendingJump { op_index, slot: JumpSlot::P2, label });
    }

    pub fn current_addr(&self) -> usize {
        self.ops.len()
    }

    /// Backpatch every pending jump and return the finished program.
    pub fn finish(mut self) -> Program {
        for pending in &self.pending {
            let target = *self
                .label_addrs
                .get(&pending.label)
                .expect("label referenced by a jump was never resolved");
            let op = &mut self.ops[pending.op_index];
            match pending.slot {
                JumpSlot::P2 => op.p2 = target as i32,
            }
        }
        Program {
            ops: self.ops,
            num_registers: (self.next_register - 1).max(0) as usize,
            num_cursors: self.next_cursor as usize,
        }
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn text_p4(s: impl Into<String>) -> P4 {
    P4::Text(s.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_and_backward_jumps_resolve() {
        let mut b = ProgramBuilder::new();
        let loop_top = b.new_label();
        let exit = b.new_label();
        b.resolve_label(loop_top);
        b.emit_jump(Opcode::IfNot, 1, exit, 0);
        let goto_addr = b.emit(VdbeOp::new(Opcode::Goto, 0, -1, 0));
        b.patch_jump(goto_addr, loop_top);
        b.resolve_label(exit);
        b.emit(VdbeOp::new(Opcode::Halt, 0, 0, 0));
        let program = b.finish();
        assert_eq!(program.ops[0].p2, 2);
        assert_eq!(program.ops[1].p2, 0);
    }
}
