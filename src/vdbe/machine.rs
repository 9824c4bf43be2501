//! The register/cursor interpreter (spec §4.5.2/§4.5.3).
//!
//! Grounded on the teacher's `vdbe/engine/mod.rs` `step()` dispatch-loop
//! convention (one `match` arm per opcode, a register file, a cursor
//! table), generalized from btree-cursor opcodes to vtab-cursor opcodes and
//! made `async` so `VFilter`/`Next`/`VUpdate`/`VBegin`/`VCommit`/`VRollback`/
//! `VSync`/`Function` can suspend on I/O (spec §5's suspension points) while
//! everything else runs to completion synchronously within one `step`.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::error::{Error, ErrorCode, Result};
use crate::udf::CallContext;
use crate::value::{Affinity, Value};
use crate::vtab::{ConflictPolicy, FilterInfo};

use super::agg::AggregateContext;
use super::cursor::{encode_key, EphemeralCursor, TableCursor, VdbeCursor};
use super::host::Host;
use super::opcode::{Opcode, P4};
use super::program::Program;

/// What a single `step()` call produced.
pub enum StepOutcome {
    Row(Vec<Value>),
    Done,
}

/// One running instance of a compiled `Program` (spec §4.5's "machine
/// state"): register file, cursor table, aggregate contexts, subroutine
/// frame stack, program counter, and halt/error state.
pub struct Vdbe {
    program: Arc<Program>,
    registers: Vec<Value>,
    cursors: Vec<Option<VdbeCursor>>,
    agg_contexts: Vec<AggregateContext>,
    /// Scalar/aggregate accumulators not tied to a group (for whole-program
    /// state a `Function` call might stash via `set_accumulator`, e.g.
    /// `random()`'s seed). Indexed by the function-call site's `p3`.
    call_accumulators: std::collections::HashMap<i32, Box<dyn Any + Send>>,
    frames: Vec<usize>,
    pc: usize,
    halted: bool,
    halt_code: ErrorCode,
    halt_message: Option<String>,
}

impl Vdbe {
    pub fn new(program: Arc<Program>) -> Self {
        let num_cursors = program.num_cursors;
        Vdbe {
            program,
            registers: vec![Value::Null; 1],
            cursors: (0..num_cursors).map(|_| None).collect(),
            agg_contexts: Vec::new(),
            call_accumulators: std::collections::HashMap::new(),
            frames: Vec::new(),
            pc: 0,
            halted: false,
            halt_code: ErrorCode::Ok,
            halt_message: None,
        }
    }

    fn ensure_register(&mut self, r: i32) {
        let r = r.max(0) as usize;
        if r >= self.registers.len() {
            self.registers.resize(r + 1, Value::Null);
        }
    }

    fn reg(&self, r: i32) -> &Value {
        self.registers.get(r.max(0) as usize).unwrap_or(&Value::Null)
    }

    fn set_reg(&mut self, r: i32, v: Value) {
        self.ensure_register(r);
        self.registers[r as usize] = v;
    }

    fn regs(&self, start: i32, count: i32) -> Vec<Value> {
        (0..count).map(|i| self.reg(start + i).clone()).collect()
    }

    fn ensure_agg_contexts(&mut self, idx: usize) {
        if idx >= self.agg_contexts.len() {
            self.agg_contexts.resize_with(idx + 1, || AggregateContext::new(0));
        }
    }

    pub fn halt_code(&self) -> ErrorCode {
        self.halt_code
    }

    /// Run from the current program counter until a `ResultRow` yields a row
    /// or the program halts, spec §4.5.3.
    pub async fn step(&mut self, host: &dyn Host, cancel: Option<&AtomicBool>) -> Result<StepOutcome> {
        if self.halted {
            return Ok(StepOutcome::Done);
        }
        loop {
            if let Some(flag) = cancel {
                if flag.load(AtomicOrdering::Relaxed) {
                    self.halted = true;
                    return Err(Error::new(ErrorCode::Interrupt));
                }
            }
            let Some(op) = self.program.ops.get(self.pc).cloned() else {
                self.halted = true;
                return Ok(StepOutcome::Done);
            };
            let next_pc = self.pc + 1;
            self.pc = next_pc;

            match op.opcode {
                Opcode::Noop => {}
                Opcode::Halt => {
                    self.halted = true;
                    self.halt_code = int_to_code(op.p1);
                    self.halt_message = match &op.p4 {
                        P4::Text(s) => Some(s.clone()),
                        _ => None,
                    };
                    if self.halt_code == ErrorCode::Ok {
                        return Ok(StepOutcome::Done);
                    }
                    return Err(Error::with_message(self.halt_code, self.halt_message.clone().unwrap_or_default()));
                }
                Opcode::Goto => self.pc = op.p2 as usize,
                Opcode::Gosub => {
                    self.frames.push(self.pc);
                    self.set_reg(op.p1, Value::Integer(self.pc as i64));
                    self.pc = op.p2 as usize;
                }
                Opcode::Return => {
                    if let Value::Integer(addr) = self.reg(op.p1) {
                        self.pc = *addr as usize;
                    } else if let Some(addr) = self.frames.pop() {
                        self.pc = addr;
                    }
                }
                Opcode::If => {
                    if self.reg(op.p1).is_truthy() {
                        self.pc = op.p2 as usize;
                    }
                }
                Opcode::IfNot => {
                    if !self.reg(op.p1).is_truthy() {
                        self.pc = op.p2 as usize;
                    }
                }
                Opcode::IfNull => {
                    if self.reg(op.p1).is_null() {
                        self.pc = op.p2 as usize;
                    }
                }
                Opcode::NotNull => {
                    if !self.reg(op.p1).is_null() {
                        self.pc = op.p2 as usize;
                    }
                }

                Opcode::Eq | Opcode::Ne | Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
                    let a = self.reg(op.p1).clone();
                    let b = self.reg(op.p3).clone();
                    if a.is_null() || b.is_null() {
                        // NULL comparisons are never true (spec §3.1); no jump.
                    } else {
                        let collation = match &op.p4 {
                            P4::Collation(c) => *c,
                            _ => crate::value::Collation::Binary,
                        };
                        let ord = crate::value::compare(&a, &b, collation);
                        let take = match op.opcode {
                            Opcode::Eq => ord.is_eq(),
                            Opcode::Ne => ord.is_ne(),
                            Opcode::Lt => ord.is_lt(),
                            Opcode::Le => ord.is_le(),
                            Opcode::Gt => ord.is_gt(),
                            Opcode::Ge => ord.is_ge(),
                            _ => unreachable!(),
                        };
                        if take {
                            self.pc = op.p2 as usize;
                        }
                    }
                }

                Opcode::Null => self.set_reg(op.p2, Value::Null),
                Opcode::Integer => self.set_reg(op.p2, Value::Integer(op.p1 as i64)),
                Opcode::Real => {
                    if let P4::Real(r) = op.p4 {
                        self.set_reg(op.p2, Value::Real(r));
                    }
                }
                Opcode::String => {
                    if let P4::Text(s) = op.p4 {
                        self.set_reg(op.p2, Value::Text(s));
                    }
                }
                Opcode::Blob => {
                    if let P4::Blob(b) = op.p4 {
                        self.set_reg(op.p2, Value::Blob(b));
                    }
                }
                Opcode::Copy => {
                    let v = self.reg(op.p1).clone();
                    self.set_reg(op.p2, v);
                }
                Opcode::Move => {
                    let v = self.reg(op.p1).clone();
                    self.set_reg(op.p2, v);
                    self.set_reg(op.p1, Value::Null);
                }
                Opcode::Affinity => {
                    if let P4::Affinities(affinities) = &op.p4 {
                        for (i, aff) in affinities.iter().enumerate() {
                            let r = op.p1 + i as i32;
                            let v = self.reg(r).clone();
                            self.set_reg(r, crate::value::affinity_apply(v, *aff));
                        }
                    }
                }

                Opcode::Add => {
                    let v = numeric_binop(self.reg(op.p1), self.reg(op.p3), i64::checked_add, |a, b| a + b);
                    self.set_reg(op.p2, v);
                }
                Opcode::Subtract => {
                    let v = numeric_binop(self.reg(op.p1), self.reg(op.p3), i64::checked_sub, |a, b| a - b);
                    self.set_reg(op.p2, v);
                }
                Opcode::Multiply => {
                    let v = numeric_binop(self.reg(op.p1), self.reg(op.p3), i64::checked_mul, |a, b| a * b);
                    self.set_reg(op.p2, v);
                }
                Opcode::Divide => {
                    let v = divide(self.reg(op.p1), self.reg(op.p3));
                    self.set_reg(op.p2, v);
                }
                Opcode::Remainder => {
                    let v = remainder(self.reg(op.p1), self.reg(op.p3));
                    self.set_reg(op.p2, v);
                }
                Opcode::Concat => {
                    let a = self.reg(op.p1);
                    let b = self.reg(op.p3);
                    let v = if a.is_null() || b.is_null() {
                        Value::Null
                    } else {
                        Value::Text(format!("{}{}", a.to_text(), b.to_text()))
                    };
                    self.set_reg(op.p2, v);
                }
                Opcode::And => {
                    let a = self.reg(op.p1);
                    let b = self.reg(op.p3);
                    let v = three_valued_and(a, b);
                    self.set_reg(op.p2, v);
                }
                Opcode::Or => {
                    let a = self.reg(op.p1);
                    let b = self.reg(op.p3);
                    let v = three_valued_or(a, b);
                    self.set_reg(op.p2, v);
                }
                Opcode::Not => {
                    let a = self.reg(op.p1);
                    let v = if a.is_null() { Value::Null } else { Value::Integer(!a.is_truthy() as i64) };
                    self.set_reg(op.p2, v);
                }
                Opcode::IsNull => {
                    let v = Value::Integer(self.reg(op.p1).is_null() as i64);
                    self.set_reg(op.p2, v);
                }

                Opcode::Function => {
                    let P4::Function(name, _arity) = &op.p4 else {
                        return Err(Error::new(ErrorCode::Internal));
                    };
                    let func = host
                        .function(name, op.p1)
                        .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such function: {}", name)))?;
                    let crate::schema::FunctionKind::Scalar(f) = func.kind else {
                        return Err(Error::with_message(ErrorCode::Error, format!("{} is not a scalar function", name)));
                    };
                    let args = self.regs(op.p2, op.p1);
                    let mut acc = self.call_accumulators.remove(&op.p3);
                    let result = {
                        let mut ctx = CallContext::new(&args, None, &mut acc);
                        f(&mut ctx)?;
                        ctx.into_result()?
                    };
                    if let Some(acc) = acc {
                        self.call_accumulators.insert(op.p3, acc);
                    }
                    self.set_reg(op.p3, result);
                }

                Opcode::AggStep => {
                    let P4::Function(name, _) = &op.p4 else {
                        return Err(Error::new(ErrorCode::Internal));
                    };
                    let func = host
                        .aggregate_function(name)
                        .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such aggregate: {}", name)))?;
                    let crate::schema::FunctionKind::Aggregate { step, .. } = func.kind else {
                        return Err(Error::new(ErrorCode::Internal));
                    };
                    let args = self.regs(op.p2, op.p1);
                    let ctx_idx = op.p5 as usize;
                    let slot = op.p3 as usize;
                    self.ensure_agg_contexts(ctx_idx);
                    let group = self.agg_contexts[ctx_idx]
                        .current_group_mut()
                        .ok_or_else(|| Error::new(ErrorCode::Internal))?;
                    if slot >= group.accumulators.len() {
                        group.accumulators.resize_with(slot + 1, || None);
                    }
                    let mut acc = group.accumulators[slot].take();
                    {
                        let mut ctx = CallContext::new(&args, None, &mut acc);
                        step(&mut ctx)?;
                    }
                    self.agg_contexts[ctx_idx].current_group_mut().unwrap().accumulators[slot] = acc;
                }
                Opcode::AggFinal => {
                    let P4::Function(name, _) = &op.p4 else {
                        return Err(Error::new(ErrorCode::Internal));
                    };
                    let func = host
                        .aggregate_function(name)
                        .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such aggregate: {}", name)))?;
                    let crate::schema::FunctionKind::Aggregate { finalize, .. } = func.kind else {
                        return Err(Error::new(ErrorCode::Internal));
                    };
                    let ctx_idx = op.p1 as usize;
                    let slot = op.p5 as usize;
                    self.ensure_agg_contexts(ctx_idx);
                    let mut acc = self.agg_contexts[ctx_idx]
                        .iter_group_mut()
                        .and_then(|g| g.accumulators.get_mut(slot).and_then(|a| a.take()));
                    let result = {
                        let args: Vec<Value> = Vec::new();
                        let mut ctx = CallContext::new(&args, None, &mut acc);
                        finalize(&mut ctx)?;
                        ctx.into_result()?
                    };
                    if let Some(group) = self.agg_contexts[ctx_idx].iter_group_mut() {
                        if slot >= group.accumulators.len() {
                            group.accumulators.resize_with(slot + 1, || None);
                        }
                        group.accumulators[slot] = acc;
                    }
                    self.set_reg(op.p3, result);
                }
                Opcode::AggReset => {
                    let ctx_idx = op.p1 as usize;
                    self.ensure_agg_contexts(ctx_idx);
                    self.agg_contexts[ctx_idx].reset();
                }
                Opcode::AggContext => {
                    let ctx_idx = op.p1 as usize;
                    let key_values = self.regs(op.p2, op.p3);
                    self.ensure_agg_contexts(ctx_idx);
                    let key = encode_key(&key_values, &super::opcode::KeyInfo::new(key_values.len()));
                    self.agg_contexts[ctx_idx].select_group(key, key_values);
                }
                Opcode::AggIterate => {
                    let ctx_idx = op.p1 as usize;
                    self.ensure_agg_contexts(ctx_idx);
                    if self.agg_contexts[ctx_idx].iterate_first() {
                        self.agg_contexts[ctx_idx].focus_iter_group();
                        self.pc = op.p2 as usize;
                    }
                }
                Opcode::AggNext => {
                    let ctx_idx = op.p1 as usize;
                    self.ensure_agg_contexts(ctx_idx);
                    if self.agg_contexts[ctx_idx].iterate_next() {
                        self.agg_contexts[ctx_idx].focus_iter_group();
                        self.pc = op.p2 as usize;
                    }
                }
                Opcode::AggGroupValue => {
                    let ctx_idx = op.p1 as usize;
                    self.ensure_agg_contexts(ctx_idx);
                    let v = self.agg_contexts[ctx_idx]
                        .iter_group()
                        .and_then(|g| g.key_values.get(op.p3 as usize))
                        .cloned()
                        .unwrap_or(Value::Null);
                    self.set_reg(op.p2, v);
                }

                Opcode::VOpen => {
                    let P4::CursorTarget(target) = &op.p4 else {
                        return Err(Error::new(ErrorCode::Internal));
                    };
                    let vtable = host.table_instance(&target.schema, &target.table).await?;
                    self.cursors[op.p1 as usize] = Some(VdbeCursor::Table(TableCursor::new(vtable)));
                }
                Opcode::VFilter => {
                    let P4::ScanPlan(plan) = op.p4.clone() else {
                        return Err(Error::new(ErrorCode::Internal));
                    };
                    let args = self.regs(op.p2, op.p3);
                    let Some(VdbeCursor::Table(cursor)) = self.cursors.get_mut(op.p1 as usize).and_then(|c| c.as_mut()) else {
                        return Err(Error::new(ErrorCode::Internal));
                    };
                    let stream = cursor.vtable.query(FilterInfo { plan: (*plan).clone(), args }).await?;
                    cursor.set_stream(stream);
                }
                Opcode::Next | Opcode::Rewind => {
                    let Some(cursor) = self.cursors.get_mut(op.p1 as usize).and_then(|c| c.as_mut()) else {
                        return Err(Error::new(ErrorCode::Internal));
                    };
                    let is_rewind = matches!(op.opcode, Opcode::Rewind);
                    let has_row = if is_rewind {
                        if let Some(eph) = cursor.ephemeral_mut() {
                            eph.rewind()
                        } else {
                            cursor.advance().await?
                        }
                    } else {
                        cursor.advance().await?
                    };
                    // Rewind jumps to p2 when the cursor is empty (nothing to
                    // loop over); Next jumps to p2 when another row remains.
                    let take = if is_rewind { !has_row } else { has_row };
                    if take {
                        self.pc = op.p2 as usize;
                    }
                }
                Opcode::Column => {
                    let Some(cursor) = self.cursors.get(op.p1 as usize).and_then(|c| c.as_ref()) else {
                        return Err(Error::new(ErrorCode::Internal));
                    };
                    let v = cursor
                        .current()
                        .and_then(|row| row.values.get(op.p2 as usize).cloned())
                        .unwrap_or(Value::Null);
                    self.set_reg(op.p3, v);
                }
                Opcode::Rowid => {
                    let Some(cursor) = self.cursors.get(op.p1 as usize).and_then(|c| c.as_ref()) else {
                        return Err(Error::new(ErrorCode::Internal));
                    };
                    let v = match cursor {
                        VdbeCursor::Ephemeral(e) => {
                            e.position().map(|p| Value::Integer(p as i64)).unwrap_or(Value::Null)
                        }
                        VdbeCursor::Table(_) => {
                            cursor.current().map(|r| Value::Integer(r.rowid)).unwrap_or(Value::Null)
                        }
                    };
                    self.set_reg(op.p2, v);
                }
                Opcode::VUpdate => {
                    let P4::ConflictPolicy(policy) = op.p4 else {
                        return Err(Error::new(ErrorCode::Internal));
                    };
                    let Some(VdbeCursor::Table(cursor)) = self.cursors.get(op.p1 as usize).and_then(|c| c.as_ref()) else {
                        return Err(Error::new(ErrorCode::Internal));
                    };
                    let rowid = match self.reg(op.p2) {
                        Value::Integer(r) => Some(*r),
                        _ => None,
                    };
                    let values = self.regs(op.p2 + 1, op.p3);
                    let vtable = cursor.vtable.clone();
                    let result = vtable.update(rowid, values, policy).await?;
                    if let Some(new_rowid) = result {
                        self.set_reg(op.p2, Value::Integer(new_rowid));
                    }
                }
                Opcode::VBegin => {
                    for cursor in self.cursors.iter().flatten() {
                        if let Some(t) = cursor.table() {
                            t.vtable.begin().await?;
                        }
                    }
                }
                Opcode::VCommit => {
                    for cursor in self.cursors.iter().flatten() {
                        if let Some(t) = cursor.table() {
                            t.vtable.commit().await?;
                        }
                    }
                }
                Opcode::VRollback => {
                    for cursor in self.cursors.iter().flatten() {
                        if let Some(t) = cursor.table() {
                            t.vtable.rollback().await?;
                        }
                    }
                }
                Opcode::VSync => {
                    for cursor in self.cursors.iter().flatten() {
                        if let Some(t) = cursor.table() {
                            t.vtable.sync().await?;
                        }
                    }
                }
                Opcode::VSavepoint => {
                    for cursor in self.cursors.iter().flatten() {
                        if let Some(t) = cursor.table() {
                            t.vtable.savepoint(op.p1).await?;
                        }
                    }
                }
                Opcode::VRelease => {
                    for cursor in self.cursors.iter().flatten() {
                        if let Some(t) = cursor.table() {
                            t.vtable.release(op.p1).await?;
                        }
                    }
                }
                Opcode::VRollbackTo => {
                    for cursor in self.cursors.iter().flatten() {
                        if let Some(t) = cursor.table() {
                            t.vtable.rollback_to(op.p1).await?;
                        }
                    }
                }
                Opcode::Close => {
                    self.cursors[op.p1 as usize] = None;
                }

                Opcode::OpenEphemeral => {
                    let key_info = match &op.p4 {
                        P4::KeyInfo(k) => k.clone(),
                        _ => Arc::new(super::opcode::KeyInfo::new(op.p2.max(0) as usize)),
                    };
                    self.cursors[op.p1 as usize] = Some(VdbeCursor::Ephemeral(EphemeralCursor::new(key_info)));
                }
                Opcode::MakeRecord => {
                    let values = self.regs(op.p1, op.p2);
                    let key = crate::value::serialize_key(
                        &values,
                        &vec![false; values.len()],
                        &vec![crate::value::Collation::Binary; values.len()],
                    );
                    self.set_reg(op.p3, Value::Blob(key));
                }
                Opcode::IdxInsert => {
                    let values = self.regs(op.p2, op.p3);
                    let Some(VdbeCursor::Ephemeral(cursor)) = self.cursors.get_mut(op.p1 as usize).and_then(|c| c.as_mut())
                    else {
                        return Err(Error::new(ErrorCode::Internal));
                    };
                    let key = encode_key(&values, &cursor.key_info);
                    let rowid = cursor.len() as i64;
                    cursor.insert(key, rowid, values);
                }
                Opcode::Sort => {
                    if let Some(VdbeCursor::Ephemeral(cursor)) = self.cursors.get_mut(op.p1 as usize).and_then(|c| c.as_mut())
                    {
                        cursor.sort();
                    }
                }

                Opcode::SeekRowid => {
                    let target = match self.reg(op.p3) {
                        Value::Integer(n) => (*n).max(0) as usize,
                        _ => return Err(Error::new(ErrorCode::Internal)),
                    };
                    let Some(VdbeCursor::Ephemeral(cursor)) = self.cursors.get_mut(op.p1 as usize).and_then(|c| c.as_mut())
                    else {
                        return Err(Error::new(ErrorCode::Internal));
                    };
                    if !cursor.seek_absolute(target) {
                        self.pc = op.p2 as usize;
                    }
                }
                Opcode::SeekRelative => {
                    let delta = match self.reg(op.p3) {
                        Value::Integer(n) => *n as i32,
                        _ => return Err(Error::new(ErrorCode::Internal)),
                    };
                    let Some(VdbeCursor::Ephemeral(cursor)) = self.cursors.get_mut(op.p1 as usize).and_then(|c| c.as_mut())
                    else {
                        return Err(Error::new(ErrorCode::Internal));
                    };
                    if !cursor.seek_relative(delta) && op.p5 != 0 {
                        self.pc = op.p2 as usize;
                    }
                }

                Opcode::ResultRow => {
                    let row = self.regs(op.p1, op.p2);
                    return Ok(StepOutcome::Row(row));
                }
                Opcode::SchemaInvalidate => {}
            }
        }
    }
}

fn int_to_code(v: i32) -> ErrorCode {
    match v {
        0 => ErrorCode::Ok,
        4 => ErrorCode::Abort,
        5 => ErrorCode::Busy,
        8 => ErrorCode::Readonly,
        9 => ErrorCode::Interrupt,
        12 => ErrorCode::NotFound,
        19 => ErrorCode::Constraint,
        21 => ErrorCode::Misuse,
        25 => ErrorCode::Range,
        _ => ErrorCode::Error,
    }
}

fn numeric_binop(a: &Value, b: &Value, int_op: fn(i64, i64) -> Option<i64>, float_op: fn(f64, f64) -> f64) -> Value {
    if a.is_null() || b.is_null() {
        return Value::Null;
    }
    if let (Value::Integer(x), Value::Integer(y)) = (a, b) {
        if let Some(r) = int_op(*x, *y) {
            return Value::Integer(r);
        }
    }
    Value::Real(float_op(a.to_f64(), b.to_f64()))
}

fn divide(a: &Value, b: &Value) -> Value {
    if a.is_null() || b.is_null() || b.to_f64() == 0.0 {
        return Value::Null;
    }
    if let (Value::Integer(x), Value::Integer(y)) = (a, b) {
        if *y != 0 && x % y == 0 {
            return Value::Integer(x / y);
        }
    }
    Value::Real(a.to_f64() / b.to_f64())
}

fn remainder(a: &Value, b: &Value) -> Value {
    if a.is_null() || b.is_null() {
        return Value::Null;
    }
    if let (Value::Integer(x), Value::Integer(y)) = (a, b) {
        if *y != 0 {
            return Value::Integer(x % y);
        }
    }
    Value::Null
}

fn three_valued_and(a: &Value, b: &Value) -> Value {
    if !a.is_null() && !a.is_truthy() || !b.is_null() && !b.is_truthy() {
        return Value::Integer(0);
    }
    if a.is_null() || b.is_null() {
        return Value::Null;
    }
    Value::Integer(1)
}

fn three_valued_or(a: &Value, b: &Value) -> Value {
    if !a.is_null() && a.is_truthy() || !b.is_null() && b.is_truthy() {
        return Value::Integer(1);
    }
    if a.is_null() || b.is_null() {
        return Value::Null;
    }
    Value::Integer(0)
}
