//! Window-function compilation (C6, spec §4.6.4): a two-pass pipeline.
//!
//! Pass A runs the query's FROM/WHERE as an ordinary nested loop (reusing
//! `planner::plan_from`/`select::emit_nested_loop`) and stages every
//! candidate row's partition columns, order columns, plain result-column
//! values, and window-call argument values into a single ephemeral "window
//! sorter" cursor, then sorts it by `PARTITION BY, ORDER BY`. Pass B walks
//! that cursor once, computing each window function's result per row by
//! seeking within the sorter (`SeekRowid`/`SeekRelative`) to read frame
//! bounds and neighboring rows, restoring position afterward. No opcode
//! beyond the VM's existing repertoire is introduced for this — compiler-
//! emitted save/seek/restore loops are the whole mechanism.
//!
//! Grounded on `select.rs`'s own nested-loop/aggregate machinery: the
//! aggregate functions usable in a window (`SUM`/`AVG`/`COUNT`/`MIN`/`MAX`/
//! `TOTAL`/`GROUP_CONCAT`) are stepped and finalized through the very same
//! `AggStep`/`AggContext`/`AggFinal`/`AggReset`/`AggIterate` opcodes
//! `build_agg_plan`/`emit_agg_epilogue` use for `GROUP BY`, just reset and
//! re-seeded once per row against whatever rows fall in that row's frame.
//!
//! Several corners of the window-function surface are deliberately out of
//! scope, recorded in `DESIGN.md`: `GROUPS` frames, `EXCLUDE`, `DISTINCT`/
//! `FILTER` on a windowed call, combining window calls with `GROUP BY` or a
//! plain aggregate in the same `SelectCore`, `RANGE` frames other than the
//! SQL-standard default (`UNBOUNDED PRECEDING .. CURRENT ROW`), window
//! definitions chained off a base window, and `NTILE` (its bucket split
//! needs floor integer division, which the VM has no opcode for).

use std::sync::Arc;

use crate::error::{Error, ErrorCode, Result};
use crate::parser::ast::{
    Expr, FromClause, FunctionArgs, FunctionCall, Over, ResultColumn, SelectCore, SortOrder, WindowFrame, WindowFrameBound, WindowFrameExclude,
    WindowFrameMode, WindowSpec,
};
use crate::schema::Catalog;
use crate::value::Collation;
use crate::vdbe::opcode::{KeyInfo, Opcode, P4, VdbeOp};
use crate::vdbe::program::{Label, ProgramBuilder};

use super::expr::{compile_expr, ExprCtx, Scope};
use super::planner::{self, Plan};
use super::select::{emit_sink, Sink};

/// Does `core` reference a window function anywhere in its result list or
/// `HAVING`? Checked before `GROUP BY`/aggregate dispatch in `select.rs`.
pub fn has_window_call(core: &SelectCore) -> bool {
    core.columns.iter().any(|c| matches!(c, ResultColumn::Expr { expr, .. } if any_window_call(expr)))
        || core.having.as_deref().is_some_and(any_window_call)
}

fn top_level_window_call(expr: &Expr) -> Option<&FunctionCall> {
    match expr {
        Expr::Function(fc) if fc.over.is_some() => Some(fc),
        _ => None,
    }
}

fn any_window_call(expr: &Expr) -> bool {
    if top_level_window_call(expr).is_some() {
        return true;
    }
    match expr {
        Expr::Function(fc) => match &fc.args {
            FunctionArgs::Exprs(args) => args.iter().any(any_window_call),
            FunctionArgs::Star => false,
        },
        Expr::Unary { expr, .. } | Expr::Cast { expr, .. } | Expr::Collate { expr, .. } | Expr::Parens(expr) | Expr::IsNull { expr, .. } => {
            any_window_call(expr)
        }
        Expr::Binary { left, right, .. } | Expr::IsDistinct { left, right, .. } => any_window_call(left) || any_window_call(right),
        Expr::Between { expr, low, high, .. } => any_window_call(expr) || any_window_call(low) || any_window_call(high),
        Expr::Case { operand, when_clauses, else_clause } => {
            operand.as_deref().is_some_and(any_window_call)
                || when_clauses.iter().any(|w| any_window_call(&w.when) || any_window_call(&w.then))
                || else_clause.as_deref().is_some_and(any_window_call)
        }
        _ => false,
    }
}

/// One recognized window function, classifying how pass B computes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowFn {
    RowNumber,
    Rank,
    DenseRank,
    PercentRank,
    CumeDist,
    Lag,
    Lead,
    FirstValue,
    LastValue,
    NthValue,
    Aggregate,
}

fn classify(name: &str) -> Option<WindowFn> {
    Some(match name.to_ascii_uppercase().as_str() {
        "ROW_NUMBER" => WindowFn::RowNumber,
        "RANK" => WindowFn::Rank,
        "DENSE_RANK" => WindowFn::DenseRank,
        "PERCENT_RANK" => WindowFn::PercentRank,
        "CUME_DIST" => WindowFn::CumeDist,
        "LAG" => WindowFn::Lag,
        "LEAD" => WindowFn::Lead,
        "FIRST_VALUE" => WindowFn::FirstValue,
        "LAST_VALUE" => WindowFn::LastValue,
        "NTH_VALUE" => WindowFn::NthValue,
        "SUM" | "AVG" | "COUNT" | "MIN" | "MAX" | "TOTAL" | "GROUP_CONCAT" => WindowFn::Aggregate,
        _ => return None,
    })
}

fn needs_frame(kind: WindowFn) -> bool {
    matches!(kind, WindowFn::Aggregate | WindowFn::FirstValue | WindowFn::LastValue | WindowFn::NthValue)
}

fn resolve_window_spec<'e>(core: &'e SelectCore, over: &'e Over) -> Result<&'e WindowSpec> {
    match over {
        Over::Spec(spec) => Ok(spec),
        Over::Window(name) => {
            let defs = core.window.as_deref().unwrap_or(&[]);
            let def = defs
                .iter()
                .find(|d| d.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such window: {}", name)))?;
            if def.spec.base.is_some() {
                return Err(Error::with_message(ErrorCode::Error, "a window definition referencing a base window is not supported"));
            }
            Ok(&def.spec)
        }
    }
}

fn collect_window_calls<'e>(core: &'e SelectCore) -> Result<Vec<&'e FunctionCall>> {
    let mut calls = Vec::new();
    for c in &core.columns {
        if let ResultColumn::Expr { expr, .. } = c {
            if let Some(fc) = top_level_window_call(expr) {
                calls.push(fc);
            } else if any_window_call(expr) {
                return Err(Error::with_message(
                    ErrorCode::Error,
                    "a window function call must be a bare result column, not nested inside a larger expression",
                ));
            }
        }
    }
    if core.having.as_deref().is_some_and(any_window_call) {
        return Err(Error::with_message(ErrorCode::Error, "window functions are not allowed in HAVING"));
    }
    Ok(calls)
}

/// Absolute sorter position a frame edge resolves to for the current row.
#[derive(Debug, Clone, Copy)]
enum FrameEdge {
    UnboundedPreceding,
    UnboundedFollowing,
    CurrentRow,
    Preceding(i32),
    Following(i32),
}

#[derive(Debug, Clone, Copy)]
enum FrameMode {
    RowsWhole,
    RowsBounded { start: FrameEdge, end: FrameEdge },
    RangeDefault,
}

fn to_edge(b: &mut ProgramBuilder, ctx: &ExprCtx, bound: &WindowFrameBound) -> Result<FrameEdge> {
    Ok(match bound {
        WindowFrameBound::UnboundedPreceding => FrameEdge::UnboundedPreceding,
        WindowFrameBound::UnboundedFollowing => FrameEdge::UnboundedFollowing,
        WindowFrameBound::CurrentRow => FrameEdge::CurrentRow,
        WindowFrameBound::Preceding(e) => FrameEdge::Preceding(compile_expr(b, ctx, e)?),
        WindowFrameBound::Following(e) => FrameEdge::Following(compile_expr(b, ctx, e)?),
    })
}

fn resolve_frame(b: &mut ProgramBuilder, catalog: &Catalog, order_by_present: bool, frame: Option<&WindowFrame>) -> Result<FrameMode> {
    let Some(f) = frame else {
        return Ok(if order_by_present { FrameMode::RangeDefault } else { FrameMode::RowsWhole });
    };
    if f.exclude != WindowFrameExclude::NoOthers {
        return Err(Error::with_message(ErrorCode::Error, "window frame EXCLUDE is not supported"));
    }
    match f.mode {
        WindowFrameMode::Groups => Err(Error::with_message(ErrorCode::Error, "GROUPS window frames are not supported")),
        WindowFrameMode::Range => {
            let end_ok = matches!(f.end, None | Some(WindowFrameBound::CurrentRow));
            if matches!(f.start, WindowFrameBound::UnboundedPreceding) && end_ok {
                Ok(FrameMode::RangeDefault)
            } else {
                Err(Error::with_message(
                    ErrorCode::Error,
                    "only the default RANGE UNBOUNDED PRECEDING .. CURRENT ROW frame is supported",
                ))
            }
        }
        WindowFrameMode::Rows => {
            let ctx = ExprCtx { catalog, scope: &Scope::default(), agg: None };
            let start = to_edge(b, &ctx, &f.start)?;
            let end = match &f.end {
                Some(e) => to_edge(b, &ctx, e)?,
                None => FrameEdge::CurrentRow,
            };
            Ok(FrameMode::RowsBounded { start, end })
        }
    }
}

struct CallLayout {
    kind: WindowFn,
    argc: usize,
    arg_base: usize,
}

/// Compile a `SelectCore` containing at least one window-function call.
/// Dispatched from `select.rs::emit_core`, mutually exclusive with the
/// `GROUP BY`/plain-aggregate path.
pub fn compile_window_select(b: &mut ProgramBuilder, catalog: &Catalog, core: &SelectCore, sink: &Sink) -> Result<()> {
    if core.group_by.is_some() {
        return Err(Error::with_message(ErrorCode::Error, "window functions cannot be combined with GROUP BY"));
    }
    let calls = collect_window_calls(core)?;
    if calls.is_empty() {
        return Err(Error::new(ErrorCode::Internal));
    }
    for fc in &calls {
        if fc.distinct {
            return Err(Error::with_message(ErrorCode::Error, "DISTINCT is not supported in a window function call"));
        }
        if fc.filter.is_some() {
            return Err(Error::with_message(ErrorCode::Error, "FILTER is not supported on a window function call"));
        }
        if classify(&fc.name).is_none() {
            return Err(Error::with_message(ErrorCode::Error, format!("{} is not a recognized window function", fc.name)));
        }
    }

    let specs = calls.iter().map(|fc| resolve_window_spec(core, fc.over.as_ref().unwrap())).collect::<Result<Vec<_>>>()?;
    for s in &specs[1..] {
        if s.partition_by != specs[0].partition_by || s.order_by != specs[0].order_by {
            return Err(Error::with_message(
                ErrorCode::Error,
                "all window functions in one query must share the same PARTITION BY/ORDER BY",
            ));
        }
    }
    let partition_by = specs[0].partition_by.clone().unwrap_or_default();
    let order_by = specs[0].order_by.clone().unwrap_or_default();
    for term in &order_by {
        if matches!(term.nulls, crate::parser::ast::NullsOrder::First | crate::parser::ast::NullsOrder::Last) {
            return Err(Error::with_message(ErrorCode::Error, "explicit NULLS FIRST/LAST in a window ORDER BY is not supported"));
        }
    }

    // --- source plan: an ordinary FROM/WHERE nested loop ---
    let empty_from = FromClause { tables: vec![] };
    let from = core.from.as_ref().unwrap_or(&empty_from);
    let plan = if from.tables.is_empty() {
        Plan { tables: vec![], scope: Scope::default() }
    } else {
        planner::plan_from(catalog, from, core.where_clause.as_deref(), None, b)?
    };
    let src_ctx = ExprCtx { catalog, scope: &plan.scope, agg: None };

    // --- resolve each call's frame before the row loop (bound exprs are
    // constant, compiled once) ---
    let frames: Vec<Option<FrameMode>> = calls
        .iter()
        .zip(&specs)
        .map(|(fc, spec)| {
            let kind = classify(&fc.name).unwrap();
            if needs_frame(kind) {
                resolve_frame(b, catalog, !order_by.is_empty(), spec.frame.as_ref()).map(Some)
            } else {
                Ok(None)
            }
        })
        .collect::<Result<_>>()?;

    // --- window sorter row layout: [partition cols][order cols][result
    // slots, one per ResultColumn][window-call argument values] ---
    let p = partition_by.len();
    let o = order_by.len();
    let s = core.columns.len();
    let mut layouts = Vec::with_capacity(calls.len());
    let mut next = p + o + s;
    for fc in &calls {
        let kind = classify(&fc.name).unwrap();
        let argc = match &fc.args {
            FunctionArgs::Star => 0,
            FunctionArgs::Exprs(es) => es.len(),
        };
        layouts.push(CallLayout { kind, argc, arg_base: next });
        next += argc;
    }
    let total_cols = next;

    let mut collations = vec![Collation::Binary; p + o];
    let _ = &mut collations;
    let mut descending = vec![false; p];
    for term in &order_by {
        descending.push(matches!(term.order, SortOrder::Desc));
    }
    let key_info = Arc::new(KeyInfo { collations, descending, partition_cols: p });

    let sorter = b.alloc_cursor();
    b.emit(VdbeOp::new(Opcode::OpenEphemeral, sorter, total_cols as i32, 0).with_p4(P4::KeyInfo(key_info)));

    // --- pass A: stage one row per match ---
    {
        let mut row_body = |b: &mut ProgramBuilder| -> Result<()> {
            let skip_row = b.new_label();
            let passes_where = match &core.where_clause {
                Some(w) => Some(compile_expr(b, &src_ctx, w)?),
                None => None,
            };
            if let Some(cond) = passes_where {
                b.emit_jump(Opcode::IfNot, cond, skip_row, 0);
            }

            let row_base = b.alloc_registers(total_cols as i32);
            for (i, e) in partition_by.iter().enumerate() {
                let r = compile_expr(b, &src_ctx, e)?;
                b.emit(VdbeOp::new(Opcode::Copy, r, row_base + i as i32, 0));
            }
            for (i, term) in order_by.iter().enumerate() {
                let r = compile_expr(b, &src_ctx, &term.expr)?;
                b.emit(VdbeOp::new(Opcode::Copy, r, row_base + (p + i) as i32, 0));
            }
            for (i, c) in core.columns.iter().enumerate() {
                let dst = row_base + (p + o + i) as i32;
                match c {
                    ResultColumn::Expr { expr, .. } if top_level_window_call(expr).is_some() => {
                        b.emit(VdbeOp::new(Opcode::Null, 0, dst, 0));
                    }
                    ResultColumn::Expr { expr, .. } => {
                        let r = compile_expr(b, &src_ctx, expr)?;
                        b.emit(VdbeOp::new(Opcode::Copy, r, dst, 0));
                    }
                    ResultColumn::Star | ResultColumn::TableStar(_) => {
                        return Err(Error::with_message(ErrorCode::Error, "* is not supported in a window query's result list"));
                    }
                }
            }
            for (fc, layout) in calls.iter().zip(&layouts) {
                if let FunctionArgs::Exprs(es) = &fc.args {
                    for (i, e) in es.iter().enumerate() {
                        let r = compile_expr(b, &src_ctx, e)?;
                        b.emit(VdbeOp::new(Opcode::Copy, r, row_base + (layout.arg_base + i) as i32, 0));
                    }
                }
            }

            let record = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::MakeRecord, row_base, total_cols as i32, record));
            b.emit(VdbeOp::new(Opcode::IdxInsert, sorter, row_base, total_cols as i32));

            if core.where_clause.is_some() {
                b.resolve_label(skip_row);
            }
            Ok(())
        };
        super::select::emit_nested_loop(b, catalog, &plan, &mut row_body)?;
    }
    b.emit(VdbeOp::new(Opcode::Sort, sorter, 0, 0));

    // --- pass B: walk the sorter, computing every window call per row ---
    let empty = b.new_label();
    b.emit_jump(Opcode::Rewind, sorter, empty, 0);

    let one = b.alloc_register();
    b.emit(VdbeOp::new(Opcode::Integer, 1, one, 0));
    let zero = b.alloc_register();
    b.emit(VdbeOp::new(Opcode::Integer, 0, zero, 0));

    let prev_partition_key = b.alloc_register();
    b.emit(VdbeOp::new(Opcode::Null, 0, prev_partition_key, 0));
    let prev_order_key = b.alloc_register();
    b.emit(VdbeOp::new(Opcode::Null, 0, prev_order_key, 0));
    let partition_start = b.alloc_register();
    let partition_end = b.alloc_register();
    let partition_size = b.alloc_register();
    let row_num = b.alloc_register();
    let rank_reg = b.alloc_register();
    let dense_rank_reg = b.alloc_register();
    let peer_end = b.alloc_register();
    // A single, literal aggregate-context slot reused serially across every
    // frame-aggregate call site and every row (one context index, not a
    // register: `AggReset`/`AggContext`/`AggFinal` all take it in `p1`
    // directly, same as `build_agg_plan`'s per-call-site context indices).
    let agg_ctx: i32 = 0;
    b.emit(VdbeOp::new(Opcode::AggReset, agg_ctx, 0, 0));

    let top = b.new_label();
    b.resolve_label(top);
    let cur_pos = b.alloc_register();
    b.emit(VdbeOp::new(Opcode::Rowid, sorter, cur_pos, 0));

    // -- partition change: recompute partition_start/end/size, force a peer
    // recompute too --
    let part_vals = if p > 0 { b.alloc_registers(p as i32) } else { 0 };
    for i in 0..p {
        b.emit(VdbeOp::new(Opcode::Column, sorter, i as i32, part_vals + i as i32));
    }
    let part_key = b.alloc_register();
    b.emit(VdbeOp::new(Opcode::MakeRecord, part_vals, p as i32, part_key));
    let same_partition = b.new_label();
    b.emit_jump(Opcode::Eq, part_key, same_partition, prev_partition_key);
    b.emit(VdbeOp::new(Opcode::Copy, part_key, prev_partition_key, 0));
    b.emit(VdbeOp::new(Opcode::Null, 0, prev_order_key, 0));
    b.emit(VdbeOp::new(Opcode::Integer, 0, row_num, 0));
    b.emit(VdbeOp::new(Opcode::Integer, 0, rank_reg, 0));
    b.emit(VdbeOp::new(Opcode::Integer, 0, dense_rank_reg, 0));
    b.emit(VdbeOp::new(Opcode::Copy, cur_pos, partition_start, 0));
    emit_find_partition_end(b, sorter, cur_pos, one, partition_end, partition_size);
    b.resolve_label(same_partition);

    // -- row number / rank / dense rank / peer group end --
    b.emit(VdbeOp::new(Opcode::Add, row_num, row_num, one));
    let order_vals = if o > 0 { b.alloc_registers(o as i32) } else { 0 };
    for i in 0..o {
        b.emit(VdbeOp::new(Opcode::Column, sorter, (p + i) as i32, order_vals + i as i32));
    }
    let order_key = b.alloc_register();
    b.emit(VdbeOp::new(Opcode::MakeRecord, order_vals, o as i32, order_key));
    let same_peer = b.new_label();
    b.emit_jump(Opcode::Eq, order_key, same_peer, prev_order_key);
    b.emit(VdbeOp::new(Opcode::Copy, row_num, rank_reg, 0));
    b.emit(VdbeOp::new(Opcode::Add, dense_rank_reg, dense_rank_reg, one));
    b.emit(VdbeOp::new(Opcode::Copy, order_key, prev_order_key, 0));
    emit_find_peer_end(b, sorter, p, o, cur_pos, order_key, one, peer_end);
    b.resolve_label(same_peer);

    // -- emit this row's result columns --
    let out_base = b.alloc_registers(s as i32);
    for (i, c) in core.columns.iter().enumerate() {
        let dst = out_base + i as i32;
        let ResultColumn::Expr { expr, .. } = c else { unreachable!("Star rejected above") };
        match top_level_window_call(expr) {
            None => {
                b.emit(VdbeOp::new(Opcode::Column, sorter, (p + o + i) as i32, dst));
            }
            Some(fc) => {
                let idx = calls.iter().position(|c| std::ptr::eq(*c, fc)).expect("window call indexed during staging");
                let layout = &layouts[idx];
                let frame = frames[idx];
                emit_call_result(
                    b,
                    sorter,
                    layout,
                    frame,
                    cur_pos,
                    partition_start,
                    partition_end,
                    partition_size,
                    row_num,
                    rank_reg,
                    dense_rank_reg,
                    peer_end,
                    one,
                    zero,
                    agg_ctx,
                    &fc.name,
                    dst,
                )?;
            }
        }
    }
    emit_sink(b, sink, out_base, s);

    b.emit_jump(Opcode::Next, sorter, top, 0);
    b.resolve_label(empty);
    Ok(())
}

/// Scan forward from `cur_pos` to the last row in the same partition,
/// leaving `end_reg`/`size_reg` set and restoring the cursor to `cur_pos`.
fn emit_find_partition_end(b: &mut ProgramBuilder, sorter: i32, cur_pos: i32, one: i32, end_reg: i32, size_reg: i32) {
    b.emit(VdbeOp::new(Opcode::Copy, cur_pos, end_reg, 0));
    b.emit(VdbeOp::new(Opcode::Integer, 1, size_reg, 0));
    let scan_top = b.new_label();
    let done = b.new_label();
    b.resolve_label(scan_top);
    let addr = b.emit(VdbeOp::new(Opcode::SeekRelative, sorter, -1, one).with_p5(1));
    b.patch_jump(addr, done);
    b.emit(VdbeOp::new(Opcode::Rowid, sorter, end_reg, 0));
    b.emit(VdbeOp::new(Opcode::Add, size_reg, size_reg, one));
    b.emit_jump(Opcode::Goto, 0, scan_top, 0);
    b.resolve_label(done);
    let restored = b.new_label();
    b.emit_jump(Opcode::SeekRowid, sorter, restored, cur_pos);
    b.resolve_label(restored);
}

/// Scan forward from `cur_pos` while the order-by columns keep matching
/// `order_key_reg`, leaving `end_reg` at the last peer row and restoring the
/// cursor to `cur_pos`.
fn emit_find_peer_end(b: &mut ProgramBuilder, sorter: i32, p: usize, o: usize, cur_pos: i32, order_key_reg: i32, one: i32, end_reg: i32) {
    b.emit(VdbeOp::new(Opcode::Copy, cur_pos, end_reg, 0));
    let scan_top = b.new_label();
    let converge = b.new_label();
    b.resolve_label(scan_top);
    let addr = b.emit(VdbeOp::new(Opcode::SeekRelative, sorter, -1, one).with_p5(1));
    b.patch_jump(addr, converge);
    let ov = if o > 0 { b.alloc_registers(o as i32) } else { 0 };
    for i in 0..o {
        b.emit(VdbeOp::new(Opcode::Column, sorter, (p + i) as i32, ov + i as i32));
    }
    let k = b.alloc_register();
    b.emit(VdbeOp::new(Opcode::MakeRecord, ov, o as i32, k));
    b.emit_jump(Opcode::Ne, k, converge, order_key_reg);
    b.emit(VdbeOp::new(Opcode::Rowid, sorter, end_reg, 0));
    b.emit_jump(Opcode::Goto, 0, scan_top, 0);
    b.resolve_label(converge);
    let restored = b.new_label();
    b.emit_jump(Opcode::SeekRowid, sorter, restored, end_reg);
    b.resolve_label(restored);
}

fn emit_edge_pos(b: &mut ProgramBuilder, edge: FrameEdge, partition_start: i32, partition_end: i32, cur_pos: i32) -> i32 {
    match edge {
        FrameEdge::UnboundedPreceding => partition_start,
        FrameEdge::UnboundedFollowing => partition_end,
        FrameEdge::CurrentRow => cur_pos,
        FrameEdge::Preceding(off) => {
            let r = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Subtract, cur_pos, r, off));
            emit_clamp(b, r, partition_start, partition_end)
        }
        FrameEdge::Following(off) => {
            let r = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Add, cur_pos, r, off));
            emit_clamp(b, r, partition_start, partition_end)
        }
    }
}

fn emit_clamp(b: &mut ProgramBuilder, val: i32, lo: i32, hi: i32) -> i32 {
    let t = b.alloc_register();
    let under_hi = b.new_label();
    let after_hi = b.new_label();
    b.emit_jump(Opcode::Le, val, under_hi, hi);
    b.emit(VdbeOp::new(Opcode::Copy, hi, t, 0));
    b.emit_jump(Opcode::Goto, 0, after_hi, 0);
    b.resolve_label(under_hi);
    b.emit(VdbeOp::new(Opcode::Copy, val, t, 0));
    b.resolve_label(after_hi);

    let out = b.alloc_register();
    let over_lo = b.new_label();
    let after_lo = b.new_label();
    b.emit_jump(Opcode::Ge, t, over_lo, lo);
    b.emit(VdbeOp::new(Opcode::Copy, lo, out, 0));
    b.emit_jump(Opcode::Goto, 0, after_lo, 0);
    b.resolve_label(over_lo);
    b.emit(VdbeOp::new(Opcode::Copy, t, out, 0));
    b.resolve_label(after_lo);
    out
}

fn frame_bounds(b: &mut ProgramBuilder, mode: FrameMode, partition_start: i32, partition_end: i32, cur_pos: i32, peer_end: i32) -> (i32, i32) {
    match mode {
        FrameMode::RowsWhole => (partition_start, partition_end),
        FrameMode::RangeDefault => (partition_start, peer_end),
        FrameMode::RowsBounded { start, end } => (
            emit_edge_pos(b, start, partition_start, partition_end, cur_pos),
            emit_edge_pos(b, end, partition_start, partition_end, cur_pos),
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn emit_call_result(
    b: &mut ProgramBuilder,
    sorter: i32,
    layout: &CallLayout,
    frame: Option<FrameMode>,
    cur_pos: i32,
    partition_start: i32,
    partition_end: i32,
    partition_size: i32,
    row_num: i32,
    rank_reg: i32,
    dense_rank_reg: i32,
    peer_end: i32,
    one: i32,
    zero: i32,
    agg_ctx: i32,
    fn_name: &str,
    dest: i32,
) -> Result<()> {
    match layout.kind {
        WindowFn::RowNumber => {
            b.emit(VdbeOp::new(Opcode::Copy, row_num, dest, 0));
        }
        WindowFn::Rank => {
            b.emit(VdbeOp::new(Opcode::Copy, rank_reg, dest, 0));
        }
        WindowFn::DenseRank => {
            b.emit(VdbeOp::new(Opcode::Copy, dense_rank_reg, dest, 0));
        }
        WindowFn::PercentRank => {
            // (rank - 1) / (partition_size - 1), 0 if the partition has one row.
            let single = b.new_label();
            let done = b.new_label();
            b.emit_jump(Opcode::Le, partition_size, single, one);
            let num = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Subtract, rank_reg, num, one));
            let den = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Subtract, partition_size, den, one));
            b.emit(VdbeOp::new(Opcode::Divide, num, dest, den));
            b.emit_jump(Opcode::Goto, 0, done, 0);
            b.resolve_label(single);
            b.emit(VdbeOp::new(Opcode::Real, 0, dest, 0).with_p4(P4::Real(0.0)));
            b.resolve_label(done);
        }
        WindowFn::CumeDist => {
            // (peer_end - partition_start + 1) / partition_size.
            let rel = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Subtract, peer_end, rel, partition_start));
            let count = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Add, rel, count, one));
            b.emit(VdbeOp::new(Opcode::Divide, count, dest, partition_size));
        }
        WindowFn::Lag => emit_lag_lead(b, sorter, cur_pos, layout.arg_base, layout.argc, -1, dest),
        WindowFn::Lead => emit_lag_lead(b, sorter, cur_pos, layout.arg_base, layout.argc, 1, dest),
        WindowFn::FirstValue | WindowFn::LastValue | WindowFn::NthValue => {
            let mode = frame.ok_or_else(|| Error::new(ErrorCode::Internal))?;
            let (start, end) = frame_bounds(b, mode, partition_start, partition_end, cur_pos, peer_end);
            let target = match layout.kind {
                WindowFn::FirstValue => start,
                WindowFn::LastValue => end,
                WindowFn::NthValue => {
                    if layout.argc < 2 {
                        return Err(Error::with_message(ErrorCode::Error, "NTH_VALUE requires a column and an N argument"));
                    }
                    let n = b.alloc_register();
                    b.emit(VdbeOp::new(Opcode::Column, sorter, (layout.arg_base + 1) as i32, n));
                    let n_minus_1 = b.alloc_register();
                    b.emit(VdbeOp::new(Opcode::Subtract, n, n_minus_1, one));
                    let t = b.alloc_register();
                    b.emit(VdbeOp::new(Opcode::Add, start, t, n_minus_1));
                    t
                }
                _ => unreachable!(),
            };
            emit_direct_value(b, sorter, start, end, target, layout.arg_base as i32, cur_pos, dest);
        }
        WindowFn::Aggregate => {
            let mode = frame.ok_or_else(|| Error::new(ErrorCode::Internal))?;
            let (start, end) = frame_bounds(b, mode, partition_start, partition_end, cur_pos, peer_end);
            emit_frame_aggregate(b, sorter, agg_ctx, zero, one, start, end, cur_pos, layout.arg_base, layout.argc, fn_name, dest);
        }
    }
    Ok(())
}

/// `LAG`/`LEAD`: seek `sign * offset` rows relative to the current row
/// (offset defaults to 1, read from the staged second argument if present),
/// falling back to the staged default-value argument (or NULL) if that
/// falls outside the partition.
fn emit_lag_lead(b: &mut ProgramBuilder, sorter: i32, cur_pos: i32, arg_base: usize, argc: usize, sign: i32, dest: i32) {
    let offset = b.alloc_register();
    if argc >= 2 {
        b.emit(VdbeOp::new(Opcode::Column, sorter, (arg_base + 1) as i32, offset));
    } else {
        b.emit(VdbeOp::new(Opcode::Integer, 1, offset, 0));
    }
    let signed = b.alloc_register();
    if sign < 0 {
        let zero = b.alloc_register();
        b.emit(VdbeOp::new(Opcode::Integer, 0, zero, 0));
        b.emit(VdbeOp::new(Opcode::Subtract, zero, signed, offset));
    } else {
        b.emit(VdbeOp::new(Opcode::Copy, offset, signed, 0));
    }

    let fallback = b.new_label();
    let done = b.new_label();
    let addr = b.emit(VdbeOp::new(Opcode::SeekRelative, sorter, -1, signed).with_p5(1));
    b.patch_jump(addr, fallback);
    b.emit(VdbeOp::new(Opcode::Column, sorter, arg_base as i32, dest));
    let restored = b.new_label();
    b.emit_jump(Opcode::SeekRowid, sorter, restored, cur_pos);
    b.resolve_label(restored);
    b.emit_jump(Opcode::Goto, 0, done, 0);
    b.resolve_label(fallback);
    if argc >= 3 {
        b.emit(VdbeOp::new(Opcode::Column, sorter, (arg_base + 2) as i32, dest));
    } else {
        b.emit(VdbeOp::new(Opcode::Null, 0, dest, 0));
    }
    b.resolve_label(done);
}

/// `FIRST_VALUE`/`LAST_VALUE`/`NTH_VALUE`: read column `arg_base` (the
/// value expression, always argument 0) at absolute position `target`,
/// NULL if the frame is empty or `target` falls outside it.
fn emit_direct_value(b: &mut ProgramBuilder, sorter: i32, start: i32, end: i32, target: i32, arg_base: i32, cur_pos: i32, dest: i32) {
    b.emit(VdbeOp::new(Opcode::Null, 0, dest, 0));
    let done = b.new_label();
    b.emit_jump(Opcode::Gt, start, done, end);
    b.emit_jump(Opcode::Gt, target, done, end);
    let seek_fail = b.new_label();
    b.emit_jump(Opcode::SeekRowid, sorter, seek_fail, target);
    b.emit(VdbeOp::new(Opcode::Column, sorter, arg_base, dest));
    let restored = b.new_label();
    b.emit_jump(Opcode::SeekRowid, sorter, restored, cur_pos);
    b.resolve_label(restored);
    b.resolve_label(seek_fail);
    b.resolve_label(done);
}

/// `SUM`/`AVG`/`COUNT`/`MIN`/`MAX`/`TOTAL`/`GROUP_CONCAT` over `[start,
/// end]`: reset a dummy single-group aggregate context, step it over every
/// row in the frame, finalize. `agg_ctx` is reused serially across every
/// call site and every row — each use is fully reset before stepping.
#[allow(clippy::too_many_arguments)]
fn emit_frame_aggregate(
    b: &mut ProgramBuilder,
    sorter: i32,
    agg_ctx: i32,
    zero: i32,
    one: i32,
    start: i32,
    end: i32,
    cur_pos: i32,
    arg_base: usize,
    argc: usize,
    fn_name: &str,
    dest: i32,
) {
    b.emit(VdbeOp::new(Opcode::AggReset, agg_ctx, 0, 0));
    b.emit(VdbeOp::new(Opcode::AggContext, agg_ctx, zero, 1));

    let skip_scan = b.new_label();
    b.emit_jump(Opcode::Gt, start, skip_scan, end);
    b.emit_jump(Opcode::SeekRowid, sorter, skip_scan, start);

    let scan_pos = b.alloc_register();
    b.emit(VdbeOp::new(Opcode::Rowid, sorter, scan_pos, 0));
    let scan_top = b.new_label();
    let restore = b.new_label();
    b.resolve_label(scan_top);
    let argv = if argc > 0 { b.alloc_registers(argc as i32) } else { b.alloc_register() };
    for i in 0..argc {
        b.emit(VdbeOp::new(Opcode::Column, sorter, (arg_base + i) as i32, argv + i as i32));
    }
    b.emit(
        VdbeOp::new(Opcode::AggStep, argc as i32, argv, 0)
            .with_p4(P4::Function(fn_name.to_string(), argc as i32))
            .with_p5(agg_ctx as u16),
    );
    b.emit_jump(Opcode::Eq, scan_pos, restore, end);
    let addr = b.emit(VdbeOp::new(Opcode::SeekRelative, sorter, -1, one).with_p5(1));
    b.patch_jump(addr, restore);
    b.emit(VdbeOp::new(Opcode::Rowid, sorter, scan_pos, 0));
    b.emit_jump(Opcode::Goto, 0, scan_top, 0);
    b.resolve_label(restore);
    let restored = b.new_label();
    b.emit_jump(Opcode::SeekRowid, sorter, restored, cur_pos);
    b.resolve_label(restored);
    b.resolve_label(skip_scan);

    let found = b.new_label();
    b.emit_jump(Opcode::AggIterate, agg_ctx, found, 0);
    b.resolve_label(found);
    b.emit(VdbeOp::new(Opcode::AggFinal, agg_ctx, 0, dest).with_p5(0));
}
