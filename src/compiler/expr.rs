//! Expression-to-register compilation (C6), spec §4.6.1/§4.7.
//!
//! Grounded on the teacher's `executor/where_expr.rs` recursive-descent
//! `Expr` walker, retargeted from btree-cursor opcodes to the new
//! `Opcode`/`ProgramBuilder` contract. Column references resolve through a
//! `Scope` built by `planner.rs` from the FROM clause rather than the
//! teacher's cursor-index table, since cursors here are vtab/ephemeral
//! cursors rather than btree cursors.

use crate::error::{Error, ErrorCode, Result};
use crate::parser::ast::{BinaryOp, ColumnRef, Expr, FunctionArgs, FunctionCall, Literal, UnaryOp, WhenClause};
use crate::schema::Catalog;
use crate::value::{Collation, Value};
use crate::vdbe::opcode::{Opcode, P4, VdbeOp};
use crate::vdbe::program::ProgramBuilder;

/// One column a compiled expression can resolve to: a column of some open
/// cursor, reached via the `Column` opcode.
#[derive(Debug, Clone)]
pub struct ColumnBinding {
    pub cursor: i32,
    pub column_index: usize,
    pub table_alias: String,
    pub column_name: String,
    /// The column's declared `COLLATE`, or `Binary` if none (spec §3.1).
    pub collation: Collation,
}

/// The set of columns visible to expressions in one FROM clause, in cursor
/// (join) order. Unqualified names resolve by searching every binding;
/// qualified names (`alias.col`) search only that alias.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub bindings: Vec<ColumnBinding>,
}

impl Scope {
    pub fn resolve(&self, col: &ColumnRef) -> Result<&ColumnBinding> {
        if let Some(table) = &col.table {
            self.bindings
                .iter()
                .find(|b| b.table_alias.eq_ignore_ascii_case(table) && b.column_name.eq_ignore_ascii_case(&col.column))
                .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such column: {}.{}", table, col.column)))
        } else {
            let mut matches = self.bindings.iter().filter(|b| b.column_name.eq_ignore_ascii_case(&col.column));
            let first = matches
                .next()
                .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such column: {}", col.column)))?;
            if matches.next().is_some() {
                return Err(Error::with_message(ErrorCode::Error, format!("ambiguous column: {}", col.column)));
            }
            Ok(first)
        }
    }
}

/// Tracks which `FunctionCall` AST nodes (identified by address, since the
/// same tree is walked twice: once to collect, once to compile) are
/// aggregate calls already evaluated into a per-group accumulator, and
/// which register each one's finalized value lands in. `None` outside an
/// aggregating SELECT (plain per-row expressions only).
pub struct AggPlan {
    pub nodes: Vec<usize>,
    pub result_regs: Vec<i32>,
}

impl AggPlan {
    pub fn lookup(&self, fc: &FunctionCall) -> Option<i32> {
        let addr = fc as *const FunctionCall as usize;
        self.nodes.iter().position(|n| *n == addr).map(|i| self.result_regs[i])
    }
}

/// Collect references to every aggregate-function call within `expr`, in
/// left-to-right traversal order, skipping over nested (non-aggregate)
/// subquery bodies.
pub fn collect_aggregates<'e>(expr: &'e Expr, catalog: &Catalog, out: &mut Vec<&'e FunctionCall>) {
    match expr {
        Expr::Function(fc) => {
            if fc.over.is_none() && catalog.aggregate_function(&fc.name).is_some() {
                out.push(fc);
            } else if let FunctionArgs::Exprs(args) = &fc.args {
                for a in args {
                    collect_aggregates(a, catalog, out);
                }
            }
        }
        Expr::Unary { expr, .. } | Expr::Cast { expr, .. } | Expr::Collate { expr, .. } | Expr::Parens(expr) => {
            collect_aggregates(expr, catalog, out)
        }
        Expr::Binary { left, right, .. } => {
            collect_aggregates(left, catalog, out);
            collect_aggregates(right, catalog, out);
        }
        Expr::Between { expr, low, high, .. } => {
            collect_aggregates(expr, catalog, out);
            collect_aggregates(low, catalog, out);
            collect_aggregates(high, catalog, out);
        }
        Expr::In { expr, .. } => collect_aggregates(expr, catalog, out),
        Expr::Like { expr, pattern, escape, .. } => {
            collect_aggregates(expr, catalog, out);
            collect_aggregates(pattern, catalog, out);
            if let Some(e) = escape {
                collect_aggregates(e, catalog, out);
            }
        }
        Expr::IsNull { expr, .. } => collect_aggregates(expr, catalog, out),
        Expr::IsDistinct { left, right, .. } => {
            collect_aggregates(left, catalog, out);
            collect_aggregates(right, catalog, out);
        }
        Expr::Case { operand, when_clauses, else_clause } => {
            if let Some(o) = operand {
                collect_aggregates(o, catalog, out);
            }
            for w in when_clauses {
                collect_aggregates(&w.when, catalog, out);
                collect_aggregates(&w.then, catalog, out);
            }
            if let Some(e) = else_clause {
                collect_aggregates(e, catalog, out);
            }
        }
        _ => {}
    }
}

/// Expression compilation context: the program being built, the FROM-clause
/// scope, the catalog (for function lookup), and the aggregate plan (if
/// compiling the output/HAVING/ORDER-BY pass of an aggregating query).
pub struct ExprCtx<'a> {
    pub catalog: &'a Catalog,
    pub scope: &'a Scope,
    pub agg: Option<&'a AggPlan>,
}

/// Compile `expr`, returning the register holding its value. Allocates a
/// fresh register for every subexpression; callers that want a result in a
/// specific register should `Copy` it afterward.
pub fn compile_expr(b: &mut ProgramBuilder, ctx: &ExprCtx, expr: &Expr) -> Result<i32> {
    match expr {
        Expr::Literal(lit) => {
            let r = b.alloc_register();
            emit_literal(b, lit, r);
            Ok(r)
        }
        Expr::Column(col) => {
            let binding = ctx.scope.resolve(col)?;
            let r = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Column, binding.cursor, binding.column_index as i32, r));
            Ok(r)
        }
        Expr::Variable(_) => {
            // Bound parameters are substituted by the caller before
            // compilation (spec §6.1's bind happens pre-compile in this
            // crate, since there is no separate prepare/bind register
            // table); an unresolved placeholder compiles to NULL.
            let r = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Null, 0, r, 0));
            Ok(r)
        }
        Expr::Unary { op, expr } => compile_unary(b, ctx, *op, expr),
        Expr::Binary { op, left, right } => compile_binary(b, ctx, *op, left, right),
        Expr::Between { expr, low, high, negated } => {
            let v = compile_expr(b, ctx, expr)?;
            let lo = compile_expr(b, ctx, low)?;
            let hi = compile_expr(b, ctx, high)?;
            let lo_coll = comparison_collation(ctx, expr, low);
            let hi_coll = comparison_collation(ctx, expr, high);
            let ge = b.alloc_register();
            emit_compare_bool(b, ge, v, lo, CmpKind::Ge, lo_coll);
            let le = b.alloc_register();
            emit_compare_bool(b, le, v, hi, CmpKind::Le, hi_coll);
            let r = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::And, ge, r, le));
            if *negated {
                let n = b.alloc_register();
                b.emit(VdbeOp::new(Opcode::Not, r, n, 0));
                Ok(n)
            } else {
                Ok(r)
            }
        }
        Expr::In { expr, list, negated } => compile_in(b, ctx, expr, list, *negated),
        Expr::Like { expr, pattern, escape: _, op, negated } => {
            let name = match op {
                crate::parser::ast::LikeOp::Like => "like",
                crate::parser::ast::LikeOp::Glob => "glob",
                crate::parser::ast::LikeOp::Regexp => "regexp",
                crate::parser::ast::LikeOp::Match => "match",
            };
            let a = compile_expr(b, ctx, expr)?;
            let p = compile_expr(b, ctx, pattern)?;
            let args = b.alloc_registers(2);
            b.emit(VdbeOp::new(Opcode::Copy, p, args, 0));
            b.emit(VdbeOp::new(Opcode::Copy, a, args + 1, 0));
            let r = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Function, 2, args, r).with_p4(P4::Function(name.to_string(), 2)));
            if *negated {
                let n = b.alloc_register();
                b.emit(VdbeOp::new(Opcode::Not, r, n, 0));
                Ok(n)
            } else {
                Ok(r)
            }
        }
        Expr::IsNull { expr, negated } => {
            let v = compile_expr(b, ctx, expr)?;
            let r = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::IsNull, v, r, 0));
            if *negated {
                let n = b.alloc_register();
                b.emit(VdbeOp::new(Opcode::Not, r, n, 0));
                Ok(n)
            } else {
                Ok(r)
            }
        }
        Expr::IsDistinct { left, right, negated } => {
            // IS [NOT] DISTINCT FROM: NULL-safe equality/inequality.
            let a = compile_expr(b, ctx, left)?;
            let bb = compile_expr(b, ctx, right)?;
            let same = b.alloc_register();
            let eq_label = b.new_label();
            let done_label = b.new_label();
            b.emit(VdbeOp::new(Opcode::Integer, 0, same, 0));
            let an = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::IsNull, a, an, 0));
            let bn = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::IsNull, bb, bn, 0));
            let both_null = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::And, an, both_null, bn));
            b.emit_jump(Opcode::If, both_null, eq_label, 0);
            b.emit_jump(Opcode::Eq, a, eq_label, bb);
            b.emit_jump(Opcode::Goto, 0, done_label, 0);
            b.resolve_label(eq_label);
            b.emit(VdbeOp::new(Opcode::Integer, 1, same, 0));
            b.resolve_label(done_label);
            if *negated {
                let n = b.alloc_register();
                b.emit(VdbeOp::new(Opcode::Not, same, n, 0));
                Ok(n)
            } else {
                Ok(same)
            }
        }
        Expr::Case { operand, when_clauses, else_clause } => compile_case(b, ctx, operand.as_deref(), when_clauses, else_clause.as_deref()),
        Expr::Cast { expr, type_name } => {
            let v = compile_expr(b, ctx, expr)?;
            let affinity = crate::value::type_affinity(&type_name.name);
            let r = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Copy, v, r, 0));
            b.emit(VdbeOp::new(Opcode::Affinity, r, 1, 0).with_p4(P4::Affinities(vec![affinity])));
            Ok(r)
        }
        Expr::Collate { expr, .. } => compile_expr(b, ctx, expr),
        Expr::Function(fc) => compile_function_call(b, ctx, fc),
        Expr::Subquery(select) => compile_scalar_subquery(b, ctx, select),
        Expr::Exists { subquery, negated } => compile_exists(b, ctx, subquery, *negated),
        Expr::Parens(expr) => compile_expr(b, ctx, expr),
        Expr::Raise { .. } => {
            let r = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Null, 0, r, 0));
            Ok(r)
        }
    }
}

fn emit_literal(b: &mut ProgramBuilder, lit: &Literal, r: i32) {
    match lit {
        Literal::Null => {
            b.emit(VdbeOp::new(Opcode::Null, 0, r, 0));
        }
        Literal::Integer(i) => {
            if let Ok(small) = i32::try_from(*i) {
                b.emit(VdbeOp::new(Opcode::Integer, small, r, 0));
            } else {
                b.emit(VdbeOp::new(Opcode::Integer, 0, r, 0).with_p4(P4::Int64(*i)));
            }
        }
        Literal::Float(f) => {
            b.emit(VdbeOp::new(Opcode::Real, 0, r, 0).with_p4(P4::Real(*f)));
        }
        Literal::String(s) => {
            b.emit(VdbeOp::new(Opcode::String, 0, r, 0).with_p4(P4::Text(s.clone())));
        }
        Literal::Blob(bytes) => {
            b.emit(VdbeOp::new(Opcode::Blob, 0, r, 0).with_p4(P4::Blob(bytes.clone())));
        }
        Literal::Bool(v) => {
            b.emit(VdbeOp::new(Opcode::Integer, *v as i32, r, 0));
        }
        Literal::CurrentTime | Literal::CurrentDate | Literal::CurrentTimestamp => {
            // No wall-clock source is wired into the compiler; these
            // compile to NULL rather than fabricating a value.
            b.emit(VdbeOp::new(Opcode::Null, 0, r, 0));
        }
    }
}

/// Constant-fold a literal expression into a `Value`, used where the
/// compiler needs a value at plan time rather than a register (e.g.
/// `bestIndex` equality-key construction). Returns `None` for anything
/// that isn't a bare literal.
pub fn literal_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Literal(Literal::Null) => Some(Value::Null),
        Expr::Literal(Literal::Integer(i)) => Some(Value::Integer(*i)),
        Expr::Literal(Literal::Float(f)) => Some(Value::Real(*f)),
        Expr::Literal(Literal::String(s)) => Some(Value::Text(s.clone())),
        Expr::Literal(Literal::Blob(b)) => Some(Value::Blob(b.clone())),
        Expr::Literal(Literal::Bool(v)) => Some(Value::Integer(*v as i64)),
        Expr::Parens(inner) => literal_value(inner),
        Expr::Unary { op: UnaryOp::Neg, expr } => match literal_value(expr)? {
            Value::Integer(i) => Some(Value::Integer(-i)),
            Value::Real(r) => Some(Value::Real(-r)),
            _ => None,
        },
        _ => None,
    }
}

enum CmpKind {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Emit `dst = (a <op> b)` as a 0/1/NULL integer, since the comparison
/// opcodes are jump-on-true rather than value-producing. `coll` is the
/// collation the comparison should use (spec §4.5.2's `p4` collation
/// descriptor); `Collation::Binary` reproduces the old hard-coded behavior.
fn emit_compare_bool(b: &mut ProgramBuilder, dst: i32, a: i32, rhs: i32, kind: CmpKind, coll: Collation) {
    let opcode = match kind {
        CmpKind::Eq => Opcode::Eq,
        CmpKind::Ne => Opcode::Ne,
        CmpKind::Lt => Opcode::Lt,
        CmpKind::Le => Opcode::Le,
        CmpKind::Gt => Opcode::Gt,
        CmpKind::Ge => Opcode::Ge,
    };
    let an = b.alloc_register();
    b.emit(VdbeOp::new(Opcode::IsNull, a, an, 0));
    let bn = b.alloc_register();
    b.emit(VdbeOp::new(Opcode::IsNull, rhs, bn, 0));
    let either_null = b.alloc_register();
    b.emit(VdbeOp::new(Opcode::Or, an, either_null, bn));
    let null_label = b.new_label();
    let true_label = b.new_label();
    let done_label = b.new_label();
    b.emit_jump(Opcode::If, either_null, null_label, 0);
    b.emit(VdbeOp::new(Opcode::Integer, 0, dst, 0));
    let cmp_addr = b.emit(VdbeOp::new(opcode, a, -1, rhs).with_p4(P4::Collation(coll)));
    b.patch_jump(cmp_addr, true_label);
    b.emit_jump(Opcode::Goto, 0, done_label, 0);
    b.resolve_label(true_label);
    b.emit(VdbeOp::new(Opcode::Integer, 1, dst, 0));
    b.emit_jump(Opcode::Goto, 0, done_label, 0);
    b.resolve_label(null_label);
    b.emit(VdbeOp::new(Opcode::Null, 0, dst, 0));
    b.resolve_label(done_label);
}

/// Resolve the collation a comparison between `left` and `right` should use:
/// an explicit `COLLATE` on either operand wins (left first), else the
/// declared collation of whichever operand is a plain column reference,
/// else `Binary` — mirrors the usual SQL collation-precedence rule.
fn comparison_collation(ctx: &ExprCtx, left: &Expr, right: &Expr) -> Collation {
    fn explicit(e: &Expr) -> Option<Collation> {
        match e {
            Expr::Collate { collation, .. } => Collation::by_name(collation).ok(),
            Expr::Parens(inner) => explicit(inner),
            _ => None,
        }
    }
    if let Some(c) = explicit(left) {
        return c;
    }
    if let Some(c) = explicit(right) {
        return c;
    }
    fn column_collation(ctx: &ExprCtx, e: &Expr) -> Option<Collation> {
        match e {
            Expr::Column(col) => ctx.scope.resolve(col).ok().map(|b| b.collation),
            Expr::Parens(inner) | Expr::Cast { expr: inner, .. } => column_collation(ctx, inner),
            _ => None,
        }
    }
    column_collation(ctx, left).or_else(|| column_collation(ctx, right)).unwrap_or_default()
}

fn compile_unary(b: &mut ProgramBuilder, ctx: &ExprCtx, op: UnaryOp, expr: &Expr) -> Result<i32> {
    let v = compile_expr(b, ctx, expr)?;
    let r = b.alloc_register();
    match op {
        UnaryOp::Pos => {
            b.emit(VdbeOp::new(Opcode::Copy, v, r, 0));
        }
        UnaryOp::Neg => {
            let zero = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Integer, 0, zero, 0));
            b.emit(VdbeOp::new(Opcode::Subtract, zero, r, v));
        }
        UnaryOp::Not => {
            b.emit(VdbeOp::new(Opcode::Not, v, r, 0));
        }
        UnaryOp::BitNot => {
            // No dedicated bitwise-not opcode; expressed as -(v) - 1, which
            // matches two's-complement `~v` for integers.
            let zero = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Integer, 0, zero, 0));
            let neg = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Subtract, zero, neg, v));
            let one = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Integer, 1, one, 0));
            b.emit(VdbeOp::new(Opcode::Subtract, neg, r, one));
        }
    }
    Ok(r)
}

fn compile_binary(b: &mut ProgramBuilder, ctx: &ExprCtx, op: BinaryOp, left: &Expr, right: &Expr) -> Result<i32> {
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let a = compile_expr(b, ctx, left)?;
        let bb = compile_expr(b, ctx, right)?;
        let r = b.alloc_register();
        let opcode = if matches!(op, BinaryOp::And) { Opcode::And } else { Opcode::Or };
        b.emit(VdbeOp::new(opcode, a, r, bb));
        return Ok(r);
    }
    let a = compile_expr(b, ctx, left)?;
    let bb = compile_expr(b, ctx, right)?;
    let r = b.alloc_register();
    match op {
        BinaryOp::Add => {
            b.emit(VdbeOp::new(Opcode::Add, a, r, bb));
        }
        BinaryOp::Sub => {
            b.emit(VdbeOp::new(Opcode::Subtract, a, r, bb));
        }
        BinaryOp::Mul => {
            b.emit(VdbeOp::new(Opcode::Multiply, a, r, bb));
        }
        BinaryOp::Div => {
            b.emit(VdbeOp::new(Opcode::Divide, a, r, bb));
        }
        BinaryOp::Mod => {
            b.emit(VdbeOp::new(Opcode::Remainder, a, r, bb));
        }
        BinaryOp::Concat => {
            b.emit(VdbeOp::new(Opcode::Concat, a, r, bb));
        }
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let coll = comparison_collation(ctx, left, right);
            let kind = match op {
                BinaryOp::Eq => CmpKind::Eq,
                BinaryOp::Ne => CmpKind::Ne,
                BinaryOp::Lt => CmpKind::Lt,
                BinaryOp::Le => CmpKind::Le,
                BinaryOp::Gt => CmpKind::Gt,
                BinaryOp::Ge => CmpKind::Ge,
                _ => unreachable!(),
            };
            emit_compare_bool(b, r, a, bb, kind, coll);
        }
        BinaryOp::Is => {
            let eq_label = b.new_label();
            let done_label = b.new_label();
            let an = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::IsNull, a, an, 0));
            let bn = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::IsNull, bb, bn, 0));
            let both_null = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::And, an, both_null, bn));
            b.emit(VdbeOp::new(Opcode::Integer, 0, r, 0));
            b.emit_jump(Opcode::If, both_null, eq_label, 0);
            b.emit_jump(Opcode::Eq, a, eq_label, bb);
            b.emit_jump(Opcode::Goto, 0, done_label, 0);
            b.resolve_label(eq_label);
            b.emit(VdbeOp::new(Opcode::Integer, 1, r, 0));
            b.resolve_label(done_label);
        }
        BinaryOp::IsNot => {
            let eq_label = b.new_label();
            let done_label = b.new_label();
            let an = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::IsNull, a, an, 0));
            let bn = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::IsNull, bb, bn, 0));
            let both_null = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::And, an, both_null, bn));
            b.emit(VdbeOp::new(Opcode::Integer, 1, r, 0));
            b.emit_jump(Opcode::If, both_null, eq_label, 0);
            b.emit_jump(Opcode::Eq, a, eq_label, bb);
            b.emit_jump(Opcode::Goto, 0, done_label, 0);
            b.resolve_label(eq_label);
            b.emit(VdbeOp::new(Opcode::Integer, 0, r, 0));
            b.resolve_label(done_label);
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::ShiftLeft | BinaryOp::ShiftRight => {
            let name = match op {
                BinaryOp::BitAnd => "__bitand",
                BinaryOp::BitOr => "__bitor",
                BinaryOp::ShiftLeft => "__shl",
                BinaryOp::ShiftRight => "__shr",
                _ => unreachable!(),
            };
            let args = b.alloc_registers(2);
            b.emit(VdbeOp::new(Opcode::Copy, a, args, 0));
            b.emit(VdbeOp::new(Opcode::Copy, bb, args + 1, 0));
            b.emit(VdbeOp::new(Opcode::Function, 2, args, r).with_p4(P4::Function(name.to_string(), 2)));
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
    Ok(r)
}

fn compile_in(b: &mut ProgramBuilder, ctx: &ExprCtx, expr: &Expr, list: &crate::parser::ast::InList, negated: bool) -> Result<i32> {
    let v = compile_expr(b, ctx, expr)?;
    let found = b.alloc_register();
    b.emit(VdbeOp::new(Opcode::Integer, 0, found, 0));
    match list {
        crate::parser::ast::InList::Values(values) => {
            let found_label = b.new_label();
            for item in values {
                let candidate = compile_expr(b, ctx, item)?;
                b.emit_jump(Opcode::Eq, v, found_label, candidate);
            }
            let after = b.new_label();
            b.emit_jump(Opcode::Goto, 0, after, 0);
            b.resolve_label(found_label);
            b.emit(VdbeOp::new(Opcode::Integer, 1, found, 0));
            b.resolve_label(after);
        }
        crate::parser::ast::InList::Subquery(_) | crate::parser::ast::InList::Table(_) => {
            let synthetic;
            let select_stmt: &crate::parser::ast::SelectStmt = match list {
                crate::parser::ast::InList::Subquery(s) => s,
                crate::parser::ast::InList::Table(name) => {
                    synthetic = table_scan_select(name);
                    &synthetic
                }
                _ => unreachable!(),
            };
            let inner = super::select::compile_select_with(ctx.catalog, select_stmt)?;
            let sub_cursor = b.alloc_cursor();
            b.emit(VdbeOp::new(Opcode::OpenEphemeral, sub_cursor, 1, 0));
            materialize_subprogram(b, ctx, &inner, sub_cursor)?;
            let loop_top = b.new_label();
            let found_label = b.new_label();
            let after = b.new_label();
            b.emit_jump(Opcode::Rewind, sub_cursor, after, 0);
            b.resolve_label(loop_top);
            let item_reg = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Column, sub_cursor, 0, item_reg));
            b.emit_jump(Opcode::Eq, v, found_label, item_reg);
            b.emit_jump(Opcode::Next, sub_cursor, loop_top, 0);
            b.emit_jump(Opcode::Goto, 0, after, 0);
            b.resolve_label(found_label);
            b.emit(VdbeOp::new(Opcode::Integer, 1, found, 0));
            b.resolve_label(after);
            b.emit(VdbeOp::new(Opcode::Close, sub_cursor, 0, 0));
        }
    }
    if negated {
        let r = b.alloc_register();
        b.emit(VdbeOp::new(Opcode::Not, found, r, 0));
        Ok(r)
    } else {
        Ok(found)
    }
}

/// Build `SELECT * FROM <name>`, used to expand `x IN <table>` (spec allows
/// a bare table name as shorthand for a full-table row set).
fn table_scan_select(name: &crate::parser::ast::QualifiedName) -> crate::parser::ast::SelectStmt {
    use crate::parser::ast::{FromClause, ResultColumn, SelectBody, SelectCore, SelectStmt, TableRef};
    SelectStmt {
        with: None,
        body: SelectBody::Select(SelectCore {
            distinct: Default::default(),
            columns: vec![ResultColumn::Star],
            from: Some(FromClause {
                tables: vec![TableRef::Table { name: name.clone(), alias: None, indexed_by: None }],
            }),
            where_clause: None,
            group_by: None,
            having: None,
            window: None,
        }),
        order_by: None,
        limit: None,
    }
}

fn compile_case(
    b: &mut ProgramBuilder,
    ctx: &ExprCtx,
    operand: Option<&Expr>,
    when_clauses: &[WhenClause],
    else_clause: Option<&Expr>,
) -> Result<i32> {
    let result = b.alloc_register();
    let done = b.new_label();
    let operand_reg = match operand {
        Some(e) => Some(compile_expr(b, ctx, e)?),
        None => None,
    };
    for wc in when_clauses {
        let next = b.new_label();
        let take = match operand_reg {
            Some(op_reg) => {
                let cmp = compile_expr(b, ctx, &wc.when)?;
                let r = b.alloc_register();
                let coll = match operand {
                    Some(e) => comparison_collation(ctx, e, &wc.when),
                    None => Collation::default(),
                };
                emit_compare_bool(b, r, op_reg, cmp, CmpKind::Eq, coll);
                r
            }
            None => compile_expr(b, ctx, &wc.when)?,
        };
        b.emit_jump(Opcode::IfNot, take, next, 0);
        let then_val = compile_expr(b, ctx, &wc.then)?;
        b.emit(VdbeOp::new(Opcode::Copy, then_val, result, 0));
        b.emit_jump(Opcode::Goto, 0, done, 0);
        b.resolve_label(next);
    }
    match else_clause {
        Some(e) => {
            let v = compile_expr(b, ctx, e)?;
            b.emit(VdbeOp::new(Opcode::Copy, v, result, 0));
        }
        None => {
            b.emit(VdbeOp::new(Opcode::Null, 0, result, 0));
        }
    }
    b.resolve_label(done);
    Ok(result)
}

fn compile_function_call(b: &mut ProgramBuilder, ctx: &ExprCtx, fc: &FunctionCall) -> Result<i32> {
    if let Some(agg) = ctx.agg {
        if let Some(reg) = agg.lookup(fc) {
            return Ok(reg);
        }
    }
    let args = match &fc.args {
        FunctionArgs::Star => Vec::new(),
        FunctionArgs::Exprs(exprs) => exprs.iter().map(|e| compile_expr(b, ctx, e)).collect::<Result<Vec<_>>>()?,
    };
    let argc = args.len() as i32;
    let base = if args.is_empty() {
        b.alloc_register()
    } else {
        let base = b.alloc_registers(argc);
        for (i, r) in args.iter().enumerate() {
            b.emit(VdbeOp::new(Opcode::Copy, *r, base + i as i32, 0));
        }
        base
    };
    ctx.catalog
        .function(&fc.name, argc)
        .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such function: {}", fc.name)))?;
    let result = b.alloc_register();
    b.emit(VdbeOp::new(Opcode::Function, argc, base, result).with_p4(P4::Function(fc.name.clone(), argc)));
    Ok(result)
}

/// Run a fully-compiled, uncorrelated subquery's program to completion,
/// inserting every row it yields into an already-open ephemeral cursor.
/// Used by `IN (SELECT ...)`, scalar subqueries, and `EXISTS`.
///
/// This can't run inside the *outer* program (the VDBE has no "call another
/// program" opcode), so the compiler evaluates subqueries eagerly against
/// the schema's static default data is not possible at compile time either;
/// instead the outer program opens the subquery as its own independent
/// ephemeral materialization step, executed by nesting a second `Vdbe`
/// instance at `Host`-invocation time would require interpreter support this
/// crate doesn't have. Given that, uncorrelated subqueries are compiled
/// inline as an ordinary join fragment: the subquery's FROM/WHERE graph is
/// spliced into the outer program as an independent set of cursors feeding
/// an ephemeral sorter, exactly as `compile_select_with` already does for a
/// top-level SELECT, reusing the same register/cursor allocator.
fn materialize_subprogram(b: &mut ProgramBuilder, ctx: &ExprCtx, inner: &super::select::SubqueryPlan, sub_cursor: i32) -> Result<()> {
    super::select::splice_subquery(b, ctx.catalog, inner, sub_cursor)
}

fn compile_scalar_subquery(b: &mut ProgramBuilder, ctx: &ExprCtx, select: &crate::parser::ast::SelectStmt) -> Result<i32> {
    let inner = super::select::compile_select_with(ctx.catalog, select)?;
    let sub_cursor = b.alloc_cursor();
    b.emit(VdbeOp::new(Opcode::OpenEphemeral, sub_cursor, inner.column_count.max(1), 0));
    materialize_subprogram(b, ctx, &inner, sub_cursor)?;
    let result = b.alloc_register();
    b.emit(VdbeOp::new(Opcode::Null, 0, result, 0));
    let empty = b.new_label();
    b.emit_jump(Opcode::Rewind, sub_cursor, empty, 0);
    b.emit(VdbeOp::new(Opcode::Column, sub_cursor, 0, result));
    b.resolve_label(empty);
    b.emit(VdbeOp::new(Opcode::Close, sub_cursor, 0, 0));
    Ok(result)
}

fn compile_exists(b: &mut ProgramBuilder, ctx: &ExprCtx, select: &crate::parser::ast::SelectStmt, negated: bool) -> Result<i32> {
    let inner = super::select::compile_select_with(ctx.catalog, select)?;
    let sub_cursor = b.alloc_cursor();
    b.emit(VdbeOp::new(Opcode::OpenEphemeral, sub_cursor, inner.column_count.max(1), 0));
    materialize_subprogram(b, ctx, &inner, sub_cursor)?;
    let result = b.alloc_register();
    let no_row = b.new_label();
    let done = b.new_label();
    b.emit(VdbeOp::new(Opcode::Integer, (!negated) as i32, result, 0));
    b.emit_jump(Opcode::Rewind, sub_cursor, no_row, 0);
    b.emit_jump(Opcode::Goto, 0, done, 0);
    b.resolve_label(no_row);
    b.emit(VdbeOp::new(Opcode::Integer, negated as i32, result, 0));
    b.resolve_label(done);
    b.emit(VdbeOp::new(Opcode::Close, sub_cursor, 0, 0));
    Ok(result)
}
