//! INSERT/UPDATE/DELETE compilation (C6), spec §4.6.5: "Insert and update
//! emit VFilter (for UPDATE's target selection), VUpdate (with the
//! onConflict in the descriptor), and ResultRow if RETURNING is present."
//!
//! DELETE and UPDATE plan their target table through the same
//! `planner::plan_from`/`emit_nested_loop` machinery `select.rs` uses for a
//! FROM clause (one cursor, `VFilter`'d against the WHERE clause's pushed-
//! down constraints), so a table with a useful index behind its `bestIndex`
//! scans only the matching rows rather than the whole table. INSERT needs no
//! such scan: it only ever opens its target cursor to write through.

use std::sync::Arc;

use crate::error::{Error, ErrorCode, Result};
use crate::parser::ast::{
    ConflictAction, DeleteStmt, Expr, FromClause, InsertSource, InsertStmt, ResultColumn, TableRef, UpdateStmt,
};
use crate::schema::{Catalog, Table};
use crate::vdbe::opcode::{CursorTarget, Opcode, P4, VdbeOp};
use crate::vdbe::program::ProgramBuilder;
use crate::vtab::ConflictPolicy;

use super::expr::{ExprCtx, Scope};
use super::planner::{self, Plan};
use super::select;
use super::Compiled;

fn unsupported(what: &str) -> Error {
    Error::with_message(ErrorCode::Error, format!("{what} is not supported"))
}

fn conflict_policy(action: Option<ConflictAction>) -> ConflictPolicy {
    match action.unwrap_or_default() {
        ConflictAction::Abort => ConflictPolicy::Abort,
        ConflictAction::Rollback => ConflictPolicy::Rollback,
        ConflictAction::Fail => ConflictPolicy::Fail,
        ConflictAction::Ignore => ConflictPolicy::Ignore,
        ConflictAction::Replace => ConflictPolicy::Replace,
    }
}

fn resolve_target(catalog: &Catalog, schema: Option<&str>, name: &str) -> Result<(String, Arc<Table>)> {
    let schema_name = schema.unwrap_or_else(|| catalog.current_schema()).to_string();
    let table = catalog
        .table(name, schema)
        .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such table: {}", name)))?;
    Ok((schema_name, table))
}

fn returning_names(table: &Table, columns: &[ResultColumn]) -> Vec<String> {
    let mut names = Vec::new();
    for c in columns {
        match c {
            ResultColumn::Star | ResultColumn::TableStar(_) => names.extend(table.columns.iter().map(|c| c.name.clone())),
            ResultColumn::Expr { expr, alias } => names.push(alias.clone().unwrap_or_else(|| match expr {
                Expr::Column(col) => col.column.clone(),
                _ => "expr".to_string(),
            })),
        }
    }
    names
}

/// Emit `ResultRow` for a RETURNING clause whose values are already sitting
/// in a contiguous run of registers, one per table column (the row just
/// written). Only plain column references and `*`/`table.*` are supported;
/// anything else (an expression over the new row) is rejected rather than
/// silently producing the wrong answer, since there is no live cursor
/// positioned on the written row to drive the ordinary expression compiler.
fn emit_returning(b: &mut ProgramBuilder, table: &Table, row_base: i32, columns: &[ResultColumn]) -> Result<()> {
    let mut regs = Vec::new();
    for c in columns {
        match c {
            ResultColumn::Star | ResultColumn::TableStar(_) => {
                for i in 0..table.columns.len() {
                    regs.push(row_base + i as i32);
                }
            }
            ResultColumn::Expr { expr: Expr::Column(col), .. } => {
                let idx = table
                    .column_index(&col.column)
                    .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such column: {}", col.column)))?;
                regs.push(row_base + idx as i32);
            }
            ResultColumn::Expr { .. } => {
                return Err(unsupported("expressions in RETURNING other than plain column references"));
            }
        }
    }
    let base = b.alloc_registers(regs.len() as i32);
    for (i, r) in regs.iter().enumerate() {
        b.emit(VdbeOp::new(Opcode::Copy, *r, base + i as i32, 0));
    }
    b.emit(VdbeOp::new(Opcode::ResultRow, base, regs.len() as i32, 0));
    Ok(())
}

enum RowSource<'a> {
    Exprs(&'a [Expr]),
    Registers(i32, usize),
}

/// Build a full `table.columns.len()`-wide row: columns present in `source`
/// copied in, columns absent from it filled from their `DEFAULT` (or NULL).
/// Returns the base of a contiguous `[rowid_reg, col0, col1, ...]` run ready
/// for `VUpdate`'s `(p2, p2+1..p2+1+p3)` operand layout.
fn assemble_row(
    b: &mut ProgramBuilder,
    catalog: &Catalog,
    table: &Table,
    target_columns: &[usize],
    source: RowSource,
    rowid_expr: Option<&Expr>,
) -> Result<i32> {
    let ncols = table.columns.len();
    let base = b.alloc_registers(1 + ncols as i32);
    let rowid_reg = base;
    let row_base = base + 1;

    match rowid_expr {
        Some(e) => {
            let ctx = ExprCtx { catalog, scope: &Scope::default(), agg: None };
            let r = super::expr::compile_expr(b, &ctx, e)?;
            b.emit(VdbeOp::new(Opcode::Copy, r, rowid_reg, 0));
        }
        None => {
            b.emit(VdbeOp::new(Opcode::Null, 0, rowid_reg, 0));
        }
    }

    let mut provided: Vec<Option<i32>> = vec![None; ncols];
    match source {
        RowSource::Exprs(exprs) => {
            let ctx = ExprCtx { catalog, scope: &Scope::default(), agg: None };
            for (i, col_idx) in target_columns.iter().enumerate() {
                let r = super::expr::compile_expr(b, &ctx, &exprs[i])?;
                provided[*col_idx] = Some(r);
            }
        }
        RowSource::Registers(src_base, count) => {
            for (i, col_idx) in target_columns.iter().enumerate() {
                if i < count {
                    provided[*col_idx] = Some(src_base + i as i32);
                }
            }
        }
    }

    for (idx, col) in table.columns.iter().enumerate() {
        let dest = row_base + idx as i32;
        match provided[idx] {
            Some(r) => {
                b.emit(VdbeOp::new(Opcode::Copy, r, dest, 0));
            }
            None => match &col.default_value {
                Some(default_expr) => {
                    let ctx = ExprCtx { catalog, scope: &Scope::default(), agg: None };
                    let r = super::expr::compile_expr(b, &ctx, default_expr)?;
                    b.emit(VdbeOp::new(Opcode::Copy, r, dest, 0));
                }
                None => {
                    b.emit(VdbeOp::new(Opcode::Null, 0, dest, 0));
                }
            },
        }
    }
    Ok(base)
}

fn emit_write(b: &mut ProgramBuilder, cursor: i32, row_base: i32, ncols: usize, policy: ConflictPolicy) {
    b.emit(VdbeOp::new(Opcode::VUpdate, cursor, row_base, ncols as i32).with_p4(P4::ConflictPolicy(policy)));
}

pub fn compile_insert(catalog: &Catalog, stmt: &InsertStmt) -> Result<Compiled> {
    if stmt.with.is_some() {
        return Err(unsupported("WITH (common table expressions)"));
    }
    if stmt.on_conflict.is_some() {
        return Err(unsupported("the ON CONFLICT DO UPDATE/DO NOTHING clause"));
    }
    let (schema_name, table) = resolve_target(catalog, stmt.table.schema.as_deref(), &stmt.table.name)?;
    let policy = conflict_policy(stmt.or_action);

    let target_columns: Vec<usize> = match &stmt.columns {
        Some(names) => names
            .iter()
            .map(|n| table.column_index(n).ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such column: {}", n))))
            .collect::<Result<_>>()?,
        None => (0..table.columns.len()).collect(),
    };

    let mut b = ProgramBuilder::new();
    let cursor = b.alloc_cursor();
    b.emit(
        VdbeOp::new(Opcode::VOpen, cursor, 0, 0)
            .with_p4(P4::CursorTarget(Arc::new(CursorTarget { schema: schema_name, table: table.name.clone() }))),
    );

    match &stmt.source {
        InsertSource::DefaultValues => {
            let base = assemble_row(&mut b, catalog, &table, &[], RowSource::Exprs(&[]), None)?;
            emit_write(&mut b, cursor, base, table.columns.len(), policy);
            if let Some(returning) = &stmt.returning {
                emit_returning(&mut b, &table, base + 1, returning)?;
            }
        }
        InsertSource::Values(rows) => {
            for row in rows {
                if row.len() != target_columns.len() {
                    return Err(Error::with_message(ErrorCode::Error, "INSERT has wrong number of values"));
                }
                let base = assemble_row(&mut b, catalog, &table, &target_columns, RowSource::Exprs(row), None)?;
                emit_write(&mut b, cursor, base, table.columns.len(), policy);
                if let Some(returning) = &stmt.returning {
                    emit_returning(&mut b, &table, base + 1, returning)?;
                }
            }
        }
        InsertSource::Select(select_stmt) => {
            let sub = select::compile_select_with(catalog, select_stmt)?;
            if sub.column_count != target_columns.len() {
                return Err(Error::with_message(ErrorCode::Error, "INSERT ... SELECT column count mismatch"));
            }
            let src_cursor = b.alloc_cursor();
            let ki = Arc::new(crate::vdbe::opcode::KeyInfo::new(sub.column_count));
            b.emit(VdbeOp::new(Opcode::OpenEphemeral, src_cursor, sub.column_count as i32, 0).with_p4(P4::KeyInfo(ki)));
            select::splice_subquery(&mut b, catalog, &sub, src_cursor)?;

            let empty = b.new_label();
            let top = b.new_label();
            b.emit_jump(Opcode::Rewind, src_cursor, empty, 0);
            b.resolve_label(top);
            let src_base = b.alloc_registers(sub.column_count as i32);
            for i in 0..sub.column_count {
                b.emit(VdbeOp::new(Opcode::Column, src_cursor, i as i32, src_base + i as i32));
            }
            let base = assemble_row(&mut b, catalog, &table, &target_columns, RowSource::Registers(src_base, sub.column_count), None)?;
            emit_write(&mut b, cursor, base, table.columns.len(), policy);
            if let Some(returning) = &stmt.returning {
                emit_returning(&mut b, &table, base + 1, returning)?;
            }
            b.emit_jump(Opcode::Next, src_cursor, top, 0);
            b.resolve_label(empty);
            b.emit(VdbeOp::new(Opcode::Close, src_cursor, 0, 0));
        }
    }

    b.emit(VdbeOp::new(Opcode::Close, cursor, 0, 0));
    b.emit(VdbeOp::new(Opcode::Halt, ErrorCode::Ok as i32, 0, 0));
    let column_names = stmt.returning.as_ref().map(|r| returning_names(&table, r)).unwrap_or_default();
    Ok(Compiled { program: Arc::new(b.finish()), column_names, readonly: false })
}

/// Wrap the target table (plus any extra `UPDATE ... FROM` tables) into a
/// `FromClause` the ordinary cursor planner can plan, with the target always
/// first so its cursor comes out first in `plan.tables`.
fn target_from_clause(stmt_table: &crate::parser::ast::QualifiedName, alias: Option<&str>, extra: Option<&FromClause>) -> FromClause {
    let mut tables = vec![TableRef::Table { name: stmt_table.clone(), alias: alias.map(|s| s.to_string()), indexed_by: None }];
    if let Some(f) = extra {
        tables.extend(f.tables.clone());
    }
    FromClause { tables }
}

pub fn compile_update(catalog: &Catalog, stmt: &UpdateStmt) -> Result<Compiled> {
    if stmt.with.is_some() {
        return Err(unsupported("WITH (common table expressions)"));
    }
    if stmt.order_by.is_some() || stmt.limit.is_some() {
        return Err(unsupported("ORDER BY/LIMIT on UPDATE"));
    }
    let (_, table) = resolve_target(catalog, stmt.table.schema.as_deref(), &stmt.table.name)?;
    let policy = conflict_policy(stmt.or_action);

    let mut b = ProgramBuilder::new();
    let from = target_from_clause(&stmt.table, stmt.alias.as_deref(), stmt.from.as_ref());
    let plan: Plan = planner::plan_from(catalog, &from, stmt.where_clause.as_deref(), None, &mut b)?;
    let target = &plan.tables[0];
    let target_cursor = target.cursor;

    let mut target_columns = Vec::new();
    let mut assign_exprs: Vec<&Expr> = Vec::new();
    for a in &stmt.assignments {
        if a.columns.len() != 1 {
            return Err(unsupported("multi-column assignment targets in UPDATE SET"));
        }
        let idx = table
            .column_index(&a.columns[0])
            .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such column: {}", a.columns[0])))?;
        target_columns.push(idx);
        assign_exprs.push(&a.expr);
    }

    {
        let mut row_body = |b: &mut ProgramBuilder| -> Result<()> {
            let ctx = ExprCtx { catalog, scope: &plan.scope, agg: None };
            let skip_row = b.new_label();
            if let Some(w) = &stmt.where_clause {
                let cond = super::expr::compile_expr(b, &ctx, w)?;
                b.emit_jump(Opcode::IfNot, cond, skip_row, 0);
            }

            let new_base = b.alloc_registers(1 + table.columns.len() as i32);
            let rowid_reg = new_base;
            let row_base = new_base + 1;
            b.emit(VdbeOp::new(Opcode::Rowid, target_cursor, rowid_reg, 0));

            let mut assigned_reg: Vec<Option<i32>> = vec![None; table.columns.len()];
            for (idx, e) in target_columns.iter().zip(assign_exprs.iter()) {
                let r = super::expr::compile_expr(b, &ctx, e)?;
                assigned_reg[*idx] = Some(r);
            }
            for (idx, _col) in table.columns.iter().enumerate() {
                let dest = row_base + idx as i32;
                match assigned_reg[idx] {
                    Some(r) => {
                        b.emit(VdbeOp::new(Opcode::Copy, r, dest, 0));
                    }
                    None => {
                        b.emit(VdbeOp::new(Opcode::Column, target_cursor, idx as i32, dest));
                    }
                }
            }

            emit_write(b, target_cursor, new_base, table.columns.len(), policy);
            if let Some(returning) = &stmt.returning {
                emit_returning(b, &table, row_base, returning)?;
            }

            if stmt.where_clause.is_some() {
                b.resolve_label(skip_row);
            }
            Ok(())
        };
        select::emit_nested_loop(&mut b, catalog, &plan, &mut row_body)?;
    }

    b.emit(VdbeOp::new(Opcode::Halt, ErrorCode::Ok as i32, 0, 0));
    let column_names = stmt.returning.as_ref().map(|r| returning_names(&table, r)).unwrap_or_default();
    Ok(Compiled { program: Arc::new(b.finish()), column_names, readonly: false })
}

pub fn compile_delete(catalog: &Catalog, stmt: &DeleteStmt) -> Result<Compiled> {
    if stmt.with.is_some() {
        return Err(unsupported("WITH (common table expressions)"));
    }
    if stmt.order_by.is_some() || stmt.limit.is_some() {
        return Err(unsupported("ORDER BY/LIMIT on DELETE"));
    }
    let (_, table) = resolve_target(catalog, stmt.table.schema.as_deref(), &stmt.table.name)?;

    let mut b = ProgramBuilder::new();
    let from = target_from_clause(&stmt.table, stmt.alias.as_deref(), None);
    let plan: Plan = planner::plan_from(catalog, &from, stmt.where_clause.as_deref(), None, &mut b)?;
    let target = &plan.tables[0];
    let target_cursor = target.cursor;

    {
        let mut row_body = |b: &mut ProgramBuilder| -> Result<()> {
            let ctx = ExprCtx { catalog, scope: &plan.scope, agg: None };
            let skip_row = b.new_label();
            if let Some(w) = &stmt.where_clause {
                let cond = super::expr::compile_expr(b, &ctx, w)?;
                b.emit_jump(Opcode::IfNot, cond, skip_row, 0);
            }

            let rowid_reg = b.alloc_register();
            b.emit(VdbeOp::new(Opcode::Rowid, target_cursor, rowid_reg, 0));

            let row_base = if stmt.returning.is_some() {
                let base = b.alloc_registers(table.columns.len() as i32);
                for (idx, _) in table.columns.iter().enumerate() {
                    b.emit(VdbeOp::new(Opcode::Column, target_cursor, idx as i32, base + idx as i32));
                }
                Some(base)
            } else {
                None
            };

            b.emit(VdbeOp::new(Opcode::VUpdate, target_cursor, rowid_reg, 0).with_p4(P4::ConflictPolicy(ConflictPolicy::Abort)));
            if let (Some(returning), Some(base)) = (&stmt.returning, row_base) {
                emit_returning(b, &table, base, returning)?;
            }

            if stmt.where_clause.is_some() {
                b.resolve_label(skip_row);
            }
            Ok(())
        };
        select::emit_nested_loop(&mut b, catalog, &plan, &mut row_body)?;
    }

    b.emit(VdbeOp::new(Opcode::Halt, ErrorCode::Ok as i32, 0, 0));
    let column_names = stmt.returning.as_ref().map(|r| returning_names(&table, r)).unwrap_or_default();
    Ok(Compiled { program: Arc::new(b.finish()), column_names, readonly: false })
}
