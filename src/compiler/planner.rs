//! FROM-clause cursor planning (C6), spec §4.6.2 step 2 and §6.3/§6.4's
//! `bestIndex` contract.
//!
//! Grounded on the teacher's `executor/planner.rs` join-order walker,
//! retargeted from a single btree-backed planner to calling each table's own
//! `Module::best_index` per spec. One cursor is opened per `TableRef::Table`
//! in the FROM clause, left to right, matching the nested-loop order the
//! interpreter executes in (no join reordering: the compiler trusts the
//! query's written order, same simplification the teacher's planner makes
//! for its first cut).

use std::sync::Arc;

use crate::error::{Error, ErrorCode, Result};
use crate::parser::ast::{BinaryOp, ColumnRef, Expr, FromClause, JoinConstraint, JoinType, OrderingTerm, SortOrder, TableRef};
use crate::schema::{Catalog, Table};
use crate::value::Collation;
use crate::vdbe::program::ProgramBuilder;
use crate::vtab::{Constraint, ConstraintOp, IndexInfo, Module, OrderByTerm, ScanPlan};

use super::expr::{ColumnBinding, Scope};

/// One resolved FROM-clause entry: its cursor, schema table, and alias. Code
/// generation (VOpen/argument evaluation/VFilter) happens in `select.rs` at
/// the correct nesting depth, not here, since an inner table's filter
/// arguments generally depend on the outer table's *current* row and must
/// be re-evaluated every outer-loop iteration rather than once up front.
pub struct PlannedTable {
    pub cursor: i32,
    pub schema: String,
    pub table_name: String,
    pub table: Arc<Table>,
    pub alias: String,
    pub plan: ScanPlan,
    /// `(argv_index, expr)` pairs, in ascending `argv_index` order, each
    /// evaluated against the *outer* scope (this table's own columns are
    /// never part of its own filter arguments).
    pub filter_args: Vec<(i32, Expr)>,
    /// How this table joins to everything planned before it. The first
    /// table in a FROM clause carries `Cross` with no `on_expr` (nothing
    /// to join against); every later `Table` entry carries the `JoinType`
    /// and `ON`/`USING` condition from its own `TableRef::Join` node, spec
    /// §4.6.2 step 4.
    pub join_type: JoinType,
    /// Compiled once per row at this nesting depth, spec §4.6.2 step 4's
    /// "compile the ON/USING condition against joinFail[i]". `None` for a
    /// comma/`CROSS JOIN`-joined table (condition lives entirely in WHERE).
    pub on_expr: Option<Expr>,
}

pub struct Plan {
    pub tables: Vec<PlannedTable>,
    pub scope: Scope,
}

/// Recursively flatten top-level `AND` conjuncts (and strip `Expr::Parens`),
/// the way the teacher's `where_expr.rs` splits a WHERE clause into
/// independently indexable pieces.
pub fn flatten_and(expr: &Expr, out: &mut Vec<&Expr>) {
    match expr {
        Expr::Binary { op: BinaryOp::And, left, right } => {
            flatten_and(left, out);
            flatten_and(right, out);
        }
        Expr::Parens(inner) => flatten_and(inner, out),
        _ => out.push(expr),
    }
}

fn constraint_op_for(op: BinaryOp) -> Option<ConstraintOp> {
    match op {
        BinaryOp::Eq => Some(ConstraintOp::Eq),
        BinaryOp::Ne => Some(ConstraintOp::Ne),
        BinaryOp::Lt => Some(ConstraintOp::Lt),
        BinaryOp::Le => Some(ConstraintOp::Le),
        BinaryOp::Gt => Some(ConstraintOp::Gt),
        BinaryOp::Ge => Some(ConstraintOp::Ge),
        BinaryOp::Is => Some(ConstraintOp::Is),
        BinaryOp::IsNot => Some(ConstraintOp::IsNot),
        _ => None,
    }
}

/// One flattened FROM-clause entry: the base table plus how it joins to
/// everything already flattened before it.
struct JoinEntry<'t> {
    table: &'t TableRef,
    join_type: JoinType,
    on: Option<&'t Expr>,
    using: Option<&'t [String]>,
}

/// Flatten a (possibly nested) FROM clause into its `TableRef::Table`
/// entries in left-to-right join order, each carrying the `JoinType`/`ON`
/// condition that attaches it to everything before it. Subqueries and
/// table-valued functions are rejected here; `select.rs` handles those
/// separately before calling the planner on the remaining plain-table
/// joins.
fn flatten_tables<'t>(refs: &'t [TableRef], out: &mut Vec<JoinEntry<'t>>) -> Result<()> {
    for t in refs {
        flatten_one(t, out, JoinType::Cross, None, None)?;
    }
    Ok(())
}

fn flatten_one<'t>(
    t: &'t TableRef,
    out: &mut Vec<JoinEntry<'t>>,
    incoming: JoinType,
    on: Option<&'t Expr>,
    using: Option<&'t [String]>,
) -> Result<()> {
    match t {
        TableRef::Table { .. } => out.push(JoinEntry { table: t, join_type: incoming, on, using }),
        TableRef::Join { left, join_type, right, constraint } => {
            // `left`'s own join type/condition (if it is itself a Join node)
            // lives in its own AST node and is picked up when we recurse
            // into it; when `left` is a bare base table this `Cross`/`None`
            // is what a query's very first table gets (nothing to its left).
            flatten_one(left, out, JoinType::Cross, None, None)?;
            let join_type = normalize_join_type(*join_type)?;
            let (on, using) = match constraint {
                Some(JoinConstraint::On(e)) => (Some(e.as_ref()), None),
                Some(JoinConstraint::Using(cols)) => (None, Some(cols.as_slice())),
                None => (None, None),
            };
            flatten_one(right, out, join_type, on, using)?;
        }
        TableRef::Parens(inner) => flatten_one(inner, out, incoming, on, using)?,
        TableRef::Subquery { .. } | TableRef::TableFunction { .. } => {
            return Err(Error::with_message(ErrorCode::Error, "subqueries and table-valued functions in FROM are not supported"));
        }
    }
    Ok(())
}

/// `RIGHT`/`FULL` joins and the `NATURAL` column-matching shorthand are
/// documented limitations (DESIGN.md): reordering the nested loop to make
/// `RIGHT` behave like `LEFT` would change which table's rows the compiler
/// scans outermost, and `NATURAL`'s implicit same-name equi-join needs
/// schema-driven column matching this planner does not implement. `CROSS`/
/// `INNER`/`LEFT` cover every join the spec's testable properties exercise.
fn normalize_join_type(jt: JoinType) -> Result<JoinType> {
    match jt {
        JoinType::Inner | JoinType::Cross => Ok(JoinType::Cross),
        JoinType::Left => Ok(JoinType::Left),
        JoinType::Right | JoinType::Full | JoinType::Natural | JoinType::NaturalLeft | JoinType::NaturalRight | JoinType::NaturalFull => {
            Err(Error::with_message(ErrorCode::Error, format!("{:?} joins are not supported", jt)))
        }
    }
}

fn table_alias(t: &TableRef) -> &str {
    match t {
        TableRef::Table { name, alias, .. } => alias.as_deref().unwrap_or(&name.name),
        _ => unreachable!(),
    }
}

fn references_cursor(expr: &Expr, scope: &Scope, cursor: i32) -> bool {
    match expr {
        Expr::Column(col) => scope.resolve(col).map(|b| b.cursor == cursor).unwrap_or(false),
        Expr::Unary { expr, .. } | Expr::Cast { expr, .. } | Expr::Collate { expr, .. } | Expr::Parens(expr) | Expr::IsNull { expr, .. } => {
            references_cursor(expr, scope, cursor)
        }
        Expr::Binary { left, right, .. } => references_cursor(left, scope, cursor) || references_cursor(right, scope, cursor),
        Expr::Between { expr, low, high, .. } => {
            references_cursor(expr, scope, cursor) || references_cursor(low, scope, cursor) || references_cursor(high, scope, cursor)
        }
        Expr::IsDistinct { left, right, .. } => references_cursor(left, scope, cursor) || references_cursor(right, scope, cursor),
        _ => false,
    }
}

/// Resolve the FROM clause into an ordered set of cursors, calling each
/// table's module `best_index` with the WHERE conjuncts that reference only
/// that table (or earlier, already-bound tables). `where_clause` is never
/// consumed here beyond planning: `select.rs` always re-evaluates it in full
/// as a post-filter, regardless of what a module's `ConstraintUsage::omit`
/// claims, since this compiler cannot be checked against a real build and
/// conservative double evaluation is cheap insurance against a planner bug
/// silently dropping rows.
///
/// `order_by` is the statement's top-level ORDER BY, if any (spec §4.6.2
/// step 2's "the ORDER BY that could be satisfied by this cursor"); each
/// table only gets the terms that resolve to one of its own columns.
pub fn plan_from(
    catalog: &Catalog,
    from: &FromClause,
    where_clause: Option<&Expr>,
    order_by: Option<&[OrderingTerm]>,
    b: &mut ProgramBuilder,
) -> Result<Plan> {
    let mut entries = Vec::new();
    flatten_tables(&from.tables, &mut entries)?;
    if entries.iter().any(|e| e.using.is_some()) {
        return Err(Error::with_message(ErrorCode::Error, "JOIN ... USING is not supported"));
    }

    // A LEFT-joined table's bestIndex call must only see constraints that
    // hold regardless of whether the join matches — i.e. its own ON
    // condition, never a WHERE conjunct (WHERE is evaluated after NULL-
    // padding, so pushing it into the scan would wrongly suppress the
    // null-padded row itself). Once any LEFT JOIN is present in the query
    // we stop pushing WHERE conjuncts into any table's plan at all and let
    // the post-join WHERE re-check in `select.rs` do the filtering;
    // comma/CROSS/INNER-only FROM clauses keep the original WHERE pushdown.
    let has_left_join = entries.iter().any(|e| matches!(e.join_type, JoinType::Left));

    let mut where_conjuncts = Vec::new();
    if let Some(w) = where_clause {
        flatten_and(w, &mut where_conjuncts);
    }

    let mut scope = Scope::default();
    let mut tables = Vec::new();

    for entry in &entries {
        let t = entry.table;
        let TableRef::Table { name, .. } = t else { unreachable!() };
        let schema_name = name.schema.clone().unwrap_or_else(|| catalog.current_schema().to_string());
        let table = catalog
            .table(&name.name, name.schema.as_deref())
            .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such table: {}", name)))?;
        let cursor = b.alloc_cursor();
        let alias = table_alias(t).to_string();

        for (idx, col) in table.columns.iter().enumerate() {
            let collation = col.collation.as_deref().and_then(|n| Collation::by_name(n).ok()).unwrap_or_default();
            scope.bindings.push(ColumnBinding {
                cursor,
                column_index: idx,
                table_alias: alias.clone(),
                column_name: col.name.clone(),
                collation,
            });
        }

        let module = catalog
            .module(&table.module_name)
            .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such module: {}", table.module_name)))?;

        let mut local_conjuncts: Vec<&Expr> = Vec::new();
        if !has_left_join && matches!(entry.join_type, JoinType::Cross) {
            local_conjuncts.extend(where_conjuncts.iter().copied());
        }
        if let Some(on) = entry.on {
            flatten_and(on, &mut local_conjuncts);
        }

        let mut candidate_constraints = Vec::new();
        let mut candidate_exprs: Vec<(usize, &Expr)> = Vec::new();
        for c in &local_conjuncts {
            if let Expr::Binary { op, left, right } = c {
                if let Some(cop) = constraint_op_for(*op) {
                    if let Some((col_idx, _)) = column_of_table(left, &table, &alias) {
                        if !references_cursor(right, &scope, cursor) && !expr_is_on_other_planned_cursor(right, &scope) {
                            let pos = candidate_constraints.len();
                            candidate_constraints.push(Constraint { column_index: col_idx as i32, op: cop, usable: true });
                            candidate_exprs.push((pos, right));
                            continue;
                        }
                    }
                    if let Some((col_idx, _)) = column_of_table(right, &table, &alias) {
                        if !references_cursor(left, &scope, cursor) {
                            if let Some(flipped) = flip_op(cop) {
                                let pos = candidate_constraints.len();
                                candidate_constraints.push(Constraint { column_index: col_idx as i32, op: flipped, usable: true });
                                candidate_exprs.push((pos, left));
                            }
                        }
                    }
                }
            }
        }

        let cursor_order_by = order_by
            .map(|terms| order_by_terms_for_table(terms, &table, &alias))
            .unwrap_or_default();
        let mut info = IndexInfo::new(candidate_constraints, cursor_order_by);
        module.module.best_index(&table, &mut info)?;

        let mut filter_args: Vec<(i32, Expr)> = Vec::new();
        for (pos, usage) in info.constraint_usage.iter().enumerate() {
            if usage.argv_index > 0 {
                if let Some((_, e)) = candidate_exprs.iter().find(|(p, _)| *p == pos) {
                    filter_args.push((usage.argv_index, (*e).clone()));
                }
            }
        }
        filter_args.sort_by_key(|(i, _)| *i);

        let scan_plan = ScanPlan {
            index_name: None,
            descending: false,
            equality_key: None,
            lower_bound: None,
            upper_bound: None,
            idx_num: info.idx_num,
            idx_str: info.idx_str.clone(),
        };

        tables.push(PlannedTable {
            cursor,
            schema: schema_name,
            table_name: name.name.clone(),
            table,
            alias,
            plan: scan_plan,
            filter_args,
            join_type: entry.join_type,
            on_expr: entry.on.cloned(),
        });
    }

    Ok(Plan { tables, scope })
}

/// Translate the statement's ORDER BY into `bestIndex`'s `OrderByTerm` list
/// for one table, only when every term is a plain reference to one of that
/// table's own columns — an ordering that also depends on another table's
/// column (or on an expression, not a bare column) can never be satisfied by
/// this cursor's scan order alone, so the module gets nothing to consume.
fn order_by_terms_for_table(terms: &[OrderingTerm], table: &Table, alias: &str) -> Vec<OrderByTerm> {
    let mut out = Vec::with_capacity(terms.len());
    for term in terms {
        match column_of_table(&term.expr, table, alias) {
            Some((col_idx, _)) => out.push(OrderByTerm {
                column_index: col_idx as i32,
                descending: term.order == SortOrder::Desc,
            }),
            None => return Vec::new(),
        }
    }
    out
}

fn column_of_table<'e>(expr: &'e Expr, table: &Table, alias: &str) -> Option<(usize, &'e ColumnRef)> {
    if let Expr::Column(col) = expr {
        if let Some(t) = &col.table {
            if !t.eq_ignore_ascii_case(alias) {
                return None;
            }
        }
        table.column_index(&col.column).map(|i| (i, col))
    } else {
        None
    }
}

fn expr_is_on_other_planned_cursor(expr: &Expr, scope: &Scope) -> bool {
    // Conservative: if the other side references any already-scoped column
    // at all, treat it as cross-table and skip pushing it down as a plan
    // argument (the post-filter still re-checks it in full).
    match expr {
        Expr::Column(col) => scope.resolve(col).is_ok(),
        Expr::Unary { expr, .. } | Expr::Parens(expr) => expr_is_on_other_planned_cursor(expr, scope),
        Expr::Binary { left, right, .. } => expr_is_on_other_planned_cursor(left, scope) || expr_is_on_other_planned_cursor(right, scope),
        _ => false,
    }
}

fn flip_op(op: ConstraintOp) -> Option<ConstraintOp> {
    Some(match op {
        ConstraintOp::Eq => ConstraintOp::Eq,
        ConstraintOp::Ne => ConstraintOp::Ne,
        ConstraintOp::Lt => ConstraintOp::Gt,
        ConstraintOp::Le => ConstraintOp::Ge,
        ConstraintOp::Gt => ConstraintOp::Lt,
        ConstraintOp::Ge => ConstraintOp::Le,
        ConstraintOp::Is => ConstraintOp::Is,
        ConstraintOp::IsNot => ConstraintOp::IsNot,
        _ => return None,
    })
}
