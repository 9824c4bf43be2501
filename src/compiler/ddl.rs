//! CREATE/DROP/ALTER compilation (C6), spec §4.6.5: "DDL (CREATE TABLE,
//! CREATE INDEX, DROP, ALTER) primarily mutates the catalog outside the VDBE
//! and emits a Noop placeholder... so the program has consistent structure
//! for EXPLAIN."
//!
//! The catalog mutation itself (`schema::Catalog::create_table` and friends)
//! is synchronous; materializing the backing store is not, since a module's
//! `create`/`destroy`/`connect` are async suspension points (spec §5). That
//! makes every function in this module `async`, unlike `select`/`dml`'s
//! purely synchronous compilers.

use std::any::Any;
use std::sync::Arc;

use crate::error::{Error, ErrorCode, Result};
use crate::parser::ast::{
    AlterTableAction, AlterTableStmt, ColumnConstraintKind, CreateIndexStmt, CreateTableStmt, CreateViewStmt, DropStmt,
};
use crate::schema::{Catalog, Column};
use crate::storage::memory::TableKey;
use crate::value::type_affinity;
use crate::vdbe::opcode::{Opcode, VdbeOp};
use crate::vdbe::program::ProgramBuilder;
use crate::vtab::SchemaChange;

use super::Compiled;

fn noop_program() -> Compiled {
    let mut b = ProgramBuilder::new();
    b.emit(VdbeOp::new(Opcode::Noop, 0, 0, 0));
    b.emit(VdbeOp::new(Opcode::SchemaInvalidate, 0, 0, 0));
    b.emit(VdbeOp::new(Opcode::Halt, ErrorCode::Ok as i32, 0, 0));
    Compiled { program: Arc::new(b.finish()), column_names: Vec::new(), readonly: false }
}

fn resolve_schema(catalog: &Catalog, explicit: Option<&str>) -> String {
    explicit.unwrap_or_else(|| catalog.current_schema()).to_string()
}

pub async fn compile_create_table(catalog: &mut Catalog, stmt: &CreateTableStmt) -> Result<Compiled> {
    let schema = resolve_schema(catalog, stmt.name.schema.as_deref());
    let already_existed = catalog.table(&stmt.name.name, Some(&schema)).is_some();
    catalog.create_table(&schema, stmt)?;

    if !already_existed {
        let table = catalog
            .table(&stmt.name.name, Some(&schema))
            .expect("create_table just inserted this table");
        let reg = catalog
            .module(&table.module_name)
            .cloned()
            .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such module: {}", table.module_name)))?;
        reg.module
            .create(Some(&*table as &(dyn Any + Send + Sync)), &table.module_name, &schema, &table.name, &table.module_args)
            .await?;
    }
    Ok(noop_program())
}

pub async fn compile_drop_table(catalog: &mut Catalog, stmt: &DropStmt) -> Result<Compiled> {
    let schema = resolve_schema(catalog, stmt.name.schema.as_deref());
    let existing = catalog.table(&stmt.name.name, Some(&schema));
    catalog.drop_table(&schema, stmt)?;

    if let Some(table) = existing {
        if let Some(reg) = catalog.module(&table.module_name).cloned() {
            let key = TableKey { schema, name: table.name.clone() };
            reg.module.destroy(Some(&key as &(dyn Any + Send + Sync))).await?;
        }
    }
    Ok(noop_program())
}

pub fn compile_create_index(catalog: &mut Catalog, stmt: &CreateIndexStmt) -> Result<Compiled> {
    let schema = resolve_schema(catalog, stmt.name.schema.as_deref());
    catalog.create_index(&schema, stmt)?;
    Ok(noop_program())
}

pub fn compile_drop_index(catalog: &mut Catalog, stmt: &DropStmt) -> Result<Compiled> {
    let schema = resolve_schema(catalog, stmt.name.schema.as_deref());
    catalog.drop_index(&schema, stmt)?;
    Ok(noop_program())
}

pub fn compile_create_view(catalog: &mut Catalog, stmt: &CreateViewStmt) -> Result<Compiled> {
    let schema = resolve_schema(catalog, stmt.name.schema.as_deref());
    catalog.create_view(&schema, stmt)?;
    Ok(noop_program())
}

pub fn compile_drop_view(catalog: &mut Catalog, stmt: &DropStmt) -> Result<Compiled> {
    let schema = resolve_schema(catalog, stmt.name.schema.as_deref());
    catalog.drop_view(&schema, stmt)?;
    Ok(noop_program())
}

/// ALTER TABLE mutates the catalog's `Table` value directly (there is no
/// `Catalog::alter_table`; `replace_table` is the generic "overwrite by
/// current name" primitive it and this function share) and tells the live
/// module about the change through `VTable::rename`/`alter_schema`, via a
/// fresh `connect()` against the table's existing storage (not `create`,
/// which would wipe it).
pub async fn compile_alter_table(catalog: &mut Catalog, stmt: &AlterTableStmt) -> Result<Compiled> {
    let schema = resolve_schema(catalog, stmt.table.schema.as_deref());
    let table = catalog
        .table(&stmt.table.name, Some(&schema))
        .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such table: {}", stmt.table)))?;

    let reg = catalog
        .module(&table.module_name)
        .cloned()
        .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such module: {}", table.module_name)))?;
    let (vtable, _) = reg
        .module
        .connect(reg.aux.as_deref(), &table.module_name, &schema, &table.name, &table.module_args)
        .await?;

    let mut updated = (*table).clone();
    match &stmt.action {
        AlterTableAction::RenameTable(new_name) => {
            vtable.rename(new_name).await?;
            updated.name = new_name.clone();
        }
        AlterTableAction::RenameColumn { old, new } => {
            let idx = updated
                .column_index(old)
                .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such column: {}", old)))?;
            vtable.alter_schema(SchemaChange::RenameColumn { from: old.clone(), to: new.clone() }).await?;
            updated.columns[idx].name = new.clone();
        }
        AlterTableAction::AddColumn(col_def) => {
            let affinity = col_def.type_name.as_ref().map(|t| type_affinity(&t.name)).unwrap_or(crate::value::Affinity::Blob);
            let mut column = Column::new(col_def.name.clone(), affinity);
            for c in &col_def.constraints {
                match &c.kind {
                    ColumnConstraintKind::NotNull { .. } => column.not_null = true,
                    ColumnConstraintKind::Collate(name) => column.collation = Some(name.clone()),
                    ColumnConstraintKind::Default(default) => column.default_value = Some(default_value_expr(default)),
                    _ => {}
                }
            }
            vtable.alter_schema(SchemaChange::AddColumn(column.clone())).await?;
            updated.columns.push(column);
        }
        AlterTableAction::DropColumn(name) => {
            let idx = updated
                .column_index(name)
                .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such column: {}", name)))?;
            vtable.alter_schema(SchemaChange::DropColumn(name.clone())).await?;
            updated.columns.remove(idx);
        }
    }

    catalog.replace_table(&schema, &table.name, Arc::new(updated))?;
    Ok(noop_program())
}

fn default_value_expr(d: &crate::parser::ast::DefaultValue) -> crate::parser::ast::Expr {
    use crate::parser::ast::{DefaultValue, Expr};
    match d {
        DefaultValue::Expr(e) => (**e).clone(),
        DefaultValue::Literal(lit) => Expr::Literal(lit.clone()),
        DefaultValue::CurrentTime => Expr::string("CURRENT_TIME"),
        DefaultValue::CurrentDate => Expr::string("CURRENT_DATE"),
        DefaultValue::CurrentTimestamp => Expr::string("CURRENT_TIMESTAMP"),
    }
}
