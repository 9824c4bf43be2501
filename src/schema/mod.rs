//! Schema catalog (C2), spec §4.2.
//!
//! Holds named schemas (always at least `main` and `temp`), resolves tables
//! and views by search order (current schema, then `main`, then `temp`), and
//! keeps the virtual-table module registry keyed by lowercase name. A
//! module registration carries opaque auxiliary data handed to the module on
//! every `create`/`connect` call (spec §4.3).

pub mod function;
pub mod table;
pub mod view;

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, ErrorCode, Result};
use crate::parser::ast::{
    ColumnConstraintKind, CreateIndexStmt, CreateTableStmt, CreateViewStmt, DropStmt,
    IndexedColumnKind, TableConstraintKind, TableDefinition,
};
use crate::value::type_affinity;
use crate::vtab::Module;

pub use function::{Function, FunctionKind};
pub use table::{CheckConstraint, Column, Index, IndexColumn, RowOpMask, Table};
pub use view::View;

pub const MAIN_SCHEMA: &str = "main";
pub const TEMP_SCHEMA: &str = "temp";
pub const SCHEMA_PSEUDO_TABLE: &str = "_schema";

/// A registered virtual-table module plus the opaque aux value passed to it
/// on every `create`/`connect`.
#[derive(Clone)]
pub struct ModuleRegistration {
    pub module: Arc<dyn Module>,
    pub aux: Option<Arc<dyn Any + Send + Sync>>,
}

#[derive(Default)]
struct SchemaNamespace {
    tables: HashMap<String, Arc<Table>>,
    views: HashMap<String, Arc<View>>,
    indexes: HashMap<String, Arc<Index>>,
}

/// The schema catalog. One instance per database; shared across connections
/// behind the schema latch (spec §5's "schema" shared resource).
pub struct Catalog {
    schemas: HashMap<String, SchemaNamespace>,
    current_schema: String,
    modules: HashMap<String, ModuleRegistration>,
    functions: HashMap<String, Vec<Function>>,
    pub default_vtab_module: Option<String>,
    pub default_vtab_args: Vec<String>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        let mut schemas = HashMap::new();
        schemas.insert(MAIN_SCHEMA.to_string(), SchemaNamespace::default());
        schemas.insert(TEMP_SCHEMA.to_string(), SchemaNamespace::default());
        Catalog {
            schemas,
            current_schema: MAIN_SCHEMA.to_string(),
            modules: HashMap::new(),
            functions: HashMap::new(),
            default_vtab_module: None,
            default_vtab_args: Vec::new(),
        }
    }

    pub fn current_schema(&self) -> &str {
        &self.current_schema
    }

    pub fn set_current_schema(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if !self.schemas.contains_key(&name) {
            return Err(Error::with_message(
                ErrorCode::Error,
                format!("no such schema: {}", name),
            ));
        }
        self.current_schema = name;
        Ok(())
    }

    pub fn add_schema(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.schemas.contains_key(&name) {
            return Err(Error::with_message(
                ErrorCode::Error,
                format!("schema {} already attached", name),
            ));
        }
        self.schemas.insert(name, SchemaNamespace::default());
        Ok(())
    }

    pub fn drop_schema(&mut self, name: &str) -> Result<()> {
        if name == MAIN_SCHEMA || name == TEMP_SCHEMA {
            return Err(Error::with_message(
                ErrorCode::Error,
                format!("cannot detach {}", name),
            ));
        }
        if self.schemas.remove(name).is_none() {
            return Err(Error::with_message(ErrorCode::Error, format!("no such schema: {}", name)));
        }
        Ok(())
    }

    /// Search order: the named schema if given, else current, then `main`,
    /// then `temp` (spec §4.2), skipping ones already tried.
    fn search_order(&self, explicit: Option<&str>) -> Vec<String> {
        if let Some(s) = explicit {
            return vec![s.to_string()];
        }
        let mut order = vec![self.current_schema.clone()];
        for s in [MAIN_SCHEMA, TEMP_SCHEMA] {
            if !order.iter().any(|o| o == s) {
                order.push(s.to_string());
            }
        }
        order
    }

    pub fn table(&self, name: &str, explicit_schema: Option<&str>) -> Option<Arc<Table>> {
        if name.eq_ignore_ascii_case(SCHEMA_PSEUDO_TABLE) {
            return Some(self.schema_pseudo_table());
        }
        for schema in self.search_order(explicit_schema) {
            if let Some(ns) = self.schemas.get(&schema) {
                if let Some(t) = ns.tables.get(&name.to_lowercase()) {
                    return Some(t.clone());
                }
            }
        }
        None
    }

    pub fn view(&self, name: &str, explicit_schema: Option<&str>) -> Option<Arc<View>> {
        for schema in self.search_order(explicit_schema) {
            if let Some(ns) = self.schemas.get(&schema) {
                if let Some(v) = ns.views.get(&name.to_lowercase()) {
                    return Some(v.clone());
                }
            }
        }
        None
    }

    pub fn index(&self, name: &str, explicit_schema: Option<&str>) -> Option<Arc<Index>> {
        for schema in self.search_order(explicit_schema) {
            if let Some(ns) = self.schemas.get(&schema) {
                if let Some(i) = ns.indexes.get(&name.to_lowercase()) {
                    return Some(i.clone());
                }
            }
        }
        None
    }

    /// The dynamic `_schema` pseudo-table, always resolvable, introspecting
    /// the catalog (spec §4.2). Its "module" is the built-in schema
    /// introspection module (C4's `_schema` virtual table); columns describe
    /// one row per catalog table.
    fn schema_pseudo_table(&self) -> Arc<Table> {
        let mut t = Table::new(MAIN_SCHEMA, SCHEMA_PSEUDO_TABLE, "_schema");
        for (name, affinity) in [
            ("schema", crate::value::Affinity::Text),
            ("name", crate::value::Affinity::Text),
            ("type", crate::value::Affinity::Text),
            ("module", crate::value::Affinity::Text),
            ("sql", crate::value::Affinity::Text),
        ] {
            t.columns.push(Column::new(name, affinity));
        }
        Arc::new(t)
    }

    pub fn register_module(
        &mut self,
        name: impl Into<String>,
        module: Arc<dyn Module>,
        aux: Option<Arc<dyn Any + Send + Sync>>,
    ) {
        self.modules.insert(name.into().to_lowercase(), ModuleRegistration { module, aux });
    }

    pub fn module(&self, name: &str) -> Option<&ModuleRegistration> {
        self.modules.get(&name.to_lowercase())
    }

    pub fn register_function(&mut self, f: Function) {
        self.functions.entry(f.name.to_lowercase()).or_default().push(f);
    }

    /// Exact-arity match first, then a variadic (`arity == -1`) entry.
    /// Prefers a scalar entry; callers that specifically want the aggregate
    /// form (e.g. the compiler's `AggStep` emission) use
    /// [`Catalog::aggregate_function`] instead, since a name like `MIN`/`MAX`
    /// registers both a multi-arg scalar and a single-arg aggregate form.
    pub fn function(&self, name: &str, argc: i32) -> Option<&Function> {
        let candidates = self.functions.get(&name.to_lowercase())?;
        candidates
            .iter()
            .filter(|f| !f.is_aggregate())
            .find(|f| f.arity == argc)
            .or_else(|| candidates.iter().filter(|f| !f.is_aggregate()).find(|f| f.arity == -1))
            .or_else(|| candidates.iter().find(|f| f.arity == argc))
            .or_else(|| candidates.iter().find(|f| f.arity == -1))
    }

    /// The aggregate-kind registration for `name`, if any (spec §4.6.2 step
    /// 5's `AggStep` emission; ignores arity since built-in aggregates are
    /// registered variadic).
    pub fn aggregate_function(&self, name: &str) -> Option<&Function> {
        self.functions.get(&name.to_lowercase())?.iter().find(|f| f.is_aggregate())
    }

    pub fn all_tables(&self) -> Vec<(String, Arc<Table>)> {
        let mut out = Vec::new();
        for (schema, ns) in &self.schemas {
            for t in ns.tables.values() {
                out.push((schema.clone(), t.clone()));
            }
        }
        out
    }

    /// Every attached schema name (`main`, `temp`, plus anything `ATTACH`ed),
    /// used by the JSON schema export (spec §6.5) to group tables per schema.
    pub fn schema_names(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }

    pub fn tables_in_schema(&self, schema: &str) -> Vec<Arc<Table>> {
        self.schemas.get(schema).map(|ns| ns.tables.values().cloned().collect()).unwrap_or_default()
    }

    /// The full function registry, irrespective of arity/kind duplicates —
    /// the catalog has no per-schema function scoping, so every schema's
    /// JSON export (spec §6.5) sees the same global list.
    pub fn all_functions(&self) -> Vec<&Function> {
        self.functions.values().flatten().collect()
    }

    fn namespace_mut(&mut self, schema: &str) -> Result<&mut SchemaNamespace> {
        self.schemas
            .get_mut(schema)
            .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such schema: {}", schema)))
    }

    pub fn create_table(&mut self, schema: &str, stmt: &CreateTableStmt) -> Result<()> {
        let table_name = stmt.name.name.to_lowercase();
        let schema = stmt.name.schema.as_deref().unwrap_or(schema).to_string();
        if self.table(&table_name, Some(&schema)).is_some() {
            if stmt.if_not_exists {
                return Ok(());
            }
            return Err(Error::with_message(
                ErrorCode::Error,
                format!("table {} already exists", table_name),
            ));
        }

        let module_name = self
            .default_vtab_module
            .clone()
            .unwrap_or_else(|| "memory".to_string());

        let mut table = Table::new(schema.clone(), table_name.clone(), module_name);
        table.without_rowid = stmt.without_rowid;
        table.strict = stmt.strict;
        table.temporary = stmt.temporary;
        table.module_args = self.default_vtab_args.clone();

        let (columns, constraints) = match &stmt.definition {
            TableDefinition::Columns { columns, constraints } => (columns, constraints),
            TableDefinition::AsSelect(_) => {
                return Err(Error::with_message(
                    ErrorCode::Error,
                    "CREATE TABLE AS SELECT is not supported",
                ))
            }
        };

        for col in columns {
            let affinity = col
                .type_name
                .as_ref()
                .map(|t| type_affinity(&t.name))
                .unwrap_or(crate::value::Affinity::Blob);
            let mut column = Column::new(col.name.clone(), affinity);
            for c in &col.constraints {
                match &c.kind {
                    ColumnConstraintKind::PrimaryKey { order, .. } => {
                        let desc = matches!(order, Some(crate::parser::ast::SortOrder::Desc));
                        column.primary_key_order = Some((1, desc));
                    }
                    ColumnConstraintKind::NotNull { .. } => column.not_null = true,
                    ColumnConstraintKind::Collate(name) => column.collation = Some(name.clone()),
                    ColumnConstraintKind::Default(default) => {
                        column.default_value = Some(default_to_expr(default));
                    }
                    ColumnConstraintKind::Check(expr) => {
                        table.checks.push(CheckConstraint {
                            expr: (**expr).clone(),
                            applies_to: RowOpMask::ALL,
                        });
                    }
                    ColumnConstraintKind::Generated { .. } => column.generated = true,
                    ColumnConstraintKind::Unique { .. } | ColumnConstraintKind::ForeignKey(_) => {}
                }
            }
            table.columns.push(column);
        }

        for constraint in constraints {
            match &constraint.kind {
                TableConstraintKind::PrimaryKey { columns: pk_cols, .. } => {
                    for (order, ic) in pk_cols.iter().enumerate() {
                        if let IndexedColumnKind::Name(name) = &ic.column {
                            if let Some(idx) = table.column_index(name) {
                                let desc = matches!(ic.order, Some(crate::parser::ast::SortOrder::Desc));
                                table.columns[idx].primary_key_order = Some(((order + 1) as u32, desc));
                            }
                        }
                    }
                }
                TableConstraintKind::Check(expr) => table.checks.push(CheckConstraint {
                    expr: (**expr).clone(),
                    applies_to: RowOpMask::ALL,
                }),
                TableConstraintKind::Unique { .. } | TableConstraintKind::ForeignKey { .. } => {}
            }
        }

        let mut pk: Vec<(usize, bool)> = table
            .columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.primary_key_order.map(|(order, desc)| (order, i, desc)))
            .map(|(order, i, desc)| (order, (i, desc)))
            .collect::<Vec<_>>()
            .into_iter()
            .collect::<std::collections::BTreeMap<_, _>>()
            .into_values()
            .collect();
        table.primary_key.append(&mut pk);

        self.namespace_mut(&schema)?.tables.insert(table_name, Arc::new(table));
        Ok(())
    }

    pub fn drop_table(&mut self, schema: &str, stmt: &DropStmt) -> Result<()> {
        let schema = stmt.name.schema.as_deref().unwrap_or(schema);
        let name = stmt.name.name.to_lowercase();
        let ns = self.namespace_mut(schema)?;
        if ns.tables.remove(&name).is_none() && !stmt.if_exists {
            return Err(Error::with_message(ErrorCode::Error, format!("no such table: {}", name)));
        }
        ns.indexes.retain(|_, idx| !idx.table.eq_ignore_ascii_case(&name));
        Ok(())
    }

    pub fn create_index(&mut self, schema: &str, stmt: &CreateIndexStmt) -> Result<()> {
        let schema = stmt.name.schema.as_deref().unwrap_or(schema).to_string();
        let index_name = stmt.name.name.to_lowercase();
        if self.index(&index_name, Some(&schema)).is_some() {
            if stmt.if_not_exists {
                return Ok(());
            }
            return Err(Error::with_message(
                ErrorCode::Error,
                format!("index {} already exists", index_name),
            ));
        }
        let table = self
            .table(&stmt.table, Some(&schema))
            .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such table: {}", stmt.table)))?;

        let mut index = Index::new(index_name.clone(), stmt.table.clone());
        for ic in &stmt.columns {
            if let IndexedColumnKind::Name(name) = &ic.column {
                let column_index = table
                    .column_index(name)
                    .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such column: {}", name)))?;
                index.columns.push(IndexColumn {
                    column_index,
                    descending: matches!(ic.order, Some(crate::parser::ast::SortOrder::Desc)),
                    collation: ic.collation.clone(),
                });
            }
        }

        let ns = self.namespace_mut(&schema)?;
        if let Some(existing) = ns.tables.get(&stmt.table.to_lowercase()).cloned() {
            let mut updated = (*existing).clone();
            updated.indexes.push(index_name.clone());
            ns.tables.insert(stmt.table.to_lowercase(), Arc::new(updated));
        }
        ns.indexes.insert(index_name, Arc::new(index));
        Ok(())
    }

    pub fn drop_index(&mut self, schema: &str, stmt: &DropStmt) -> Result<()> {
        let schema = stmt.name.schema.as_deref().unwrap_or(schema);
        let name = stmt.name.name.to_lowercase();
        if self.namespace_mut(schema)?.indexes.remove(&name).is_none() && !stmt.if_exists {
            return Err(Error::with_message(ErrorCode::Error, format!("no such index: {}", name)));
        }
        Ok(())
    }

    pub fn create_view(&mut self, schema: &str, stmt: &CreateViewStmt) -> Result<()> {
        let schema = stmt.name.schema.as_deref().unwrap_or(schema).to_string();
        let name = stmt.name.name.to_lowercase();
        if self.table(&name, Some(&schema)).is_some() || self.view(&name, Some(&schema)).is_some() {
            if stmt.if_not_exists {
                return Ok(());
            }
            return Err(Error::with_message(ErrorCode::Error, format!("view {} already exists", name)));
        }
        let view = View {
            schema: schema.clone(),
            name: name.clone(),
            select: (*stmt.query).clone(),
            columns: stmt.columns.clone(),
            sql: String::new(),
        };
        self.namespace_mut(&schema)?.views.insert(name, Arc::new(view));
        Ok(())
    }

    /// Overwrite a table's catalog entry in place, keyed by its *current*
    /// name (used by ALTER TABLE, which mutates columns/name/indexes after
    /// the fact rather than going through `create_table`'s fresh-insert
    /// path).
    pub fn replace_table(&mut self, schema: &str, current_name: &str, table: Arc<Table>) -> Result<()> {
        let ns = self.namespace_mut(schema)?;
        ns.tables.remove(&current_name.to_lowercase());
        ns.tables.insert(table.name.to_lowercase(), table);
        Ok(())
    }

    pub fn drop_view(&mut self, schema: &str, stmt: &DropStmt) -> Result<()> {
        let schema = stmt.name.schema.as_deref().unwrap_or(schema);
        let name = stmt.name.name.to_lowercase();
        if self.namespace_mut(schema)?.views.remove(&name).is_none() && !stmt.if_exists {
            return Err(Error::with_message(ErrorCode::Error, format!("no such view: {}", name)));
        }
        Ok(())
    }
}

fn default_to_expr(d: &crate::parser::ast::DefaultValue) -> crate::parser::ast::Expr {
    use crate::parser::ast::{DefaultValue, Expr};
    match d {
        DefaultValue::Expr(e) => (**e).clone(),
        DefaultValue::Literal(lit) => Expr::Literal(lit.clone()),
        DefaultValue::CurrentTime => Expr::string("CURRENT_TIME"),
        DefaultValue::CurrentDate => Expr::string("CURRENT_DATE"),
        DefaultValue::CurrentTimestamp => Expr::string("CURRENT_TIMESTAMP"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_catalog_has_main_and_temp() {
        let cat = Catalog::new();
        assert_eq!(cat.current_schema(), MAIN_SCHEMA);
        assert!(cat.search_order(None).contains(&TEMP_SCHEMA.to_string()));
    }

    #[test]
    fn schema_pseudo_table_always_resolves() {
        let cat = Catalog::new();
        let t = cat.table(SCHEMA_PSEUDO_TABLE, None).unwrap();
        assert_eq!(t.name, SCHEMA_PSEUDO_TABLE);
        assert!(!t.columns.is_empty());
    }
}
