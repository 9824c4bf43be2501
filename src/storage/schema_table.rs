//! The `_schema` introspection pseudo-table: a read-only view over the
//! catalog itself, addressed the same way any other table is (spec §4.2's
//! `_schema` pseudo-table, always resolvable regardless of search order).
//!
//! Registered like any other module, with the shared catalog handle passed
//! as the module's `aux` value (`Catalog::register_module`'s generic
//! "opaque auxiliary data handed to the module on every `create`/`connect`
//! call") rather than through a bespoke constructor parameter.

use std::any::Any;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::stream;

use crate::error::{Error, ErrorCode, Result};
use crate::schema::{Catalog, Index, Table};
use crate::value::Value;
use crate::vtab::{ConflictPolicy, FilterInfo, IndexInfo, Module, RowStream, SchemaChange, UpdateResult, VTable};

pub struct SchemaModule;

impl SchemaModule {
    pub fn new() -> Arc<Self> {
        Arc::new(SchemaModule)
    }

    fn build(aux: Option<&(dyn Any + Send + Sync)>, schema: &str) -> Result<(Arc<dyn VTable>, Table)> {
        let catalog = aux
            .and_then(|a| a.downcast_ref::<Arc<RwLock<Catalog>>>())
            .cloned()
            .ok_or_else(|| Error::with_message(ErrorCode::Internal, "_schema module requires a Catalog handle as aux"))?;
        let mut table = Table::new(schema, crate::schema::SCHEMA_PSEUDO_TABLE, "_schema");
        for (name, affinity) in [
            ("schema", crate::value::Affinity::Text),
            ("name", crate::value::Affinity::Text),
            ("type", crate::value::Affinity::Text),
            ("module", crate::value::Affinity::Text),
            ("sql", crate::value::Affinity::Text),
        ] {
            table.columns.push(crate::schema::Column::new(name, affinity));
        }
        Ok((Arc::new(SchemaVTable { catalog }), table))
    }
}

#[async_trait]
impl Module for SchemaModule {
    async fn create(
        &self,
        aux: Option<&(dyn Any + Send + Sync)>,
        _module_name: &str,
        schema: &str,
        _name: &str,
        _args: &[String],
    ) -> Result<(Arc<dyn VTable>, Table)> {
        Self::build(aux, schema)
    }

    async fn connect(
        &self,
        aux: Option<&(dyn Any + Send + Sync)>,
        _module_name: &str,
        schema: &str,
        _name: &str,
        _args: &[String],
    ) -> Result<(Arc<dyn VTable>, Table)> {
        Self::build(aux, schema)
    }

    fn best_index(&self, _table: &Table, info: &mut IndexInfo) -> Result<()> {
        info.estimated_cost = 1.0;
        info.estimated_rows = 100;
        Ok(())
    }

    async fn destroy(&self, _aux: Option<&(dyn Any + Send + Sync)>) -> Result<()> {
        Ok(())
    }
}

pub struct SchemaVTable {
    catalog: Arc<RwLock<Catalog>>,
}

#[async_trait]
impl VTable for SchemaVTable {
    async fn query(&self, _filter: FilterInfo) -> Result<RowStream> {
        let catalog = self.catalog.read().unwrap();
        let mut rows = Vec::new();
        for (i, (schema, table)) in catalog.all_tables().into_iter().enumerate() {
            let kind = if table.is_view { "view" } else { "table" };
            rows.push(Ok((
                i as i64,
                vec![
                    Value::Text(schema),
                    Value::Text(table.name.clone()),
                    Value::Text(kind.to_string()),
                    Value::Text(table.module_name.clone()),
                    Value::Null,
                ],
            )));
        }
        Ok(Box::pin(stream::iter(rows)))
    }

    async fn update(&self, _rowid: Option<i64>, _values: Vec<Value>, _policy: ConflictPolicy) -> Result<UpdateResult> {
        Err(Error::with_message(ErrorCode::Readonly, "_schema is read-only"))
    }

    async fn begin(&self) -> Result<()> {
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        Ok(())
    }

    async fn savepoint(&self, _i: i32) -> Result<()> {
        Ok(())
    }

    async fn release(&self, _i: i32) -> Result<()> {
        Ok(())
    }

    async fn rollback_to(&self, _i: i32) -> Result<()> {
        Ok(())
    }

    async fn rename(&self, _new_name: &str) -> Result<()> {
        Err(Error::with_message(ErrorCode::Readonly, "_schema cannot be renamed"))
    }

    async fn alter_schema(&self, _change: SchemaChange) -> Result<()> {
        Err(Error::with_message(ErrorCode::Readonly, "_schema cannot be altered"))
    }

    async fn create_index(&self, _idx: &Index) -> Result<()> {
        Err(Error::with_message(ErrorCode::Readonly, "_schema cannot be indexed"))
    }

    async fn drop_index(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        true
    }
}
