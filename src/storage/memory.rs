//! The in-memory table module: the one concrete `vtab::Module`/`VTable` pair
//! spec §1 calls out as in scope, built on the generic layer/manager/
//! connection/cursor machinery above.
//!
//! Every SQL connection that opens a table calls `connect()` (mirroring a
//! vtab's per-connection `xConnect`), which hands back its own `MemoryTable`
//! wrapping a fresh `ConnectionState` against the table's shared
//! `TableManager` — so two connections touching the same table see the same
//! committed data but independent read snapshots and pending transactions,
//! per spec §4.4.3.
//!
//! `Module::create`/`connect` only take a `module_name`/`schema`/`name`/
//! `args` quadruple in the generic contract; this module repurposes `aux` as
//! the carrier for the freshly parsed `Table` on `create` (the DDL compiler
//! passes `Some(&table)`) and for a `TableKey` on `destroy`, since the
//! generic signature has no table name parameter there.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::error::{Error, ErrorCode, Result};
use crate::schema::{Index, Table};
use crate::storage::connection::ConnectionState;
use crate::storage::layer::{self as layer, EncodedKey, Layer, LayerRef, Modification, RowTuple};
use crate::storage::manager::TableManager;
use crate::value::{Collation, Value};
use crate::vtab::{
    ConflictPolicy, ConstraintOp, ConstraintUsage, FilterInfo, IndexInfo, Module, RowStream, SchemaChange, UpdateResult, VTable,
};

/// `(schema, name)` pair passed as `aux` to `Module::destroy`, which has no
/// other way to learn which table is being torn down.
pub struct TableKey {
    pub schema: String,
    pub name: String,
}

/// The module factory: owns the registry of live `TableManager`s keyed by
/// `"schema.name"`, so repeated `connect()` calls for the same table (from
/// different SQL connections, or after a schema reload) share one
/// `BaseLayer` rather than each getting their own empty table.
pub struct MemoryModule {
    tables: Mutex<HashMap<String, Arc<TableManager>>>,
}

impl MemoryModule {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryModule { tables: Mutex::new(HashMap::new()) })
    }

    fn key(schema: &str, name: &str) -> String {
        format!("{}.{}", schema, name)
    }

    fn instantiate(manager: Arc<TableManager>) -> (Arc<dyn VTable>, Table) {
        let table = manager.schema.read().unwrap().as_ref().clone();
        let conn = manager.new_connection();
        (
            Arc::new(MemoryTable {
                manager,
                conn,
                indexes: Mutex::new(Vec::new()),
            }),
            table,
        )
    }
}

#[async_trait]
impl Module for MemoryModule {
    async fn create(
        &self,
        aux: Option<&(dyn std::any::Any + Send + Sync)>,
        module_name: &str,
        schema: &str,
        name: &str,
        _args: &[String],
    ) -> Result<(Arc<dyn VTable>, Table)> {
        let table = aux
            .and_then(|a| a.downcast_ref::<Table>())
            .cloned()
            .unwrap_or_else(|| Table::new(schema, name, module_name));
        let manager = TableManager::new(Arc::new(table));
        self.tables.lock().unwrap().insert(Self::key(schema, name), manager.clone());
        Ok(Self::instantiate(manager))
    }

    async fn connect(
        &self,
        aux: Option<&(dyn std::any::Any + Send + Sync)>,
        module_name: &str,
        schema: &str,
        name: &str,
        args: &[String],
    ) -> Result<(Arc<dyn VTable>, Table)> {
        let existing = self.tables.lock().unwrap().get(&Self::key(schema, name)).cloned();
        match existing {
            Some(manager) => Ok(Self::instantiate(manager)),
            None => self.create(aux, module_name, schema, name, args).await,
        }
    }

    /// A deliberately naive planner: an equality constraint on the leading
    /// primary-key column is worth a point lookup, everything else is a full
    /// scan. Richer index selection belongs to the compiler's `planner.rs`,
    /// which can call this repeatedly while comparing `estimated_cost`
    /// across registered indexes.
    fn best_index(&self, table: &Table, info: &mut IndexInfo) -> Result<()> {
        let leading_pk = table.primary_key.first().map(|(idx, _)| *idx as i32);
        for (i, c) in info.constraints.iter().enumerate() {
            if !c.usable {
                continue;
            }
            if Some(c.column_index) == leading_pk && c.op == ConstraintOp::Eq {
                info.constraint_usage[i] = ConstraintUsage { argv_index: 1, omit: true };
                info.idx_num = 1;
                info.estimated_cost = 1.0;
                info.estimated_rows = 1;
                return Ok(());
            }
        }
        info.estimated_cost = 1_000_000.0;
        info.estimated_rows = 1_000_000;
        Ok(())
    }

    async fn destroy(&self, aux: Option<&(dyn std::any::Any + Send + Sync)>) -> Result<()> {
        if let Some(key) = aux.and_then(|a| a.downcast_ref::<TableKey>()) {
            self.tables.lock().unwrap().remove(&Self::key(&key.schema, &key.name));
        }
        Ok(())
    }
}

/// A live table instance bound to one `ConnectionState`. `indexes` is this
/// connection's view of the table's secondary indexes; `create_index`/
/// `drop_index` are schema-change hooks so every open instance is kept in
/// sync through the same `schema_latch`-guarded protocol.
pub struct MemoryTable {
    manager: Arc<TableManager>,
    conn: Arc<ConnectionState>,
    indexes: Mutex<Vec<Index>>,
}

impl MemoryTable {
    fn table_snapshot(&self) -> Arc<Table> {
        self.manager.schema.read().unwrap().clone()
    }

    /// Resolve the rowid a write should use: an explicit `INTEGER PRIMARY
    /// KEY` value in `values` wins, otherwise `preferred` (the row's current
    /// rowid, for an update), otherwise a freshly allocated one (spec
    /// §4.4.7).
    fn resolve_rowid(&self, table: &Table, preferred: Option<i64>, values: &[Value]) -> i64 {
        if table.has_rowid_alias() && table.primary_key.len() == 1 {
            let (idx, _) = table.primary_key[0];
            if let Some(Value::Integer(n)) = values.get(idx) {
                return *n;
            }
        }
        preferred.unwrap_or_else(|| self.manager.allocate_rowid())
    }

    fn apply(&self, rowid: Option<i64>, values: Vec<Value>, policy: ConflictPolicy) -> Result<UpdateResult> {
        let table = self.table_snapshot();
        let layer = self.conn.pending_transaction()?;

        match (rowid, values.is_empty()) {
            (Some(old_rowid), true) => {
                self.delete_row(&table, &layer, old_rowid);
                Ok(None)
            }
            (None, _) => self.insert_row(&table, &layer, None, values, policy),
            (Some(old_rowid), false) => {
                self.delete_row(&table, &layer, old_rowid);
                self.insert_row(&table, &layer, Some(old_rowid), values, policy)
            }
        }
    }

    fn insert_row(
        &self,
        table: &Table,
        txn_layer: &LayerRef,
        preferred_rowid: Option<i64>,
        values: Vec<Value>,
        policy: ConflictPolicy,
    ) -> Result<UpdateResult> {
        let rowid = self.resolve_rowid(table, preferred_rowid, &values);
        let key = primary_key_bytes(table, rowid, &values);
        if let Some(existing) = layer::effective_lookup(txn_layer, None, &key) {
            if let Some(old_row) = existing.row() {
                return match policy {
                    ConflictPolicy::Ignore => Ok(None),
                    ConflictPolicy::Replace => {
                        let old_row = old_row.clone();
                        self.remove_secondary_entries(txn_layer, &old_row);
                        self.write_row(txn_layer, rowid, key, values);
                        Ok(Some(rowid))
                    }
                    _ => Err(Error::with_message(ErrorCode::Constraint, "UNIQUE constraint failed")),
                };
            }
        }
        self.write_row(txn_layer, rowid, key, values);
        Ok(Some(rowid))
    }

    fn write_row(&self, txn_layer: &LayerRef, rowid: i64, key: EncodedKey, values: Vec<Value>) {
        let Layer::Transaction(txn) = &**txn_layer else {
            unreachable!("pending layer is always a TransactionLayer")
        };
        let row: RowTuple = (rowid, values);
        txn.record_primary(key, Modification::Upsert(row.clone()));
        for idx in self.indexes.lock().unwrap().iter() {
            let idx_key = index_key_for_row(idx, &row.1, rowid);
            txn.record_secondary(&idx.name, idx_key, Modification::Upsert(row.clone()));
        }
    }

    fn delete_row(&self, table: &Table, txn_layer: &LayerRef, rowid: i64) {
        let Some((key, row)) = resolve_by_rowid(txn_layer, table.has_rowid_alias(), rowid) else {
            return;
        };
        let Layer::Transaction(txn) = &**txn_layer else {
            unreachable!("pending layer is always a TransactionLayer")
        };
        txn.record_primary(key.clone(), Modification::Deleted { original_key: key, rowid });
        txn.mark_rowid_deleted(rowid);
        self.remove_secondary_entries(txn_layer, &row);
    }

    fn remove_secondary_entries(&self, txn_layer: &LayerRef, row: &RowTuple) {
        let Layer::Transaction(txn) = &**txn_layer else {
            unreachable!("pending layer is always a TransactionLayer")
        };
        for idx in self.indexes.lock().unwrap().iter() {
            let idx_key = index_key_for_row(idx, &row.1, row.0);
            txn.record_secondary(
                &idx.name,
                idx_key.clone(),
                Modification::Deleted { original_key: idx_key, rowid: row.0 },
            );
        }
    }
}

/// WITHOUT ROWID tables key rows by their composite user key, not the rowid,
/// so finding a row by its rowid handle means walking the layer chain
/// looking for the insert/delete that last touched it (spec §4.4.1's
/// `rowid_to_key` map covers only the committed `BaseLayer`; this extends the
/// same lookup through any still-pending layers on top of it).
fn resolve_by_rowid(start: &LayerRef, has_rowid_alias: bool, rowid: i64) -> Option<(EncodedKey, RowTuple)> {
    if has_rowid_alias {
        let key = layer::encode_rowid(rowid);
        return layer::effective_lookup(start, None, &key).and_then(|m| m.row().cloned()).map(|row| (key, row));
    }
    let mut cur = start.clone();
    loop {
        match &*cur {
            Layer::Transaction(t) => {
                let mods = t.primary_mods.lock().unwrap();
                for (k, m) in mods.iter() {
                    match m {
                        Modification::Upsert(row) if row.0 == rowid => return Some((k.clone(), row.clone())),
                        Modification::Deleted { rowid: r, .. } if *r == rowid => return None,
                        _ => {}
                    }
                }
                let parent = t.parent.clone();
                drop(mods);
                cur = parent;
            }
            Layer::Base(base) => {
                let base = base.lock().unwrap();
                let key = base.rowid_to_key.as_ref()?.get(&rowid)?.clone();
                let row = base.primary.get(&key).cloned()?;
                return Some((key, row));
            }
        }
    }
}

fn column_collation(table: &Table, column_index: usize) -> Collation {
    table.columns[column_index]
        .collation
        .as_deref()
        .and_then(|n| Collation::by_name(n).ok())
        .unwrap_or(Collation::Binary)
}

fn primary_key_bytes(table: &Table, rowid: i64, values: &[Value]) -> EncodedKey {
    if table.without_rowid {
        let vals: Vec<Value> = table.primary_key.iter().map(|(i, _)| values[*i].clone()).collect();
        let dirs: Vec<bool> = table.primary_key.iter().map(|(_, desc)| *desc).collect();
        let collations: Vec<Collation> = table.primary_key.iter().map(|(i, _)| column_collation(table, *i)).collect();
        layer::encode_primary_key(&vals, &dirs, &collations)
    } else {
        layer::encode_rowid(rowid)
    }
}

fn index_key_for_row(idx: &Index, values: &[Value], rowid: i64) -> EncodedKey {
    let vals: Vec<Value> = idx.columns.iter().map(|c| values[c.column_index].clone()).collect();
    let dirs: Vec<bool> = idx.columns.iter().map(|c| c.descending).collect();
    let collations: Vec<Collation> = idx
        .columns
        .iter()
        .map(|c| c.collation.as_deref().and_then(|n| Collation::by_name(n).ok()).unwrap_or(Collation::Binary))
        .collect();
    layer::encode_index_key(&vals, &dirs, &collations, rowid)
}

#[async_trait]
impl VTable for MemoryTable {
    async fn query(&self, filter: FilterInfo) -> Result<RowStream> {
        let rows = crate::storage::cursor::scan(&self.conn.active_layer(), &filter.plan, Collation::Binary);
        Ok(Box::pin(stream::iter(rows.into_iter().map(Ok))))
    }

    async fn update(&self, rowid: Option<i64>, values: Vec<Value>, policy: ConflictPolicy) -> Result<UpdateResult> {
        let autocommit = !self.conn.in_transaction();
        if autocommit {
            self.conn.begin()?;
        }
        let outcome = self.apply(rowid, values, policy);
        if autocommit {
            match &outcome {
                Ok(_) => self.conn.commit()?,
                Err(_) => self.conn.rollback(),
            }
        }
        outcome
    }

    async fn begin(&self) -> Result<()> {
        self.conn.begin()
    }

    async fn commit(&self) -> Result<()> {
        self.conn.commit()
    }

    async fn rollback(&self) -> Result<()> {
        self.conn.rollback();
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        Ok(())
    }

    /// `i` is the VDBE's savepoint nesting level; `ConnectionState` tracks
    /// its own stack index in lockstep, so the two always agree.
    async fn savepoint(&self, _i: i32) -> Result<()> {
        self.conn.savepoint()?;
        Ok(())
    }

    async fn release(&self, i: i32) -> Result<()> {
        self.conn.release(i as usize)
    }

    async fn rollback_to(&self, i: i32) -> Result<()> {
        self.conn.rollback_to(i as usize)
    }

    async fn rename(&self, new_name: &str) -> Result<()> {
        self.manager.begin_schema_change()?;
        let mut guard = self.manager.schema.write().unwrap();
        let mut updated = (**guard).clone();
        updated.name = new_name.to_string();
        *guard = Arc::new(updated);
        Ok(())
    }

    async fn alter_schema(&self, change: SchemaChange) -> Result<()> {
        self.manager.begin_schema_change()?;
        let mut guard = self.manager.schema.write().unwrap();
        let mut updated = (**guard).clone();
        match change {
            SchemaChange::AddColumn(col) => updated.columns.push(col),
            SchemaChange::DropColumn(name) => {
                updated.columns.retain(|c| !c.name.eq_ignore_ascii_case(&name));
            }
            SchemaChange::RenameColumn { from, to } => {
                if let Some(col) = updated.columns.iter_mut().find(|c| c.name.eq_ignore_ascii_case(&from)) {
                    col.name = to;
                }
            }
        }
        *guard = Arc::new(updated);
        Ok(())
    }

    async fn create_index(&self, idx: &Index) -> Result<()> {
        self.manager.begin_schema_change()?;
        self.indexes.lock().unwrap().push(idx.clone());
        let entries: Vec<(EncodedKey, RowTuple)> = {
            let Layer::Base(base) = &*self.manager.base else {
                unreachable!("TableManager::base is always a BaseLayer")
            };
            base.lock().unwrap().primary.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        let Layer::Base(base) = &*self.manager.base else {
            unreachable!("TableManager::base is always a BaseLayer")
        };
        let mut base = base.lock().unwrap();
        for (_, row) in entries {
            let key = index_key_for_row(idx, &row.1, row.0);
            base.apply(Some(&idx.name), key, Modification::Upsert(row));
        }
        Ok(())
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        self.manager.begin_schema_change()?;
        self.indexes.lock().unwrap().retain(|idx| idx.name != name);
        if let Layer::Base(base) = &*self.manager.base {
            base.lock().unwrap().secondary.remove(name);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Table;
    use crate::value::Affinity;
    use futures::StreamExt;

    fn int_table(name: &str) -> Table {
        let mut t = Table::new("main", name, "memory");
        t.columns.push(crate::schema::Column::new("id", Affinity::Integer));
        t.columns.push(crate::schema::Column::new("val", Affinity::Text));
        t.primary_key = vec![(0, false)];
        t
    }

    #[tokio::test]
    async fn insert_then_query_sees_row_autocommit() {
        let module = MemoryModule::new();
        let table = int_table("t");
        let (vtab, _) = module.create(Some(&table), "memory", "main", "t", &[]).await.unwrap();

        vtab.update(None, vec![Value::Integer(1), Value::Text("a".into())], ConflictPolicy::Abort)
            .await
            .unwrap();

        let filter = FilterInfo {
            plan: crate::vtab::ScanPlan {
                index_name: None,
                descending: false,
                equality_key: None,
                lower_bound: None,
                upper_bound: None,
                idx_num: 0,
                idx_str: None,
            },
            args: vec![],
        };
        let rows: Vec<_> = vtab.query(filter).await.unwrap().collect().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_ref().unwrap().0, 1);
    }

    #[tokio::test]
    async fn concurrent_connections_do_not_see_uncommitted_writes() {
        let module = MemoryModule::new();
        let table = int_table("t2");
        let (vtab_a, _) = module.create(Some(&table), "memory", "main", "t2", &[]).await.unwrap();
        let (vtab_b, _) = module.connect(None, "memory", "main", "t2", &[]).await.unwrap();

        vtab_a.begin().await.unwrap();
        vtab_a
            .update(None, vec![Value::Integer(1), Value::Text("a".into())], ConflictPolicy::Abort)
            .await
            .unwrap();

        let filter = || FilterInfo {
            plan: crate::vtab::ScanPlan {
                index_name: None,
                descending: false,
                equality_key: None,
                lower_bound: None,
                upper_bound: None,
                idx_num: 0,
                idx_str: None,
            },
            args: vec![],
        };
        let rows_b: Vec<_> = vtab_b.query(filter()).await.unwrap().collect().await;
        assert!(rows_b.is_empty());

        vtab_a.commit().await.unwrap();
        let rows_b_after: Vec<_> = vtab_b.query(filter()).await.unwrap().collect().await;
        assert_eq!(rows_b_after.len(), 1);
    }

    #[tokio::test]
    async fn replace_policy_overwrites_conflicting_primary_key() {
        let module = MemoryModule::new();
        let table = int_table("t3");
        let (vtab, _) = module.create(Some(&table), "memory", "main", "t3", &[]).await.unwrap();

        vtab.update(None, vec![Value::Integer(1), Value::Text("a".into())], ConflictPolicy::Abort)
            .await
            .unwrap();
        let err = vtab
            .update(None, vec![Value::Integer(1), Value::Text("b".into())], ConflictPolicy::Abort)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Constraint);

        vtab.update(None, vec![Value::Integer(1), Value::Text("b".into())], ConflictPolicy::Replace)
            .await
            .unwrap();
        let filter = FilterInfo {
            plan: crate::vtab::ScanPlan {
                index_name: None,
                descending: false,
                equality_key: None,
                lower_bound: None,
                upper_bound: None,
                idx_num: 0,
                idx_str: None,
            },
            args: vec![],
        };
        let rows: Vec<_> = vtab.query(filter).await.unwrap().collect().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_ref().unwrap().1[1], Value::Text("b".into()));
    }
}
