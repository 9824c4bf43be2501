//! A single SQL connection against a `Database`, spec §6.1/§5.
//!
//! Implements `vdbe::Host` (the live table-instance cache a running program
//! drives) and owns the transaction bookkeeping the VDBE itself doesn't:
//! `BEGIN`/`COMMIT`/`ROLLBACK`/`SAVEPOINT`/`RELEASE` never compile to VDBE
//! opcodes here (`compiler::compile` refuses them explicitly) because the
//! existing `VBegin`/`VCommit`/… opcodes only ever act on cursors open
//! within one running program, and no compiler path emits them — every
//! real transaction spans a whole prepared statement's run (or several, for
//! an explicit transaction), not a span of cursor opcodes. So this module
//! drives `VTable::begin`/`commit`/`rollback`/`savepoint`/`release`/
//! `rollback_to` directly against cached table instances instead, mirroring
//! the module-dispatch style of `src/storage/connection.rs`'s
//! `ConnectionState` one layer up the stack.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{Error, ErrorCode, Result};
use crate::parser::ast::{BeginStmt, PragmaStmt, Stmt};
use crate::schema::{Catalog, Function};
use crate::vdbe::Host;
use crate::vtab::VTable;
use crate::{functions, pragma};

use super::database::Database;
use super::stmt::Statement;

type TableKey = (String, String);

#[derive(Default)]
struct TxnState {
    /// `true` once an explicit `BEGIN` has opened a transaction that spans
    /// more than the currently-running statement.
    explicit: bool,
    /// Tables `begin()`-ed for the transaction/statement currently in
    /// flight; drained (committed or rolled back) when that unit ends.
    touched: HashSet<TableKey>,
    /// Open `SAVEPOINT` names in nesting order, each carrying the integer
    /// index handed to `VTable::savepoint`/`release`/`rollback_to`.
    savepoints: Vec<(String, i32)>,
    next_savepoint: i32,
}

/// One SQL connection. Cheap to create; the expensive state (the catalog,
/// the underlying storage) lives in the shared `Database`.
pub struct Connection {
    db: Arc<Database>,
    instances: Mutex<HashMap<TableKey, Arc<dyn VTable>>>,
    txn: Mutex<TxnState>,
    functions: Vec<Function>,
}

impl Connection {
    pub(crate) fn new(db: Arc<Database>) -> Arc<Connection> {
        Arc::new(Connection {
            db,
            instances: Mutex::new(HashMap::new()),
            txn: Mutex::new(TxnState::default()),
            functions: functions::builtins(),
        })
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Parse `sql` and hand back a `Statement` ready for `bind`/`step`. Spec
    /// §6.1's `prepare`.
    pub fn prepare(self: &Arc<Self>, sql: &str) -> Result<Statement> {
        let stmt = crate::parser::grammar::parse(sql)?;
        Ok(Statement::new(self.clone(), stmt))
    }

    /// Run `sql` to completion, discarding any rows it produces. Convenience
    /// for statements the caller doesn't need `column`/`columnName` from.
    pub async fn execute(self: &Arc<Self>, sql: &str) -> Result<()> {
        let mut stmt = self.prepare(sql)?;
        loop {
            match stmt.step().await? {
                super::stmt::StepResult::Row => continue,
                super::stmt::StepResult::Done => return Ok(()),
            }
        }
    }

    /// Handle a transaction-control or `PRAGMA` statement directly, without
    /// going through `compiler::compile` (which refuses these). Returns
    /// `Some` if `stmt` was one of these and has been fully handled.
    pub(crate) async fn try_handle_control_statement(&self, stmt: &Stmt) -> Option<Result<()>> {
        match stmt {
            Stmt::Begin(b) => Some(self.begin(b).await),
            Stmt::Commit => Some(self.commit().await),
            Stmt::Rollback(r) => Some(self.rollback(r.savepoint.as_deref()).await),
            Stmt::Savepoint(name) => Some(self.savepoint(name).await),
            Stmt::Release(name) => Some(self.release(name).await),
            Stmt::Pragma(p) => Some(self.pragma(p).await),
            _ => None,
        }
    }

    async fn begin(&self, _stmt: &BeginStmt) -> Result<()> {
        let mut txn = self.txn.lock().await;
        if txn.explicit {
            return Err(Error::with_message(ErrorCode::Error, "cannot start a transaction within a transaction"));
        }
        txn.explicit = true;
        txn.touched.clear();
        txn.savepoints.clear();
        txn.next_savepoint = 0;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let touched = {
            let mut txn = self.txn.lock().await;
            if !txn.explicit {
                return Err(Error::with_message(ErrorCode::Error, "cannot commit - no transaction is active"));
            }
            txn.explicit = false;
            txn.savepoints.clear();
            std::mem::take(&mut txn.touched)
        };
        self.commit_tables(&touched).await
    }

    async fn rollback(&self, savepoint: Option<&str>) -> Result<()> {
        if let Some(name) = savepoint {
            return self.rollback_to_savepoint(name).await;
        }
        let touched = {
            let mut txn = self.txn.lock().await;
            if !txn.explicit {
                return Err(Error::with_message(ErrorCode::Error, "cannot rollback - no transaction is active"));
            }
            txn.explicit = false;
            txn.savepoints.clear();
            std::mem::take(&mut txn.touched)
        };
        self.rollback_tables(&touched).await
    }

    async fn savepoint(&self, name: &str) -> Result<()> {
        let (idx, instances) = {
            let mut txn = self.txn.lock().await;
            let idx = txn.next_savepoint;
            txn.next_savepoint += 1;
            txn.savepoints.push((name.to_string(), idx));
            txn.explicit = true;
            let touched = txn.touched.clone();
            (idx, touched)
        };
        for key in &instances {
            if let Some(vt) = self.instances.lock().await.get(key).cloned() {
                vt.savepoint(idx).await?;
            }
        }
        Ok(())
    }

    async fn release(&self, name: &str) -> Result<()> {
        let (idx, instances) = {
            let mut txn = self.txn.lock().await;
            let idx = self.find_savepoint(&txn.savepoints, name)?;
            txn.savepoints.retain(|(_, i)| *i < idx);
            (idx, txn.touched.clone())
        };
        for key in &instances {
            if let Some(vt) = self.instances.lock().await.get(key).cloned() {
                vt.release(idx).await?;
            }
        }
        Ok(())
    }

    async fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        let (idx, instances) = {
            let mut txn = self.txn.lock().await;
            let idx = self.find_savepoint(&txn.savepoints, name)?;
            txn.savepoints.retain(|(_, i)| *i <= idx);
            (idx, txn.touched.clone())
        };
        for key in &instances {
            if let Some(vt) = self.instances.lock().await.get(key).cloned() {
                vt.rollback_to(idx).await?;
            }
        }
        Ok(())
    }

    fn find_savepoint(&self, savepoints: &[(String, i32)], name: &str) -> Result<i32> {
        savepoints
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, i)| *i)
            .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such savepoint: {}", name)))
    }

    async fn pragma(&self, stmt: &PragmaStmt) -> Result<()> {
        let mut catalog = self.db.catalog.write().await;
        pragma::apply(&mut catalog, stmt);
        Ok(())
    }

    async fn commit_tables(&self, keys: &HashSet<TableKey>) -> Result<()> {
        for key in keys {
            if let Some(vt) = self.instances.lock().await.get(key).cloned() {
                vt.commit().await?;
            }
        }
        Ok(())
    }

    async fn rollback_tables(&self, keys: &HashSet<TableKey>) -> Result<()> {
        for key in keys {
            if let Some(vt) = self.instances.lock().await.get(key).cloned() {
                vt.rollback().await?;
            }
        }
        Ok(())
    }

    /// Called by `Statement` when a fresh run starts. Outside an explicit
    /// transaction each statement is its own auto-commit unit, so the
    /// touched-table set restarts empty; inside one it keeps accumulating
    /// until `COMMIT`/`ROLLBACK`.
    pub(crate) async fn statement_started(&self) {
        let mut txn = self.txn.lock().await;
        if !txn.explicit {
            txn.touched.clear();
        }
    }

    /// Called when a statement runs to `Done` with no error. Auto-commits
    /// the tables it touched unless an explicit transaction is still open.
    pub(crate) async fn statement_finished(&self) -> Result<()> {
        let touched = {
            let mut txn = self.txn.lock().await;
            if txn.explicit {
                return Ok(());
            }
            std::mem::take(&mut txn.touched)
        };
        self.commit_tables(&touched).await
    }

    /// Called when a statement aborts mid-run. Rolls back whatever it
    /// touched unless an explicit transaction is still open (in which case
    /// the whole transaction, not just this statement, stays pending until
    /// the caller explicitly rolls it back, matching spec §7's "explicit
    /// outer transactions remain intact").
    pub(crate) async fn statement_failed(&self) {
        let touched = {
            let mut txn = self.txn.lock().await;
            if txn.explicit {
                return;
            }
            std::mem::take(&mut txn.touched)
        };
        let _ = self.rollback_tables(&touched).await;
    }
}

#[async_trait]
impl Host for Connection {
    async fn table_instance(&self, schema: &str, table: &str) -> Result<Arc<dyn VTable>> {
        let key = (schema.to_string(), table.to_string());
        if let Some(vt) = self.instances.lock().await.get(&key).cloned() {
            return Ok(vt);
        }

        let (table_def, reg) = {
            let catalog: tokio::sync::RwLockReadGuard<'_, Catalog> = self.db.catalog.read().await;
            let table_def = catalog
                .table(table, Some(schema))
                .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such table: {}.{}", schema, table)))?;
            let reg = catalog
                .module(&table_def.module_name)
                .cloned()
                .ok_or_else(|| Error::with_message(ErrorCode::Error, format!("no such module: {}", table_def.module_name)))?;
            (table_def, reg)
        };

        let (vt, _) = reg
            .module
            .connect(
                Some(&*table_def as &(dyn Any + Send + Sync)),
                &table_def.module_name,
                schema,
                table,
                &table_def.module_args,
            )
            .await?;

        self.instances.lock().await.insert(key.clone(), vt.clone());

        let mut txn = self.txn.lock().await;
        if txn.touched.insert(key) {
            let savepoints = txn.savepoints.clone();
            drop(txn);
            vt.begin().await?;
            for (_, idx) in savepoints {
                vt.savepoint(idx).await?;
            }
        }
        Ok(vt)
    }

    fn function(&self, name: &str, argc: i32) -> Option<Function> {
        let candidates: Vec<&Function> = self.functions.iter().filter(|f| f.name.eq_ignore_ascii_case(name)).collect();
        candidates
            .iter()
            .filter(|f| !f.is_aggregate())
            .find(|f| f.arity == argc)
            .or_else(|| candidates.iter().filter(|f| !f.is_aggregate()).find(|f| f.arity == -1))
            .or_else(|| candidates.iter().find(|f| f.arity == argc))
            .or_else(|| candidates.iter().find(|f| f.arity == -1))
            .map(|f| (*f).clone())
    }

    fn aggregate_function(&self, name: &str) -> Option<Function> {
        self.functions.iter().find(|f| f.name.eq_ignore_ascii_case(name) && f.is_aggregate()).cloned()
    }
}
