//! Virtual-table contract (C3), spec §4.3 and §6.3/§6.4.
//!
//! A module is the factory (`create`/`connect`/`bestIndex`/`destroy`); a
//! table instance is the live object the compiler's cursors drive through
//! `VFilter`/`VNext`/`VUpdate` and friends. Every method the spec marks as a
//! suspension point (`query`, `update`, `begin`, `commit`, `rollback`,
//! `sync`) is `async`, following the teacher's `async-trait` + `tokio` /
//! `futures` idiom (see `estuary-flow`).

use std::any::Any;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;
use crate::schema::Table;
use crate::value::Value;

/// Constraint operators a module's `bestIndex` may see in `IndexInfo`
/// (spec §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConstraintOp {
    Eq = 2,
    Gt = 4,
    Le = 8,
    Lt = 16,
    Ge = 32,
    Match = 64,
    Like = 65,
    Glob = 66,
    Regexp = 67,
    Ne = 68,
    IsNot = 69,
    IsNotNull = 70,
    IsNull = 71,
    Is = 72,
    Limit = 73,
    Offset = 74,
}

/// One usable constraint on a column, as supplied to `bestIndex`.
#[derive(Debug, Clone, Copy)]
pub struct Constraint {
    pub column_index: i32,
    pub op: ConstraintOp,
    pub usable: bool,
}

/// One ORDER BY term, as supplied to `bestIndex`.
#[derive(Debug, Clone, Copy)]
pub struct OrderByTerm {
    pub column_index: i32,
    pub descending: bool,
}

/// How a chosen constraint is consumed, filled in by `bestIndex`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintUsage {
    /// 1-based position of this constraint's value in the `argv` array
    /// `query` receives; 0 means unconsumed.
    pub argv_index: i32,
    /// If true, the VDBE may skip re-verifying this constraint on the rows
    /// the module returns.
    pub omit: bool,
}

/// The planning contract a module's `bestIndex` reads and fills in,
/// spec §6.3.
#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub constraints: Vec<Constraint>,
    pub order_by: Vec<OrderByTerm>,

    pub idx_num: i32,
    pub idx_str: Option<String>,
    pub constraint_usage: Vec<ConstraintUsage>,
    pub order_by_consumed: bool,
    pub estimated_cost: f64,
    pub estimated_rows: i64,
    pub idx_flags: i32,
}

impl IndexInfo {
    pub fn new(constraints: Vec<Constraint>, order_by: Vec<OrderByTerm>) -> Self {
        let n = constraints.len();
        IndexInfo {
            constraints,
            order_by,
            idx_num: 0,
            idx_str: None,
            constraint_usage: vec![ConstraintUsage::default(); n],
            order_by_consumed: false,
            estimated_cost: f64::MAX,
            estimated_rows: i64::MAX,
            idx_flags: 0,
        }
    }
}

/// The scan descriptor passed to `query`, built by the compiler from the
/// `bestIndex` decision (spec §6.3).
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub index_name: Option<String>,
    pub descending: bool,
    pub equality_key: Option<Vec<Value>>,
    pub lower_bound: Option<Value>,
    pub upper_bound: Option<Value>,
    pub idx_num: i32,
    pub idx_str: Option<String>,
}

/// Everything `query` needs: the scan plan plus the argument values the
/// compiler assembled in the order the planner requested (spec §4.3).
#[derive(Debug, Clone)]
pub struct FilterInfo {
    pub plan: ScanPlan,
    pub args: Vec<Value>,
}

/// Conflict-resolution policy, spec §6.4, carried through `VUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConflictPolicy {
    Rollback = 1,
    Ignore = 2,
    Fail = 3,
    Abort = 4,
    Replace = 5,
}

/// A row as the module returns it during a scan: its rowid (or composite key
/// position for WITHOUT ROWID tables) and its column values.
pub type Row = (i64, Vec<Value>);

pub type RowStream = Pin<Box<dyn Stream<Item = Result<Row>> + Send>>;

/// The unified mutation result: the assigned rowid on insert, `None`
/// otherwise.
pub type UpdateResult = Option<i64>;

/// A live table instance, spec §4.3's "table instance". Implemented once per
/// concrete storage backend (the in-memory layered MVCC module is one such
/// backend, see `crate::storage`).
#[async_trait]
pub trait VTable: Send + Sync {
    async fn query(&self, filter: FilterInfo) -> Result<RowStream>;

    /// Unified mutation: `rowid.is_some() && values.is_empty()` is a delete;
    /// `rowid.is_none()` is an insert; otherwise an update.
    async fn update(&self, rowid: Option<i64>, values: Vec<Value>, policy: ConflictPolicy) -> Result<UpdateResult>;

    async fn begin(&self) -> Result<()>;
    async fn commit(&self) -> Result<()>;
    async fn rollback(&self) -> Result<()>;
    async fn sync(&self) -> Result<()>;

    async fn savepoint(&self, i: i32) -> Result<()>;
    async fn release(&self, i: i32) -> Result<()>;
    async fn rollback_to(&self, i: i32) -> Result<()>;

    async fn rename(&self, new_name: &str) -> Result<()>;
    async fn alter_schema(&self, change: SchemaChange) -> Result<()>;
    async fn create_index(&self, idx: &crate::schema::Index) -> Result<()>;
    async fn drop_index(&self, name: &str) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;

    fn is_read_only(&self) -> bool {
        false
    }
}

/// A schema-change descriptor passed to `alterSchema` (spec §4.3/§4.4.8).
#[derive(Debug, Clone)]
pub enum SchemaChange {
    AddColumn(crate::schema::Column),
    DropColumn(String),
    RenameColumn { from: String, to: String },
}

/// The module factory, spec §4.3. `bestIndex` is synchronous: planning never
/// suspends (spec §5 lists only I/O-bearing methods as suspension points).
#[async_trait]
pub trait Module: Send + Sync {
    async fn create(
        &self,
        aux: Option<&(dyn Any + Send + Sync)>,
        module_name: &str,
        schema: &str,
        name: &str,
        args: &[String],
    ) -> Result<(std::sync::Arc<dyn VTable>, Table)>;

    async fn connect(
        &self,
        aux: Option<&(dyn Any + Send + Sync)>,
        module_name: &str,
        schema: &str,
        name: &str,
        args: &[String],
    ) -> Result<(std::sync::Arc<dyn VTable>, Table)>;

    fn best_index(&self, table: &Table, info: &mut IndexInfo) -> Result<()>;

    async fn destroy(&self, aux: Option<&(dyn Any + Send + Sync)>) -> Result<()>;
}
