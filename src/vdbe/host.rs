//! The environment a `Vdbe` runs against: table instances and the function
//! catalog, injected rather than owned directly so the interpreter doesn't
//! need to know how a connection wires up its catalog/registry (spec §6.1's
//! `Connection` is the concrete implementor).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::schema::Function;
use crate::vtab::VTable;

#[async_trait]
pub trait Host: Send + Sync {
    /// The live `VTable` instance this connection uses for `schema.table`,
    /// opened (via the module's `connect`) the first time it's touched. Async
    /// because opening a table may itself call into the module's `connect`
    /// (spec §5's suspension points) and, on the first touch inside an
    /// explicit transaction, `begin()` it.
    async fn table_instance(&self, schema: &str, table: &str) -> Result<Arc<dyn VTable>>;

    fn function(&self, name: &str, argc: i32) -> Option<Function>;
    fn aggregate_function(&self, name: &str) -> Option<Function>;
}
