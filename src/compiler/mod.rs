//! Query compiler (C6), spec §4.6.
//!
//! Lowers a parsed `Stmt` into a `vdbe::Program`. One submodule per
//! statement family: `select` (the hardest part, spec §4.6.2-§4.6.4),
//! `dml` (INSERT/UPDATE/DELETE, spec §4.6.5), `ddl` (CREATE/DROP/ALTER,
//! which mutate the `Catalog` directly rather than running through the
//! VDBE), plus the `expr`/`planner` helpers both of those share.

pub mod ddl;
pub mod dml;
pub mod expr;
pub mod planner;
pub mod select;
pub mod window;

use std::sync::Arc;

use crate::error::{Error, ErrorCode, Result};
use crate::parser::ast::Stmt;
use crate::schema::Catalog;
use crate::vdbe::Program;

/// The result of compiling one statement: a ready-to-run program, the
/// display names of its result columns (empty for statements that produce
/// no rows), and whether it can ever write.
pub struct Compiled {
    pub program: Arc<Program>,
    pub column_names: Vec<String>,
    pub readonly: bool,
}

/// Lower one parsed statement into a runnable program, dispatching to the
/// submodule that owns its statement family. Transaction-control statements
/// (`BEGIN`/`COMMIT`/`ROLLBACK`/`SAVEPOINT`/`RELEASE`) and `PRAGMA` are not
/// compiled here — the embedding `Connection` (spec §6.1) handles those
/// directly against the storage layer/catalog without going through the
/// VDBE, since they have no rows to produce and no cursors to drive.
pub async fn compile(catalog: &mut Catalog, stmt: &Stmt) -> Result<Compiled> {
    match stmt {
        Stmt::Select(s) => select::compile_select(catalog, s),
        Stmt::Insert(s) => dml::compile_insert(catalog, s),
        Stmt::Update(s) => dml::compile_update(catalog, s),
        Stmt::Delete(s) => dml::compile_delete(catalog, s),
        Stmt::CreateTable(s) => ddl::compile_create_table(catalog, s).await,
        Stmt::CreateIndex(s) => ddl::compile_create_index(catalog, s),
        Stmt::CreateView(s) => ddl::compile_create_view(catalog, s),
        Stmt::DropTable(s) => ddl::compile_drop_table(catalog, s).await,
        Stmt::DropIndex(s) => ddl::compile_drop_index(catalog, s),
        Stmt::DropView(s) => ddl::compile_drop_view(catalog, s),
        Stmt::AlterTable(s) => ddl::compile_alter_table(catalog, s).await,
        Stmt::CreateTrigger(_) | Stmt::DropTrigger(_) => {
            Err(Error::with_message(ErrorCode::Error, "triggers are not supported"))
        }
        Stmt::Vacuum(_) | Stmt::Analyze(_) | Stmt::Reindex(_) | Stmt::Attach(_) | Stmt::Detach(_) => {
            Err(Error::with_message(ErrorCode::Error, "statement is not supported"))
        }
        Stmt::Explain(_) | Stmt::ExplainQueryPlan(_) => {
            Err(Error::with_message(ErrorCode::Error, "EXPLAIN is not supported"))
        }
        Stmt::Begin(_)
        | Stmt::Commit
        | Stmt::Rollback(_)
        | Stmt::Savepoint(_)
        | Stmt::Release(_)
        | Stmt::Pragma(_) => Err(Error::with_message(
            ErrorCode::Misuse,
            "transaction-control and PRAGMA statements are handled by the connection, not the compiler",
        )),
    }
}
