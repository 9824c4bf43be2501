//! Views, spec §3.2: a stored SELECT with an optional explicit column list.

use crate::parser::ast::SelectStmt;

#[derive(Debug, Clone)]
pub struct View {
    pub schema: String,
    pub name: String,
    pub select: SelectStmt,
    pub columns: Option<Vec<String>>,
    pub sql: String,
}
