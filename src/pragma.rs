//! PRAGMA handling, spec §6.6.
//!
//! Scoped to the two pragmas the spec actually gives meaning to —
//! `default_vtab_module` and `default_vtab_args`, which steer a bare
//! `CREATE TABLE` at the catalog (`Catalog::default_vtab_module`/
//! `default_vtab_args`, spec §4.2). Every other pragma name is a no-op,
//! mirroring `src/executor/pragma.rs`'s introspection pragmas but without
//! reproducing their schema-dump surface, which this crate's thin
//! `Connection` (spec §6.1) has no use for.

use crate::error::Result;
use crate::parser::ast::{Expr, Literal, PragmaStmt, PragmaValue};
use crate::schema::Catalog;

/// Apply one parsed `PRAGMA` statement to the catalog. Always succeeds —
/// an unrecognized name or a malformed value is simply ignored, per spec
/// §6.6's "unknown pragmas are no-ops".
pub fn apply(catalog: &mut Catalog, stmt: &PragmaStmt) {
    let Some(value) = &stmt.value else { return };
    let expr = match value {
        PragmaValue::Set(e) | PragmaValue::Call(e) => e,
    };

    match stmt.name.to_lowercase().as_str() {
        "default_vtab_module" => {
            if let Some(name) = literal_string(expr) {
                catalog.default_vtab_module = Some(name);
            }
        }
        "default_vtab_args" => {
            if let Some(json) = literal_string(expr) {
                if let Ok(args) = parse_json_string_array(&json) {
                    catalog.default_vtab_args = args;
                }
            }
        }
        _ => {}
    }
}

fn literal_string(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Literal(Literal::String(s)) => Some(s.clone()),
        Expr::Column(col) => Some(col.column.clone()),
        _ => None,
    }
}

fn parse_json_string_array(s: &str) -> Result<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(s)
        .map_err(|e| crate::error::Error::with_message(crate::error::ErrorCode::Error, e.to_string()))?;
    let arr = value
        .as_array()
        .ok_or_else(|| crate::error::Error::with_message(crate::error::ErrorCode::Error, "default_vtab_args must be a JSON array"))?;
    Ok(arr
        .iter()
        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::ColumnRef;

    fn pragma(name: &str, value: Expr) -> PragmaStmt {
        PragmaStmt { schema: None, name: name.to_string(), value: Some(PragmaValue::Set(value)) }
    }

    #[test]
    fn sets_default_vtab_module_from_bareword_or_string() {
        let mut cat = Catalog::new();
        apply(&mut cat, &pragma("default_vtab_module", Expr::string("logtable")));
        assert_eq!(cat.default_vtab_module.as_deref(), Some("logtable"));

        let mut cat = Catalog::new();
        apply(
            &mut cat,
            &pragma(
                "default_vtab_module",
                Expr::Column(ColumnRef { database: None, table: None, column: "logtable".to_string() }),
            ),
        );
        assert_eq!(cat.default_vtab_module.as_deref(), Some("logtable"));
    }

    #[test]
    fn sets_default_vtab_args_from_json_array() {
        let mut cat = Catalog::new();
        apply(&mut cat, &pragma("default_vtab_args", Expr::string("[\"a\", \"b\"]")));
        assert_eq!(cat.default_vtab_args, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn unknown_pragma_is_a_noop() {
        let mut cat = Catalog::new();
        apply(&mut cat, &pragma("cache_size", Expr::int(2000)));
        assert!(cat.default_vtab_module.is_none());
    }
}
