//! JSON schema export, spec §6.5.
//!
//! A versioned snapshot of the catalog's tables and registered functions,
//! grouped by schema: `{schemaVersion:1, schemas:{<name>:{tables:[…],
//! functions:[…]}}}`. Functions travel by signature only (name + arity) —
//! their callback pointers obviously don't survive serialization, so a
//! caller re-registering a function after import must supply its own
//! implementation, per spec §6.5's "re-registered out-of-band on import".
//!
//! Grounded on `src/executor/pragma.rs`'s `PragmaResult` column/type-list
//! convention for how the teacher shapes introspection output, built here
//! with `serde_json` the way the pack's catalog-export examples do rather
//! than hand-rolled string concatenation.

use serde_json::{json, Value as Json};

use crate::schema::{Catalog, Column, Table};
use crate::value::Affinity;

const SCHEMA_VERSION: i64 = 1;

pub fn export(catalog: &Catalog) -> Json {
    let mut schemas = serde_json::Map::new();
    for name in catalog.schema_names() {
        let tables: Vec<Json> = catalog.tables_in_schema(&name).iter().map(|t| table_json(t)).collect();
        let functions: Vec<Json> = catalog.all_functions().iter().map(|f| json!({"name": f.name, "arity": f.arity})).collect();
        schemas.insert(name, json!({"tables": tables, "functions": functions}));
    }
    json!({"schemaVersion": SCHEMA_VERSION, "schemas": Json::Object(schemas)})
}

fn table_json(t: &Table) -> Json {
    json!({
        "name": t.name,
        "module": t.module_name,
        "withoutRowid": t.without_rowid,
        "strict": t.strict,
        "columns": t.columns.iter().map(column_json).collect::<Vec<_>>(),
    })
}

fn column_json(c: &Column) -> Json {
    json!({
        "name": c.name,
        "affinity": affinity_name(c.affinity),
        "notNull": c.not_null,
        "primaryKeyOrder": c.primary_key_order.map(|(order, desc)| json!({"order": order, "desc": desc})),
        "default": c.default_value.as_ref().map(default_json).unwrap_or(Json::Null),
        "collation": c.collation,
    })
}

fn affinity_name(a: Affinity) -> &'static str {
    match a {
        Affinity::Integer => "INTEGER",
        Affinity::Real => "REAL",
        Affinity::Text => "TEXT",
        Affinity::Blob => "BLOB",
        Affinity::Numeric => "NUMERIC",
    }
}

/// Column defaults as spec §6.5 prescribes: scalars as JSON numbers/null,
/// big integers as `"<digits>n"`, blobs as `"x'<hex>'"`. A non-literal
/// default (e.g. `CURRENT_TIMESTAMP`, or an arbitrary expression) has no
/// representation in this format and exports as `null`.
fn default_json(expr: &crate::parser::ast::Expr) -> Json {
    use crate::parser::ast::{Expr, Literal};
    match expr {
        Expr::Literal(Literal::Null) => Json::Null,
        Expr::Literal(Literal::Integer(i)) => json!(i),
        Expr::Literal(Literal::Float(f)) => json!(f),
        Expr::Literal(Literal::Bool(b)) => json!(b),
        Expr::Literal(Literal::String(s)) => json!(s),
        Expr::Literal(Literal::Blob(b)) => json!(format!("x'{}'", hex_encode(b))),
        _ => Json::Null,
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::{CreateTableStmt, QualifiedName};

    #[test]
    fn exports_version_and_known_schemas() {
        let cat = Catalog::new();
        let out = export(&cat);
        assert_eq!(out["schemaVersion"], json!(1));
        assert!(out["schemas"]["main"].is_object());
        assert!(out["schemas"]["temp"].is_object());
    }

    #[test]
    fn exports_table_columns() {
        use crate::parser::ast::{ColumnConstraint, ColumnConstraintKind, ColumnDef, TableDefinition};
        let mut cat = Catalog::new();
        let stmt = CreateTableStmt {
            name: QualifiedName { schema: None, name: "widgets".to_string() },
            if_not_exists: false,
            temporary: false,
            without_rowid: false,
            strict: false,
            definition: TableDefinition::Columns {
                columns: vec![ColumnDef {
                    name: "id".to_string(),
                    type_name: None,
                    constraints: vec![ColumnConstraint {
                        name: None,
                        kind: ColumnConstraintKind::NotNull { conflict: None },
                    }],
                }],
                constraints: vec![],
            },
        };
        cat.create_table("main", &stmt).unwrap();
        let out = export(&cat);
        let tables = out["schemas"]["main"]["tables"].as_array().unwrap();
        let widgets = tables.iter().find(|t| t["name"] == "widgets").unwrap();
        assert_eq!(widgets["columns"][0]["name"], "id");
        assert_eq!(widgets["columns"][0]["notNull"], json!(true));
    }
}
