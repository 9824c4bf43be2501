//! Snapshot isolation, commit staleness, and savepoint rollback (spec §8
//! properties 3/4, scenario E2/E3) driven through two `Connection`s sharing
//! one `Database`.

use sqlmvcc::error::ErrorCode;
use sqlmvcc::value::Value;
use sqlmvcc::{connect, Database, StepResult};

async fn scalar(conn: &std::sync::Arc<sqlmvcc::Connection>, sql: &str) -> Value {
    let mut stmt = conn.prepare(sql).unwrap();
    match stmt.step().await.unwrap() {
        StepResult::Row => stmt.column(0),
        StepResult::Done => panic!("expected a row from {sql}"),
    }
}

#[tokio::test]
async fn e2_snapshot_isolation_across_connections() {
    let db = Database::new();
    let a = connect(db.clone());
    let b = connect(db);

    a.execute("CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT)").await.unwrap();
    a.execute("INSERT INTO t(id, v) VALUES (2, 'b')").await.unwrap();

    a.execute("BEGIN").await.unwrap();
    a.execute("UPDATE t SET v = 'B' WHERE id = 2").await.unwrap();

    // B, not yet in its own transaction touching the row, still sees the
    // pre-update committed value.
    assert_eq!(scalar(&b, "SELECT v FROM t WHERE id = 2").await, Value::Text("b".into()));

    a.execute("COMMIT").await.unwrap();

    assert_eq!(scalar(&b, "SELECT v FROM t WHERE id = 2").await, Value::Text("B".into()));
}

#[tokio::test]
async fn e3_second_committer_gets_busy() {
    let db = Database::new();
    let a = connect(db.clone());
    let b = connect(db);

    a.execute("CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT)").await.unwrap();
    a.execute("INSERT INTO t(id, v) VALUES (2, 'b')").await.unwrap();

    // Both open a transaction against the same pre-update snapshot.
    a.execute("BEGIN").await.unwrap();
    b.execute("BEGIN").await.unwrap();
    a.execute("UPDATE t SET v = 'from-a' WHERE id = 2").await.unwrap();
    b.execute("UPDATE t SET v = 'from-b' WHERE id = 2").await.unwrap();

    a.execute("COMMIT").await.unwrap();

    let err = b.execute("COMMIT").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Busy);
}

#[tokio::test]
async fn rollback_to_savepoint_undoes_only_the_nested_write() {
    let db = Database::new();
    let conn = connect(db);
    conn.execute("CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT)").await.unwrap();
    conn.execute("INSERT INTO t(id, v) VALUES (1, 'a')").await.unwrap();

    conn.execute("BEGIN").await.unwrap();
    conn.execute("UPDATE t SET v = 'outer' WHERE id = 1").await.unwrap();
    conn.execute("SAVEPOINT sp1").await.unwrap();
    conn.execute("INSERT INTO t(id, v) VALUES (2, 'inner')").await.unwrap();
    conn.execute("ROLLBACK TO sp1").await.unwrap();
    conn.execute("COMMIT").await.unwrap();

    assert_eq!(scalar(&conn, "SELECT v FROM t WHERE id = 1").await, Value::Text("outer".into()));
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM t").await, Value::Integer(1));
}

#[tokio::test]
async fn explicit_rollback_discards_all_statements_in_the_transaction() {
    let db = Database::new();
    let conn = connect(db);
    conn.execute("CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT)").await.unwrap();
    conn.execute("INSERT INTO t(id, v) VALUES (1, 'a')").await.unwrap();

    conn.execute("BEGIN").await.unwrap();
    conn.execute("UPDATE t SET v = 'changed' WHERE id = 1").await.unwrap();
    conn.execute("INSERT INTO t(id, v) VALUES (2, 'new')").await.unwrap();
    conn.execute("ROLLBACK").await.unwrap();

    assert_eq!(scalar(&conn, "SELECT v FROM t WHERE id = 1").await, Value::Text("a".into()));
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM t").await, Value::Integer(1));
}
