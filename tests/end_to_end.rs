//! Seed scenarios from spec §8 (E1, E5, E6) driven through the public
//! `api::{Database, Connection, Statement}` surface.

use sqlmvcc::value::Value;
use sqlmvcc::{connect, Database, StepResult};

async fn rows(conn: &std::sync::Arc<sqlmvcc::Connection>, sql: &str) -> Vec<Vec<Value>> {
    let mut stmt = conn.prepare(sql).unwrap();
    let mut out = Vec::new();
    loop {
        match stmt.step().await.unwrap() {
            StepResult::Row => {
                let n = stmt.column_count();
                out.push((0..n).map(|i| stmt.column(i)).collect());
            }
            StepResult::Done => break,
        }
    }
    out
}

#[tokio::test]
async fn e1_insert_and_order_by_desc() {
    let db = Database::new();
    let conn = connect(db);
    conn.execute("CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT)").await.unwrap();
    conn.execute("INSERT INTO t(id, v) VALUES (1, 'a'), (2, 'b')").await.unwrap();

    let got = rows(&conn, "SELECT * FROM t ORDER BY id DESC").await;
    assert_eq!(
        got,
        vec![
            vec![Value::Integer(2), Value::Text("b".into())],
            vec![Value::Integer(1), Value::Text("a".into())],
        ]
    );
}

#[tokio::test]
async fn e5_left_join_pads_with_null() {
    let db = Database::new();
    let conn = connect(db);
    conn.execute("CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT)").await.unwrap();
    conn.execute("INSERT INTO t(id, v) VALUES (1, 'a'), (2, 'b')").await.unwrap();

    let got = rows(&conn, "SELECT a.id, b.id FROM t a LEFT JOIN t b ON b.id = a.id + 10 ORDER BY a.id").await;
    assert_eq!(
        got,
        vec![
            vec![Value::Integer(1), Value::Null],
            vec![Value::Integer(2), Value::Null],
        ]
    );
}

#[tokio::test]
async fn e5_inner_join_against_empty_side_yields_no_rows() {
    let db = Database::new();
    let conn = connect(db);
    conn.execute("CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT)").await.unwrap();
    conn.execute("INSERT INTO t(id, v) VALUES (1, 'a'), (2, 'b')").await.unwrap();

    let got = rows(&conn, "SELECT a.id, b.id FROM t a JOIN t b ON b.id = a.id + 10").await;
    assert!(got.is_empty());
}

#[tokio::test]
async fn e6_index_plans_equality_lookup() {
    let db = Database::new();
    let conn = connect(db);
    conn.execute("CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT)").await.unwrap();
    conn.execute("INSERT INTO t(id, v) VALUES (1, 'a'), (2, 'b')").await.unwrap();
    conn.execute("CREATE INDEX ix ON t(v)").await.unwrap();

    let got = rows(&conn, "SELECT id FROM t WHERE v = 'b'").await;
    assert_eq!(got, vec![vec![Value::Integer(2)]]);
}

#[tokio::test]
async fn window_running_sum_matches_unbounded_preceding() {
    let db = Database::new();
    let conn = connect(db);
    conn.execute("CREATE TABLE nums(id INTEGER PRIMARY KEY, x INTEGER)").await.unwrap();
    conn.execute("INSERT INTO nums(id, x) VALUES (1,1), (2,2), (3,3), (4,4)").await.unwrap();

    let got = rows(
        &conn,
        "SELECT id, SUM(x) OVER (ORDER BY id ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW) FROM nums ORDER BY id",
    )
    .await;
    assert_eq!(
        got,
        vec![
            vec![Value::Integer(1), Value::Integer(1)],
            vec![Value::Integer(2), Value::Integer(3)],
            vec![Value::Integer(3), Value::Integer(6)],
            vec![Value::Integer(4), Value::Integer(10)],
        ]
    );
}

#[tokio::test]
async fn row_number_restarts_per_partition() {
    let db = Database::new();
    let conn = connect(db);
    conn.execute("CREATE TABLE t(id INTEGER PRIMARY KEY, p TEXT, o INTEGER)").await.unwrap();
    conn.execute(
        "INSERT INTO t(id, p, o) VALUES (1,'x',1), (2,'x',2), (3,'y',1), (4,'y',2)",
    )
    .await
    .unwrap();

    let got = rows(
        &conn,
        "SELECT p, row_number() OVER (PARTITION BY p ORDER BY o) FROM t ORDER BY p, o",
    )
    .await;
    assert_eq!(
        got,
        vec![
            vec![Value::Text("x".into()), Value::Integer(1)],
            vec![Value::Text("x".into()), Value::Integer(2)],
            vec![Value::Text("y".into()), Value::Integer(1)],
            vec![Value::Text("y".into()), Value::Integer(2)],
        ]
    );
}

#[tokio::test]
async fn group_by_counts_match_occurrence() {
    let db = Database::new();
    let conn = connect(db);
    conn.execute("CREATE TABLE t(id INTEGER PRIMARY KEY, k TEXT)").await.unwrap();
    conn.execute("INSERT INTO t(id, k) VALUES (1,'a'), (2,'a'), (3,'b')").await.unwrap();

    let got = rows(&conn, "SELECT k, COUNT(*) FROM t GROUP BY k ORDER BY k").await;
    assert_eq!(
        got,
        vec![
            vec![Value::Text("a".into()), Value::Integer(2)],
            vec![Value::Text("b".into()), Value::Integer(1)],
        ]
    );
}
