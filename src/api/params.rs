//! Parameter binding, spec §6.1's `bind`.
//!
//! Rather than threading a `params` slice through the compiler's `ExprCtx`
//! and its construction sites in `select.rs`/`dml.rs`/`window.rs` (`expr.rs`
//! already carries a comment to this effect), binding happens by rewriting
//! the AST before it reaches the compiler: [`number`] walks a freshly parsed
//! statement and assigns each `?`/`?NNN`/`:name` parameter a stable 1-based
//! slot, and [`substitute`] walks a clone of that numbered statement,
//! replacing every `Expr::Variable` with an `Expr::Literal` holding the
//! caller's bound value. Both passes reuse the existing `ExprWalker`
//! machinery in `parser::walker`.

use std::collections::HashMap;

use crate::error::{Error, ErrorCode, Result};
use crate::parser::ast::{Expr, Literal, Stmt, Variable};
use crate::parser::walker::{self, ExprWalker, WalkResult};
use crate::value::Value;

/// The result of numbering a statement's parameters: the statement with
/// every anonymous `?` assigned a concrete index, the total slot count, and
/// a name → index map for `:name`/`@name`/`$name` parameters.
pub struct ParamLayout {
    pub stmt: Stmt,
    pub count: usize,
    pub names: HashMap<String, usize>,
}

/// Assign sequential 1-based indices to every parameter in `stmt`, in the
/// order they're first seen. An already-numbered `?NNN` keeps its number but
/// still grows `count` to cover it (spec makes no promise about gaps, so a
/// mixed `?1 ... ?` statement simply reserves slot 1 explicitly and numbers
/// the anonymous one next).
pub fn number(mut stmt: Stmt) -> ParamLayout {
    struct Numberer {
        next: usize,
        names: HashMap<String, usize>,
    }

    impl Numberer {
        fn slot_for_name(&mut self, name: &str) -> usize {
            if let Some(&i) = self.names.get(name) {
                return i;
            }
            self.next += 1;
            self.names.insert(name.to_string(), self.next);
            self.next
        }
    }

    impl ExprWalker for Numberer {
        fn walk_expr(&mut self, expr: &mut Expr) -> WalkResult {
            if let Expr::Variable(v) = expr {
                match v {
                    Variable::Numbered(Some(n)) => {
                        self.next = self.next.max(*n as usize);
                    }
                    Variable::Numbered(slot @ None) => {
                        self.next += 1;
                        *slot = Some(self.next as i32);
                    }
                    Variable::Named { prefix, name } => {
                        let key = format!("{prefix}{name}");
                        let i = self.slot_for_name(&key);
                        *v = Variable::Numbered(Some(i as i32));
                    }
                }
            }
            WalkResult::Continue
        }
    }

    let mut numberer = Numberer { next: 0, names: HashMap::new() };
    walk_stmt(&mut numberer, &mut stmt);
    ParamLayout { stmt, count: numberer.next, names: numberer.names }
}

/// Replace every numbered `Expr::Variable` in a clone of `stmt` with the
/// bound value at that slot. `params` is 1-indexed by parameter number;
/// index 0 is unused. Errors if a referenced slot was never bound.
pub fn substitute(stmt: &Stmt, params: &[Option<Value>]) -> Result<Stmt> {
    struct Substituter<'a> {
        params: &'a [Option<Value>],
        error: Option<Error>,
    }

    impl ExprWalker for Substituter<'_> {
        fn walk_expr(&mut self, expr: &mut Expr) -> WalkResult {
            if let Expr::Variable(Variable::Numbered(Some(n))) = expr {
                let idx = *n as usize;
                match self.params.get(idx).and_then(|v| v.as_ref()) {
                    Some(v) => *expr = Expr::Literal(value_to_literal(v)),
                    None => {
                        self.error = Some(Error::with_message(
                            ErrorCode::Misuse,
                            format!("parameter {} was not bound", n),
                        ));
                        return WalkResult::Abort;
                    }
                }
            }
            WalkResult::Continue
        }
    }

    let mut stmt = stmt.clone();
    let mut sub = Substituter { params, error: None };
    walk_stmt(&mut sub, &mut stmt);
    if let Some(e) = sub.error {
        return Err(e);
    }
    Ok(stmt)
}

fn value_to_literal(v: &Value) -> Literal {
    match v {
        Value::Null => Literal::Null,
        Value::Integer(i) => Literal::Integer(*i),
        Value::Real(r) => Literal::Float(*r),
        Value::Text(s) => Literal::String(s.clone()),
        Value::Blob(b) => Literal::Blob(b.clone()),
        // `Literal` has no big-integer variant (it only ever arises from
        // runtime arithmetic, never from parsed source text); round-trip it
        // as text and let affinity coercion re-widen it downstream.
        Value::BigInt(s) => Literal::String(s.clone()),
    }
}

/// Statement-level expression walk: `walker::walk_select`/`walk_expr` only
/// cover a `SelectStmt`'s own tree, so every other statement family that
/// carries expressions (INSERT's VALUES/RETURNING, UPDATE's SET/WHERE/
/// RETURNING, DELETE's WHERE/RETURNING) is unpacked here by hand.
fn walk_stmt<W: ExprWalker>(walker: &mut W, stmt: &mut Stmt) {
    use crate::parser::ast::{InsertSource, ResultColumn};

    fn walk_returning<W: ExprWalker>(walker: &mut W, returning: &mut Option<Vec<ResultColumn>>) {
        if let Some(cols) = returning {
            for col in cols {
                if let ResultColumn::Expr { expr, .. } = col {
                    walker::walk_expr(walker, expr);
                }
            }
        }
    }

    match stmt {
        Stmt::Select(s) => {
            walker::walk_select(walker, s);
        }
        Stmt::Insert(s) => {
            match &mut s.source {
                InsertSource::Values(rows) => {
                    for row in rows {
                        for expr in row {
                            walker::walk_expr(walker, expr);
                        }
                    }
                }
                InsertSource::Select(select) => walker::walk_select(walker, select),
                InsertSource::DefaultValues => {}
            }
            walk_returning(walker, &mut s.returning);
        }
        Stmt::Update(s) => {
            for assignment in &mut s.assignments {
                walker::walk_expr(walker, &mut assignment.expr);
            }
            if let Some(w) = &mut s.where_clause {
                walker::walk_expr(walker, w);
            }
            walk_returning(walker, &mut s.returning);
        }
        Stmt::Delete(s) => {
            if let Some(w) = &mut s.where_clause {
                walker::walk_expr(walker, w);
            }
            walk_returning(walker, &mut s.returning);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::grammar::parse;

    #[test]
    fn numbers_anonymous_and_named_params_in_order() {
        let stmt = parse("SELECT ? , :x, ?").unwrap();
        let layout = number(stmt);
        assert_eq!(layout.count, 3);
    }

    #[test]
    fn substitute_replaces_numbered_variables() {
        let stmt = parse("SELECT ?1, ?2").unwrap();
        let layout = number(stmt);
        let params = vec![None, Some(Value::Integer(7)), Some(Value::Text("hi".to_string()))];
        let out = substitute(&layout.stmt, &params).unwrap();
        if let Stmt::Select(s) = out {
            if let crate::parser::ast::SelectBody::Select(core) = &s.body {
                assert_eq!(core.columns.len(), 2);
            }
        } else {
            panic!("expected select");
        }
    }

    #[test]
    fn substitute_errors_on_unbound_slot() {
        let stmt = parse("SELECT ?1").unwrap();
        let layout = number(stmt);
        let err = substitute(&layout.stmt, &[None]).unwrap_err();
        assert_eq!(err.code, ErrorCode::Misuse);
    }
}
