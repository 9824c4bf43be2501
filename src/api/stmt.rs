//! Prepared statements, spec §6.1.
//!
//! A `Statement` holds the parsed-and-parameter-numbered AST from `prepare`;
//! compilation is deferred to the first `step()` call (after `bind`, so the
//! bound values are already known) and redone on every run after a `reset`,
//! since a schema change between runs can change what the same SQL text
//! compiles to.

use std::collections::HashMap;
use std::sync::Arc;

use crate::compiler;
use crate::error::{Error, ErrorCode, Result};
use crate::parser::ast::Stmt;
use crate::value::Value;
use crate::vdbe::{StepOutcome, Vdbe};

use super::connection::Connection;
use super::params;

/// What one `step()` call produced, spec §6.1's `ROW|DONE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Row,
    Done,
}

enum RunState {
    /// A transaction-control/`PRAGMA` statement, handled directly by the
    /// connection and already finished by the time `run` is set.
    Control,
    Program(Vdbe),
}

pub struct Statement {
    connection: Arc<Connection>,
    template: Stmt,
    param_names: HashMap<String, usize>,
    param_count: usize,
    params: Vec<Option<Value>>,
    run: Option<RunState>,
    current_row: Vec<Value>,
    column_names: Vec<String>,
    readonly: bool,
}

impl Statement {
    pub(crate) fn new(connection: Arc<Connection>, stmt: Stmt) -> Self {
        let layout = params::number(stmt);
        Statement {
            connection,
            template: layout.stmt,
            param_names: layout.names,
            param_count: layout.count,
            params: vec![None; layout.count + 1],
            run: None,
            current_row: Vec::new(),
            column_names: Vec::new(),
            readonly: true,
        }
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Bind a 1-based positional parameter, spec §6.1's `bind(statement,
    /// index, value)`.
    pub fn bind(&mut self, index: usize, value: Value) -> Result<()> {
        if self.run.is_some() {
            return Err(Error::with_message(ErrorCode::Misuse, "cannot bind after step; call reset first"));
        }
        if index == 0 || index > self.param_count {
            return Err(Error::with_message(ErrorCode::Range, format!("no such parameter: {}", index)));
        }
        self.params[index] = Some(value);
        Ok(())
    }

    /// Bind a named parameter (`:name`/`@name`/`$name`), spec §6.1's
    /// `bind(statement, name, value)`.
    pub fn bind_by_name(&mut self, name: &str, value: Value) -> Result<()> {
        let index = *self
            .param_names
            .get(name)
            .ok_or_else(|| Error::with_message(ErrorCode::Range, format!("no such parameter: {}", name)))?;
        self.bind(index, value)
    }

    /// Pump the interpreter until the next row or completion, spec §6.1's
    /// `step`.
    pub async fn step(&mut self) -> Result<StepResult> {
        if self.run.is_none() {
            if let Some(result) = self.connection.try_handle_control_statement(&self.template).await {
                result?;
                self.run = Some(RunState::Control);
                self.column_names.clear();
                return Ok(StepResult::Done);
            }

            let substituted = params::substitute(&self.template, &self.params)?;
            let compiled = {
                let mut catalog = self.connection.database().catalog.write().await;
                compiler::compile(&mut catalog, &substituted).await?
            };
            self.column_names = compiled.column_names;
            self.readonly = compiled.readonly;
            self.connection.statement_started().await;
            self.run = Some(RunState::Program(Vdbe::new(compiled.program)));
        }

        match self.run.as_mut().expect("just set above") {
            RunState::Control => Ok(StepResult::Done),
            RunState::Program(vdbe) => match vdbe.step(self.connection.as_ref(), None).await {
                Ok(StepOutcome::Row(values)) => {
                    self.current_row = values;
                    Ok(StepResult::Row)
                }
                Ok(StepOutcome::Done) => {
                    self.connection.statement_finished().await?;
                    Ok(StepResult::Done)
                }
                Err(e) => {
                    self.connection.statement_failed().await;
                    Err(e)
                }
            },
        }
    }

    /// The value of result column `i` (0-based) from the most recent `Row`,
    /// spec §6.1's `column`.
    pub fn column(&self, i: usize) -> Value {
        self.current_row.get(i).cloned().unwrap_or(Value::Null)
    }

    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }

    /// Spec §6.1's `columnName`.
    pub fn column_name(&self, i: usize) -> Option<&str> {
        self.column_names.get(i).map(String::as_str)
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Spec §6.1's `reset`: rewind to re-run from the start, keeping bound
    /// parameter values (matching SQLite's `sqlite3_reset` semantics —
    /// `clear_bindings` is the separate operation for dropping them).
    pub fn reset(&mut self) {
        self.run = None;
        self.current_row.clear();
    }

    pub fn clear_bindings(&mut self) {
        for p in &mut self.params {
            *p = None;
        }
    }

    /// Spec §6.1's `finalize`. A statement is also cleaned up by simply
    /// dropping it; this just makes the lifecycle operation explicit.
    pub fn finalize(self) {}
}
