//! UDF invocation context (C7), spec §4.7.
//!
//! Scalar and aggregate callbacks never see a `Value` enum field directly —
//! they receive a `&mut dyn Context` and call a result setter on it, mirroring
//! the teacher's `FunctionContext` trait in `types.rs` (`result_i64`,
//! `result_text`, …) generalized so user-defined functions registered at
//! runtime can participate the same way built-ins do.

use std::any::Any;

use crate::error::{Error, Result};
use crate::value::Value;

/// Declared argument count. `-1` means variadic.
pub type Arity = i32;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FunctionFlags: u8 {
        const DETERMINISTIC = 1 << 0;
        const DIRECT_ONLY   = 1 << 1;
        const INNOCUOUS     = 1 << 2;
    }
}

/// The context object passed to every scalar/step/final callback. Zeroed
/// (its result and error slots cleared, per-group accumulator addressed
/// fresh) before each call by the interpreter, per spec §4.7.
pub trait Context: Send {
    /// Opaque data registered alongside the function, if any.
    fn aux(&self) -> Option<&(dyn Any + Send + Sync)>;

    fn args(&self) -> &[Value];

    fn result_int(&mut self, v: i64);
    fn result_double(&mut self, v: f64);
    fn result_text(&mut self, v: String);
    fn result_blob(&mut self, v: Vec<u8>);
    fn result_null(&mut self);
    fn result_value(&mut self, v: Value);
    fn result_error(&mut self, err: Error);

    /// Per-group accumulator for aggregate/window functions. `None` until the
    /// first `step` call for the current group; the callback is responsible
    /// for initializing it with `set_accumulator` on first use.
    fn accumulator(&mut self) -> Option<&mut (dyn Any + Send)>;
    fn set_accumulator(&mut self, value: Box<dyn Any + Send>);
}

/// A concrete, owned `Context` implementation used by the interpreter. Holds
/// the outcome of the call (a `Value` or an `Error`) plus the accumulator
/// slot, which the caller persists across `step` invocations for the same
/// group and discards after `final`.
pub struct CallContext<'a> {
    args: &'a [Value],
    aux: Option<&'a (dyn Any + Send + Sync)>,
    accumulator: &'a mut Option<Box<dyn Any + Send>>,
    result: Option<Value>,
    error: Option<Error>,
}

impl<'a> CallContext<'a> {
    pub fn new(
        args: &'a [Value],
        aux: Option<&'a (dyn Any + Send + Sync)>,
        accumulator: &'a mut Option<Box<dyn Any + Send>>,
    ) -> Self {
        CallContext {
            args,
            aux,
            accumulator,
            result: None,
            error: None,
        }
    }

    pub fn into_result(self) -> Result<Value> {
        if let Some(err) = self.error {
            Err(err)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

impl<'a> Context for CallContext<'a> {
    fn aux(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.aux
    }

    fn args(&self) -> &[Value] {
        self.args
    }

    fn result_int(&mut self, v: i64) {
        self.result = Some(Value::Integer(v));
    }

    fn result_double(&mut self, v: f64) {
        self.result = Some(Value::Real(v));
    }

    fn result_text(&mut self, v: String) {
        self.result = Some(Value::Text(v));
    }

    fn result_blob(&mut self, v: Vec<u8>) {
        self.result = Some(Value::Blob(v));
    }

    fn result_null(&mut self) {
        self.result = Some(Value::Null);
    }

    fn result_value(&mut self, v: Value) {
        self.result = Some(v);
    }

    fn result_error(&mut self, err: Error) {
        self.error = Some(err);
    }

    fn accumulator(&mut self) -> Option<&mut (dyn Any + Send)> {
        self.accumulator.as_mut().map(|b| b.as_mut() as &mut (dyn Any + Send))
    }

    fn set_accumulator(&mut self, value: Box<dyn Any + Send>) {
        *self.accumulator = Some(value);
    }
}

/// A scalar function callback: computes a result directly from its
/// arguments.
pub type ScalarFn = std::sync::Arc<dyn Fn(&mut dyn Context) -> Result<()> + Send + Sync>;

/// An aggregate/window function's per-row accumulation step.
pub type StepFn = std::sync::Arc<dyn Fn(&mut dyn Context) -> Result<()> + Send + Sync>;

/// An aggregate/window function's finalization, producing the result from
/// the accumulator built up by `step`.
pub type FinalFn = std::sync::Arc<dyn Fn(&mut dyn Context) -> Result<()> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_roundtrips_int_result() {
        let args = vec![Value::Integer(1)];
        let mut acc: Option<Box<dyn Any + Send>> = None;
        let mut ctx = CallContext::new(&args, None, &mut acc);
        ctx.result_int(42);
        assert_eq!(ctx.into_result().unwrap(), Value::Integer(42));
    }

    #[test]
    fn accumulator_persists_across_steps() {
        let args: Vec<Value> = vec![];
        let mut acc: Option<Box<dyn Any + Send>> = None;
        {
            let mut ctx = CallContext::new(&args, None, &mut acc);
            ctx.set_accumulator(Box::new(5i64));
        }
        {
            let mut ctx = CallContext::new(&args, None, &mut acc);
            let v = ctx.accumulator().unwrap().downcast_mut::<i64>().unwrap();
            *v += 1;
        }
        assert_eq!(*acc.unwrap().downcast::<i64>().unwrap(), 6);
    }
}
