//! Built-in scalar and aggregate functions, registered into the schema
//! catalog's function table (spec §3.2) behind the C7 `Context` contract.
//!
//! The scalar/aggregate implementations themselves (`scalar.rs`,
//! `aggregate.rs`, `datetime.rs`, `printf.rs`) are pure `&[Value] -> Value`
//! code, kept close to the teacher's `functions/` layout; this module is the
//! adapter that lets the VDBE's `Function`/`AggStep`/`AggFinal` opcodes drive
//! them through `udf::Context` the same way a registered user function would.

pub mod aggregate;
pub mod datetime;
pub mod printf;
pub mod scalar;

use std::any::Any;

use aggregate::AggregateState;
use scalar::get_scalar_function;

use crate::schema::{Function, FunctionKind};
use crate::udf::{Context, FunctionFlags};

/// All built-in scalar and aggregate functions, ready to hand to
/// `Catalog::register_function`.
pub fn builtins() -> Vec<Function> {
    let mut out = Vec::new();
    for name in SCALAR_NAMES {
        if let Some(f) = get_scalar_function(name) {
            out.push(Function {
                name: name.to_string(),
                arity: -1,
                flags: FunctionFlags::DETERMINISTIC,
                kind: FunctionKind::Scalar(std::sync::Arc::new(move |ctx: &mut dyn Context| {
                    match f(ctx.args()) {
                        Ok(v) => ctx.result_value(v),
                        Err(e) => ctx.result_error(e),
                    }
                    Ok(())
                })),
            });
        }
    }
    for name in AGGREGATE_NAMES {
        out.push(Function {
            name: name.to_string(),
            arity: -1,
            flags: FunctionFlags::empty(),
            kind: FunctionKind::Aggregate {
                step: std::sync::Arc::new(move |ctx: &mut dyn Context| {
                    if ctx.accumulator().is_none() {
                        let Some(state) = AggregateState::new(name) else {
                            return Ok(());
                        };
                        ctx.set_accumulator(Box::new(state) as Box<dyn Any + Send>);
                    }
                    let args: Vec<_> = ctx.args().to_vec();
                    if let Some(acc) = ctx.accumulator() {
                        if let Some(state) = acc.downcast_mut::<AggregateState>() {
                            state.step(&args)?;
                        }
                    }
                    Ok(())
                }),
                finalize: std::sync::Arc::new(move |ctx: &mut dyn Context| {
                    let result = match ctx.accumulator().and_then(|a| a.downcast_ref::<AggregateState>()) {
                        Some(state) => state.finalize()?,
                        None => AggregateState::new(name)
                            .map(|s| s.finalize())
                            .transpose()?
                            .unwrap_or(crate::value::Value::Null),
                    };
                    ctx.result_value(result);
                    Ok(())
                }),
            },
        });
    }
    out
}

const SCALAR_NAMES: &[&str] = &[
    "ABS", "MAX", "MIN", "ROUND", "SIGN", "LENGTH", "SUBSTR", "SUBSTRING", "INSTR", "UPPER",
    "LOWER", "TRIM", "LTRIM", "RTRIM", "REPLACE", "REVERSE", "TYPEOF", "COALESCE", "NULLIF",
    "IFNULL", "IIF", "HEX", "UNHEX", "ZEROBLOB", "QUOTE", "RANDOM", "RANDOMBLOB", "UNICODE",
    "CHAR", "PRINTF", "FORMAT", "LIKE", "GLOB", "REGEXP", "MATCH", "DATE", "TIME", "DATETIME",
    "JULIANDAY", "UNIXEPOCH", "STRFTIME", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP",
    "__BITAND", "__BITOR", "__SHL", "__SHR",
];

const AGGREGATE_NAMES: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX", "TOTAL", "GROUP_CONCAT", "STRING_AGG"];

pub use aggregate::{get_aggregate_function, is_aggregate_function, AggregateInfo};
