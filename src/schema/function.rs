//! Function catalog entries, spec §3.2. Callbacks are held in memory only
//! and never serialized (spec §6.5 exports functions "by signature only").

use crate::udf::{Arity, FinalFn, FunctionFlags, ScalarFn, StepFn};

#[derive(Clone)]
pub enum FunctionKind {
    Scalar(ScalarFn),
    Aggregate { step: StepFn, finalize: FinalFn },
}

#[derive(Clone)]
pub struct Function {
    pub name: String,
    pub arity: Arity,
    pub flags: FunctionFlags,
    pub kind: FunctionKind,
}

impl Function {
    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, FunctionKind::Aggregate { .. })
    }
}
