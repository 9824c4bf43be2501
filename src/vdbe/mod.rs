//! Virtual Database Engine (C5), spec §4.5.
//!
//! `opcode` defines the instruction set and its operand payloads; `program`
//! is the two-pass label/jump assembler the compiler emits into; `machine`
//! is the register/cursor interpreter; `cursor` and `agg` hold the runtime
//! state a running program drives (vtab/ephemeral cursors, the aggregate
//! context map); `host` is the trait a `Connection` implements to give the
//! interpreter access to table instances and the function catalog.

pub mod agg;
pub mod cursor;
pub mod host;
pub mod machine;
pub mod opcode;
pub mod program;

pub use agg::AggregateContext;
pub use cursor::{CurrentRow, EphemeralCursor, TableCursor, VdbeCursor};
pub use host::Host;
pub use machine::{StepOutcome, Vdbe};
pub use opcode::{CursorTarget, KeyInfo, Opcode, VdbeOp, P4};
pub use program::{Label, Program, ProgramBuilder};
