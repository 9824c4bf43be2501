//! VDBE opcode set (C5), spec §4.5.1.
//!
//! Grounded on the teacher's `vdbe/ops.rs` `Opcode`/`VdbeOp`/`P4` shape (one
//! opcode per operation, `(p1,p2,p3,p4,p5)` operands, a side-channel `P4`
//! payload for operands too large for an `i32`), generalized from
//! SQLite-style btree-cursor opcodes to the spec's vtab-cursor and
//! layered-storage opcodes. The teacher carries two divergent opcode
//! numberings across `ops.rs` and `types.rs`; this crate settles on one,
//! sequential per family, since the spec is silent on concrete codes.

use std::sync::Arc;

use crate::schema::Index;
use crate::value::{Affinity, Collation};
use crate::vtab::ScanPlan;

/// One VDBE operation. Families follow spec §4.5.1's grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    // -- Control flow --------------------------------------------------
    /// No-op, used as a label target placeholder before backpatching.
    Noop,
    /// Halt the program. `p1` is the `ErrorCode` to report (`Ok` on normal
    /// completion); `p4` carries an error message when `p1 != Ok`.
    Halt,
    /// Unconditional jump to `p2`.
    Goto,
    /// Call a subroutine at `p2`, pushing the return address onto the frame
    /// stack in register `p1`.
    Gosub,
    /// Return to the address stored in register `p1`.
    Return,
    /// Jump to `p2` if register `p1` is truthy (spec §3.1's 3-valued logic:
    /// NULL is not truthy).
    If,
    /// Jump to `p2` if register `p1` is falsy or NULL.
    IfNot,
    /// Jump to `p2` if register `p1` is NULL.
    IfNull,
    /// Jump to `p2` if register `p1` is not NULL.
    NotNull,

    // -- Comparison (affinity-coercing, jump-on-true) -------------------
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // -- Register load/move ---------------------------------------------
    /// Store NULL in register `p2`.
    Null,
    /// Store the integer `p1` in register `p2`.
    Integer,
    /// Store the real `p4` in register `p2`.
    Real,
    /// Store the text `p4` in register `p2`.
    String,
    /// Store the blob `p4` in register `p2`.
    Blob,
    /// Copy register `p1` to `p2`, leaving `p1` intact.
    Copy,
    /// Move register `p1` to `p2`, leaving `p1` as NULL.
    Move,
    /// Coerce registers `p1..p1+p2` in place to the affinities in `p4`
    /// (one `Affinity` byte per register), spec §3.1.
    Affinity,

    // -- Arithmetic / logical ---------------------------------------------
    // Binary ops all read `p1 <op> p3`, writing the result to `p2`; NULL in
    // either operand yields a NULL result (spec §3.1's 3-valued arithmetic),
    // except `And`/`Or` which follow SQL's 3-valued logic table instead.
    Add,
    Subtract,
    Multiply,
    /// `p1 / p3`, storing NULL on division by zero rather than erroring.
    Divide,
    /// `p1 % p3`, storing NULL on division by zero.
    Remainder,
    /// Text concatenation `p1 || p3`; NULL if either operand is NULL.
    Concat,
    And,
    Or,
    Not,
    /// Register `p2` = 1 if register `p1` is NULL, else 0.
    IsNull,

    // -- Function invocation ----------------------------------------------
    /// Call the scalar function named by `p4` on registers `p2..p2+p1`,
    /// storing the result in `p3` (spec §4.7).
    Function,
    /// Feed registers `p2..p2+p1` into the step callback of the aggregate
    /// named by `p4`, against accumulator slot `p3` of the group selected by
    /// the most recent `AggContext` on context `p5`.
    AggStep,
    /// Call the aggregate named by `p4`'s finalize callback against
    /// accumulator slot `p5` of context `p1`'s currently selected group,
    /// storing the result in `p3`.
    AggFinal,

    // -- Virtual-table cursor ops (spec §4.3/§4.5.1) -----------------------
    /// Open cursor `p1` against the table in `p4` (a `CursorTarget`).
    VOpen,
    /// Execute `p1`'s `bestIndex`-selected scan (`p4` is the `ScanPlan`,
    /// preceded by argument registers at `p2..p2+p3`); jump to `p2`... no,
    /// jump-if-empty target is carried in the cursor's first `Next`. Opens
    /// the row stream; a following `Next` fetches the first row.
    VFilter,
    /// Advance cursor `p1`; jump to `p2` if a row is available, otherwise
    /// fall through (cursor exhausted). Works uniformly for vtab cursors,
    /// ephemeral sorters, and the aggregate-iteration cursor.
    Next,
    /// Load column `p2` of cursor `p1`'s current row into register `p3`.
    Column,
    /// Load cursor `p1`'s current rowid into register `p2`.
    Rowid,
    /// Apply a write through cursor `p1`: `p4` carries the `ConflictPolicy`.
    /// Register `p2` holds the target rowid (NULL for an insert);
    /// `p2+1..p2+1+p3` are the column values (empty, `p3 == 0`, for a pure
    /// delete). Matches `VTable::update`'s `(Option<i64>, Vec<Value>)`
    /// contract directly.
    VUpdate,
    VBegin,
    VCommit,
    VRollback,
    VSync,
    VSavepoint,
    VRelease,
    VRollbackTo,
    /// Close cursor `p1`, releasing any open row stream.
    Close,

    // -- Ephemeral tables / sorting (spec §4.5.1, §4.6.3) ------------------
    /// Open cursor `p1` as an empty ephemeral table with `p2` key columns
    /// described by `p4` (a `KeyInfo`).
    OpenEphemeral,
    /// Encode registers `p2..p2+p1` into a single record value stored in
    /// `p3` (spec §4.4.1's tagged-byte encoding, reused verbatim from C1).
    MakeRecord,
    /// Insert the row held in registers `p2..p2+p3` into ephemeral cursor
    /// `p1`, keyed by encoding those same columns per the cursor's
    /// `KeyInfo` (set when the cursor was opened).
    IdxInsert,
    /// Sort ephemeral cursor `p1` in place by its key order.
    Sort,
    /// Position ephemeral/vtab cursor `p1` at its first row; jump to `p2` if
    /// empty.
    Rewind,

    // -- Aggregation (spec §4.5.1, §4.6.2/§4.6.4) --------------------------
    /// Discard all accumulated groups for aggregate context `p1`.
    AggReset,
    /// Position the iteration cursor for aggregate context `p1` at the
    /// first group in key order; jump to `p2` if there are none.
    AggIterate,
    /// Advance the iteration cursor for aggregate context `p1`; jump to `p2`
    /// if a group remains.
    AggNext,
    /// Load the `p3`-th group-key column of aggregate context `p1`'s current
    /// group into register `p2`.
    AggGroupValue,
    /// Select the group the next `AggStep`/`AggFinal` on context `p1`
    /// operates on: the group whose key is registers `p2..p2+p3` (creating
    /// it, with that key, if absent).
    AggContext,

    // -- Window-frame seeking (spec §4.6.4) ---------------------------------
    /// Seek ephemeral cursor `p1` to the absolute position held in register
    /// `p3`; jump to `p2` (`addrFail`) if that position falls outside the
    /// cursor's bounds or outside the current row's partition. On success
    /// the cursor's position register (`Rowid`) reads back that position;
    /// on failure the cursor's position is left unchanged.
    SeekRowid,
    /// Seek cursor `p1` by the (possibly negative) row offset held in
    /// register `p3`, relative to its current position, refusing to cross
    /// a partition boundary. On failure: jump to `p2` (`addrFail`) if `p5`
    /// is nonzero, else fall through leaving the cursor's position
    /// unchanged.
    SeekRelative,

    // -- Output / schema ----------------------------------------------------
    /// Yield registers `p1..p1+p2` as one result row to the caller (spec
    /// §4.5.3's suspension point for `Statement::step`).
    ResultRow,
    /// Bump the schema generation counter, invalidating cached plans that
    /// read the old one (spec §4.4.8).
    SchemaInvalidate,
}

/// Operand too large or too structured for an `i32`, spec §4.5.1.
#[derive(Debug, Clone)]
pub enum P4 {
    Unused,
    Int64(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    /// `(function name, declared arity)`.
    Function(String, i32),
    KeyInfo(Arc<KeyInfo>),
    ScanPlan(Arc<ScanPlan>),
    CursorTarget(Arc<CursorTarget>),
    Index(Arc<Index>),
    ConflictPolicy(crate::vtab::ConflictPolicy),
    SchemaChange(Arc<crate::vtab::SchemaChange>),
    /// One `Affinity` per register touched by an `Affinity` opcode.
    Affinities(Vec<Affinity>),
    /// Collation sequence an `Eq`/`Ne`/`Lt`/`Le`/`Gt`/`Ge` comparison should
    /// use, spec §4.5.2. Absent (`P4::Unused`) means `Collation::Binary`.
    Collation(Collation),
}

impl Default for P4 {
    fn default() -> Self {
        P4::Unused
    }
}

/// Per-column collation/sort-order metadata for an ephemeral table or index,
/// spec §4.4.1/§4.4.4.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyInfo {
    pub collations: Vec<Collation>,
    pub descending: Vec<bool>,
    /// Leading key columns that are a window sorter's `PARTITION BY` list
    /// (spec §4.6.4). Zero for every other ephemeral cursor use (ORDER BY
    /// sorters, `UNION` dedup, subquery materialization). `seek_relative`
    /// and `seek_absolute` refuse to cross a partition boundary when this
    /// is nonzero.
    pub partition_cols: usize,
}

impl KeyInfo {
    pub fn new(n: usize) -> Self {
        KeyInfo {
            collations: vec![Collation::Binary; n],
            descending: vec![false; n],
            partition_cols: 0,
        }
    }
}

/// Which table/schema a `VOpen` cursor binds to.
#[derive(Debug, Clone)]
pub struct CursorTarget {
    pub schema: String,
    pub table: String,
}

/// One instruction, spec §4.5.1.
#[derive(Debug, Clone)]
pub struct VdbeOp {
    pub opcode: Opcode,
    pub p1: i32,
    pub p2: i32,
    pub p3: i32,
    pub p4: P4,
    pub p5: u16,
}

impl VdbeOp {
    pub fn new(opcode: Opcode, p1: i32, p2: i32, p3: i32) -> Self {
        VdbeOp { opcode, p1, p2, p3, p4: P4::Unused, p5: 0 }
    }

    pub fn with_p4(mut self, p4: P4) -> Self {
        self.p4 = p4;
        self
    }

    pub fn with_p5(mut self, p5: u16) -> Self {
        self.p5 = p5;
        self
    }
}
