//! Cursor table entries (spec §4.5.1): a slot is either a live vtab cursor
//! driven by `VFilter`/`Next`, or an ephemeral in-memory table built up by
//! `MakeRecord`/`IdxInsert` and walked in sorted order by `Sort`/`Rewind`/
//! `Next` (spec §4.6.3's window/GROUP BY/ORDER BY sorters all reuse this
//! same cursor kind).

use std::sync::Arc;

use futures::StreamExt;

use crate::error::Result;
use crate::value::{Collation, Value};
use crate::vtab::{RowStream, VTable};

use super::opcode::KeyInfo;

/// The row a cursor is currently positioned on.
#[derive(Debug, Clone)]
pub struct CurrentRow {
    pub rowid: i64,
    pub values: Vec<Value>,
}

pub enum VdbeCursor {
    Table(TableCursor),
    Ephemeral(EphemeralCursor),
}

pub struct TableCursor {
    pub vtable: Arc<dyn VTable>,
    stream: Option<RowStream>,
    current: Option<CurrentRow>,
}

impl TableCursor {
    pub fn new(vtable: Arc<dyn VTable>) -> Self {
        TableCursor { vtable, stream: None, current: None }
    }

    pub fn set_stream(&mut self, stream: RowStream) {
        self.stream = Some(stream);
        self.current = None;
    }

    pub async fn advance(&mut self) -> Result<bool> {
        let Some(stream) = self.stream.as_mut() else {
            self.current = None;
            return Ok(false);
        };
        match stream.next().await {
            Some(Ok((rowid, values))) => {
                self.current = Some(CurrentRow { rowid, values });
                Ok(true)
            }
            Some(Err(e)) => Err(e),
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }
}

/// A materialized, optionally-sorted record table. `records` holds
/// `(key, row)` pairs in insertion order until `Sort` is applied, after
/// which they're in key order (spec §4.4.1's tagged-byte total order,
/// reused from C1's `serialize_key`).
pub struct EphemeralCursor {
    pub key_info: Arc<KeyInfo>,
    records: Vec<(Vec<u8>, CurrentRow)>,
    pos: Option<usize>,
}

impl EphemeralCursor {
    pub fn new(key_info: Arc<KeyInfo>) -> Self {
        EphemeralCursor { key_info, records: Vec::new(), pos: None }
    }

    pub fn insert(&mut self, key: Vec<u8>, rowid: i64, values: Vec<Value>) {
        self.records.push((key, CurrentRow { rowid, values }));
    }

    pub fn sort(&mut self) {
        self.records.sort_by(|a, b| a.0.cmp(&b.0));
    }

    pub fn rewind(&mut self) -> bool {
        if self.records.is_empty() {
            self.pos = None;
            false
        } else {
            self.pos = Some(0);
            true
        }
    }

    pub fn advance(&mut self) -> bool {
        match self.pos {
            Some(p) if p + 1 < self.records.len() => {
                self.pos = Some(p + 1);
                true
            }
            _ => {
                self.pos = None;
                false
            }
        }
    }

    /// Seek directly to `index`. Fails (leaving position unchanged) if
    /// `index` is out of bounds or, when the cursor's `KeyInfo` carries a
    /// `partition_cols` > 0, crosses into a different partition than the
    /// cursor's current row (spec §4.6.4's frame-seeking stays within the
    /// current partition).
    pub fn seek_absolute(&mut self, index: usize) -> bool {
        if index >= self.records.len() {
            return false;
        }
        if let Some(cur) = self.pos {
            if !self.same_partition(cur, index) {
                return false;
            }
        }
        self.pos = Some(index);
        true
    }

    /// Seek `delta` rows relative to the current position (may be
    /// negative). Same partition-boundary rule as `seek_absolute`.
    pub fn seek_relative(&mut self, delta: i32) -> bool {
        let Some(cur) = self.pos else { return false };
        let target = cur as i64 + delta as i64;
        if target < 0 || target as usize >= self.records.len() {
            return false;
        }
        let target = target as usize;
        if !self.same_partition(cur, target) {
            return false;
        }
        self.pos = Some(target);
        true
    }

    fn same_partition(&self, a: usize, b: usize) -> bool {
        let n = self.key_info.partition_cols;
        if n == 0 {
            return true;
        }
        let ra = &self.records[a].1.values;
        let rb = &self.records[b].1.values;
        ra.iter().take(n).zip(rb.iter().take(n)).all(|(x, y)| {
            crate::value::compare(x, y, Collation::Binary) == std::cmp::Ordering::Equal
        })
    }

    pub fn current(&self) -> Option<&CurrentRow> {
        self.pos.and_then(|p| self.records.get(p)).map(|(_, row)| row)
    }

    pub fn position(&self) -> Option<usize> {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl VdbeCursor {
    pub fn current(&self) -> Option<CurrentRow> {
        match self {
            VdbeCursor::Table(t) => t.current.clone(),
            VdbeCursor::Ephemeral(e) => e.current().cloned(),
        }
    }

    pub async fn advance(&mut self) -> Result<bool> {
        match self {
            VdbeCursor::Table(t) => t.advance().await,
            VdbeCursor::Ephemeral(e) => Ok(e.advance()),
        }
    }

    pub fn table(&self) -> Option<&TableCursor> {
        match self {
            VdbeCursor::Table(t) => Some(t),
            VdbeCursor::Ephemeral(_) => None,
        }
    }

    pub fn ephemeral_mut(&mut self) -> Option<&mut EphemeralCursor> {
        match self {
            VdbeCursor::Ephemeral(e) => Some(e),
            VdbeCursor::Table(_) => None,
        }
    }
}

impl Clone for CurrentRow {
    fn clone(&self) -> Self {
        CurrentRow { rowid: self.rowid, values: self.values.clone() }
    }
}

pub fn encode_key(values: &[Value], key_info: &KeyInfo) -> Vec<u8> {
    let collations: Vec<Collation> = key_info.collations.clone();
    crate::value::serialize_key(values, &key_info.descending, &collations)
}
