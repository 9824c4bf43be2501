//! Layer taxonomy (spec §4.4.1): the single mutable `BaseLayer` and the
//! chain of immutable-once-committed `TransactionLayer`s overlaid on it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::value::{Collation, Value};

pub type EncodedKey = Vec<u8>;
pub type RowTuple = (i64, Vec<Value>);

/// One change recorded in a `TransactionLayer`'s modification map: either a
/// full row (covers both insert and update/upsert) or a marker recording
/// that the key that used to live here is gone, spec §4.4.1.
#[derive(Debug, Clone)]
pub enum Modification {
    Upsert(RowTuple),
    Deleted { original_key: EncodedKey, rowid: i64 },
}

impl Modification {
    pub fn row(&self) -> Option<&RowTuple> {
        match self {
            Modification::Upsert(row) => Some(row),
            Modification::Deleted { .. } => None,
        }
    }
}

/// The committed ground truth for a table: owns the primary ordered map and
/// one ordered map per secondary index, mutated in place (spec §4.4.1).
pub struct BaseLayer {
    pub primary: BTreeMap<EncodedKey, RowTuple>,
    /// index name -> (encoded index key + rowid tiebreaker) -> row. Rows are
    /// denormalized into the index map rather than stored as a pointer back
    /// to `primary`, so a secondary scan never needs a second hop.
    pub secondary: HashMap<String, BTreeMap<EncodedKey, RowTuple>>,
    /// populated only when the table's primary key is not the rowid.
    pub rowid_to_key: Option<HashMap<i64, EncodedKey>>,
}

impl BaseLayer {
    pub fn new(has_rowid_alias: bool) -> Self {
        BaseLayer {
            primary: BTreeMap::new(),
            secondary: HashMap::new(),
            rowid_to_key: if has_rowid_alias { None } else { Some(HashMap::new()) },
        }
    }

    pub fn apply(&mut self, index_name: Option<&str>, key: EncodedKey, modification: Modification) {
        match index_name {
            None => match modification {
                Modification::Upsert(row) => {
                    if let Some(map) = self.rowid_to_key.as_mut() {
                        map.insert(row.0, key.clone());
                    }
                    self.primary.insert(key, row);
                }
                Modification::Deleted { rowid, .. } => {
                    self.primary.remove(&key);
                    if let Some(map) = self.rowid_to_key.as_mut() {
                        map.remove(&rowid);
                    }
                }
            },
            Some(idx) => {
                let map = self.secondary.entry(idx.to_string()).or_default();
                match modification {
                    Modification::Upsert(row) => {
                        map.insert(key, row);
                    }
                    Modification::Deleted { .. } => {
                        map.remove(&key);
                    }
                }
            }
        }
    }
}

/// An overlay parented to another layer, spec §4.4.1/§4.4.3. `committed`
/// becomes permanently true once `TableManager::commit` advances the
/// `currentCommitted` pointer past it; a pending layer is exclusively owned
/// by the connection that created it via `begin()`.
pub struct TransactionLayer {
    pub parent: LayerRef,
    pub primary_mods: Mutex<BTreeMap<EncodedKey, Modification>>,
    pub secondary_mods: Mutex<HashMap<String, BTreeMap<EncodedKey, Modification>>>,
    pub deleted_rowids: Mutex<HashSet<i64>>,
    pub committed: std::sync::atomic::AtomicBool,
}

impl TransactionLayer {
    pub fn new(parent: LayerRef) -> Self {
        TransactionLayer {
            parent,
            primary_mods: Mutex::new(BTreeMap::new()),
            secondary_mods: Mutex::new(HashMap::new()),
            deleted_rowids: Mutex::new(HashSet::new()),
            committed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn is_committed(&self) -> bool {
        self.committed.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// A deep copy of this layer's modification state, used for savepoints
    /// (spec §4.4.3: "a copy of the pending layer's modification state").
    pub fn snapshot_mods(&self) -> ModSnapshot {
        ModSnapshot {
            primary: self.primary_mods.lock().unwrap().clone(),
            secondary: self.secondary_mods.lock().unwrap().clone(),
            deleted_rowids: self.deleted_rowids.lock().unwrap().clone(),
        }
    }

    pub fn restore_mods(&self, snap: ModSnapshot) {
        *self.primary_mods.lock().unwrap() = snap.primary;
        *self.secondary_mods.lock().unwrap() = snap.secondary;
        *self.deleted_rowids.lock().unwrap() = snap.deleted_rowids;
    }

    pub fn record_primary(&self, key: EncodedKey, modification: Modification) {
        self.primary_mods.lock().unwrap().insert(key, modification);
    }

    pub fn record_secondary(&self, index_name: &str, key: EncodedKey, modification: Modification) {
        self.secondary_mods
            .lock()
            .unwrap()
            .entry(index_name.to_string())
            .or_default()
            .insert(key, modification);
    }

    pub fn mark_rowid_deleted(&self, rowid: i64) {
        self.deleted_rowids.lock().unwrap().insert(rowid);
    }
}

#[derive(Clone)]
pub struct ModSnapshot {
    pub primary: BTreeMap<EncodedKey, Modification>,
    pub secondary: HashMap<String, BTreeMap<EncodedKey, Modification>>,
    pub deleted_rowids: HashSet<i64>,
}

pub enum Layer {
    Base(Mutex<BaseLayer>),
    Transaction(TransactionLayer),
}

pub type LayerRef = Arc<Layer>;

impl Layer {
    pub fn new_base(has_rowid_alias: bool) -> LayerRef {
        Arc::new(Layer::Base(Mutex::new(BaseLayer::new(has_rowid_alias))))
    }

    pub fn parent(&self) -> Option<LayerRef> {
        match self {
            Layer::Base(_) => None,
            Layer::Transaction(t) => Some(t.parent.clone()),
        }
    }
}

/// Encode a single rowid as a primary key (rowid-based tables).
pub fn encode_rowid(rowid: i64) -> EncodedKey {
    crate::value::serialize_key(&[Value::Integer(rowid)], &[false], &[Collation::Binary])
}

/// Encode a composite WITHOUT ROWID primary key per the table's column
/// directions/collations.
pub fn encode_primary_key(values: &[Value], directions: &[bool], collations: &[Collation]) -> EncodedKey {
    crate::value::serialize_key(values, directions, collations)
}

/// Encode a secondary-index key as `(IndexKey, rowid)` so duplicate index
/// values remain individually addressable (spec §4.4.1/§4.4.4).
pub fn encode_index_key(values: &[Value], directions: &[bool], collations: &[Collation], rowid: i64) -> EncodedKey {
    let mut out = crate::value::serialize_key(values, directions, collations);
    out.extend_from_slice(&rowid.to_be_bytes());
    out
}

/// Walk from `start` toward the base looking up `key` in `index_name`
/// (`None` means the primary index), spec §4.4.4.
pub fn effective_lookup(start: &LayerRef, index_name: Option<&str>, key: &EncodedKey) -> Option<Modification> {
    let mut layer = start.clone();
    loop {
        match &*layer {
            Layer::Transaction(t) => {
                let found = match index_name {
                    None => t.primary_mods.lock().unwrap().get(key).cloned(),
                    Some(idx) => t
                        .secondary_mods
                        .lock()
                        .unwrap()
                        .get(idx)
                        .and_then(|m| m.get(key).cloned()),
                };
                if let Some(m) = found {
                    return Some(m);
                }
                let parent = t.parent.clone();
                layer = parent;
            }
            Layer::Base(base) => {
                let base = base.lock().unwrap();
                return match index_name {
                    None => base.primary.get(key).cloned().map(Modification::Upsert),
                    Some(idx) => base.secondary.get(idx).and_then(|m| m.get(key)).cloned().map(Modification::Upsert),
                };
            }
        }
    }
}
