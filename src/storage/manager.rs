//! Per-table manager (spec §4.4.2) and the commit/collapse protocol
//! (spec §4.4.3, §4.4.6).

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tracing::{debug, trace};

use crate::error::{Error, ErrorCode, Result};
use crate::schema::Table;
use crate::storage::connection::ConnectionState;
use crate::storage::layer::{Layer, LayerRef, Modification};

/// Owns the `BaseLayer`, the `currentCommitted` pointer, the table's
/// canonical schema, the rowid allocator, and the set of live connections
/// (spec §4.4.2).
pub struct TableManager {
    pub base: LayerRef,
    pub current_committed: RwLock<LayerRef>,
    pub schema: RwLock<Arc<Table>>,
    next_rowid: AtomicI64,
    next_connection_id: AtomicU64,
    connections: Mutex<Vec<Weak<ConnectionState>>>,
    commit_latch: Mutex<()>,
    collapse_latch: Mutex<()>,
    pub schema_latch: Mutex<()>,
}

impl TableManager {
    pub fn new(schema: Arc<Table>) -> Arc<Self> {
        let base = Layer::new_base(schema.has_rowid_alias());
        Arc::new(TableManager {
            current_committed: RwLock::new(base.clone()),
            base,
            schema: RwLock::new(schema),
            next_rowid: AtomicI64::new(1),
            next_connection_id: AtomicU64::new(1),
            connections: Mutex::new(Vec::new()),
            commit_latch: Mutex::new(()),
            collapse_latch: Mutex::new(()),
            schema_latch: Mutex::new(()),
        })
    }

    pub fn allocate_rowid(&self) -> i64 {
        self.next_rowid.fetch_add(1, Ordering::SeqCst)
    }

    /// Create and register a fresh connection reading from the current
    /// committed layer.
    pub fn new_connection(self: &Arc<Self>) -> Arc<ConnectionState> {
        let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        let conn = ConnectionState::new(id, self.clone(), self.current_committed());
        self.register_connection(&conn);
        conn
    }

    pub fn current_committed(&self) -> LayerRef {
        self.current_committed.read().unwrap().clone()
    }

    pub fn register_connection(&self, conn: &Arc<ConnectionState>) {
        self.connections.lock().unwrap().push(Arc::downgrade(conn));
    }

    fn live_connections(&self) -> Vec<Arc<ConnectionState>> {
        let mut conns = self.connections.lock().unwrap();
        conns.retain(|w| w.strong_count() > 0);
        conns.iter().filter_map(|w| w.upgrade()).collect()
    }

    /// Commit protocol, spec §4.4.3: staleness check against the current
    /// committed pointer, then advance it and the caller's `readLayer`.
    /// Returns `Err(Busy)` without mutating anything if the pending layer's
    /// parent has been superseded.
    pub fn commit(&self, pending: LayerRef) -> Result<()> {
        let _guard = self.commit_latch.lock().unwrap();
        let current = self.current_committed();
        let parent_matches = match &*pending {
            Layer::Transaction(t) => Arc::ptr_eq(&t.parent, &current),
            Layer::Base(_) => true,
        };
        if !parent_matches {
            debug!("commit staleness: pending layer's parent superseded, returning BUSY");
            return Err(Error::new(ErrorCode::Busy));
        }
        if let Layer::Transaction(t) = &*pending {
            t.committed.store(true, Ordering::SeqCst);
        }
        *self.current_committed.write().unwrap() = pending.clone();
        drop(_guard);
        self.try_collapse();
        Ok(())
    }

    /// Attempt to merge the top committed `TransactionLayer` into its parent
    /// if no live connection still references the parent (spec §4.4.6).
    /// Never blocks commit: uses a try-lock on the collapse latch.
    pub fn try_collapse(&self) {
        let Ok(_guard) = self.collapse_latch.try_lock() else {
            return;
        };
        let top = self.current_committed();
        let Layer::Transaction(top_txn) = &*top else {
            return;
        };
        if !top_txn.is_committed() {
            return;
        }
        let parent = top_txn.parent.clone();
        let still_referenced = self.live_connections().iter().any(|c| {
            Arc::ptr_eq(&c.read_layer(), &parent)
                || c.pending_parent().map(|p| Arc::ptr_eq(&p, &parent)).unwrap_or(false)
        });
        if still_referenced {
            return;
        }
        self.merge_into_parent(top_txn, &parent);
        *self.current_committed.write().unwrap() = parent.clone();
        for conn in self.live_connections() {
            conn.advance_read_layer_if(&top, &parent);
        }
        trace!("collapsed a committed transaction layer into its parent");
    }

    fn merge_into_parent(&self, layer: &crate::storage::layer::TransactionLayer, parent: &LayerRef) {
        match &**parent {
            Layer::Base(base) => {
                let mut base = base.lock().unwrap();
                for (key, modification) in layer.primary_mods.lock().unwrap().iter() {
                    base.apply(None, key.clone(), modification.clone());
                }
                for (idx_name, mods) in layer.secondary_mods.lock().unwrap().iter() {
                    for (key, modification) in mods.iter() {
                        base.apply(Some(idx_name), key.clone(), modification.clone());
                    }
                }
            }
            Layer::Transaction(parent_txn) => {
                for (key, modification) in layer.primary_mods.lock().unwrap().iter() {
                    parent_txn.record_primary(key.clone(), modification.clone());
                }
                for (idx_name, mods) in layer.secondary_mods.lock().unwrap().iter() {
                    for (key, modification) in mods.iter() {
                        parent_txn.record_secondary(idx_name, key.clone(), modification.clone());
                    }
                }
                for rowid in layer.deleted_rowids.lock().unwrap().iter() {
                    parent_txn.mark_rowid_deleted(*rowid);
                }
            }
        }
    }

    /// Run under `schema_latch`: force collapse, then refuse if any live
    /// TransactionLayer still exists (spec §4.4.8).
    pub fn begin_schema_change(&self) -> Result<()> {
        self.try_collapse();
        if matches!(&*self.current_committed(), Layer::Transaction(_)) {
            return Err(Error::with_message(
                ErrorCode::Busy,
                "schema change blocked by a live transaction layer",
            ));
        }
        Ok(())
    }

    pub fn effective_lookup(&self, from: &LayerRef, index_name: Option<&str>, key: &crate::storage::layer::EncodedKey) -> Option<Modification> {
        crate::storage::layer::effective_lookup(from, index_name, key)
    }
}
