//! Connection state (spec §4.4.3): the read snapshot, the pending write-set
//! layer, and savepoints.

use std::sync::{Arc, Mutex};

use crate::error::{Error, ErrorCode, Result};
use crate::storage::layer::{Layer, LayerRef, ModSnapshot, TransactionLayer};
use crate::storage::manager::TableManager;

pub struct ConnectionState {
    pub id: u64,
    pub manager: Arc<TableManager>,
    read_layer: Mutex<LayerRef>,
    pending: Mutex<Option<LayerRef>>,
    savepoints: Mutex<Vec<ModSnapshot>>,
}

impl ConnectionState {
    pub fn new(id: u64, manager: Arc<TableManager>, read_layer: LayerRef) -> Arc<Self> {
        Arc::new(ConnectionState {
            id,
            manager,
            read_layer: Mutex::new(read_layer),
            pending: Mutex::new(None),
            savepoints: Mutex::new(Vec::new()),
        })
    }

    pub fn read_layer(&self) -> LayerRef {
        self.read_layer.lock().unwrap().clone()
    }

    /// The layer this connection currently reads and writes through: the
    /// pending transaction layer inside a write transaction, else the read
    /// snapshot (spec §4.4.5).
    pub fn active_layer(&self) -> LayerRef {
        self.pending.lock().unwrap().clone().unwrap_or_else(|| self.read_layer())
    }

    pub fn pending_parent(&self) -> Option<LayerRef> {
        let pending = self.pending.lock().unwrap();
        match pending.as_deref() {
            Some(Layer::Transaction(t)) => Some(t.parent.clone()),
            _ => None,
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }

    pub fn advance_read_layer_if(&self, old: &LayerRef, new: &LayerRef) {
        let mut rl = self.read_layer.lock().unwrap();
        if Arc::ptr_eq(&rl, old) {
            *rl = new.clone();
        }
    }

    /// Establish a fresh pending layer parented to the current read snapshot
    /// (spec §4.4.3).
    pub fn begin(&self) -> Result<()> {
        if self.in_transaction() {
            return Err(Error::with_message(ErrorCode::Misuse, "transaction already in progress"));
        }
        let parent = self.read_layer();
        *self.pending.lock().unwrap() = Some(Arc::new(Layer::Transaction(TransactionLayer::new(parent))));
        self.savepoints.lock().unwrap().clear();
        Ok(())
    }

    fn transaction_layer(&self) -> Result<LayerRef> {
        self.pending
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::with_message(ErrorCode::Misuse, "no transaction in progress"))
    }

    pub fn pending_transaction(&self) -> Result<LayerRef> {
        self.transaction_layer()
    }

    /// Commit protocol, spec §4.4.3: staleness check, advance pointers, then
    /// schedule a collapse attempt. On BUSY the pending layer is discarded
    /// regardless.
    pub fn commit(&self) -> Result<()> {
        let pending = self.transaction_layer()?;
        let result = self.manager.commit(pending.clone());
        *self.pending.lock().unwrap() = None;
        self.savepoints.lock().unwrap().clear();
        result?;
        *self.read_layer.lock().unwrap() = pending;
        Ok(())
    }

    pub fn rollback(&self) {
        *self.pending.lock().unwrap() = None;
        self.savepoints.lock().unwrap().clear();
    }

    pub fn savepoint(&self) -> Result<usize> {
        let layer = self.transaction_layer()?;
        let Layer::Transaction(t) = &*layer else {
            unreachable!("pending layer is always a TransactionLayer")
        };
        let mut stack = self.savepoints.lock().unwrap();
        stack.push(t.snapshot_mods());
        Ok(stack.len() - 1)
    }

    pub fn release(&self, mark: usize) -> Result<()> {
        let mut stack = self.savepoints.lock().unwrap();
        if mark >= stack.len() {
            return Err(Error::with_message(ErrorCode::Misuse, "no such savepoint"));
        }
        stack.truncate(mark);
        Ok(())
    }

    pub fn rollback_to(&self, mark: usize) -> Result<()> {
        let layer = self.transaction_layer()?;
        let Layer::Transaction(t) = &*layer else {
            unreachable!("pending layer is always a TransactionLayer")
        };
        let mut stack = self.savepoints.lock().unwrap();
        let snap = stack.get(mark).cloned().ok_or_else(|| Error::with_message(ErrorCode::Misuse, "no such savepoint"))?;
        t.restore_mods(snap);
        stack.truncate(mark + 1);
        Ok(())
    }
}
