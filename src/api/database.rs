//! The shared, possibly-multi-connection database handle, spec §6.1.
//!
//! Owns the one `Catalog` every `Connection` opened against it shares
//! (spec §4.2 calls the catalog out as a resource latched, not cloned, per
//! connection), and seeds it with the one concrete virtual-table module
//! this crate ships (`storage::memory::MemoryModule`, registered under the
//! name `"memory"`, spec §1/§4.4) plus the built-in scalar/aggregate
//! functions (`functions::builtins`).

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::functions;
use crate::schema::Catalog;
use crate::storage::memory::MemoryModule;

use super::connection::Connection;

pub struct Database {
    pub(crate) catalog: RwLock<Catalog>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new_unshared()
    }
}

impl Database {
    /// Open a fresh in-memory database, ready to accept connections.
    pub fn new() -> Arc<Database> {
        Arc::new(Self::new_unshared())
    }

    fn new_unshared() -> Database {
        let mut catalog = Catalog::new();
        catalog.register_module("memory", MemoryModule::new(), None);
        for f in functions::builtins() {
            catalog.register_function(f);
        }
        Database { catalog: RwLock::new(catalog) }
    }

    /// Export the current catalog as the spec §6.5 JSON schema document.
    pub async fn schema_json(&self) -> serde_json::Value {
        crate::json_schema::export(&*self.catalog.read().await)
    }
}

/// Open a new `Connection` against `db`. A free function rather than a
/// `Database` method so the embedding program chooses whether `db` lives
/// behind an `Arc` it shares across connections or one it owns outright.
pub fn connect(db: Arc<Database>) -> Arc<Connection> {
    Connection::new(db)
}
