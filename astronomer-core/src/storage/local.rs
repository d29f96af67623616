//! Local store backend for pages that never reach the network.

use crate::db::Database;
use crate::error::Result;

use super::{BackendKind, KeyValueStore};

/// Origin-scoped key/value store persisted in the database
pub struct LocalStoreBackend<'a> {
    db: &'a Database,
    origin: String,
}

impl<'a> LocalStoreBackend<'a> {
    pub fn new(db: &'a Database, origin: impl Into<String>) -> Self {
        Self {
            db,
            origin: origin.into(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl KeyValueStore for LocalStoreBackend<'_> {
    fn get(&self, key: &str) -> Option<String> {
        match self.db.get_local(&self.origin, key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(origin = %self.origin, key, error = %e, "Local store read failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => self.db.set_local(&self.origin, key, value),
            None => self.db.remove_local(&self.origin, key).map(|_| ()),
        }
    }

    fn kind(&self) -> BackendKind {
        BackendKind::LocalStore
    }
}
