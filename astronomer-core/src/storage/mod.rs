//! Key/value persistence for cross-page correlation data
//!
//! Pages delivered over the network keep state in the cookie jar; pages that
//! never touch the network (`file:`, `chrome-extension:`) keep it in a local
//! store keyed by origin. The choice is a pure function of the page scheme and
//! is made per call:
//!
//! | Page scheme          | Backend                    |
//! |----------------------|----------------------------|
//! | `file:`              | [`LocalStoreBackend`]      |
//! | `chrome-extension:`  | [`LocalStoreBackend`]      |
//! | anything else        | [`CookieBackend`]          |
//!
//! Both backends swallow read failures: a value that cannot be read or
//! decoded is reported as absent.

mod cookie;
mod local;

pub use cookie::{CookieBackend, PublicSuffixes, COOKIE_MAX_AGE_DAYS, DEFAULT_PUBLIC_SUFFIXES};
pub use local::LocalStoreBackend;

use crate::db::Database;
use crate::error::Result;
use crate::page::{PageEnvironment, Scheme};

/// Which backend a [`KeyValueStore`] writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Cookie,
    LocalStore,
}

/// Minimal get/set capability shared by both backends
pub trait KeyValueStore {
    /// Read a value; unreadable or malformed values are `None`
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, or clear the slot when `value` is `None`
    fn set(&self, key: &str, value: Option<&str>) -> Result<()>;

    /// The backend this store writes to
    fn kind(&self) -> BackendKind;
}

/// Backend to use for pages delivered over `scheme`
pub fn backend_kind_for(scheme: &Scheme) -> BackendKind {
    if scheme.is_local() {
        BackendKind::LocalStore
    } else {
        BackendKind::Cookie
    }
}

/// A backend chosen for one page
pub enum Backend<'a> {
    Cookie(CookieBackend<'a>),
    LocalStore(LocalStoreBackend<'a>),
}

impl KeyValueStore for Backend<'_> {
    fn get(&self, key: &str) -> Option<String> {
        match self {
            Backend::Cookie(b) => b.get(key),
            Backend::LocalStore(b) => b.get(key),
        }
    }

    fn set(&self, key: &str, value: Option<&str>) -> Result<()> {
        match self {
            Backend::Cookie(b) => b.set(key, value),
            Backend::LocalStore(b) => b.set(key, value),
        }
    }

    fn kind(&self) -> BackendKind {
        match self {
            Backend::Cookie(_) => BackendKind::Cookie,
            Backend::LocalStore(_) => BackendKind::LocalStore,
        }
    }
}

/// Picks the persistence backend for a page
pub struct StorageSelector<'a> {
    db: &'a Database,
    suffixes: &'a PublicSuffixes,
}

impl<'a> StorageSelector<'a> {
    pub fn new(db: &'a Database, suffixes: &'a PublicSuffixes) -> Self {
        Self { db, suffixes }
    }

    /// Backend for `page`, decided from its scheme alone
    pub fn select(&self, page: &PageEnvironment) -> Backend<'a> {
        match backend_kind_for(&page.scheme) {
            BackendKind::LocalStore => {
                Backend::LocalStore(LocalStoreBackend::new(self.db, page.origin()))
            }
            BackendKind::Cookie => Backend::Cookie(CookieBackend::new(
                self.db,
                page.hostname.clone(),
                self.suffixes,
            )),
        }
    }
}
