//! Database layer for astronomer
//!
//! Persists the host-side state that normalization reads across page loads:
//! - the cookie jar (domain-scoped cookies with expiry)
//! - the per-origin local store used by file and extension pages

pub mod repo;
pub mod schema;

pub use repo::{Database, StoredCookie};
