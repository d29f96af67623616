//! Database repository layer
//!
//! Provides query and write operations for the cookie jar and the
//! per-origin local store.

use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// A cookie as held by the jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    pub name: String,
    /// URI-encoded value, exactly as written
    pub value: String,
    /// Domain the cookie is scoped to, without a leading dot
    pub domain: String,
    pub path: String,
    /// Host-only cookies match `domain` exactly, never its subdomains
    pub host_only: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl StoredCookie {
    /// True once the expiry time has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// SQLite-backed persistence for cookies and local-store entries
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.connection();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves no partial SQLite state behind
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ============================================
    // Cookie operations
    // ============================================

    /// Insert or replace a cookie keyed by (name, domain, path)
    pub fn upsert_cookie(&self, cookie: &StoredCookie) -> Result<()> {
        let conn = self.connection();
        conn.execute(
            r#"
            INSERT INTO cookies (name, value, domain, path, host_only, expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(name, domain, path) DO UPDATE SET
                value = excluded.value,
                host_only = excluded.host_only,
                expires_at = excluded.expires_at
            "#,
            params![
                cookie.name,
                cookie.value,
                cookie.domain,
                cookie.path,
                cookie.host_only,
                cookie.expires_at.timestamp_millis(),
                cookie.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// All unexpired cookies with the given name, regardless of domain
    pub fn cookies_named(&self, name: &str, now: DateTime<Utc>) -> Result<Vec<StoredCookie>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM cookies
            WHERE name = ?1 AND expires_at > ?2
            ORDER BY length(domain) DESC, created_at ASC
            "#,
        )?;
        let cookies = stmt
            .query_map(params![name, now.timestamp_millis()], Self::row_to_cookie)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cookies)
    }

    /// Delete a single cookie; returns whether one existed
    pub fn delete_cookie(&self, name: &str, domain: &str, path: &str) -> Result<bool> {
        let conn = self.connection();
        let deleted = conn.execute(
            "DELETE FROM cookies WHERE name = ?1 AND domain = ?2 AND path = ?3",
            params![name, domain, path],
        )?;
        Ok(deleted > 0)
    }

    /// Drop every cookie whose expiry has passed
    pub fn purge_expired_cookies(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.connection();
        let deleted = conn.execute(
            "DELETE FROM cookies WHERE expires_at <= ?1",
            params![now.timestamp_millis()],
        )?;
        Ok(deleted)
    }

    fn row_to_cookie(row: &Row) -> rusqlite::Result<StoredCookie> {
        let expires_ms: i64 = row.get("expires_at")?;
        let created_ms: i64 = row.get("created_at")?;

        Ok(StoredCookie {
            name: row.get("name")?,
            value: row.get("value")?,
            domain: row.get("domain")?,
            path: row.get("path")?,
            host_only: row.get("host_only")?,
            expires_at: millis_to_datetime(expires_ms),
            created_at: millis_to_datetime(created_ms),
        })
    }

    // ============================================
    // Local store operations
    // ============================================

    /// Read a local-store value for an origin
    pub fn get_local(&self, origin: &str, key: &str) -> Result<Option<String>> {
        let conn = self.connection();
        conn.query_row(
            "SELECT value FROM local_store WHERE origin = ?1 AND key = ?2",
            params![origin, key],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
    }

    /// Write a local-store value for an origin
    pub fn set_local(&self, origin: &str, key: &str, value: &str) -> Result<()> {
        let conn = self.connection();
        conn.execute(
            r#"
            INSERT INTO local_store (origin, key, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(origin, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![origin, key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Remove a local-store key; returns whether it existed
    pub fn remove_local(&self, origin: &str, key: &str) -> Result<bool> {
        let conn = self.connection();
        let deleted = conn.execute(
            "DELETE FROM local_store WHERE origin = ?1 AND key = ?2",
            params![origin, key],
        )?;
        Ok(deleted > 0)
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
