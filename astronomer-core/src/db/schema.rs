//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: cookie jar and per-origin local store
    r#"
    CREATE TABLE IF NOT EXISTS cookies (
        name             TEXT NOT NULL,
        value            TEXT NOT NULL,
        domain           TEXT NOT NULL,
        path             TEXT NOT NULL DEFAULT '/',
        host_only        INTEGER NOT NULL,
        expires_at       INTEGER NOT NULL,   -- unix millis
        created_at       INTEGER NOT NULL,   -- unix millis

        PRIMARY KEY (name, domain, path)
    );

    CREATE INDEX IF NOT EXISTS idx_cookies_name ON cookies(name);

    CREATE TABLE IF NOT EXISTS local_store (
        origin           TEXT NOT NULL,
        key              TEXT NOT NULL,
        value            TEXT NOT NULL,
        updated_at       DATETIME NOT NULL,

        PRIMARY KEY (origin, key)
    );
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::debug!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
