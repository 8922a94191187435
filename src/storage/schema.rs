//! Table and trigger definitions.
//!
//! Timestamps are unix milliseconds. The `*_touch_updated_at` triggers keep
//! `updated_at` strictly increasing for writes that bypass the repository
//! (which injects its own timestamp).

use rusqlite::Connection;

use crate::error::{AppError, Result};

pub const SCHEMA_VERSION: i32 = 1;

const NOW_MILLIS_SQL: &str = "CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)";

const TABLES: &str = "
CREATE TABLE IF NOT EXISTS collections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    parent_id INTEGER REFERENCES collections (id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_collections_parent ON collections (parent_id);

CREATE TABLE IF NOT EXISTS requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection_id INTEGER NOT NULL REFERENCES collections (id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    method TEXT NOT NULL
        CHECK (method IN ('GET', 'POST', 'PUT', 'DELETE', 'PATCH', 'HEAD', 'OPTIONS')),
    headers TEXT,
    body TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_requests_collection ON requests (collection_id);
CREATE INDEX IF NOT EXISTS idx_requests_url_method ON requests (url, method);

CREATE TABLE IF NOT EXISTS environments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    variables TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 0 CHECK (is_active IN (0, 1)),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id INTEGER NOT NULL REFERENCES requests (id) ON DELETE CASCADE,
    response_status INTEGER,
    response_headers TEXT,
    response_body TEXT,
    response_time INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_request ON history (request_id, created_at);

CREATE TRIGGER IF NOT EXISTS history_immutable
BEFORE UPDATE ON history
BEGIN
    SELECT RAISE(ABORT, 'history rows are immutable');
END;
";

fn touch_trigger(table: &str) -> String {
    format!(
        "CREATE TRIGGER IF NOT EXISTS {table}_touch_updated_at
         AFTER UPDATE ON {table}
         WHEN NEW.updated_at <= OLD.updated_at
         BEGIN
             UPDATE {table}
             SET updated_at = MAX({NOW_MILLIS_SQL}, OLD.updated_at + 1)
             WHERE id = NEW.id;
         END;"
    )
}

/// Creates tables and triggers once, tracked through `PRAGMA user_version`.
pub fn apply(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|err| AppError::storage("read schema version", "database", err))?;
    if version >= SCHEMA_VERSION {
        tracing::debug!(version, "schema already applied");
        return Ok(());
    }

    let mut ddl = String::from("BEGIN;\n");
    ddl.push_str(TABLES);
    for table in ["collections", "requests", "environments"] {
        ddl.push_str(&touch_trigger(table));
        ddl.push('\n');
    }
    ddl.push_str(&format!("PRAGMA user_version = {SCHEMA_VERSION};\nCOMMIT;"));

    conn.execute_batch(&ddl)
        .map_err(|err| AppError::storage("apply schema", "database", err))?;
    tracing::info!(version = SCHEMA_VERSION, "schema applied");
    Ok(())
}
