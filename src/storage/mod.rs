//! Connection manager for the single embedded SQLite file.
//!
//! The [`Database`] exclusively owns the connection. Repositories never hold
//! it; they borrow a `&Connection` for the duration of one call through
//! [`Database::with_handle`] or [`Database::run_in_transaction`].

pub mod repository;
pub mod schema;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};

use crate::error::{AppError, Result};

const STATEMENT_CACHE_CAPACITY: usize = 64;
const BUSY_TIMEOUT_MS: u64 = 5_000;

pub struct Database {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
    tx_owner: Mutex<Option<ThreadId>>,
}

impl Database {
    /// Describes the store at `path`; nothing is opened until
    /// [`initialize`](Self::initialize).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: Mutex::new(None),
            tx_owner: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the file (creating it and its directory), switches to WAL and
    /// applies the schema. Calling it again on an open store is a no-op.
    pub fn initialize(&self) -> Result<()> {
        let mut slot = self.lock_conn();
        if slot.is_some() {
            return Ok(());
        }

        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| AppError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(&self.path)
            .map_err(|err| AppError::storage("open", "database", err))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| AppError::storage("set journal mode", "database", err))?;
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(|err| AppError::storage("enable foreign keys", "database", err))?;
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))
            .map_err(|err| AppError::storage("set busy timeout", "database", err))?;
        conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);

        schema::apply(&conn)?;

        *slot = Some(conn);
        tracing::info!(path = %self.path.display(), "database initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.lock_conn().is_some()
    }

    /// Runs `f` with the open connection outside of any explicit transaction.
    pub fn with_handle<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.ensure_not_in_transaction()?;
        let slot = self.lock_conn();
        let conn = slot.as_ref().ok_or(AppError::NotInitialized)?;
        f(conn)
    }

    /// Runs `work` inside one `BEGIN IMMEDIATE` transaction: its writes commit
    /// together when it returns `Ok` and roll back otherwise.
    ///
    /// Calling this (or [`with_handle`](Self::with_handle)) from inside `work`
    /// fails with [`AppError::NestedTransaction`].
    pub fn run_in_transaction<T>(&self, work: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.ensure_not_in_transaction()?;
        let slot = self.lock_conn();
        let conn = slot.as_ref().ok_or(AppError::NotInitialized)?;

        let _owner = TxOwnerGuard::claim(&self.tx_owner);
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
            .map_err(|err| AppError::storage("begin transaction", "database", err))?;

        match work(&tx) {
            Ok(value) => {
                tx.commit()
                    .map_err(|err| AppError::storage("commit", "database", err))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Releases the connection. Later calls fail with
    /// [`AppError::NotInitialized`] until the store is initialized again.
    pub fn close(&self) -> Result<()> {
        self.ensure_not_in_transaction()?;
        let conn = self.lock_conn().take();
        if let Some(conn) = conn {
            conn.close()
                .map_err(|(_, err)| AppError::storage("close", "database", err))?;
            tracing::info!(path = %self.path.display(), "database connection closed");
        }
        Ok(())
    }

    fn ensure_not_in_transaction(&self) -> Result<()> {
        let owner = *self
            .tx_owner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if owner == Some(thread::current().id()) {
            return Err(AppError::NestedTransaction);
        }
        Ok(())
    }

    fn lock_conn(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks the current thread as the transaction owner until dropped.
struct TxOwnerGuard<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
}

impl<'a> TxOwnerGuard<'a> {
    fn claim(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(thread::current().id());
        Self { slot }
    }
}

impl Drop for TxOwnerGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Current wall clock in unix milliseconds, the unit every timestamp column uses.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn timestamp_column(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(column)?;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Integer,
            format!("timestamp out of range in `{column}`: {millis}").into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("nested").join("test.db"));
        (dir, db)
    }

    #[test]
    fn handle_before_initialize_fails() {
        let (_dir, db) = temp_db();
        let err = db.with_handle(|_| Ok(())).unwrap_err();
        assert!(matches!(err, AppError::NotInitialized));
    }

    #[test]
    fn initialize_creates_directory_and_is_idempotent() {
        let (_dir, db) = temp_db();
        db.initialize().unwrap();
        db.initialize().unwrap();
        assert!(db.path().exists());

        let mode: String = db
            .with_handle(|conn| {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .map_err(|err| AppError::storage("read", "pragma", err))
            })
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn close_then_use_fails() {
        let (_dir, db) = temp_db();
        db.initialize().unwrap();
        db.close().unwrap();
        assert!(!db.is_initialized());
        let err = db.run_in_transaction(|_| Ok(())).unwrap_err();
        assert!(matches!(err, AppError::NotInitialized));
    }

    #[test]
    fn nested_transaction_fails_fast() {
        let (_dir, db) = temp_db();
        db.initialize().unwrap();

        let err = db
            .run_in_transaction(|_| db.run_in_transaction(|_| Ok(())))
            .unwrap_err();
        assert!(matches!(err, AppError::NestedTransaction));

        // The owner marker is released afterwards.
        db.run_in_transaction(|_| Ok(())).unwrap();
    }

    #[test]
    fn failed_work_rolls_back() {
        let (_dir, db) = temp_db();
        db.initialize().unwrap();

        let result: Result<()> = db.run_in_transaction(|conn| {
            conn.execute(
                "INSERT INTO environments (name, variables, created_at, updated_at)
                 VALUES ('tmp', '{}', 0, 0)",
                [],
            )
            .map_err(|err| AppError::storage("create", "environments", err))?;
            Err(AppError::NotFound {
                entity: "environment",
                id: 1,
            })
        });
        assert!(result.is_err());

        let count: i64 = db
            .with_handle(|conn| {
                conn.query_row("SELECT COUNT(*) FROM environments", [], |row| row.get(0))
                    .map_err(|err| AppError::storage("count", "environments", err))
            })
            .unwrap();
        assert_eq!(count, 0);
    }
}
