//! Table-agnostic CRUD engine shared by the entity repositories.
//!
//! An entity repository describes its table with a [`TableSpec`] and converts
//! its own typed inputs into positional [`Value`]s; [`Repository`] owns the
//! SQL text, parameter binding and timestamp injection. SQL is rendered once
//! when the repository is constructed and compiled through the connection's
//! prepared statement cache, so each statement is parsed at most once per
//! connection.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};

use super::now_millis;
use crate::error::{AppError, Result};

/// Row decoder for one entity type.
pub type Decoder<E> = fn(&Row<'_>) -> rusqlite::Result<E>;

/// Per-table configuration supplied by an entity repository.
pub struct TableSpec<E> {
    pub table: &'static str,
    /// Columns written by `create`, in binding order.
    pub insert_columns: &'static [&'static str],
    /// Columns a partial `update` may change, in binding order.
    pub update_columns: &'static [&'static str],
    pub decode: Decoder<E>,
}

/// SQL for the five generic operations, rendered from a [`TableSpec`].
#[derive(Debug)]
struct Statements {
    find_by_id: String,
    find_all: String,
    insert: String,
    update: String,
    delete: String,
}

impl Statements {
    fn render(table: &str, insert_columns: &[&str], update_columns: &[&str]) -> Self {
        let insert_count = insert_columns.len();
        let mut columns: Vec<&str> = insert_columns.to_vec();
        columns.extend(["created_at", "updated_at"]);
        let placeholders: Vec<String> = (1..=insert_count)
            .map(|index| format!("?{index}"))
            .chain(std::iter::repeat_n(format!("?{}", insert_count + 1), 2))
            .collect();

        // Each update column binds a "supplied" flag followed by its value, so
        // one cached statement serves every combination of supplied fields.
        let mut assignments: Vec<String> = update_columns
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let flag = index * 2 + 1;
                let value = flag + 1;
                format!("{column} = CASE WHEN ?{flag} THEN ?{value} ELSE {column} END")
            })
            .collect();
        let now = update_columns.len() * 2 + 1;
        assignments.push(format!("updated_at = MAX(?{now}, updated_at + 1)"));

        Self {
            find_by_id: format!("SELECT * FROM {table} WHERE id = ?1"),
            find_all: format!("SELECT * FROM {table} ORDER BY id ASC"),
            insert: format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            ),
            update: format!(
                "UPDATE {table} SET {} WHERE id = ?{}",
                assignments.join(", "),
                now + 1
            ),
            delete: format!("DELETE FROM {table} WHERE id = ?1"),
        }
    }
}

pub struct Repository<E> {
    layout: TableSpec<E>,
    sql: Statements,
}

impl<E> Repository<E> {
    pub fn new(layout: TableSpec<E>) -> Self {
        let sql = Statements::render(layout.table, layout.insert_columns, layout.update_columns);
        tracing::debug!(table = layout.table, insert = %sql.insert, update = %sql.update, "repository statements rendered");
        Self { layout, sql }
    }

    /// Wraps a SQLite fault with this table's name and logs it.
    pub fn fail(&self, operation: &'static str, err: rusqlite::Error) -> AppError {
        tracing::error!(table = self.layout.table, operation, error = %err, "storage operation failed");
        AppError::storage(operation, self.layout.table, err)
    }

    pub fn find_by_id(&self, conn: &Connection, id: i64) -> Result<Option<E>> {
        let decode = self.layout.decode;
        conn.prepare_cached(&self.sql.find_by_id)
            .and_then(|mut stmt| stmt.query_row([id], |row| decode(row)).optional())
            .map_err(|err| self.fail("findById", err))
    }

    pub fn find_all(&self, conn: &Connection) -> Result<Vec<E>> {
        self.query(conn, "findAll", &self.sql.find_all, [])
    }

    /// Inserts `values` (aligned with `insert_columns`) and returns the stored
    /// entity, including its assigned id and timestamps.
    pub fn create(&self, conn: &Connection, values: Vec<Value>) -> Result<E> {
        debug_assert_eq!(values.len(), self.layout.insert_columns.len());
        let mut params = values;
        params.push(Value::Integer(now_millis()));

        conn.prepare_cached(&self.sql.insert)
            .and_then(|mut stmt| stmt.execute(params_from_iter(params.iter())))
            .map_err(|err| self.fail("create", err))?;

        let id = conn.last_insert_rowid();
        let created = self
            .find_by_id(conn, id)?
            .ok_or_else(|| self.fail("create", rusqlite::Error::QueryReturnedNoRows))?;
        tracing::info!(table = self.layout.table, id, "created");
        Ok(created)
    }

    /// Applies the supplied fields of `patch` (aligned with `update_columns`;
    /// `None` leaves a column untouched) and always advances `updated_at`.
    /// Returns `None` when no row has this id.
    pub fn update(&self, conn: &Connection, id: i64, patch: Vec<Option<Value>>) -> Result<Option<E>> {
        debug_assert_eq!(patch.len(), self.layout.update_columns.len());
        let mut params = Vec::with_capacity(patch.len() * 2 + 2);
        for field in patch {
            match field {
                Some(value) => {
                    params.push(Value::Integer(1));
                    params.push(value);
                }
                None => {
                    params.push(Value::Integer(0));
                    params.push(Value::Null);
                }
            }
        }
        params.push(Value::Integer(now_millis()));
        params.push(Value::Integer(id));

        let changed = conn
            .prepare_cached(&self.sql.update)
            .and_then(|mut stmt| stmt.execute(params_from_iter(params.iter())))
            .map_err(|err| self.fail("update", err))?;
        if changed == 0 {
            return Ok(None);
        }

        tracing::info!(table = self.layout.table, id, "updated");
        self.find_by_id(conn, id)
    }

    /// True iff a row was removed.
    pub fn delete(&self, conn: &Connection, id: i64) -> Result<bool> {
        let removed = conn
            .prepare_cached(&self.sql.delete)
            .and_then(|mut stmt| stmt.execute([id]))
            .map_err(|err| self.fail("delete", err))?;
        if removed > 0 {
            tracing::info!(table = self.layout.table, id, "deleted");
        }
        Ok(removed > 0)
    }

    /// Runs a table-specific `SELECT` through the statement cache and decodes
    /// every row with this table's decoder.
    pub fn query<P: rusqlite::Params>(
        &self,
        conn: &Connection,
        operation: &'static str,
        sql: &str,
        params: P,
    ) -> Result<Vec<E>> {
        self.query_with(conn, operation, sql, params, self.layout.decode)
    }

    /// Like [`query`](Self::query) with a caller-supplied row mapper, for
    /// queries that return annotated rows.
    pub fn query_with<T, P: rusqlite::Params>(
        &self,
        conn: &Connection,
        operation: &'static str,
        sql: &str,
        params: P,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        conn.prepare_cached(sql)
            .and_then(|mut stmt| {
                let rows = stmt.query_map(params, |row| map(row))?;
                rows.collect::<rusqlite::Result<Vec<T>>>()
            })
            .map_err(|err| self.fail(operation, err))
    }

    pub fn query_one<P: rusqlite::Params>(
        &self,
        conn: &Connection,
        operation: &'static str,
        sql: &str,
        params: P,
    ) -> Result<Option<E>> {
        let decode = self.layout.decode;
        conn.prepare_cached(sql)
            .and_then(|mut stmt| stmt.query_row(params, |row| decode(row)).optional())
            .map_err(|err| self.fail(operation, err))
    }

    /// Executes a table-specific write and returns the affected row count.
    pub fn execute<P: rusqlite::Params>(
        &self,
        conn: &Connection,
        operation: &'static str,
        sql: &str,
        params: P,
    ) -> Result<usize> {
        conn.prepare_cached(sql)
            .and_then(|mut stmt| stmt.execute(params))
            .map_err(|err| self.fail(operation, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Note {
        id: i64,
        title: String,
        body: Option<String>,
        updated_at: i64,
    }

    fn decode_note(row: &Row<'_>) -> rusqlite::Result<Note> {
        Ok(Note {
            id: row.get("id")?,
            title: row.get("title")?,
            body: row.get("body")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn notes() -> (Connection, Repository<Note>) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                body TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )
        .unwrap();
        let repo = Repository::new(TableSpec {
            table: "notes",
            insert_columns: &["title", "body"],
            update_columns: &["title", "body"],
            decode: decode_note,
        });
        (conn, repo)
    }

    #[test]
    fn rendered_update_binds_flag_value_pairs() {
        let sql = Statements::render("notes", &["title"], &["title", "body"]);
        assert_eq!(
            sql.update,
            "UPDATE notes SET title = CASE WHEN ?1 THEN ?2 ELSE title END, \
             body = CASE WHEN ?3 THEN ?4 ELSE body END, \
             updated_at = MAX(?5, updated_at + 1) WHERE id = ?6"
        );
        assert_eq!(
            sql.insert,
            "INSERT INTO notes (title, created_at, updated_at) VALUES (?1, ?2, ?2)"
        );
    }

    #[test]
    fn create_then_find_by_id_round_trips() {
        let (conn, repo) = notes();
        let created = repo
            .create(&conn, vec![Value::Text("hello".into()), Value::Null])
            .unwrap();

        let found = repo.find_by_id(&conn, created.id).unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(found.title, "hello");
        assert_eq!(found.body, None);
    }

    #[test]
    fn partial_update_keeps_omitted_fields_and_advances_timestamp() {
        let (conn, repo) = notes();
        let created = repo
            .create(&conn, vec![Value::Text("a".into()), Value::Text("body".into())])
            .unwrap();

        let updated = repo
            .update(&conn, created.id, vec![Some(Value::Text("b".into())), None])
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "b");
        assert_eq!(updated.body.as_deref(), Some("body"));
        assert!(updated.updated_at > created.updated_at);

        let cleared = repo
            .update(&conn, created.id, vec![None, Some(Value::Null)])
            .unwrap()
            .unwrap();
        assert_eq!(cleared.title, "b");
        assert_eq!(cleared.body, None);
        assert!(cleared.updated_at > updated.updated_at);
    }

    #[test]
    fn update_and_delete_on_missing_id() {
        let (conn, repo) = notes();
        assert!(repo.update(&conn, 42, vec![None, None]).unwrap().is_none());
        assert!(!repo.delete(&conn, 42).unwrap());
    }

    #[test]
    fn delete_reports_removal() {
        let (conn, repo) = notes();
        let created = repo
            .create(&conn, vec![Value::Text("x".into()), Value::Null])
            .unwrap();
        assert!(repo.delete(&conn, created.id).unwrap());
        assert!(repo.find_by_id(&conn, created.id).unwrap().is_none());
        assert!(repo.find_all(&conn).unwrap().is_empty());
    }

    #[test]
    fn storage_faults_carry_table_and_operation() {
        let conn = Connection::open_in_memory().unwrap();
        let repo = Repository::new(TableSpec {
            table: "missing_table",
            insert_columns: &["title", "body"],
            update_columns: &["title", "body"],
            decode: decode_note,
        });

        match repo.find_all(&conn).unwrap_err() {
            AppError::Storage {
                operation, table, ..
            } => {
                assert_eq!(operation, "findAll");
                assert_eq!(table, "missing_table");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
