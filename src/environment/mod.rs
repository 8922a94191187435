//! # Environments
//!
//! Named variable sets used for `{{variable}}` interpolation. At most one
//! environment is active at a time.

pub mod service;
pub mod variables;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::Serialize;

use crate::codec::{self, KeyValues};
use crate::error::Result;
use crate::storage::repository::{Repository, TableSpec};
use crate::storage::timestamp_column;

pub type EnvironmentId = i64;

/// An id no row can have. Activating it deactivates every environment.
pub const NO_ENVIRONMENT: EnvironmentId = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: EnvironmentId,
    pub name: String,
    /// JSON-encoded variable map, as stored.
    pub variables: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Environment {
    /// Malformed stored variables yield an empty map.
    pub fn parsed_variables(&self) -> KeyValues {
        codec::decode_map_lossy(&self.variables, "environment variables")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewEnvironment {
    pub name: String,
    pub variables: KeyValues,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentPatch {
    pub name: Option<String>,
    pub variables: Option<KeyValues>,
}

fn decode(row: &Row<'_>) -> rusqlite::Result<Environment> {
    Ok(Environment {
        id: row.get("id")?,
        name: row.get("name")?,
        variables: row.get("variables")?,
        is_active: row.get("is_active")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

const FIND_ACTIVE: &str = "SELECT * FROM environments WHERE is_active = 1 ORDER BY id ASC LIMIT 1";

// One statement flips every row that disagrees with the target, so no reader
// ever sees two active rows.
const SET_ACTIVE: &str =
    "UPDATE environments SET is_active = (id = ?1) WHERE is_active != (id = ?1)";

pub struct EnvironmentRepository {
    base: Repository<Environment>,
}

impl Default for EnvironmentRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentRepository {
    pub fn new() -> Self {
        Self {
            base: Repository::new(TableSpec {
                table: "environments",
                insert_columns: &["name", "variables"],
                update_columns: &["name", "variables"],
                decode,
            }),
        }
    }

    pub fn find_by_id(&self, conn: &Connection, id: EnvironmentId) -> Result<Option<Environment>> {
        self.base.find_by_id(conn, id)
    }

    pub fn find_all(&self, conn: &Connection) -> Result<Vec<Environment>> {
        self.base.find_all(conn)
    }

    /// New environments start inactive.
    pub fn create(&self, conn: &Connection, new: &NewEnvironment) -> Result<Environment> {
        self.base.create(
            conn,
            vec![
                Value::Text(new.name.clone()),
                Value::Text(codec::encode_map(&new.variables)),
            ],
        )
    }

    pub fn update(
        &self,
        conn: &Connection,
        id: EnvironmentId,
        patch: &EnvironmentPatch,
    ) -> Result<Option<Environment>> {
        self.base.update(
            conn,
            id,
            vec![
                patch.name.clone().map(Value::Text),
                patch
                    .variables
                    .as_ref()
                    .map(|variables| Value::Text(codec::encode_map(variables))),
            ],
        )
    }

    pub fn delete(&self, conn: &Connection, id: EnvironmentId) -> Result<bool> {
        self.base.delete(conn, id)
    }

    pub fn find_active(&self, conn: &Connection) -> Result<Option<Environment>> {
        self.base.query_one(conn, "findActive", FIND_ACTIVE, [])
    }

    /// Makes `id` the only active environment. Returns whether `id` is active
    /// afterwards, which is false for an unknown id (every row is then
    /// inactive).
    pub fn set_active(&self, conn: &Connection, id: EnvironmentId) -> Result<bool> {
        let changed = self.base.execute(conn, "setActive", SET_ACTIVE, [id])?;
        tracing::debug!(id, changed, "active environment switched");
        Ok(self
            .find_active(conn)?
            .is_some_and(|active| active.id == id))
    }
}
