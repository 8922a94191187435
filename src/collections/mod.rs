//! # Collections
//!
//! Hierarchical folders of saved requests. The parent graph must stay a
//! forest; [`service::CollectionService`] guards that on every re-parenting.

pub mod service;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::repository::{Repository, TableSpec};
use crate::storage::timestamp_column;

pub type CollectionId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<CollectionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCollection {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<CollectionId>,
}

/// Partial update. `None` leaves a field untouched; for nullable columns
/// `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub parent_id: Option<Option<CollectionId>>,
}

/// A collection annotated with the number of its direct children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionNode {
    #[serde(flatten)]
    pub collection: Collection,
    pub child_count: i64,
}

fn decode(row: &Row<'_>) -> rusqlite::Result<Collection> {
    Ok(Collection {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        parent_id: row.get("parent_id")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

fn decode_node(row: &Row<'_>) -> rusqlite::Result<CollectionNode> {
    Ok(CollectionNode {
        collection: decode(row)?,
        child_count: row.get("child_count")?,
    })
}

const FIND_BY_PARENT: &str =
    "SELECT * FROM collections WHERE parent_id IS ?1 ORDER BY created_at ASC, id ASC";

const FIND_TREE: &str = "
    SELECT c.*, COUNT(child.id) AS child_count
    FROM collections c
    LEFT JOIN collections child ON child.parent_id = c.id
    GROUP BY c.id
    ORDER BY c.created_at ASC, c.id ASC";

pub struct CollectionRepository {
    base: Repository<Collection>,
}

impl Default for CollectionRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionRepository {
    pub fn new() -> Self {
        Self {
            base: Repository::new(TableSpec {
                table: "collections",
                insert_columns: &["name", "description", "parent_id"],
                update_columns: &["name", "description", "parent_id"],
                decode,
            }),
        }
    }

    pub fn find_by_id(&self, conn: &Connection, id: CollectionId) -> Result<Option<Collection>> {
        self.base.find_by_id(conn, id)
    }

    pub fn find_all(&self, conn: &Connection) -> Result<Vec<Collection>> {
        self.base.find_all(conn)
    }

    pub fn create(&self, conn: &Connection, new: &NewCollection) -> Result<Collection> {
        self.base.create(
            conn,
            vec![
                Value::Text(new.name.clone()),
                optional_text(new.description.as_deref()),
                optional_id(new.parent_id),
            ],
        )
    }

    pub fn update(
        &self,
        conn: &Connection,
        id: CollectionId,
        patch: &CollectionPatch,
    ) -> Result<Option<Collection>> {
        self.base.update(
            conn,
            id,
            vec![
                patch.name.clone().map(Value::Text),
                patch
                    .description
                    .as_ref()
                    .map(|description| optional_text(description.as_deref())),
                patch.parent_id.map(optional_id),
            ],
        )
    }

    pub fn delete(&self, conn: &Connection, id: CollectionId) -> Result<bool> {
        self.base.delete(conn, id)
    }

    /// Direct children of `parent_id` (roots when `None`), oldest first.
    pub fn find_by_parent(
        &self,
        conn: &Connection,
        parent_id: Option<CollectionId>,
    ) -> Result<Vec<Collection>> {
        self.base.query(conn, "findByParent", FIND_BY_PARENT, [parent_id])
    }

    /// Every collection with its direct child count, in one aggregate query.
    pub fn find_tree(&self, conn: &Connection) -> Result<Vec<CollectionNode>> {
        self.base
            .query_with(conn, "findTree", FIND_TREE, [], decode_node)
    }
}

pub(crate) fn optional_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

pub(crate) fn optional_id(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}
