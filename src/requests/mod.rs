//! Saved requests and their execution.

pub mod service;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::Serialize;

use crate::codec::{self, KeyValues};
use crate::collections::{optional_text, CollectionId};
use crate::error::Result;
use crate::http::method::HttpMethod;
use crate::storage::repository::{Repository, TableSpec};
use crate::storage::timestamp_column;

pub type RequestId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRequest {
    pub id: RequestId,
    pub collection_id: CollectionId,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    /// JSON-encoded header map, as stored.
    pub headers: Option<String>,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SavedRequest {
    pub fn parsed_headers(&self) -> KeyValues {
        self.headers
            .as_deref()
            .map(|raw| codec::decode_map_lossy(raw, "request headers"))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequest {
    pub collection_id: CollectionId,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub headers: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestPatch {
    pub collection_id: Option<CollectionId>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    pub headers: Option<Option<String>>,
    pub body: Option<Option<String>>,
}

fn decode(row: &Row<'_>) -> rusqlite::Result<SavedRequest> {
    Ok(SavedRequest {
        id: row.get("id")?,
        collection_id: row.get("collection_id")?,
        name: row.get("name")?,
        url: row.get("url")?,
        method: row.get("method")?,
        headers: row.get("headers")?,
        body: row.get("body")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

const COLUMNS: &[&str] = &["collection_id", "name", "url", "method", "headers", "body"];

const FIND_BY_COLLECTION: &str =
    "SELECT * FROM requests WHERE collection_id = ?1 ORDER BY created_at DESC, id DESC";

const FIND_BY_URL_AND_METHOD: &str =
    "SELECT * FROM requests WHERE url = ?1 AND method = ?2 ORDER BY id ASC LIMIT 1";

pub struct RequestRepository {
    base: Repository<SavedRequest>,
}

impl Default for RequestRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestRepository {
    pub fn new() -> Self {
        Self {
            base: Repository::new(TableSpec {
                table: "requests",
                insert_columns: COLUMNS,
                update_columns: COLUMNS,
                decode,
            }),
        }
    }

    pub fn find_by_id(&self, conn: &Connection, id: RequestId) -> Result<Option<SavedRequest>> {
        self.base.find_by_id(conn, id)
    }

    pub fn find_all(&self, conn: &Connection) -> Result<Vec<SavedRequest>> {
        self.base.find_all(conn)
    }

    pub fn create(&self, conn: &Connection, new: &NewRequest) -> Result<SavedRequest> {
        self.base.create(
            conn,
            vec![
                Value::Integer(new.collection_id),
                Value::Text(new.name.clone()),
                Value::Text(new.url.clone()),
                Value::Text(new.method.as_str().to_string()),
                optional_text(new.headers.as_deref()),
                optional_text(new.body.as_deref()),
            ],
        )
    }

    pub fn update(
        &self,
        conn: &Connection,
        id: RequestId,
        patch: &RequestPatch,
    ) -> Result<Option<SavedRequest>> {
        self.base.update(
            conn,
            id,
            vec![
                patch.collection_id.map(Value::Integer),
                patch.name.clone().map(Value::Text),
                patch.url.clone().map(Value::Text),
                patch.method.map(|method| Value::Text(method.as_str().to_string())),
                patch.headers.as_ref().map(|h| optional_text(h.as_deref())),
                patch.body.as_ref().map(|b| optional_text(b.as_deref())),
            ],
        )
    }

    pub fn delete(&self, conn: &Connection, id: RequestId) -> Result<bool> {
        self.base.delete(conn, id)
    }

    /// Requests of one collection, most recent first.
    pub fn find_by_collection(
        &self,
        conn: &Connection,
        collection_id: CollectionId,
    ) -> Result<Vec<SavedRequest>> {
        self.base
            .query(conn, "findByCollection", FIND_BY_COLLECTION, [collection_id])
    }

    /// Oldest request stored with exactly this URL and method.
    pub fn find_by_url_and_method(
        &self,
        conn: &Connection,
        url: &str,
        method: HttpMethod,
    ) -> Result<Option<SavedRequest>> {
        self.base.query_one(
            conn,
            "findByUrlAndMethod",
            FIND_BY_URL_AND_METHOD,
            rusqlite::params![url, method],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{CollectionRepository, NewCollection};
    use crate::storage::schema;

    fn setup() -> (Connection, RequestRepository, CollectionId) {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", true).unwrap();
        schema::apply(&conn).unwrap();
        let collection = CollectionRepository::new()
            .create(
                &conn,
                &NewCollection {
                    name: "c".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        (conn, RequestRepository::new(), collection.id)
    }

    fn new(collection_id: CollectionId, url: &str, method: HttpMethod) -> NewRequest {
        NewRequest {
            collection_id,
            name: url.to_string(),
            url: url.to_string(),
            method,
            headers: None,
            body: None,
        }
    }

    #[test]
    fn create_keeps_every_supplied_field() {
        let (conn, repo, collection_id) = setup();
        let created = repo
            .create(
                &conn,
                &NewRequest {
                    collection_id,
                    name: "Create user".into(),
                    url: "{{baseUrl}}/users".into(),
                    method: HttpMethod::Post,
                    headers: Some(r#"{"Content-Type":"application/json"}"#.into()),
                    body: Some(r#"{"name":"ada"}"#.into()),
                },
            )
            .unwrap();

        let found = repo.find_by_id(&conn, created.id).unwrap().unwrap();
        assert_eq!(found.method, HttpMethod::Post);
        assert_eq!(found.url, "{{baseUrl}}/users");
        assert_eq!(found.parsed_headers()["Content-Type"], "application/json");
        assert_eq!(found.body.as_deref(), Some(r#"{"name":"ada"}"#));
    }

    #[test]
    fn find_by_collection_is_most_recent_first() {
        let (conn, repo, collection_id) = setup();
        let first = repo.create(&conn, &new(collection_id, "http://a", HttpMethod::Get)).unwrap();
        let second = repo.create(&conn, &new(collection_id, "http://b", HttpMethod::Get)).unwrap();

        let ids: Vec<_> = repo
            .find_by_collection(&conn, collection_id)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn url_and_method_must_both_match() {
        let (conn, repo, collection_id) = setup();
        let get = repo.create(&conn, &new(collection_id, "http://a", HttpMethod::Get)).unwrap();
        repo.create(&conn, &new(collection_id, "http://a", HttpMethod::Post)).unwrap();

        let found = repo
            .find_by_url_and_method(&conn, "http://a", HttpMethod::Get)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, get.id);
        assert!(repo
            .find_by_url_and_method(&conn, "http://a", HttpMethod::Delete)
            .unwrap()
            .is_none());
    }

    #[test]
    fn partial_update_changes_only_supplied_fields() {
        let (conn, repo, collection_id) = setup();
        let created = repo
            .create(
                &conn,
                &NewRequest {
                    body: Some("payload".into()),
                    ..new(collection_id, "http://a", HttpMethod::Put)
                },
            )
            .unwrap();

        let updated = repo
            .update(
                &conn,
                created.id,
                &RequestPatch {
                    method: Some(HttpMethod::Patch),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.method, HttpMethod::Patch);
        assert_eq!(updated.url, created.url);
        assert_eq!(updated.body.as_deref(), Some("payload"));
        assert!(updated.updated_at > created.updated_at);
    }

    #[test]
    fn malformed_headers_parse_to_empty_map() {
        let (conn, repo, collection_id) = setup();
        let created = repo
            .create(
                &conn,
                &NewRequest {
                    headers: Some("not json".into()),
                    ..new(collection_id, "http://a", HttpMethod::Get)
                },
            )
            .unwrap();
        assert!(created.parsed_headers().is_empty());
    }
}
