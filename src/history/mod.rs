//! # Request history
//!
//! One immutable row per execution of a saved request. `executed_at` is the
//! creation timestamp; rows are never updated, only deleted (directly, via
//! [`HistoryRepository::clear`], or by cascade with their request).

pub mod service;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::Serialize;

use crate::codec::{self, KeyValues};
use crate::collections::optional_text;
use crate::error::Result;
use crate::http::method::HttpMethod;
use crate::requests::RequestId;
use crate::storage::repository::{Repository, TableSpec};
use crate::storage::timestamp_column;

pub type HistoryId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    pub id: HistoryId,
    pub request_id: RequestId,
    /// `None` when the call never produced a response.
    pub response_status: Option<u16>,
    pub response_headers: Option<String>,
    pub response_body: Option<String>,
    /// Elapsed milliseconds.
    pub response_time: Option<i64>,
    pub executed_at: DateTime<Utc>,
}

impl History {
    pub fn parsed_headers(&self) -> KeyValues {
        self.response_headers
            .as_deref()
            .map(|raw| codec::decode_map_lossy(raw, "response headers"))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewHistory {
    pub request_id: RequestId,
    pub response_status: Option<u16>,
    pub response_headers: Option<String>,
    pub response_body: Option<String>,
    pub response_time: Option<i64>,
}

/// A history row with the owning request's display fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentHistory {
    #[serde(flatten)]
    pub entry: History,
    pub request_name: String,
    pub method: HttpMethod,
    pub url: String,
}

fn decode(row: &Row<'_>) -> rusqlite::Result<History> {
    Ok(History {
        id: row.get("id")?,
        request_id: row.get("request_id")?,
        response_status: row.get("response_status")?,
        response_headers: row.get("response_headers")?,
        response_body: row.get("response_body")?,
        response_time: row.get("response_time")?,
        executed_at: timestamp_column(row, "created_at")?,
    })
}

fn decode_recent(row: &Row<'_>) -> rusqlite::Result<RecentHistory> {
    Ok(RecentHistory {
        entry: decode(row)?,
        request_name: row.get("request_name")?,
        method: row.get("request_method")?,
        url: row.get("request_url")?,
    })
}

const FIND_BY_REQUEST: &str =
    "SELECT * FROM history WHERE request_id = ?1 ORDER BY created_at DESC, id DESC";

const FIND_RECENT: &str = "
    SELECT h.*, r.name AS request_name, r.method AS request_method, r.url AS request_url
    FROM history h
    JOIN requests r ON r.id = h.request_id
    ORDER BY h.created_at DESC, h.id DESC
    LIMIT ?1";

const CLEAR: &str = "DELETE FROM history";

pub struct HistoryRepository {
    base: Repository<History>,
}

impl Default for HistoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryRepository {
    pub fn new() -> Self {
        Self {
            base: Repository::new(TableSpec {
                table: "history",
                insert_columns: &[
                    "request_id",
                    "response_status",
                    "response_headers",
                    "response_body",
                    "response_time",
                ],
                update_columns: &[],
                decode,
            }),
        }
    }

    pub fn find_by_id(&self, conn: &Connection, id: HistoryId) -> Result<Option<History>> {
        self.base.find_by_id(conn, id)
    }

    pub fn find_all(&self, conn: &Connection) -> Result<Vec<History>> {
        self.base.find_all(conn)
    }

    pub fn create(&self, conn: &Connection, new: &NewHistory) -> Result<History> {
        self.base.create(
            conn,
            vec![
                Value::Integer(new.request_id),
                new.response_status
                    .map_or(Value::Null, |status| Value::Integer(i64::from(status))),
                optional_text(new.response_headers.as_deref()),
                optional_text(new.response_body.as_deref()),
                new.response_time.map_or(Value::Null, Value::Integer),
            ],
        )
    }

    pub fn delete(&self, conn: &Connection, id: HistoryId) -> Result<bool> {
        self.base.delete(conn, id)
    }

    pub fn find_by_request(&self, conn: &Connection, request_id: RequestId) -> Result<Vec<History>> {
        self.base
            .query(conn, "findByRequest", FIND_BY_REQUEST, [request_id])
    }

    pub fn find_recent(&self, conn: &Connection, limit: usize) -> Result<Vec<RecentHistory>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.base
            .query_with(conn, "findRecent", FIND_RECENT, [limit], decode_recent)
    }

    /// Removes every row; returns how many were removed.
    pub fn clear(&self, conn: &Connection) -> Result<usize> {
        self.base.execute(conn, "clear", CLEAR, [])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{CollectionRepository, NewCollection};
    use crate::requests::{NewRequest, RequestRepository};
    use crate::storage::schema;

    fn setup() -> (Connection, HistoryRepository, RequestId) {
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
        let request = RequestRepository::new()
            .create(
                &conn,
                &NewRequest {
                    collection_id: collection.id,
                    name: "List users".into(),
                    url: "http://localhost/users".into(),
                    method: HttpMethod::Get,
                    headers: None,
                    body: None,
                },
            )
            .unwrap();
        (conn, HistoryRepository::new(), request.id)
    }

    fn entry(request_id: RequestId, status: u16) -> NewHistory {
        NewHistory {
            request_id,
            response_status: Some(status),
            response_headers: Some(r#"{"content-type":"text/plain"}"#.into()),
            response_body: Some("ok".into()),
            response_time: Some(12),
        }
    }

    #[test]
    fn create_and_find_round_trip() {
        let (conn, repo, request_id) = setup();
        let created = repo.create(&conn, &entry(request_id, 201)).unwrap();
        let found = repo.find_by_id(&conn, created.id).unwrap().unwrap();

        assert_eq!(found, created);
        assert_eq!(found.response_status, Some(201));
        assert_eq!(found.response_time, Some(12));
        assert_eq!(found.parsed_headers()["content-type"], "text/plain");
    }

    #[test]
    fn find_by_request_is_newest_first() {
        let (conn, repo, request_id) = setup();
        let older = repo.create(&conn, &entry(request_id, 200)).unwrap();
        let newer = repo.create(&conn, &entry(request_id, 500)).unwrap();

        let ids: Vec<_> = repo
            .find_by_request(&conn, request_id)
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[test]
    fn recent_joins_request_fields_and_honours_limit() {
        let (conn, repo, request_id) = setup();
        for status in [200, 201, 202] {
            repo.create(&conn, &entry(request_id, status)).unwrap();
        }

        let recent = repo.find_recent(&conn, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].entry.response_status, Some(202));
        assert_eq!(recent[0].request_name, "List users");
        assert_eq!(recent[0].method, HttpMethod::Get);
        assert_eq!(recent[0].url, "http://localhost/users");
    }

    #[test]
    fn clear_reports_removed_rows() {
        let (conn, repo, request_id) = setup();
        repo.create(&conn, &entry(request_id, 200)).unwrap();
        repo.create(&conn, &entry(request_id, 404)).unwrap();

        assert_eq!(repo.clear(&conn).unwrap(), 2);
        assert!(repo.find_all(&conn).unwrap().is_empty());
        assert_eq!(repo.clear(&conn).unwrap(), 0);
    }

    #[test]
    fn rows_cascade_with_their_request() {
        let (conn, repo, request_id) = setup();
        repo.create(&conn, &entry(request_id, 200)).unwrap();
        RequestRepository::new().delete(&conn, request_id).unwrap();
        assert!(repo.find_all(&conn).unwrap().is_empty());
    }
}
