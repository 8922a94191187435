use std::time::Instant;

use rusqlite::Connection;
use serde::Serialize;

use super::{NewRequest, RequestId, RequestPatch, SavedRequest};
use crate::codec::{self, KeyValues};
use crate::collections::{CollectionId, NewCollection};
use crate::config::Config;
use crate::context::Repositories;
use crate::error::{AppError, Result};
use crate::history::{History, NewHistory};
use crate::http::dispatcher::Dispatcher;
use crate::http::request::OutboundRequest;
use crate::http::response::ProtocolResponse;
use crate::storage::Database;

/// A completed call together with the rows that record it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub request: SavedRequest,
    pub history: History,
    pub response: ProtocolResponse,
    pub elapsed_ms: i64,
}

enum Outcome<'r> {
    Completed(&'r ProtocolResponse),
    Failed(&'r str),
}

/// Which request row a recorded outcome belongs to.
enum Owner<'r> {
    /// Match by URL and method, creating the row in the default collection.
    Matching(&'r OutboundRequest),
    Saved(RequestId),
}

pub struct RequestService<'a> {
    db: &'a Database,
    repos: &'a Repositories,
    dispatcher: &'a Dispatcher,
    config: &'a Config,
}

impl<'a> RequestService<'a> {
    pub fn new(
        db: &'a Database,
        repos: &'a Repositories,
        dispatcher: &'a Dispatcher,
        config: &'a Config,
    ) -> Self {
        Self {
            db,
            repos,
            dispatcher,
            config,
        }
    }

    /// Executes an ad hoc request and records it.
    ///
    /// Placeholders are resolved from the active environment for the call
    /// itself, while the request row is matched on the unresolved URL so that
    /// templates keep accumulating history. Requests that never leave the
    /// process (bad URL, unsupported scheme, invalid header) record nothing.
    pub async fn send(&self, request: &OutboundRequest) -> Result<Execution> {
        self.execute(request, Owner::Matching(request)).await
    }

    /// Executes a stored request and records the outcome against it.
    pub async fn send_saved(&self, id: RequestId) -> Result<Execution> {
        let saved = self.get(id)?.ok_or(AppError::NotFound {
            entity: "request",
            id,
        })?;
        let request = OutboundRequest {
            method: saved.method,
            url: saved.url.clone(),
            headers: saved.parsed_headers(),
            body: saved.body.clone(),
        };
        self.execute(&request, Owner::Saved(saved.id)).await
    }

    async fn execute(&self, request: &OutboundRequest, owner: Owner<'_>) -> Result<Execution> {
        let variables = self
            .db
            .with_handle(|conn| self.active_variables(conn))?;
        let resolved = request.resolve(&variables);

        let started = Instant::now();
        let result = self.dispatcher.send(&resolved).await;
        let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        match result {
            Ok(response) => {
                let (saved, history) =
                    self.record(&owner, Outcome::Completed(&response), elapsed_ms)?;
                Ok(Execution {
                    request: saved,
                    history,
                    response,
                    elapsed_ms,
                })
            }
            Err(AppError::Transport(message)) => {
                self.record(&owner, Outcome::Failed(&message), elapsed_ms)?;
                Err(AppError::Transport(message))
            }
            Err(err) => Err(err),
        }
    }

    /// Variables of the active environment. A malformed stored value
    /// resolves to an empty map; a storage fault does not.
    fn active_variables(&self, conn: &Connection) -> Result<KeyValues> {
        let active = self.repos.environments.find_active(conn)?;
        Ok(active.map(|env| env.parsed_variables()).unwrap_or_default())
    }

    /// Finds or creates the owning request row and appends one history row,
    /// in a single transaction.
    fn record(
        &self,
        owner: &Owner<'_>,
        outcome: Outcome<'_>,
        elapsed_ms: i64,
    ) -> Result<(SavedRequest, History)> {
        self.db.run_in_transaction(|conn| {
            let saved = match owner {
                Owner::Saved(id) => self
                    .repos
                    .requests
                    .find_by_id(conn, *id)?
                    .ok_or(AppError::NotFound {
                        entity: "request",
                        id: *id,
                    })?,
                Owner::Matching(request) => self.find_or_create(conn, request)?,
            };

            let new = match outcome {
                Outcome::Completed(response) => NewHistory {
                    request_id: saved.id,
                    response_status: Some(response.status),
                    response_headers: Some(codec::encode_map(&response.headers)),
                    response_body: Some(response.raw_body.clone()),
                    response_time: Some(elapsed_ms),
                },
                Outcome::Failed(message) => NewHistory {
                    request_id: saved.id,
                    response_status: None,
                    response_headers: None,
                    response_body: Some(message.to_string()),
                    response_time: Some(elapsed_ms),
                },
            };
            let history = self.repos.history.create(conn, &new)?;
            tracing::info!(request_id = saved.id, history_id = history.id, status = ?new.response_status, "execution recorded");
            Ok((saved, history))
        })
    }

    fn find_or_create(&self, conn: &Connection, request: &OutboundRequest) -> Result<SavedRequest> {
        if let Some(existing) =
            self.repos
                .requests
                .find_by_url_and_method(conn, &request.url, request.method)?
        {
            return Ok(existing);
        }

        let collection_id = self.default_collection(conn)?;
        self.repos.requests.create(
            conn,
            &NewRequest {
                collection_id,
                name: format!("{} {}", request.method, request.url),
                url: request.url.clone(),
                method: request.method,
                headers: encode_headers(&request.headers),
                body: request.body.clone(),
            },
        )
    }

    fn default_collection(&self, conn: &Connection) -> Result<CollectionId> {
        let name = &self.config.default_collection_name;
        let roots = self.repos.collections.find_by_parent(conn, None)?;
        if let Some(existing) = roots.iter().find(|c| &c.name == name) {
            return Ok(existing.id);
        }
        tracing::info!(%name, "creating default collection for ad hoc requests");
        let created = self.repos.collections.create(
            conn,
            &NewCollection {
                name: name.clone(),
                description: None,
                parent_id: None,
            },
        )?;
        Ok(created.id)
    }

    /// Stores `request` in `collection_id`. Without a name the request is
    /// named after its method and URL.
    pub fn save(
        &self,
        request: &OutboundRequest,
        collection_id: CollectionId,
        name: Option<&str>,
    ) -> Result<SavedRequest> {
        let new = NewRequest {
            collection_id,
            name: name
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} {}", request.method, request.url)),
            url: request.url.clone(),
            method: request.method,
            headers: encode_headers(&request.headers),
            body: request.body.clone(),
        };
        tracing::info!(collection_id, name = %new.name, "saving request");
        self.db
            .with_handle(|conn| self.repos.requests.create(conn, &new))
            .map_err(|err| missing_collection(err, collection_id))
    }

    /// Requests of one collection (most recent first), or all requests.
    pub fn list(&self, collection_id: Option<CollectionId>) -> Result<Vec<SavedRequest>> {
        self.db.with_handle(|conn| match collection_id {
            Some(collection_id) => self.repos.requests.find_by_collection(conn, collection_id),
            None => self.repos.requests.find_all(conn),
        })
    }

    pub fn get(&self, id: RequestId) -> Result<Option<SavedRequest>> {
        self.db
            .with_handle(|conn| self.repos.requests.find_by_id(conn, id))
    }

    pub fn update(&self, id: RequestId, patch: &RequestPatch) -> Result<Option<SavedRequest>> {
        tracing::info!(id, "updating request");
        let result = self
            .db
            .with_handle(|conn| self.repos.requests.update(conn, id, patch));
        match patch.collection_id {
            Some(collection_id) => result.map_err(|err| missing_collection(err, collection_id)),
            None => result,
        }
    }

    /// Deletes the request and, by cascade, its history.
    pub fn delete(&self, id: RequestId) -> Result<bool> {
        tracing::info!(id, "deleting request");
        self.db
            .with_handle(|conn| self.repos.requests.delete(conn, id))
    }

    pub fn history(&self, id: RequestId) -> Result<Vec<History>> {
        self.db
            .with_handle(|conn| self.repos.history.find_by_request(conn, id))
    }
}

fn encode_headers(headers: &KeyValues) -> Option<String> {
    (!headers.is_empty()).then(|| codec::encode_map(headers))
}

fn missing_collection(err: AppError, collection_id: CollectionId) -> AppError {
    if err.is_foreign_key_violation() {
        AppError::NotFound {
            entity: "collection",
            id: collection_id,
        }
    } else {
        err
    }
}
