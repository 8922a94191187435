use super::{History, HistoryId, RecentHistory};
use crate::context::Repositories;
use crate::error::Result;
use crate::requests::RequestId;
use crate::storage::Database;

pub struct HistoryService<'a> {
    db: &'a Database,
    repos: &'a Repositories,
}

impl<'a> HistoryService<'a> {
    pub fn new(db: &'a Database, repos: &'a Repositories) -> Self {
        Self { db, repos }
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<RecentHistory>> {
        self.db
            .with_handle(|conn| self.repos.history.find_recent(conn, limit))
    }

    pub fn by_request(&self, request_id: RequestId) -> Result<Vec<History>> {
        self.db
            .with_handle(|conn| self.repos.history.find_by_request(conn, request_id))
    }

    pub fn get(&self, id: HistoryId) -> Result<Option<History>> {
        self.db
            .with_handle(|conn| self.repos.history.find_by_id(conn, id))
    }

    pub fn delete(&self, id: HistoryId) -> Result<bool> {
        tracing::info!(id, "deleting history entry");
        self.db
            .with_handle(|conn| self.repos.history.delete(conn, id))
    }

    pub fn clear(&self) -> Result<usize> {
        let removed = self
            .db
            .with_handle(|conn| self.repos.history.clear(conn))?;
        tracing::info!(removed, "history cleared");
        Ok(removed)
    }
}
