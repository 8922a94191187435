use std::collections::HashSet;

use rusqlite::Connection;
use serde::Serialize;

use super::{Collection, CollectionId, CollectionNode, CollectionPatch, NewCollection};
use crate::context::Repositories;
use crate::error::{AppError, Result};
use crate::storage::Database;

/// Rows removed by a cascading collection delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeSummary {
    pub collections: usize,
    pub requests: usize,
}

impl CascadeSummary {
    pub fn removed(&self) -> bool {
        self.collections > 0
    }
}

pub struct CollectionService<'a> {
    db: &'a Database,
    repos: &'a Repositories,
}

impl<'a> CollectionService<'a> {
    pub fn new(db: &'a Database, repos: &'a Repositories) -> Self {
        Self { db, repos }
    }

    /// A parent that does not exist is reported as [`AppError::NotFound`].
    pub fn create(
        &self,
        name: &str,
        description: Option<&str>,
        parent_id: Option<CollectionId>,
    ) -> Result<Collection> {
        tracing::info!(name, ?parent_id, "creating collection");
        let new = NewCollection {
            name: name.to_string(),
            description: description.map(str::to_string),
            parent_id,
        };
        self.db
            .with_handle(|conn| self.repos.collections.create(conn, &new))
            .map_err(|err| match parent_id {
                Some(parent) if err.is_foreign_key_violation() => AppError::NotFound {
                    entity: "parent collection",
                    id: parent,
                },
                _ => err,
            })
    }

    /// Children of `parent_id`, or every collection when `None`.
    pub fn list(&self, parent_id: Option<CollectionId>) -> Result<Vec<Collection>> {
        self.db.with_handle(|conn| match parent_id {
            Some(parent) => self.repos.collections.find_by_parent(conn, Some(parent)),
            None => self.repos.collections.find_all(conn),
        })
    }

    pub fn tree(&self) -> Result<Vec<CollectionNode>> {
        self.db
            .with_handle(|conn| self.repos.collections.find_tree(conn))
    }

    pub fn get(&self, id: CollectionId) -> Result<Option<Collection>> {
        self.db
            .with_handle(|conn| self.repos.collections.find_by_id(conn, id))
    }

    /// Partial update. A parent change is validated exactly like
    /// [`move_collection`](Self::move_collection).
    pub fn update(&self, id: CollectionId, patch: &CollectionPatch) -> Result<Option<Collection>> {
        tracing::info!(id, "updating collection");
        if let Some(new_parent_id) = patch.parent_id {
            let exists = self.get(id)?.is_some();
            if !exists {
                return Ok(None);
            }
            self.db
                .with_handle(|conn| self.ensure_acyclic(conn, id, new_parent_id))?;
        }

        self.db.run_in_transaction(|conn| {
            if let Some(new_parent_id) = patch.parent_id {
                self.ensure_acyclic(conn, id, new_parent_id)?;
            }
            self.repos.collections.update(conn, id, patch)
        })
    }

    /// Deletes the collection, every descendant collection and every request
    /// they own, all in one transaction.
    pub fn delete(&self, id: CollectionId) -> Result<CascadeSummary> {
        tracing::info!(id, "deleting collection");
        let summary = self.db.run_in_transaction(|conn| {
            if self.repos.collections.find_by_id(conn, id)?.is_none() {
                return Ok(CascadeSummary::default());
            }

            let mut levels = vec![vec![id]];
            loop {
                let mut next = Vec::new();
                if let Some(level) = levels.last() {
                    for parent in level {
                        next.extend(
                            self.repos
                                .collections
                                .find_by_parent(conn, Some(*parent))?
                                .into_iter()
                                .map(|child| child.id),
                        );
                    }
                }
                if next.is_empty() {
                    break;
                }
                levels.push(next);
            }

            let mut summary = CascadeSummary::default();
            for level in levels.iter().rev() {
                for collection_id in level {
                    for request in self.repos.requests.find_by_collection(conn, *collection_id)? {
                        if self.repos.requests.delete(conn, request.id)? {
                            summary.requests += 1;
                        }
                    }
                    if self.repos.collections.delete(conn, *collection_id)? {
                        summary.collections += 1;
                    }
                }
            }
            Ok(summary)
        })?;

        tracing::info!(
            id,
            collections = summary.collections,
            requests = summary.requests,
            "collection deleted"
        );
        Ok(summary)
    }

    /// Re-parents `id` under `new_parent_id` (or makes it a root).
    ///
    /// Fails with [`AppError::Cycle`] if the new parent is the collection
    /// itself or one of its descendants, and with [`AppError::NotFound`] if
    /// either collection is missing.
    pub fn move_collection(
        &self,
        id: CollectionId,
        new_parent_id: Option<CollectionId>,
    ) -> Result<Collection> {
        tracing::info!(id, ?new_parent_id, "moving collection");

        self.db.with_handle(|conn| {
            if self.repos.collections.find_by_id(conn, id)?.is_none() {
                return Err(AppError::NotFound {
                    entity: "collection",
                    id,
                });
            }
            self.ensure_acyclic(conn, id, new_parent_id)
        })?;

        self.db.run_in_transaction(|conn| {
            // Re-checked under the write lock.
            self.ensure_acyclic(conn, id, new_parent_id)?;
            let patch = CollectionPatch {
                parent_id: Some(new_parent_id),
                ..Default::default()
            };
            self.repos
                .collections
                .update(conn, id, &patch)?
                .ok_or(AppError::NotFound {
                    entity: "collection",
                    id,
                })
        })
    }

    /// All transitive children of `id`, depth first.
    pub fn descendants(&self, id: CollectionId) -> Result<Vec<Collection>> {
        self.db.with_handle(|conn| self.collect_descendants(conn, id))
    }

    fn ensure_acyclic(
        &self,
        conn: &Connection,
        id: CollectionId,
        new_parent_id: Option<CollectionId>,
    ) -> Result<()> {
        let Some(new_parent_id) = new_parent_id else {
            return Ok(());
        };
        if new_parent_id == id {
            return Err(AppError::Cycle { id, new_parent_id });
        }
        if self
            .repos
            .collections
            .find_by_id(conn, new_parent_id)?
            .is_none()
        {
            return Err(AppError::NotFound {
                entity: "parent collection",
                id: new_parent_id,
            });
        }
        let descendants = self.collect_descendants(conn, id)?;
        if descendants.iter().any(|desc| desc.id == new_parent_id) {
            tracing::warn!(id, new_parent_id, "rejected move into own subtree");
            return Err(AppError::Cycle { id, new_parent_id });
        }
        Ok(())
    }

    fn collect_descendants(&self, conn: &Connection, id: CollectionId) -> Result<Vec<Collection>> {
        let mut descendants = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut stack = self.unseen_children(conn, id, &mut seen)?;
        while let Some(next) = stack.pop() {
            stack.extend(self.unseen_children(conn, next.id, &mut seen)?);
            descendants.push(next);
        }
        Ok(descendants)
    }

    /// Children not visited yet, reversed so the stack pops the oldest first.
    fn unseen_children(
        &self,
        conn: &Connection,
        id: CollectionId,
        seen: &mut HashSet<CollectionId>,
    ) -> Result<Vec<Collection>> {
        let mut children = self.repos.collections.find_by_parent(conn, Some(id))?;
        children.retain(|child| seen.insert(child.id));
        children.reverse();
        Ok(children)
    }
}
