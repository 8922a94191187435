use super::{
    Environment, EnvironmentId, EnvironmentPatch, NewEnvironment, NO_ENVIRONMENT,
};
use crate::codec::KeyValues;
use crate::context::Repositories;
use crate::error::{AppError, Result};
use crate::storage::Database;

pub struct EnvironmentService<'a> {
    db: &'a Database,
    repos: &'a Repositories,
}

impl<'a> EnvironmentService<'a> {
    pub fn new(db: &'a Database, repos: &'a Repositories) -> Self {
        Self { db, repos }
    }

    /// Inserts the environment and, if `activate` is set, makes it the active
    /// one in the same transaction.
    pub fn create(&self, name: &str, variables: KeyValues, activate: bool) -> Result<Environment> {
        tracing::info!(name, activate, "creating environment");
        let new = NewEnvironment {
            name: name.to_string(),
            variables,
        };
        self.db.run_in_transaction(|conn| {
            let created = self.repos.environments.create(conn, &new)?;
            if !activate {
                return Ok(created);
            }
            self.repos.environments.set_active(conn, created.id)?;
            self.repos
                .environments
                .find_by_id(conn, created.id)?
                .ok_or(AppError::NotFound {
                    entity: "environment",
                    id: created.id,
                })
        })
    }

    pub fn list(&self) -> Result<Vec<Environment>> {
        self.db
            .with_handle(|conn| self.repos.environments.find_all(conn))
    }

    pub fn get(&self, id: EnvironmentId) -> Result<Option<Environment>> {
        self.db
            .with_handle(|conn| self.repos.environments.find_by_id(conn, id))
    }

    pub fn get_active(&self) -> Result<Option<Environment>> {
        self.db
            .with_handle(|conn| self.repos.environments.find_active(conn))
    }

    /// Makes `id` the single active environment. An unknown id is reported as
    /// [`AppError::NotFound`] and leaves the current selection untouched.
    pub fn set_active(&self, id: EnvironmentId) -> Result<Environment> {
        tracing::info!(id, "activating environment");
        self.db.run_in_transaction(|conn| {
            let missing = AppError::NotFound {
                entity: "environment",
                id,
            };
            if self.repos.environments.find_by_id(conn, id)?.is_none() {
                return Err(missing);
            }
            self.repos.environments.set_active(conn, id)?;
            self.repos
                .environments
                .find_by_id(conn, id)?
                .ok_or(missing)
        })
    }

    /// The active flag can only change through [`set_active`](Self::set_active).
    pub fn update(
        &self,
        id: EnvironmentId,
        name: Option<String>,
        variables: Option<KeyValues>,
    ) -> Result<Option<Environment>> {
        tracing::info!(id, "updating environment");
        let patch = EnvironmentPatch { name, variables };
        self.db
            .with_handle(|conn| self.repos.environments.update(conn, id, &patch))
    }

    /// Deactivates first when the target is active, then deletes, in one
    /// transaction.
    pub fn delete(&self, id: EnvironmentId) -> Result<bool> {
        tracing::info!(id, "deleting environment");
        self.db.run_in_transaction(|conn| {
            let Some(existing) = self.repos.environments.find_by_id(conn, id)? else {
                return Ok(false);
            };
            if existing.is_active {
                self.repos.environments.set_active(conn, NO_ENVIRONMENT)?;
            }
            self.repos.environments.delete(conn, id)
        })
    }

    /// Variables of `id`; empty when the environment is missing or its stored
    /// variables are malformed.
    pub fn parsed_variables(&self, id: EnvironmentId) -> Result<KeyValues> {
        Ok(self
            .get(id)?
            .map(|env| env.parsed_variables())
            .unwrap_or_default())
    }

    /// Variables of the active environment, or an empty map when none is active.
    pub fn active_parsed_variables(&self) -> Result<KeyValues> {
        Ok(self
            .get_active()?
            .map(|env| env.parsed_variables())
            .unwrap_or_default())
    }
}
