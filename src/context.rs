//! Application context: the store, the repositories and the dispatcher,
//! constructed once at startup and borrowed by every service.

use crate::codec::KeyValues;
use crate::collections::service::CollectionService;
use crate::collections::{CollectionRepository, NewCollection};
use crate::config::Config;
use crate::environment::service::EnvironmentService;
use crate::environment::{EnvironmentRepository, NewEnvironment};
use crate::error::Result;
use crate::history::service::HistoryService;
use crate::history::HistoryRepository;
use crate::http::dispatcher::Dispatcher;
use crate::requests::service::RequestService;
use crate::requests::RequestRepository;
use crate::storage::Database;

const DEFAULT_ENVIRONMENT_NAME: &str = "Default Environment";
const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// The four entity repositories, built once with their SQL rendered.
#[derive(Default)]
pub struct Repositories {
    pub collections: CollectionRepository,
    pub requests: RequestRepository,
    pub environments: EnvironmentRepository,
    pub history: HistoryRepository,
}

pub struct AppContext {
    config: Config,
    db: Database,
    repos: Repositories,
    dispatcher: Dispatcher,
}

impl AppContext {
    /// Opens the store described by `config` with the HTTP client registered.
    pub fn open(config: Config) -> Result<Self> {
        let dispatcher = Dispatcher::with_http(&config)?;
        Self::with_dispatcher(config, dispatcher)
    }

    pub fn with_dispatcher(config: Config, dispatcher: Dispatcher) -> Result<Self> {
        let db = Database::new(config.database_path());
        db.initialize()?;

        let ctx = Self {
            config,
            db,
            repos: Repositories::default(),
            dispatcher,
        };
        if ctx.config.seed_defaults {
            ctx.seed_defaults()?;
        }
        Ok(ctx)
    }

    /// Creates the default collection and environment when the store has
    /// none of either. Safe to call repeatedly.
    pub fn seed_defaults(&self) -> Result<()> {
        self.db.run_in_transaction(|conn| {
            if self.repos.collections.find_all(conn)?.is_empty() {
                self.repos.collections.create(
                    conn,
                    &NewCollection {
                        name: self.config.default_collection_name.clone(),
                        description: Some("Requests sent without a collection".to_string()),
                        parent_id: None,
                    },
                )?;
                tracing::info!("seeded default collection");
            }

            if self.repos.environments.find_all(conn)?.is_empty() {
                let env = self.repos.environments.create(
                    conn,
                    &NewEnvironment {
                        name: DEFAULT_ENVIRONMENT_NAME.to_string(),
                        variables: KeyValues::from([(
                            "baseUrl".to_string(),
                            DEFAULT_BASE_URL.to_string(),
                        )]),
                    },
                )?;
                self.repos.environments.set_active(conn, env.id)?;
                tracing::info!("seeded default environment");
            }
            Ok(())
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    pub fn collections(&self) -> CollectionService<'_> {
        CollectionService::new(&self.db, &self.repos)
    }

    pub fn environments(&self) -> EnvironmentService<'_> {
        EnvironmentService::new(&self.db, &self.repos)
    }

    pub fn requests(&self) -> RequestService<'_> {
        RequestService::new(&self.db, &self.repos, &self.dispatcher, &self.config)
    }

    pub fn history(&self) -> HistoryService<'_> {
        HistoryService::new(&self.db, &self.repos)
    }

    pub fn close(&self) -> Result<()> {
        self.db.close()
    }
}
