//! Storage and request dispatch core of the dmapi API client.
//!
//! [`context::AppContext`] owns the SQLite store, the entity repositories and
//! the protocol dispatcher; the services it hands out enforce the
//! cross-entity rules (acyclic collections, one active environment,
//! cascading deletes, recorded executions).

pub mod cli;
pub mod codec;
pub mod collections;
pub mod commands;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod history;
pub mod http;
pub mod requests;
pub mod storage;

pub use context::AppContext;
pub use error::{AppError, Result};
