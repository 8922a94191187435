//! Caller-facing operations. Each takes a camelCase payload, borrows the
//! [`AppContext`](crate::context::AppContext) and answers with an [`Ack`] or
//! a [`CommandError`], both serializable for an IPC bridge.

pub mod collection_commands;
pub mod environment_commands;
pub mod history_commands;
pub mod request_commands;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Ack<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }

    /// `success` reports whether the target existed.
    pub fn found(data: Option<T>) -> Self {
        Self {
            success: data.is_some(),
            data,
        }
    }
}

impl Ack<()> {
    pub fn flag(success: bool) -> Self {
        Self {
            success,
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<AppError> for CommandError {
    fn from(err: AppError) -> Self {
        tracing::debug!(error = %err, "command failed");
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CommandError {}

pub type CommandResult<T> = Result<Ack<T>, CommandError>;

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in patch payloads.
pub(crate) fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}
