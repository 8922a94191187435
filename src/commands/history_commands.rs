use super::{Ack, CommandResult};
use crate::context::AppContext;
use crate::history::{History, HistoryId, RecentHistory};
use crate::requests::RequestId;

/// Newest entries first; `limit` falls back to the configured default.
pub fn get_recent_history(ctx: &AppContext, limit: Option<usize>) -> CommandResult<Vec<RecentHistory>> {
    let limit = limit.unwrap_or(ctx.config().recent_history_limit);
    Ok(Ack::ok(ctx.history().recent(limit)?))
}

pub fn get_request_history(ctx: &AppContext, request_id: RequestId) -> CommandResult<Vec<History>> {
    Ok(Ack::ok(ctx.history().by_request(request_id)?))
}

pub fn delete_history(ctx: &AppContext, id: HistoryId) -> CommandResult<()> {
    Ok(Ack::flag(ctx.history().delete(id)?))
}

/// Data is the number of removed entries.
pub fn clear_history(ctx: &AppContext) -> CommandResult<usize> {
    Ok(Ack::ok(ctx.history().clear()?))
}
