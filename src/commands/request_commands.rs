use serde::Deserialize;

use super::{deserialize_some, Ack, CommandResult};
use crate::codec::{self, KeyValues};
use crate::collections::CollectionId;
use crate::context::AppContext;
use crate::http::method::HttpMethod;
use crate::http::request::OutboundRequest;
use crate::requests::service::Execution;
use crate::requests::{RequestId, RequestPatch, SavedRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequestPayload {
    pub collection_id: CollectionId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub request: OutboundRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequestPayload {
    pub id: RequestId,
    #[serde(default)]
    pub collection_id: Option<CollectionId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<HttpMethod>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub headers: Option<Option<KeyValues>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub body: Option<Option<String>>,
}

/// Saves a request into a collection; used for both create and save.
pub fn save_request(ctx: &AppContext, payload: SaveRequestPayload) -> CommandResult<SavedRequest> {
    let saved = ctx.requests().save(
        &payload.request,
        payload.collection_id,
        payload.name.as_deref(),
    )?;
    Ok(Ack::ok(saved))
}

pub fn list_requests(ctx: &AppContext, collection_id: Option<CollectionId>) -> CommandResult<Vec<SavedRequest>> {
    Ok(Ack::ok(ctx.requests().list(collection_id)?))
}

pub fn get_request(ctx: &AppContext, id: RequestId) -> CommandResult<SavedRequest> {
    Ok(Ack::found(ctx.requests().get(id)?))
}

pub fn update_request(ctx: &AppContext, payload: UpdateRequestPayload) -> CommandResult<SavedRequest> {
    let patch = RequestPatch {
        collection_id: payload.collection_id,
        name: payload.name,
        url: payload.url,
        method: payload.method,
        headers: payload
            .headers
            .map(|headers| headers.map(|map| codec::encode_map(&map))),
        body: payload.body,
    };
    Ok(Ack::found(ctx.requests().update(payload.id, &patch)?))
}

pub fn delete_request(ctx: &AppContext, id: RequestId) -> CommandResult<()> {
    Ok(Ack::flag(ctx.requests().delete(id)?))
}

pub async fn send_request(ctx: &AppContext, payload: OutboundRequest) -> CommandResult<Execution> {
    Ok(Ack::ok(ctx.requests().send(&payload).await?))
}

pub async fn send_saved_request(ctx: &AppContext, id: RequestId) -> CommandResult<Execution> {
    Ok(Ack::ok(ctx.requests().send_saved(id).await?))
}
