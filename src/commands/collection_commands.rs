use serde::Deserialize;

use super::{deserialize_some, Ack, CommandResult};
use crate::collections::service::CascadeSummary;
use crate::collections::{Collection, CollectionId, CollectionNode, CollectionPatch};
use crate::context::AppContext;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCollectionPayload {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<CollectionId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCollectionPayload {
    pub id: CollectionId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub parent_id: Option<Option<CollectionId>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveCollectionPayload {
    pub id: CollectionId,
    #[serde(default)]
    pub new_parent_id: Option<CollectionId>,
}

pub fn create_collection(ctx: &AppContext, payload: CreateCollectionPayload) -> CommandResult<Collection> {
    let created = ctx.collections().create(
        &payload.name,
        payload.description.as_deref(),
        payload.parent_id,
    )?;
    Ok(Ack::ok(created))
}

pub fn list_collections(ctx: &AppContext, parent_id: Option<CollectionId>) -> CommandResult<Vec<Collection>> {
    Ok(Ack::ok(ctx.collections().list(parent_id)?))
}

pub fn get_collection(ctx: &AppContext, id: CollectionId) -> CommandResult<Collection> {
    Ok(Ack::found(ctx.collections().get(id)?))
}

pub fn get_collection_tree(ctx: &AppContext) -> CommandResult<Vec<CollectionNode>> {
    Ok(Ack::ok(ctx.collections().tree()?))
}

pub fn update_collection(ctx: &AppContext, payload: UpdateCollectionPayload) -> CommandResult<Collection> {
    let patch = CollectionPatch {
        name: payload.name,
        description: payload.description,
        parent_id: payload.parent_id,
    };
    Ok(Ack::found(ctx.collections().update(payload.id, &patch)?))
}

pub fn delete_collection(ctx: &AppContext, id: CollectionId) -> CommandResult<CascadeSummary> {
    let summary = ctx.collections().delete(id)?;
    Ok(Ack {
        success: summary.removed(),
        data: Some(summary),
    })
}

pub fn move_collection(ctx: &AppContext, payload: MoveCollectionPayload) -> CommandResult<Collection> {
    let moved = ctx
        .collections()
        .move_collection(payload.id, payload.new_parent_id)?;
    Ok(Ack::ok(moved))
}
