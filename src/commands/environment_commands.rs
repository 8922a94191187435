use serde::Deserialize;

use super::{Ack, CommandResult};
use crate::codec::KeyValues;
use crate::context::AppContext;
use crate::environment::{Environment, EnvironmentId};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEnvironmentPayload {
    pub name: String,
    #[serde(default)]
    pub variables: KeyValues,
    #[serde(default)]
    pub activate: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEnvironmentPayload {
    pub id: EnvironmentId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub variables: Option<KeyValues>,
}

pub fn create_environment(ctx: &AppContext, payload: CreateEnvironmentPayload) -> CommandResult<Environment> {
    let created = ctx
        .environments()
        .create(&payload.name, payload.variables, payload.activate)?;
    Ok(Ack::ok(created))
}

pub fn list_environments(ctx: &AppContext) -> CommandResult<Vec<Environment>> {
    Ok(Ack::ok(ctx.environments().list()?))
}

pub fn get_active_environment(ctx: &AppContext) -> CommandResult<Environment> {
    Ok(Ack::found(ctx.environments().get_active()?))
}

pub fn set_active_environment(ctx: &AppContext, id: EnvironmentId) -> CommandResult<Environment> {
    Ok(Ack::ok(ctx.environments().set_active(id)?))
}

pub fn update_environment(ctx: &AppContext, payload: UpdateEnvironmentPayload) -> CommandResult<Environment> {
    let updated = ctx
        .environments()
        .update(payload.id, payload.name, payload.variables)?;
    Ok(Ack::found(updated))
}

pub fn delete_environment(ctx: &AppContext, id: EnvironmentId) -> CommandResult<()> {
    Ok(Ack::flag(ctx.environments().delete(id)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorKind;

    fn context() -> (tempfile::TempDir, AppContext) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::open(Config::in_dir(dir.path())).unwrap();
        (dir, ctx)
    }

    #[test]
    fn create_active_environment_from_payload() {
        let (_dir, ctx) = context();
        let payload = serde_json::from_str(
            r#"{"name":"staging","variables":{"baseUrl":"https://staging.example.com"},"activate":true}"#,
        )
        .unwrap();
        let created = create_environment(&ctx, payload).unwrap().data.unwrap();
        assert!(created.is_active);

        let active = get_active_environment(&ctx).unwrap().data.unwrap();
        assert_eq!(active.id, created.id);
        let envs = list_environments(&ctx).unwrap().data.unwrap();
        assert_eq!(envs.iter().filter(|e| e.is_active).count(), 1);
    }

    #[test]
    fn set_active_on_missing_id_is_not_found() {
        let (_dir, ctx) = context();
        let err = set_active_environment(&ctx, 404).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn update_then_delete() {
        let (_dir, ctx) = context();
        let id = list_environments(&ctx).unwrap().data.unwrap()[0].id;
        let payload =
            serde_json::from_str(&format!(r#"{{"id":{id},"variables":{{"k":"v"}}}}"#)).unwrap();
        let updated = update_environment(&ctx, payload).unwrap().data.unwrap();
        assert_eq!(updated.parsed_variables()["k"], "v");

        assert!(delete_environment(&ctx, id).unwrap().success);
        assert!(!get_active_environment(&ctx).unwrap().success);
    }
}
