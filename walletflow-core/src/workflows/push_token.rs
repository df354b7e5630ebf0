//! Push token registration.

use uuid::Uuid;

use crate::bridge::{ops, PushTokenConfig};
use crate::engine::{Workflow, WorkflowContext, WorkflowError, WorkflowKind, WorkflowResult};
use crate::error::ERROR_PUSH_TOKEN;
use crate::event::{Event, PushEvent};
use crate::storage::keys;

const PUSH_PROVIDER_PREFIX: &str = "FCM:";

/// Registers a new push token with the agency under this device's identifier.
#[derive(Debug)]
pub struct UpdatePushToken(pub String);

async fn device_id(ctx: &WorkflowContext) -> WorkflowResult<String> {
    let secure = ctx.secure();
    if let Some(id) = secure.get(keys::DEVICE_ID.to_string()).await? {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    tracing::info!("generated device identifier");
    secure.set(keys::DEVICE_ID.to_string(), id.clone()).await?;
    Ok(id)
}

#[async_trait::async_trait]
impl Workflow for UpdatePushToken {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::PushToken
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        let push_token = format!("{PUSH_PROVIDER_PREFIX}{}", self.0);
        let unique_id = device_id(ctx).await?;

        ctx.ensure_bridge_ready().await?;
        ctx.call_bridge(
            ops::UPDATE_PUSH_TOKEN,
            ctx.bridge().update_push_token(PushTokenConfig {
                unique_id,
                push_token: push_token.clone(),
            }),
        )
        .await?;
        ctx.safe()
            .set(keys::PUSH_COM_METHOD.to_string(), push_token.clone())
            .await?;
        ctx.publish(PushEvent::PushTokenSaved(push_token));
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(PushEvent::PushTokenFail(ERROR_PUSH_TOKEN.with_detail(error)).into())
    }
}
