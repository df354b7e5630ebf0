//! Connection persistence.
//!
//! Connections are kept in secure storage as one JSON object keyed by
//! identifier. Every read-modify-write of that object holds the connections
//! lock.

use std::collections::BTreeMap;

use crate::bridge::ops;
use crate::engine::{Workflow, WorkflowContext, WorkflowError, WorkflowKind, WorkflowResult};
use crate::error::{ERROR_DELETE_CONNECTION, ERROR_SAVE_CONNECTION};
use crate::event::{ConnectionEvent, Event};
use crate::state::connections::Connection;
use crate::state::selectors;
use crate::storage::keys;

/// Reads the persisted connections. Nothing persisted reads as empty.
pub(crate) async fn load_connections(
    ctx: &WorkflowContext,
) -> WorkflowResult<BTreeMap<String, Connection>> {
    match ctx.secure().get(keys::CONNECTIONS.to_string()).await? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(BTreeMap::new()),
    }
}

async fn store_connections(
    ctx: &WorkflowContext,
    connections: &BTreeMap<String, Connection>,
) -> WorkflowResult<()> {
    ctx.secure()
        .set(
            keys::CONNECTIONS.to_string(),
            serde_json::to_string(connections)?,
        )
        .await?;
    Ok(())
}

/// Merges a new connection into the persisted ones.
#[derive(Debug)]
pub struct SaveConnection(pub Connection);

#[async_trait::async_trait]
impl Workflow for SaveConnection {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::SaveConnection
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        {
            let _guard = ctx.lock_connections().await;
            let mut persisted = load_connections(ctx).await?;
            persisted.insert(self.0.identifier.clone(), self.0.clone());
            store_connections(ctx, &persisted).await?;
        }
        tracing::info!(identifier = %self.0.identifier, "connection saved");
        ctx.publish(ConnectionEvent::NewConnectionSuccess(self.0.clone()));
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(ConnectionEvent::NewConnectionFail(ERROR_SAVE_CONNECTION.with_detail(error)).into())
    }
}

/// Deletes the connection with a remote party, at the agency and locally.
#[derive(Debug)]
pub struct DeleteConnection {
    /// Pairwise DID of the remote party.
    pub sender_did: String,
}

#[async_trait::async_trait]
impl Workflow for DeleteConnection {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::DeleteConnection
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        let connection = ctx
            .select(|s| selectors::connection_by_sender(s, &self.sender_did))
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "connection",
                key: self.sender_did.clone(),
            })?;

        if let Some(serialized) = connection.vcx_serialized_connection {
            ctx.call_bridge(
                ops::DELETE_CONNECTION,
                ctx.bridge().delete_connection(serialized),
            )
            .await?;
        }

        {
            let _guard = ctx.lock_connections().await;
            let mut persisted = load_connections(ctx).await?;
            persisted.remove(&connection.identifier);
            store_connections(ctx, &persisted).await?;
        }
        ctx.publish(ConnectionEvent::DeleteConnectionSuccess {
            identifier: connection.identifier,
        });
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(
            ConnectionEvent::DeleteConnectionFail(ERROR_DELETE_CONNECTION.with_detail(error))
                .into(),
        )
    }
}

/// Accepts an invitation; the resulting connection is saved by
/// [`SaveConnection`].
#[derive(Debug)]
pub struct AcceptInvitation(pub String);

#[async_trait::async_trait]
impl Workflow for AcceptInvitation {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::AcceptInvitation
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        ctx.ensure_bridge_ready().await?;
        let connection = ctx
            .call_bridge(
                ops::ACCEPT_INVITATION,
                ctx.bridge().accept_invitation(self.0.clone()),
            )
            .await?;
        ctx.publish(ConnectionEvent::NewConnection(connection));
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(ConnectionEvent::NewConnectionFail(ERROR_SAVE_CONNECTION.with_detail(error)).into())
    }
}
