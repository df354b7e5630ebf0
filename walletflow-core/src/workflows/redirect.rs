//! Deferred navigation and delayed clean-up.

use crate::engine::{Workflow, WorkflowContext, WorkflowKind, WorkflowResult};
use crate::event::{CorrelationEvent, NavigationEvent};
use crate::state::selectors;

/// Replays pending redirections once the app may navigate again.
#[derive(Debug)]
pub struct ReplayPendingRedirections;

#[async_trait::async_trait]
impl Workflow for ReplayPendingRedirections {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::ReplayPendingRedirections
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        // Taken under the publish lock so concurrent replays cannot both
        // see the same redirections.
        let mut pending = Vec::new();
        let taken = ctx.publish_if(
            |s| {
                if selectors::can_redirect(s) {
                    pending = selectors::pending_redirections(s);
                }
                !pending.is_empty()
            },
            NavigationEvent::ClearPendingRedirection,
        );
        if !taken {
            return Ok(());
        }

        tracing::debug!(count = pending.len(), "replaying pending redirections");
        for redirection in pending {
            ctx.publish(NavigationEvent::NavigateToRoute(redirection));
        }
        Ok(())
    }
}

/// Deletes an ignored out-of-band proof request after a grace period.
#[derive(Debug)]
pub struct OobDeletion {
    /// Record to delete.
    pub uid: String,
}

#[async_trait::async_trait]
impl Workflow for OobDeletion {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::OobDeletion
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        ctx.timer(ctx.config().oob_deletion_delay()).await;
        ctx.publish(CorrelationEvent::Deleted {
            uid: self.uid.clone(),
        });
        Ok(())
    }
}
