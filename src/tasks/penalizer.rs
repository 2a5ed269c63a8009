use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    domain::{ActionKind, ModerationAction, SpamVerdict},
    infrastructure::shutdown::ShutdownListener,
    platform::{PlatformClient, PlatformError},
    tasks::{queue::WorkQueue, ScanSettings},
};

pub struct Penalizer {
    client: Arc<dyn PlatformClient>,
    spam: Arc<WorkQueue<SpamVerdict>>,
    settings: Arc<ScanSettings>,
}

impl Penalizer {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        spam: Arc<WorkQueue<SpamVerdict>>,
        settings: Arc<ScanSettings>,
    ) -> Self {
        Self {
            client,
            spam,
            settings,
        }
    }

    pub fn spawn(self, shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_loop(shutdown).await })
    }

    async fn run_loop(&self, mut shutdown: ShutdownListener) {
        while let Some(verdict) = self.spam.pop(&mut shutdown).await {
            match self.penalize(&verdict).await {
                Ok(_) => {}
                Err(err) if err.is_rate_limited() => {
                    let backoff = err
                        .retry_after()
                        .unwrap_or(self.settings.rate_limit_timeout);
                    tracing::warn!(
                        target: "penalizer",
                        post = %crate::domain::short_url(&verdict.post_id),
                        backoff_secs = backoff.as_secs(),
                        "rate limited; verdict dropped"
                    );
                    if !shutdown.sleep(backoff).await {
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!(
                        target: "penalizer",
                        post = %crate::domain::short_url(&verdict.post_id),
                        error = %err,
                        "failed to penalize post"
                    );
                }
            }
        }
        tracing::info!(target: "penalizer", "penalizer stopped");
    }

    /// Re-reads the post so actions target its current state, then applies
    /// each configured action in order. Stops at the first failure.
    pub async fn penalize(
        &self,
        verdict: &SpamVerdict,
    ) -> Result<Vec<ActionKind>, PlatformError> {
        let post = self.client.fetch_post(&verdict.post_id).await?;
        let tag = post.short_url();
        let mut applied = Vec::with_capacity(self.settings.actions.len());

        for kind in &self.settings.actions {
            let action = match kind {
                ActionKind::Debug => {
                    tracing::info!(
                        target: "penalizer",
                        post = %tag,
                        confidence = %format!("{:.1}", 100.0 * verdict.confidence),
                        "{}",
                        verdict.short_message
                    );
                    for line in &verdict.long_message {
                        tracing::info!(target: "penalizer", post = %tag, "{line}");
                    }
                    applied.push(*kind);
                    continue;
                }
                ActionKind::Downvote => ModerationAction::Downvote,
                ActionKind::Reply => ModerationAction::Reply {
                    body: verdict.reply_body(),
                },
                ActionKind::Report => ModerationAction::Report {
                    reason: verdict.short_message.clone(),
                },
            };
            self.client.apply_action(&post, &action).await?;
            tracing::debug!(target: "penalizer", post = %tag, action = %kind, "action applied");
            applied.push(*kind);
        }
        tracing::info!(target: "penalizer", post = %tag, actions = ?applied, "penalties applied");
        Ok(applied)
    }
}
