use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    detection::{PipelineError, PostInspector},
    domain::{Post, SpamVerdict},
    infrastructure::shutdown::ShutdownListener,
    platform::PlatformClient,
    tasks::{queue::WorkQueue, ScanSettings},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Discard {
    AlreadyVoted,
    AlreadyReplied,
    NoAuthor,
    UserBelowThreshold(f64),
    PostBelowThreshold(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Clear(Discard),
    Spam,
}

pub struct Scanner {
    worker: usize,
    client: Arc<dyn PlatformClient>,
    inspector: Arc<dyn PostInspector>,
    work: Arc<WorkQueue<String>>,
    spam: Arc<WorkQueue<SpamVerdict>>,
    settings: Arc<ScanSettings>,
}

impl Scanner {
    pub fn new(
        worker: usize,
        client: Arc<dyn PlatformClient>,
        inspector: Arc<dyn PostInspector>,
        work: Arc<WorkQueue<String>>,
        spam: Arc<WorkQueue<SpamVerdict>>,
        settings: Arc<ScanSettings>,
    ) -> Self {
        Self {
            worker,
            client,
            inspector,
            work,
            spam,
            settings,
        }
    }

    pub fn spawn(self, shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_loop(shutdown).await })
    }

    async fn run_loop(&self, mut shutdown: ShutdownListener) {
        while let Some(item) = self.work.pop(&mut shutdown).await {
            let id = item.as_str();
            match self.scan(id).await {
                Ok(_) => {}
                Err(err) if err.is_rate_limited() => {
                    let backoff = err.retry_after().unwrap_or(self.settings.scanner_backoff);
                    tracing::warn!(
                        target: "scanner",
                        worker = self.worker,
                        post = %crate::domain::short_url(id),
                        backoff_secs = backoff.as_secs(),
                        error = %err,
                        "rate limited; dropping post and backing off"
                    );
                    if !shutdown.sleep(backoff).await {
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!(
                        target: "scanner",
                        worker = self.worker,
                        post = %crate::domain::short_url(id),
                        error = %err,
                        "failed to scan post"
                    );
                }
            }
        }
        tracing::info!(target: "scanner", worker = self.worker, "scanner stopped");
    }

    pub async fn scan(&self, id: &str) -> Result<ScanOutcome, PipelineError> {
        let post = self.client.fetch_post(id).await?;
        tracing::info!(
            target: "scanner",
            worker = self.worker,
            post = %post.short_url(),
            title = %post.title,
            "processing post"
        );

        if post.likes.is_some() {
            return Ok(self.clear(&post, Discard::AlreadyVoted));
        }
        if self
            .client
            .has_reply_from(self.client.username(), &post)
            .await?
        {
            return Ok(self.clear(&post, Discard::AlreadyReplied));
        }
        let Some(author) = post.author.as_deref() else {
            return Ok(self.clear(&post, Discard::NoAuthor));
        };

        let report = self
            .inspector
            .user_suspicion(self.client.as_ref(), author)
            .await?;
        if self.settings.verbose {
            report.log_breakdown();
        }
        tracing::info!(
            target: "scanner",
            post = %post.short_url(),
            author,
            user_suspicion = %format!("{:.1}", 100.0 * report.score),
            "user scored"
        );
        if report.score < self.settings.thresh_user {
            return Ok(self.clear(&post, Discard::UserBelowThreshold(report.score)));
        }

        let matched = self
            .inspector
            .repost_match(self.client.as_ref(), &post)
            .await?;
        tracing::info!(
            target: "scanner",
            post = %post.short_url(),
            post_suspicion = %format!("{:.1}", 100.0 * matched.confidence),
            best_match = %matched.candidate.as_ref().map(|c| c.full_permalink()).unwrap_or_default(),
            "post scored"
        );
        let original = match matched.candidate.as_ref() {
            Some(original) if matched.confidence >= self.settings.thresh_post => original,
            _ => {
                return Ok(self.clear(&post, Discard::PostBelowThreshold(matched.confidence)));
            }
        };

        let verdict = SpamVerdict::new(
            &post,
            original,
            report.score,
            matched.confidence,
            self.client.username(),
        );
        tracing::warn!(
            target: "scanner",
            post = %post.short_url(),
            original = %original.short_url(),
            confidence = %format!("{:.1}", 100.0 * verdict.confidence),
            "repost spam detected"
        );
        self.spam.push(verdict);
        Ok(ScanOutcome::Spam)
    }

    fn clear(&self, post: &Post, reason: Discard) -> ScanOutcome {
        tracing::info!(
            target: "scanner",
            post = %post.short_url(),
            reason = ?reason,
            "post cleared"
        );
        ScanOutcome::Clear(reason)
    }
}
