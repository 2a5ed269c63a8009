use std::sync::Arc;

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;

use crate::{
    config::AppConfig,
    detection::{
        suspicion::DEFAULT_ACTIVITY_LIMIT, CandidateSearch, Detector, PostInspector,
        SimilarityMatcher, SuspicionScorer,
    },
    imaging::{HttpImageFetcher, OrientedPatchExtractor},
    infrastructure::shutdown::Shutdown,
    platform::{reddit::user_agent, PlatformClient, RedditSessionFactory, SessionFactory},
    tasks::{Orchestrator, ScanSettings},
};

static POST_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:redd\.it/|/comments/)([a-z0-9]+)|^([a-z0-9]+)$").expect("valid post id regex")
});

pub fn parse_post_id(input: &str) -> Option<String> {
    let input = input.trim();
    let caps = POST_ID.captures(input)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

pub struct ExterminatorApp {
    config: Arc<AppConfig>,
    shutdown: Shutdown,
    sessions: Arc<dyn SessionFactory>,
    inspector: Arc<dyn PostInspector>,
}

impl ExterminatorApp {
    pub fn initialize(config: AppConfig, shutdown: Shutdown) -> Result<Self> {
        let sessions = Arc::new(RedditSessionFactory::new(
            config.credentials.clone(),
            config.http_timeout,
        ));

        let http_client = Client::builder()
            .user_agent(user_agent(&config.credentials.username))
            .build()
            .context("failed to build image http client")?;
        let matcher = SimilarityMatcher::new(
            Arc::new(HttpImageFetcher::new(http_client, config.http_timeout)),
            Arc::new(OrientedPatchExtractor::new()),
        );
        let detector = Detector::new(
            SuspicionScorer::new(DEFAULT_ACTIVITY_LIMIT, config.watchlist.clone()),
            CandidateSearch::new(config.search_depth),
            matcher,
        );

        Ok(Self::with_parts(config, shutdown, sessions, Arc::new(detector)))
    }

    pub fn with_parts(
        config: AppConfig,
        shutdown: Shutdown,
        sessions: Arc<dyn SessionFactory>,
        inspector: Arc<dyn PostInspector>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            shutdown,
            sessions,
            inspector,
        }
    }

    pub async fn run(self) -> Result<()> {
        let client = self
            .sessions
            .open_session()
            .await
            .context("login failed")?;
        tracing::info!(target: "app", username = client.username(), "logged in");

        if self.config.diagnostics.is_requested() {
            self.diagnose(client.as_ref()).await;
            return Ok(());
        }

        for source in &self.config.sources {
            client
                .validate_source(source)
                .await
                .with_context(|| format!("cannot read r/{source}"))?;
        }

        let orchestrator = Orchestrator::new(self.scan_settings(), self.shutdown.clone());
        if let Err(err) = orchestrator
            .start(
                self.config.threads,
                self.sessions.as_ref(),
                self.inspector.clone(),
            )
            .await
        {
            orchestrator.close().await;
            return Err(err).context("failed to open worker sessions");
        }

        let outcome = self.drive(&orchestrator, client.as_ref()).await;
        let pending = orchestrator.snapshot();
        orchestrator.close().await;
        tracing::info!(
            target: "app",
            unscanned = pending.work,
            unpunished = pending.spam,
            "exterminator stopped"
        );
        outcome
    }

    async fn drive(&self, orchestrator: &Orchestrator, client: &dyn PlatformClient) -> Result<()> {
        let sources = &self.config.sources;
        if self.config.forever {
            tracing::info!(target: "app", sources = ?sources, "following new posts");
            orchestrator
                .run_forever(client, sources)
                .await
                .context("new-post stream failed")?;
        } else {
            let queued = orchestrator
                .run_batch(client, sources, self.config.limit)
                .await
                .context("failed to list new posts")?;
            tracing::info!(target: "app", queued, "waiting for batch to finish");
        }
        orchestrator.wait().await;
        Ok(())
    }

    fn scan_settings(&self) -> ScanSettings {
        ScanSettings::new(
            self.config.thresh_user,
            self.config.thresh_post,
            self.config.actions.clone(),
            self.config.verbose,
            self.config.scanner_backoff,
            self.config.rate_limit_timeout,
        )
    }

    async fn diagnose(&self, client: &dyn PlatformClient) {
        for user in &self.config.diagnostics.users {
            match self.inspector.user_suspicion(client, user).await {
                Ok(report) => report.log_breakdown(),
                Err(err) => {
                    tracing::error!(target: "app", account = %user, error = %err, "failed to score account")
                }
            }
        }
        for input in &self.config.diagnostics.posts {
            if let Err(err) = self.diagnose_post(client, input).await {
                tracing::error!(target: "app", input = %input, error = %err, "failed to check post");
            }
        }
    }

    async fn diagnose_post(&self, client: &dyn PlatformClient, input: &str) -> Result<()> {
        let Some(id) = parse_post_id(input) else {
            bail!("not a post id or link");
        };
        let post = client.fetch_post(&id).await?;
        tracing::info!(
            target: "app",
            post = %post.short_url(),
            title = %post.title,
            scannable = post.is_scannable(),
            "checking post"
        );
        if let Some(author) = post.author.as_deref() {
            self.inspector
                .user_suspicion(client, author)
                .await?
                .log_breakdown();
        }
        let matched = self.inspector.repost_match(client, &post).await?;
        tracing::info!(
            target: "app",
            post = %post.short_url(),
            post_suspicion = %format!("{:.1}%", 100.0 * matched.confidence),
            best_match = %matched.candidate.as_ref().map(|c| c.full_permalink()).unwrap_or_default(),
            "post checked"
        );
        Ok(())
    }
}
