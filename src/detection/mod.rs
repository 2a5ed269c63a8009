pub mod matcher;
pub mod search;
pub mod suspicion;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use crate::{
    domain::{MatchResult, Post},
    imaging::ImageError,
    platform::{PlatformClient, PlatformError},
};

pub use matcher::SimilarityMatcher;
pub use search::{normalize_title, CandidateSearch};
pub use suspicion::{SuspicionReport, SuspicionScorer};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Image(#[from] ImageError),
}

impl PipelineError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PipelineError::Platform(err) if err.is_rate_limited())
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PipelineError::Platform(err) => err.retry_after(),
            PipelineError::Image(_) => None,
        }
    }
}

#[async_trait]
pub trait PostInspector: Send + Sync {
    async fn user_suspicion(
        &self,
        client: &dyn PlatformClient,
        author: &str,
    ) -> Result<SuspicionReport, PipelineError>;

    async fn repost_match(
        &self,
        client: &dyn PlatformClient,
        post: &Post,
    ) -> Result<MatchResult, PipelineError>;
}

pub struct Detector {
    scorer: SuspicionScorer,
    search: CandidateSearch,
    matcher: SimilarityMatcher,
}

impl Detector {
    pub fn new(scorer: SuspicionScorer, search: CandidateSearch, matcher: SimilarityMatcher) -> Self {
        Self {
            scorer,
            search,
            matcher,
        }
    }
}

#[async_trait]
impl PostInspector for Detector {
    async fn user_suspicion(
        &self,
        client: &dyn PlatformClient,
        author: &str,
    ) -> Result<SuspicionReport, PipelineError> {
        Ok(self.scorer.evaluate(client, author, Utc::now()).await?)
    }

    async fn repost_match(
        &self,
        client: &dyn PlatformClient,
        post: &Post,
    ) -> Result<MatchResult, PipelineError> {
        let candidates = self.search.candidates(client, post).await?;
        Ok(self.matcher.best_match(post, &candidates).await?)
    }
}
