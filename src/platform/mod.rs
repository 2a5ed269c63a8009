pub mod listing;
pub mod reddit;

use std::{collections::VecDeque, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;

use crate::domain::{Account, ModerationAction, Post, SeenIds};

pub use reddit::{RedditClient, RedditSessionFactory};

pub const STREAM_POLL_INTERVAL: Duration = Duration::from_secs(10);
const STREAM_PAGE_SIZE: usize = 100;
const STREAM_SEEN_CAPACITY: usize = 300;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("rate limited by platform (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("not found or not accessible: {0}")]
    NotFound(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected platform response: {0}")]
    Api(String),
}

impl PlatformError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PlatformError::RateLimited { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PlatformError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopWindow {
    All,
    Month,
}

impl TopWindow {
    pub fn as_query(&self) -> &'static str {
        match self {
            TopWindow::All => "all",
            TopWindow::Month => "month",
        }
    }
}

#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn username(&self) -> &str;

    async fn validate_source(&self, source: &str) -> Result<(), PlatformError>;

    async fn fetch_new_posts(
        &self,
        sources: &[String],
        limit: usize,
    ) -> Result<Vec<Post>, PlatformError>;

    async fn fetch_post(&self, id: &str) -> Result<Post, PlatformError>;

    async fn fetch_account(&self, name: &str, limit: usize) -> Result<Account, PlatformError>;

    async fn count_top_content(
        &self,
        name: &str,
        window: TopWindow,
        limit: usize,
    ) -> Result<usize, PlatformError>;

    async fn search(
        &self,
        scope: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Post>, PlatformError>;

    async fn apply_action(&self, post: &Post, action: &ModerationAction)
        -> Result<(), PlatformError>;

    async fn has_reply_from(&self, account: &str, post: &Post) -> Result<bool, PlatformError>;

    /// Polls `fetch_new_posts` and remembers the last few hundred ids so a post
    /// is yielded once. Errors are yielded in-band and polling resumes after the
    /// next interval; callers cancel by dropping the stream.
    fn stream_new_posts<'a>(
        &'a self,
        sources: &[String],
    ) -> BoxStream<'a, Result<Post, PlatformError>> {
        let state = StreamState {
            sources: sources.to_vec(),
            seen: SeenIds::with_capacity(STREAM_SEEN_CAPACITY),
            pending: VecDeque::new(),
            primed: false,
        };
        stream::unfold(state, move |mut state| async move {
            loop {
                if let Some(post) = state.pending.pop_front() {
                    return Some((Ok(post), state));
                }
                if state.primed {
                    tokio::time::sleep(STREAM_POLL_INTERVAL).await;
                }
                state.primed = true;
                match self.fetch_new_posts(&state.sources, STREAM_PAGE_SIZE).await {
                    Ok(posts) => {
                        for post in posts.into_iter().rev() {
                            if state.seen.insert(&post.id) {
                                state.pending.push_back(post);
                            }
                        }
                    }
                    Err(err) => return Some((Err(err), state)),
                }
            }
        })
        .boxed()
    }
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open_session(&self) -> Result<Arc<dyn PlatformClient>, PlatformError>;
}

struct StreamState {
    sources: Vec<String>,
    seen: SeenIds,
    pending: VecDeque<Post>,
    primed: bool,
}
