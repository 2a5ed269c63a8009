use std::{fmt, time::Duration};

use thiserror::Error;

use crate::domain::ActionKind;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sources: Vec<String>,
    pub forever: bool,
    pub limit: usize,
    pub search_depth: usize,
    pub threads: usize,
    pub thresh_user: f64,
    pub thresh_post: f64,
    pub actions: Vec<ActionKind>,
    pub verbose: bool,
    pub rate_limit_timeout: Duration,
    pub scanner_backoff: Duration,
    pub http_timeout: Duration,
    pub watchlist: Vec<String>,
    pub credentials: RedditCredentials,
    pub diagnostics: DiagnosticsConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticsConfig {
    pub posts: Vec<String>,
    pub users: Vec<String>,
}

impl DiagnosticsConfig {
    pub fn is_requested(&self) -> bool {
        !self.posts.is_empty() || !self.users.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(String),
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
