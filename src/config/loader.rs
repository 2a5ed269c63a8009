use std::{env, time::Duration};

use super::{
    cli::Cli,
    env::{
        AppConfig, ConfigError, DiagnosticsConfig, DirectoryConfig, LoggingConfig,
        RedditCredentials,
    },
};
use crate::detection::suspicion::DEFAULT_WATCHLIST;

pub fn load_config(cli: &Cli) -> Result<AppConfig, ConfigError> {
    AppConfig::from_sources(cli, |key| env::var(key).ok())
}

impl AppConfig {
    fn from_sources(
        cli: &Cli,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        check_unit("sus_user", cli.thresh_user)?;
        check_unit("sus_post", cli.thresh_post)?;
        if cli.threads == 0 {
            return Err(ConfigError::Invalid {
                name: "threads",
                reason: "at least one scanner is required".to_string(),
            });
        }

        let credentials = load_credentials(&cli.login, &lookup)?;

        let watchlist = lookup("WATCHLIST")
            .map(|value| {
                value
                    .split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|| DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect());

        let http_timeout = Duration::from_millis(
            lookup("HTTP_TIMEOUT_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30_000),
        );
        let scanner_backoff = Duration::from_secs(
            lookup("SCANNER_BACKOFF_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
        );

        Ok(Self {
            sources: cli.sources.clone(),
            forever: cli.forever,
            limit: cli.limit,
            search_depth: cli.search_depth,
            threads: cli.threads,
            thresh_user: cli.thresh_user,
            thresh_post: cli.thresh_post,
            actions: cli.actions.clone(),
            verbose: cli.verbose,
            rate_limit_timeout: Duration::from_secs(cli.timeout),
            scanner_backoff,
            http_timeout,
            watchlist,
            credentials,
            diagnostics: DiagnosticsConfig {
                posts: cli.check_post.clone(),
                users: cli.check_user.clone(),
            },
            directories: DirectoryConfig {
                logs_dir: lookup("LOGS_DIR").unwrap_or_else(|| "logs".to_string()),
            },
            logging: LoggingConfig {
                level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            },
        })
    }
}

pub fn profile_prefix(profile: &str) -> String {
    profile.trim().to_ascii_uppercase().replace('-', "_")
}

fn load_credentials(
    profile: &str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<RedditCredentials, ConfigError> {
    let prefix = profile_prefix(profile);
    let required = |suffix: &str| {
        let key = format!("{prefix}_{suffix}");
        lookup(&key).ok_or(ConfigError::Missing(key))
    };
    Ok(RedditCredentials {
        client_id: required("CLIENT_ID")?,
        client_secret: required("CLIENT_SECRET")?,
        password: required("PASSWORD")?,
        username: lookup(&format!("{prefix}_USERNAME")).unwrap_or_else(|| profile.to_string()),
    })
}

fn check_unit(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            name,
            reason: format!("{value} is outside [0, 1]"),
        })
    }
}
