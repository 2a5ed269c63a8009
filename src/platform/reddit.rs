use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{header::HeaderMap, Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::{
    config::RedditCredentials,
    domain::{Account, ActivityItem, ModerationAction, Post},
};

use super::{
    listing::{
        split_things, AccountAbout, Listing, Me, MoreChildrenResponse, TokenResponse,
        WriteResponse,
    },
    PlatformClient, PlatformError, SessionFactory, TopWindow,
};

pub const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
pub const API_BASE: &str = "https://oauth.reddit.com";

const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME: u64 = 3600;
const MAX_PAGE_SIZE: usize = 100;
const REPLY_SCAN_LIMIT: usize = 500;
const MORE_CHILDREN_BATCH: usize = 100;

pub fn user_agent(username: &str) -> String {
    format!(
        "script:ExterminatorBot:v{} (by /u/{username})",
        env!("CARGO_PKG_VERSION")
    )
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

pub struct RedditClient {
    http: Client,
    credentials: RedditCredentials,
    username: String,
    token: Mutex<Option<AccessToken>>,
}

impl RedditClient {
    pub async fn login(
        credentials: RedditCredentials,
        timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let http = Client::builder()
            .user_agent(user_agent(&credentials.username))
            .timeout(timeout)
            .build()?;
        let mut client = Self {
            http,
            username: credentials.username.clone(),
            credentials,
            token: Mutex::new(None),
        };
        let me: Me = client.get_json("/api/v1/me", &[]).await?;
        client.username = me.name;
        tracing::debug!(target: "reddit", username = %client.username, "session opened");
        Ok(client)
    }

    fn cached_token(&self) -> Option<String> {
        self.token
            .lock()
            .as_ref()
            .filter(|token| token.expires_at > Instant::now())
            .map(|token| token.value.clone())
    }

    async fn access_token(&self) -> Result<String, PlatformError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[
                ("grant_type", "password"),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(PlatformError::Auth(
                "client id or secret rejected".to_string(),
            ));
        }
        let body: TokenResponse = check_status(response)?.json().await?;
        if let Some(error) = body.error {
            return Err(PlatformError::Auth(error));
        }
        let value = body
            .access_token
            .ok_or_else(|| PlatformError::Auth("token response missing access_token".into()))?;
        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME))
            .saturating_sub(TOKEN_REFRESH_MARGIN);

        *self.token.lock() = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });
        tracing::debug!(target: "reddit", lifetime_secs = lifetime.as_secs(), "access token refreshed");
        Ok(value)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, PlatformError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{API_BASE}{path}"))
            .bearer_auth(token)
            .query(&[("raw_json", "1")])
            .query(query)
            .send()
            .await?;
        Ok(check_status(response)?.json::<T>().await?)
    }

    async fn post_form(&self, path: &str, form: &[(&str, String)]) -> Result<(), PlatformError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{API_BASE}{path}"))
            .bearer_auth(token)
            .form(form)
            .send()
            .await?;
        let text = check_status(response)?.text().await?;
        let body: WriteResponse = if text.trim().is_empty() {
            WriteResponse::default()
        } else {
            serde_json::from_str(&text).map_err(decode_error)?
        };

        let codes = body.json.error_codes();
        if codes.iter().any(|code| code == "RATELIMIT") {
            return Err(PlatformError::RateLimited {
                retry_after: body.json.ratelimit.and_then(seconds),
            });
        }
        if !codes.is_empty() {
            return Err(PlatformError::Api(body.json.describe()));
        }
        Ok(())
    }

    async fn listing_items(
        &self,
        path: &str,
        extra: &[(&str, String)],
        limit: usize,
    ) -> Result<Vec<ActivityItem>, PlatformError> {
        let mut items = Vec::new();
        let mut after: Option<String> = None;
        while items.len() < limit {
            let page = (limit - items.len()).min(MAX_PAGE_SIZE);
            let mut query = extra.to_vec();
            query.push(("limit", page.to_string()));
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }
            let listing: Listing = self.get_json(path, &query).await?;
            let next = listing.data.after.clone();
            let batch = listing.into_items().map_err(decode_error)?;
            if batch.is_empty() {
                break;
            }
            items.extend(batch);
            match next {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }
        items.truncate(limit);
        Ok(items)
    }
}

#[async_trait]
impl PlatformClient for RedditClient {
    fn username(&self) -> &str {
        &self.username
    }

    async fn validate_source(&self, source: &str) -> Result<(), PlatformError> {
        // Unknown subreddits redirect to a search listing instead of failing.
        let about: serde_json::Value = self.get_json(&format!("/r/{source}/about"), &[]).await?;
        if about.get("kind").and_then(|kind| kind.as_str()) == Some("t5") {
            Ok(())
        } else {
            Err(PlatformError::NotFound(format!("subreddit {source}")))
        }
    }

    async fn fetch_new_posts(
        &self,
        sources: &[String],
        limit: usize,
    ) -> Result<Vec<Post>, PlatformError> {
        let path = format!("/r/{}/new", sources.join("+"));
        let items = self.listing_items(&path, &[], limit).await?;
        Ok(only_posts(items))
    }

    async fn fetch_post(&self, id: &str) -> Result<Post, PlatformError> {
        let listing: Listing = self
            .get_json("/api/info", &[("id", format!("t3_{id}"))])
            .await?;
        listing
            .into_posts()
            .map_err(decode_error)?
            .into_iter()
            .next()
            .ok_or_else(|| PlatformError::NotFound(format!("post {id}")))
    }

    async fn fetch_account(&self, name: &str, limit: usize) -> Result<Account, PlatformError> {
        let about: AccountAbout = self.get_json(&format!("/user/{name}/about"), &[]).await?;
        let activity = self
            .listing_items(
                &format!("/user/{name}/overview"),
                &[("sort", "new".to_string())],
                limit,
            )
            .await?;
        Ok(Account {
            name: about.data.name,
            created: about
                .data
                .created_utc
                .and_then(|secs| chrono::DateTime::from_timestamp(secs as i64, 0)),
            activity,
        })
    }

    async fn count_top_content(
        &self,
        name: &str,
        window: TopWindow,
        limit: usize,
    ) -> Result<usize, PlatformError> {
        let items = self
            .listing_items(
                &format!("/user/{name}/overview"),
                &[
                    ("sort", "top".to_string()),
                    ("t", window.as_query().to_string()),
                ],
                limit,
            )
            .await?;
        Ok(items.len())
    }

    async fn search(
        &self,
        scope: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Post>, PlatformError> {
        let listing: Listing = self
            .get_json(
                &format!("/r/{scope}/search"),
                &[
                    ("q", query.to_string()),
                    ("restrict_sr", "on".to_string()),
                    ("sort", "relevance".to_string()),
                    ("t", "all".to_string()),
                    ("limit", limit.min(MAX_PAGE_SIZE).to_string()),
                ],
            )
            .await?;
        listing.into_posts().map_err(decode_error)
    }

    async fn apply_action(
        &self,
        post: &Post,
        action: &ModerationAction,
    ) -> Result<(), PlatformError> {
        let thing_id = format!("t3_{}", post.id);
        match action {
            ModerationAction::Downvote => {
                self.post_form("/api/vote", &[("id", thing_id), ("dir", "-1".to_string())])
                    .await
            }
            ModerationAction::Reply { body } => {
                self.post_form(
                    "/api/comment",
                    &[
                        ("api_type", "json".to_string()),
                        ("thing_id", thing_id),
                        ("text", body.clone()),
                    ],
                )
                .await
            }
            ModerationAction::Report { reason } => {
                self.post_form(
                    "/api/report",
                    &[
                        ("api_type", "json".to_string()),
                        ("thing_id", thing_id),
                        ("reason", reason.clone()),
                    ],
                )
                .await
            }
        }
    }

    async fn has_reply_from(&self, account: &str, post: &Post) -> Result<bool, PlatformError> {
        let listings: Vec<Listing> = self
            .get_json(
                &format!("/comments/{}", post.id),
                &[
                    ("limit", REPLY_SCAN_LIMIT.to_string()),
                    ("depth", "1".to_string()),
                ],
            )
            .await?;
        let Some(comments) = listings.into_iter().nth(1) else {
            return Ok(false);
        };
        let (items, mut more) = comments.into_items_and_more().map_err(decode_error)?;
        if any_comment_by(account, &items) {
            return Ok(true);
        }

        // Collapsed comments sit behind `more` stubs; expand until none remain.
        while !more.is_empty() {
            let take = more.len().min(MORE_CHILDREN_BATCH);
            let batch: Vec<String> = more.drain(..take).collect();
            let body: MoreChildrenResponse = self
                .get_json(
                    "/api/morechildren",
                    &[
                        ("api_type", "json".to_string()),
                        ("link_id", format!("t3_{}", post.id)),
                        ("children", batch.join(",")),
                        ("depth", "1".to_string()),
                        ("limit_children", "false".to_string()),
                    ],
                )
                .await?;
            let (items, nested) = split_things(body.json.data.things).map_err(decode_error)?;
            if any_comment_by(account, &items) {
                return Ok(true);
            }
            more.extend(nested);
        }
        Ok(false)
    }
}

fn any_comment_by(account: &str, items: &[ActivityItem]) -> bool {
    items.iter().any(|item| match item {
        ActivityItem::Comment(comment) => comment
            .author
            .as_deref()
            .is_some_and(|author| author.eq_ignore_ascii_case(account)),
        ActivityItem::Post(_) => false,
    })
}

pub struct RedditSessionFactory {
    credentials: RedditCredentials,
    timeout: Duration,
}

impl RedditSessionFactory {
    pub fn new(credentials: RedditCredentials, timeout: Duration) -> Self {
        Self {
            credentials,
            timeout,
        }
    }
}

#[async_trait]
impl SessionFactory for RedditSessionFactory {
    async fn open_session(&self) -> Result<Arc<dyn PlatformClient>, PlatformError> {
        let client = RedditClient::login(self.credentials.clone(), self.timeout).await?;
        Ok(Arc::new(client))
    }
}

fn check_status(response: Response) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let context = format!("{status} for {}", response.url().path());
    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(PlatformError::RateLimited {
            retry_after: retry_after_header(response.headers()),
        }),
        StatusCode::UNAUTHORIZED => Err(PlatformError::Auth(context)),
        StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Err(PlatformError::NotFound(context)),
        _ => Err(PlatformError::Api(context)),
    }
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    ["retry-after", "x-ratelimit-reset"].iter().find_map(|name| {
        headers
            .get(*name)?
            .to_str()
            .ok()?
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(seconds)
    })
}

fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

fn decode_error(err: serde_json::Error) -> PlatformError {
    PlatformError::Api(format!("malformed response: {err}"))
}

fn only_posts(items: Vec<ActivityItem>) -> Vec<Post> {
    items
        .into_iter()
        .filter_map(|item| match item {
            ActivityItem::Post(post) => Some(post),
            ActivityItem::Comment(_) => None,
        })
        .collect()
}
