use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::{ActivityItem, Comment, Post};

const DELETED_AUTHOR: &str = "[deleted]";

#[derive(Debug, Deserialize)]
pub struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
pub struct Thing {
    pub kind: String,
    pub data: serde_json::Value,
}

impl Thing {
    pub fn into_activity(self) -> Result<Option<ActivityItem>, serde_json::Error> {
        match self.kind.as_str() {
            "t3" => {
                let link: LinkData = serde_json::from_value(self.data)?;
                Ok(Some(ActivityItem::Post(link.into())))
            }
            "t1" => {
                let comment: CommentData = serde_json::from_value(self.data)?;
                Ok(Some(ActivityItem::Comment(comment.into())))
            }
            _ => Ok(None),
        }
    }
}

pub fn split_things(
    things: Vec<Thing>,
) -> Result<(Vec<ActivityItem>, Vec<String>), serde_json::Error> {
    let mut items = Vec::with_capacity(things.len());
    let mut more = Vec::new();
    for thing in things {
        if thing.kind == "more" {
            let stub: MoreData = serde_json::from_value(thing.data)?;
            more.extend(stub.children);
        } else if let Some(item) = thing.into_activity()? {
            items.push(item);
        }
    }
    Ok((items, more))
}

impl Listing {
    pub fn into_items(self) -> Result<Vec<ActivityItem>, serde_json::Error> {
        self.into_items_and_more().map(|(items, _)| items)
    }

    pub fn into_items_and_more(
        self,
    ) -> Result<(Vec<ActivityItem>, Vec<String>), serde_json::Error> {
        split_things(self.data.children)
    }

    pub fn into_posts(self) -> Result<Vec<Post>, serde_json::Error> {
        Ok(self
            .into_items()?
            .into_iter()
            .filter_map(|item| match item {
                ActivityItem::Post(post) => Some(post),
                ActivityItem::Comment(_) => None,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct MoreData {
    #[serde(default)]
    children: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MoreChildrenResponse {
    #[serde(default)]
    pub json: MoreChildrenJson,
}

#[derive(Debug, Default, Deserialize)]
pub struct MoreChildrenJson {
    #[serde(default)]
    pub data: MoreChildrenData,
}

#[derive(Debug, Default, Deserialize)]
pub struct MoreChildrenData {
    #[serde(default)]
    pub things: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
pub struct LinkData {
    pub id: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub likes: Option<bool>,
}

impl From<LinkData> for Post {
    fn from(data: LinkData) -> Self {
        Post {
            id: data.id,
            author: live_author(data.author),
            subreddit: data.subreddit,
            permalink: data.permalink,
            url: data.url,
            title: data.title,
            created: timestamp(data.created_utc),
            is_self: data.is_self,
            locked: data.locked,
            stickied: data.stickied,
            likes: data.likes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentData {
    pub id: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub created_utc: f64,
}

impl From<CommentData> for Comment {
    fn from(data: CommentData) -> Self {
        Comment {
            id: data.id,
            author: live_author(data.author),
            permalink: data.permalink,
            body: data.body,
            created: timestamp(data.created_utc),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AccountAbout {
    pub data: AccountAboutData,
}

#[derive(Debug, Deserialize)]
pub struct AccountAboutData {
    pub name: String,
    #[serde(default)]
    pub created_utc: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct Me {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WriteResponse {
    #[serde(default)]
    pub json: WriteBody,
}

#[derive(Debug, Default, Deserialize)]
pub struct WriteBody {
    /// Each entry is `[code, message, field]`.
    #[serde(default)]
    pub errors: Vec<Vec<serde_json::Value>>,
    /// Seconds until the rate limit resets, sent alongside `RATELIMIT` errors.
    #[serde(default)]
    pub ratelimit: Option<f64>,
}

impl WriteBody {
    pub fn error_codes(&self) -> Vec<String> {
        self.errors
            .iter()
            .filter_map(|entry| entry.first())
            .filter_map(|code| code.as_str())
            .map(str::to_string)
            .collect()
    }

    pub fn describe(&self) -> String {
        self.errors
            .iter()
            .map(|entry| {
                entry
                    .iter()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(": ")
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn live_author(author: Option<String>) -> Option<String> {
    author.filter(|name| name != DELETED_AUTHOR && !name.is_empty())
}

fn timestamp(created_utc: f64) -> DateTime<Utc> {
    let secs = created_utc.trunc() as i64;
    let nanos = (created_utc.fract() * 1e9) as u32;
    DateTime::from_timestamp(secs, nanos).unwrap_or_default()
}
