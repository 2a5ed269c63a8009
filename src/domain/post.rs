use chrono::{DateTime, Utc};
use url::Url;

const IMAGE_HOSTS: &[&str] = &["i.redd.it"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "png"];

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub author: Option<String>,
    pub subreddit: String,
    pub permalink: String,
    pub url: String,
    pub title: String,
    pub created: DateTime<Utc>,
    pub is_self: bool,
    pub locked: bool,
    pub stickied: bool,
    /// Vote already cast on this post by the session account, if any.
    pub likes: Option<bool>,
}

impl Post {
    pub fn is_single_image(&self) -> bool {
        if self.is_self {
            return false;
        }
        let Ok(url) = Url::parse(&self.url) else {
            return false;
        };
        let host_ok = url
            .host_str()
            .map(|host| IMAGE_HOSTS.contains(&host))
            .unwrap_or(false);
        if !host_ok {
            return false;
        }
        url.path()
            .rsplit_once('.')
            .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    pub fn is_scannable(&self) -> bool {
        !self.locked && !self.stickied && self.is_single_image()
    }

    pub fn short_url(&self) -> String {
        short_url(&self.id)
    }

    pub fn full_permalink(&self) -> String {
        absolute_permalink(&self.permalink)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub author: Option<String>,
    pub permalink: String,
    pub body: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActivityItem {
    Post(Post),
    Comment(Comment),
}

impl ActivityItem {
    pub fn permalink(&self) -> &str {
        match self {
            ActivityItem::Post(post) => &post.permalink,
            ActivityItem::Comment(comment) => &comment.permalink,
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, ActivityItem::Comment(_))
    }

    pub fn is_single_image(&self) -> bool {
        match self {
            ActivityItem::Post(post) => post.is_single_image(),
            ActivityItem::Comment(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub name: String,
    pub created: Option<DateTime<Utc>>,
    pub activity: Vec<ActivityItem>,
}

impl Account {
    pub fn unavailable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            created: None,
            activity: Vec::new(),
        }
    }
}

pub fn short_url(id: &str) -> String {
    format!("https://redd.it/{id}")
}

pub fn absolute_permalink(permalink: &str) -> String {
    if permalink.starts_with("http") {
        permalink.to_string()
    } else {
        format!("https://www.reddit.com{permalink}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::image_post;

    #[test]
    fn single_image_requires_host_and_extension() {
        let ok = image_post("a", "title", 0);
        assert!(ok.is_single_image());

        let mut upper = ok.clone();
        upper.url = "https://i.redd.it/abc.PNG".into();
        assert!(upper.is_single_image());

        let mut gif = ok.clone();
        gif.url = "https://i.redd.it/abc.gif".into();
        assert!(!gif.is_single_image());

        let mut imgur = ok.clone();
        imgur.url = "https://i.imgur.com/abc.jpg".into();
        assert!(!imgur.is_single_image());

        let mut gallery = ok.clone();
        gallery.url = "https://www.reddit.com/gallery/abc".into();
        assert!(!gallery.is_single_image());

        let mut text = ok.clone();
        text.is_self = true;
        assert!(!text.is_single_image());
    }

    #[test]
    fn locked_and_stickied_posts_are_not_scannable() {
        let mut post = image_post("a", "title", 0);
        assert!(post.is_scannable());
        post.locked = true;
        assert!(!post.is_scannable());
        post.locked = false;
        post.stickied = true;
        assert!(!post.is_scannable());
    }

    #[test]
    fn permalinks_are_made_absolute() {
        assert_eq!(
            absolute_permalink("/r/pics/comments/abc/x/"),
            "https://www.reddit.com/r/pics/comments/abc/x/"
        );
        assert_eq!(short_url("abc"), "https://redd.it/abc");
    }
}
