use std::fmt;

use clap::ValueEnum;

use super::post::Post;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum ActionKind {
    Debug,
    Downvote,
    Reply,
    Report,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionKind::Debug => "debug",
            ActionKind::Downvote => "downvote",
            ActionKind::Reply => "reply",
            ActionKind::Report => "report",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationAction {
    Downvote,
    Reply { body: String },
    Report { reason: String },
}

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub candidate: Option<Post>,
    pub confidence: f64,
}

impl MatchResult {
    pub fn none() -> Self {
        Self {
            candidate: None,
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpamVerdict {
    pub post_id: String,
    pub short_message: String,
    pub long_message: Vec<String>,
    pub confidence: f64,
}

impl SpamVerdict {
    pub fn new(post: &Post, original: &Post, user_score: f64, post_score: f64, me: &str) -> Self {
        let confidence = (0.5 * (user_score + post_score)).clamp(0.0, 1.0);
        let pct = 100.0 * confidence;
        let author = post.author.as_deref().unwrap_or("[deleted]");
        let long_message = vec![
            format!(
                "WARNING: /u/{author} may be a spambot that [copy-pastes popular old posts]({}).",
                original.full_permalink()
            ),
            format!("Confidence rating {pct:.1}%."),
            "This bot is still in development and sometimes makes mistakes.".to_string(),
            format!("[_Contact the developers?_](https://www.reddit.com/message/compose/?to={me})"),
        ];
        let short_message = format!(
            "[Copy-paste spambot]({}), confidence {pct:.1}%",
            original.short_url()
        );
        Self {
            post_id: post.id.clone(),
            short_message,
            long_message,
            confidence,
        }
    }

    pub fn reply_body(&self) -> String {
        self.long_message.join("\n\n")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub work: usize,
    pub spam: usize,
}
