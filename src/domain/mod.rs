pub mod post;
pub mod seen;
pub mod types;

pub use post::{short_url, Account, ActivityItem, Comment, Post};
pub use seen::SeenIds;
pub use types::{ActionKind, MatchResult, ModerationAction, QueueSnapshot, SpamVerdict};
