use clap::Parser;

use crate::domain::ActionKind;

/// Finds image posts that copy older popular posts and acts on them.
#[derive(Debug, Clone, Parser)]
#[command(name = "exterminate", version, about)]
pub struct Cli {
    /// Subreddits to watch.
    #[arg(required_unless_present_any = ["check_post", "check_user"])]
    pub sources: Vec<String>,

    /// Actions to take on confirmed spam.
    #[arg(long, value_enum, value_delimiter = ',', default_value = "debug")]
    pub actions: Vec<ActionKind>,

    /// Follow the new-post stream until interrupted.
    #[arg(long)]
    pub forever: bool,

    /// Posts pulled per source in batch mode.
    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Search results compared per post.
    #[arg(long = "search", default_value_t = 3)]
    pub search_depth: usize,

    /// Minimum account suspicion before images are compared.
    #[arg(long = "sus_user", default_value_t = 0.5)]
    pub thresh_user: f64,

    /// Minimum image similarity for a verdict.
    #[arg(long = "sus_post", default_value_t = 0.5)]
    pub thresh_post: f64,

    /// Number of scanner workers.
    #[arg(long, default_value_t = 1)]
    pub threads: usize,

    /// Credential profile read from the environment.
    #[arg(long)]
    pub login: String,

    /// Seconds the penalizer sleeps after being rate limited.
    #[arg(long, default_value_t = 1_200)]
    pub timeout: u64,

    /// Log every score component.
    #[arg(long)]
    pub verbose: bool,

    /// Score these posts (id or link) and exit without acting.
    #[arg(long = "check-post", num_args = 1..)]
    pub check_post: Vec<String>,

    /// Score these accounts and exit without acting.
    #[arg(long = "check-user", num_args = 1..)]
    pub check_user: Vec<String>,
}
