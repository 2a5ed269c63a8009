pub mod orchestrator;
pub mod penalizer;
pub mod queue;
pub mod scanner;

use std::time::Duration;

use crate::domain::ActionKind;

pub use orchestrator::Orchestrator;

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub thresh_user: f64,
    pub thresh_post: f64,
    /// Applied in this order; sorted and deduplicated.
    pub actions: Vec<ActionKind>,
    pub verbose: bool,
    pub scanner_backoff: Duration,
    pub rate_limit_timeout: Duration,
}

impl ScanSettings {
    pub fn new(
        thresh_user: f64,
        thresh_post: f64,
        mut actions: Vec<ActionKind>,
        verbose: bool,
        scanner_backoff: Duration,
        rate_limit_timeout: Duration,
    ) -> Self {
        actions.sort();
        actions.dedup();
        Self {
            thresh_user,
            thresh_post,
            actions,
            verbose,
            scanner_backoff,
            rate_limit_timeout,
        }
    }
}
