use chrono::{DateTime, Utc};

use crate::{
    domain::{Account, ActivityItem},
    platform::{PlatformClient, PlatformError, TopWindow},
};

pub const DEFAULT_ACTIVITY_LIMIT: usize = 50;
pub const DEFAULT_WATCHLIST: &[&str] = &["/r/freekarma4u", "/r/freekarma4you"];

const AGE_HORIZON_DAYS: f64 = 180.0;
const SECONDS_PER_DAY: f64 = 86_400.0;
/// Keeps the aggregate strictly inside (0, 1) when the logistic saturates.
const SCORE_FLOOR: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DormancyDivisor {
    LifetimeCount,
    WindowLimit,
}

pub const DORMANCY_DIVISOR: DormancyDivisor = DormancyDivisor::LifetimeCount;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreComponents {
    pub age: f64,
    pub count: f64,
    pub dormancy: f64,
    pub image_density: f64,
    pub watchlist: f64,
}

impl ScoreComponents {
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.age,
            self.count,
            self.dormancy,
            self.image_density,
            self.watchlist,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub age: f64,
    pub count: f64,
    pub dormancy: f64,
    pub image_density: f64,
    pub watchlist: f64,
    pub bias: f64,
    pub steepness: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            age: 0.6,
            count: 1.0,
            dormancy: 1.0,
            image_density: 3.0,
            watchlist: 3.0,
            bias: 1.0,
            steepness: 3.0,
        }
    }
}

impl ScoreWeights {
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.age,
            self.count,
            self.dormancy,
            self.image_density,
            self.watchlist,
        ]
    }
}

pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn aggregate(components: &ScoreComponents, weights: &ScoreWeights) -> f64 {
    let sum: f64 = components
        .as_array()
        .iter()
        .zip(weights.as_array())
        .map(|(value, weight)| value * weight)
        .sum();
    logistic(weights.steepness * (sum - weights.bias)).clamp(SCORE_FLOOR, 1.0 - SCORE_FLOOR)
}

pub fn score_age(account: &Account, now: DateTime<Utc>) -> f64 {
    if account.activity.is_empty() {
        return 0.0;
    }
    let Some(created) = account.created else {
        return 0.0;
    };
    let age_days = ((now - created).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0);
    (-3.0 * age_days / AGE_HORIZON_DAYS).exp()
}

pub fn score_count(len: usize, limit: usize) -> f64 {
    if len == 0 || limit == 0 {
        return 0.0;
    }
    (-3.0 * len as f64 / limit as f64).exp() - 0.5
}

pub fn score_dormancy(
    lifetime_top: usize,
    recent_top: usize,
    len: usize,
    limit: usize,
    divisor: DormancyDivisor,
) -> f64 {
    if len == 0 {
        return 0.0;
    }
    let denominator = match divisor {
        DormancyDivisor::LifetimeCount => lifetime_top,
        DormancyDivisor::WindowLimit => limit,
    };
    if denominator == 0 {
        return 0.0;
    }
    let ratio = (lifetime_top as f64 - recent_top as f64) / denominator as f64;
    logistic(-6.0 * ratio)
}

pub fn score_image_density(items: &[ActivityItem], limit: usize) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    let tally = items.iter().fold(-1i64, |tally, item| {
        if item.is_comment() {
            tally - 2
        } else if item.is_single_image() {
            tally + 1
        } else {
            tally
        }
    });
    let window = limit.min(1 + items.len()).max(1) as f64;
    logistic(3.0 * tally as f64 / window)
}

/// Patterns must already be lowercase.
pub fn score_watchlist(items: &[ActivityItem], watchlist: &[String]) -> f64 {
    let hit = items.iter().any(|item| {
        let permalink = item.permalink().to_ascii_lowercase();
        watchlist.iter().any(|pattern| permalink.contains(pattern.as_str()))
    });
    if hit {
        1.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub account: Account,
    pub lifetime_top: usize,
    pub recent_top: usize,
}

#[derive(Debug, Clone)]
pub struct SuspicionReport {
    pub account: String,
    pub components: ScoreComponents,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct SuspicionScorer {
    limit: usize,
    weights: ScoreWeights,
    watchlist: Vec<String>,
    divisor: DormancyDivisor,
}

impl Default for SuspicionScorer {
    fn default() -> Self {
        Self::new(
            DEFAULT_ACTIVITY_LIMIT,
            DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl SuspicionScorer {
    pub fn new(limit: usize, watchlist: Vec<String>) -> Self {
        Self {
            limit,
            weights: ScoreWeights::default(),
            watchlist: watchlist
                .into_iter()
                .map(|pattern| pattern.to_ascii_lowercase())
                .filter(|pattern| !pattern.is_empty())
                .collect(),
            divisor: DORMANCY_DIVISOR,
        }
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_divisor(mut self, divisor: DormancyDivisor) -> Self {
        self.divisor = divisor;
        self
    }

    pub async fn evaluate(
        &self,
        client: &dyn PlatformClient,
        author: &str,
        now: DateTime<Utc>,
    ) -> Result<SuspicionReport, PlatformError> {
        let snapshot = self.snapshot(client, author).await?;
        Ok(self.score(&snapshot, now))
    }

    /// Fetches the account's history. Accounts that cannot be read are scored
    /// as if they had no history; throttling still propagates.
    pub async fn snapshot(
        &self,
        client: &dyn PlatformClient,
        author: &str,
    ) -> Result<AccountSnapshot, PlatformError> {
        let account = match client.fetch_account(author, self.limit).await {
            Ok(account) => account,
            Err(err) if err.is_rate_limited() => return Err(err),
            Err(err) => {
                tracing::debug!(
                    target: "suspicion",
                    account = author,
                    error = %err,
                    "account unavailable; scoring empty history"
                );
                Account::unavailable(author)
            }
        };

        if account.activity.is_empty() {
            return Ok(AccountSnapshot {
                account,
                lifetime_top: 0,
                recent_top: 0,
            });
        }

        let lifetime_top = client
            .count_top_content(author, TopWindow::All, 2 * self.limit)
            .await?;
        let recent_top = client
            .count_top_content(author, TopWindow::Month, self.limit)
            .await?;
        Ok(AccountSnapshot {
            account,
            lifetime_top,
            recent_top,
        })
    }

    pub fn score(&self, snapshot: &AccountSnapshot, now: DateTime<Utc>) -> SuspicionReport {
        let items = &snapshot.account.activity;
        let components = ScoreComponents {
            age: score_age(&snapshot.account, now),
            count: score_count(items.len(), self.limit),
            dormancy: score_dormancy(
                snapshot.lifetime_top,
                snapshot.recent_top,
                items.len(),
                self.limit,
                self.divisor,
            ),
            image_density: score_image_density(items, self.limit),
            watchlist: score_watchlist(items, &self.watchlist),
        };
        SuspicionReport {
            account: snapshot.account.name.clone(),
            score: aggregate(&components, &self.weights),
            components,
        }
    }
}

impl SuspicionReport {
    pub fn log_breakdown(&self) {
        let c = &self.components;
        tracing::info!(
            target: "suspicion",
            account = %self.account,
            score = %format!("{:.1}%", 100.0 * self.score),
            age = %format!("{:.2}", c.age),
            count = %format!("{:.2}", c.count),
            dormancy = %format!("{:.2}", c.dormancy),
            image_density = %format!("{:.2}", c.image_density),
            watchlist = %format!("{:.2}", c.watchlist),
            "account suspicion breakdown"
        );
    }
}
