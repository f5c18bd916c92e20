//! Tier-based daily quota gate for prediction issuance.
//!
//! The check is advisory read-then-decide over the persisted count: it is
//! consulted before every issuance and never cached, but concurrent
//! requests can both observe "allowed" before either row lands.

use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::db::Database;
use crate::error::QuotaExceededError;

/// Subscription plan controlling the daily prediction quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Basic,
    Premium,
    Elite,
}

impl Tier {
    /// Fixed per-tier daily quota table.
    pub fn daily_limit(&self) -> u32 {
        match self {
            Tier::Free => 5,
            Tier::Basic => 50,
            Tier::Premium => 500,
            Tier::Elite => 5000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Basic => "basic",
            Tier::Premium => "premium",
            Tier::Elite => "elite",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "basic" => Ok(Tier::Basic),
            "premium" => Ok(Tier::Premium),
            "elite" => Ok(Tier::Elite),
            other => Err(format!("unknown subscription tier: {other}")),
        }
    }
}

/// Outcome of a quota check. Computed fresh per call.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Predictions left today; 0 when denied
    pub remaining: u32,
    pub tier: Tier,
    /// Set on denial, names the tier and its limit
    pub message: Option<String>,
}

impl RateLimitDecision {
    /// Turn a denial into its error so issuance sites can `?` on it.
    pub fn into_result(self) -> Result<Self, QuotaExceededError> {
        if self.allowed {
            Ok(self)
        } else {
            Err(QuotaExceededError {
                tier: self.tier,
                limit: self.tier.daily_limit(),
            })
        }
    }
}

/// Check a user's remaining daily quota. Users without a subscription row
/// (or with an unrecognized stored tier) count as "free".
pub fn check_rate_limit(db: &Database, user_id: i64) -> Result<RateLimitDecision> {
    let tier = match db.user_tier(user_id)? {
        Some(name) => name.parse().unwrap_or_else(|e: String| {
            warn!("User {}: {}; treating as free", user_id, e);
            Tier::Free
        }),
        None => Tier::Free,
    };

    let limit = tier.daily_limit();
    let used = db.count_predictions_today(user_id)?;

    if used >= limit {
        let denial = QuotaExceededError { tier, limit };
        return Ok(RateLimitDecision {
            allowed: false,
            remaining: 0,
            tier,
            message: Some(denial.to_string()),
        });
    }

    Ok(RateLimitDecision {
        allowed: true,
        remaining: limit - used,
        tier,
        message: None,
    })
}
