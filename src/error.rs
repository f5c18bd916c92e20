use thiserror::Error;

use crate::quota::Tier;

/// Rejections raised before any scoring happens. Each variant carries the
/// message shown to the caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Horse name is required")]
    HorseName,
    #[error("Track is required")]
    Track,
    #[error("Race type is required")]
    RaceType,
    #[error("Valid distance is required")]
    Distance,
}

/// Raised when a user's daily prediction quota is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Daily limit of {limit} predictions exceeded for {tier} tier")]
pub struct QuotaExceededError {
    pub tier: Tier,
    pub limit: u32,
}
