use anyhow::Result;
use async_trait::async_trait;

use crate::db::models::{Meet, Race, RaceResult, Runner};

/// Trait that every race-data provider must implement.
#[async_trait]
pub trait RaceDataProvider: Send + Sync {
    /// Return all meets scheduled for the current day.
    async fn meets_today(&self) -> Result<Vec<Meet>>;

    /// Return the race card for a single meet.
    async fn races(&self, meet_id: &str) -> Result<Vec<Race>>;

    /// Return the runners entered in one race.
    async fn runners(&self, meet_id: &str, race_number: u32) -> Result<Vec<Runner>>;

    /// Return the finishing order for one race. An empty vec means the
    /// race has not settled yet.
    async fn fetch_results(&self, meet_id: &str, race_number: u32) -> Result<Vec<RaceResult>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
