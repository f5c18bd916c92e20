pub mod collector;
pub mod scheduler;

#[cfg(test)]
pub mod testkit;

pub use collector::{AccuracyMetrics, CollectorStatus, Outcome, PendingBook, ResultCollector};
pub use scheduler::{PredictionScheduler, SchedulerMetrics};

use std::fmt;

/// Identifies one race within one meet, used as the join key across the
/// prediction and result-collection pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RaceKey {
    pub meet_id: String,
    pub race_number: u32,
}

impl RaceKey {
    pub fn new(meet_id: impl Into<String>, race_number: u32) -> Self {
        RaceKey {
            meet_id: meet_id.into(),
            race_number,
        }
    }
}

impl fmt::Display for RaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.meet_id, self.race_number)
    }
}
