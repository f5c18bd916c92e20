use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Everything known about a horse ahead of a race, as supplied by a caller
/// or assembled by the scheduler from live race data. Optional fields fall
/// back to population defaults during feature extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceInput {
    pub horse_name: String,
    pub track: String,
    /// e.g. "Thoroughbred", "Standard"
    pub race_type: String,
    /// Race distance in metres
    pub distance: f64,
    pub race_date: NaiveDate,
    pub days_since_last_race: Option<u32>,
    pub winning_streak: u32,
    pub losing_streak: u32,
    /// Career win rate in [0,1]
    pub historical_win_rate: Option<f64>,
    /// Recent form score in [0,1]
    pub recent_form_score: Option<f64>,
    /// Win rate at this venue in [0,1]
    pub track_win_rate: Option<f64>,
    /// Free text the race class is parsed from, e.g. "Group 1 Stakes"
    pub class_descriptor: Option<String>,
}

impl RaceInput {
    /// Reject malformed input before any scoring happens.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.horse_name.trim().is_empty() {
            return Err(ValidationError::HorseName);
        }
        if self.track.trim().is_empty() {
            return Err(ValidationError::Track);
        }
        if self.race_type.trim().is_empty() {
            return Err(ValidationError::RaceType);
        }
        // NaN and non-positive distances both fail this comparison
        if !(self.distance > 0.0) {
            return Err(ValidationError::Distance);
        }
        Ok(())
    }
}
