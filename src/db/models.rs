use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A day's race program at one venue, as served by the racing API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meet {
    /// Provider meet ID, e.g. "meet-1"
    pub id: String,
    pub name: String,
    pub venue: String,
    pub date: NaiveDate,
}

/// One scheduled contest within a meet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Race {
    pub id: String,
    /// Sequence number within the meet (1-based)
    pub number: u32,
    /// Local start time, e.g. "12:30"
    pub time: String,
    pub name: String,
    /// Free-text distance, e.g. "1200m"
    pub distance: String,
    /// Track conditions, e.g. "Good"
    pub conditions: Option<String>,
}

/// A competitor entered in a race
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runner {
    pub id: String,
    /// Saddlecloth number
    pub number: u32,
    pub name: String,
    /// Fixed-odds price, if listed
    pub odds: Option<f64>,
    /// Recent finishing positions, e.g. "1-2-3"
    pub form: Option<String>,
    /// Carried weight in kg
    pub weight: Option<f64>,
    pub jockey: Option<String>,
    pub trainer: Option<String>,
}

/// A settled finishing position within a race
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceResult {
    pub horse_name: String,
    /// 1 = winner
    pub finishing_position: u32,
}

/// A persisted user-issued prediction (inputs plus model outputs)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPrediction {
    pub id: Option<i64>,
    pub user_id: i64,
    pub horse_name: String,
    pub track: String,
    pub race_type: String,
    pub distance: f64,
    pub race_date: NaiveDate,
    pub days_since_last_race: Option<u32>,
    pub winning_streak: u32,
    pub losing_streak: u32,
    pub lightgbm: f64,
    pub random_forest: f64,
    pub gradient_boosting: f64,
    pub logistic: f64,
    /// Arithmetic mean of the four model probabilities
    pub ensemble: f64,
    /// e.g. "Very High" | "Medium" | "Very Low"
    pub confidence: String,
    pub explanation: String,
    pub created_at: DateTime<Utc>,
}
