use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Horse-racing win-probability engine
#[derive(Parser, Debug, Clone)]
#[command(name = "turfcast", version, about)]
pub struct Config {
    #[command(subcommand)]
    pub command: Commands,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "turfcast.db")]
    pub database_path: String,

    /// Racing API base URL
    #[arg(long, env = "RACING_API_URL", default_value = "https://api.racing.com")]
    pub racing_api_url: String,

    /// Racing API username
    #[arg(long, env = "RACING_API_USERNAME")]
    pub racing_api_username: Option<String>,

    /// Racing API password
    #[arg(long, env = "RACING_API_PASSWORD")]
    pub racing_api_password: Option<String>,

    /// Serve the built-in fixture card instead of calling the racing API
    #[arg(long, env = "MOCK_DATA", default_value = "false")]
    pub mock_data: bool,

    /// Prediction cycle interval in seconds
    #[arg(long, env = "PREDICT_INTERVAL_SECS", default_value = "300")]
    pub predict_interval_secs: u64,

    /// Result collection interval in seconds
    #[arg(long, env = "RESULT_INTERVAL_SECS", default_value = "600")]
    pub result_interval_secs: u64,

    /// Fixed RNG seed for reproducible model output
    #[arg(long, env = "MODEL_SEED")]
    pub model_seed: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Monitor the live race card and predict continuously
    Run,

    /// Score a single horse and store the prediction
    Predict {
        /// Horse name
        #[arg(long)]
        horse: String,

        /// Venue the race is run at
        #[arg(long)]
        track: String,

        /// Race type, e.g. "Thoroughbred"
        #[arg(long, default_value = "Thoroughbred")]
        race_type: String,

        /// Race distance in metres
        #[arg(long)]
        distance: f64,

        /// Race date (defaults to today)
        #[arg(long)]
        race_date: Option<NaiveDate>,

        /// Days since the horse last raced
        #[arg(long)]
        days_since_last_race: Option<u32>,

        /// Current winning streak
        #[arg(long, default_value = "0")]
        winning_streak: u32,

        /// Current losing streak
        #[arg(long, default_value = "0")]
        losing_streak: u32,

        /// Career win rate in [0,1]
        #[arg(long)]
        historical_win_rate: Option<f64>,

        /// Recent form score in [0,1]
        #[arg(long)]
        recent_form_score: Option<f64>,

        /// Win rate at this venue in [0,1]
        #[arg(long)]
        track_win_rate: Option<f64>,

        /// Race class text, e.g. "Group 1"
        #[arg(long)]
        race_class: Option<String>,

        /// Acting user ID for quota accounting
        #[arg(long, default_value = "1")]
        user: i64,
    },

    /// List a user's stored predictions, newest first
    History {
        /// User ID to list predictions for
        #[arg(long, default_value = "1")]
        user: i64,

        /// Maximum rows to print
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Set a user's subscription tier
    SetTier {
        /// User ID to update
        #[arg(long, default_value = "1")]
        user: i64,

        /// One of: free, basic, premium, elite
        #[arg(long)]
        tier: String,
    },
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.predict_interval_secs < 10 {
            anyhow::bail!("predict_interval_secs must be at least 10");
        }
        if self.result_interval_secs < 10 {
            anyhow::bail!("result_interval_secs must be at least 10");
        }
        if matches!(self.command, Commands::Run)
            && !self.mock_data
            && (self.racing_api_username.is_none() || self.racing_api_password.is_none())
        {
            anyhow::bail!(
                "RACING_API_USERNAME and RACING_API_PASSWORD are required in run mode. Use --mock-data for the offline fixture card."
            );
        }
        Ok(())
    }
}
