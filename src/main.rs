use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod agents;
mod config;
mod db;
mod error;
mod model;
mod quota;
mod racing;

use agents::{PendingBook, PredictionScheduler, ResultCollector};
use config::{Commands, Config};
use db::models::StoredPrediction;
use db::Database;
use model::{Ensemble, RaceInput};
use quota::{check_rate_limit, Tier};
use racing::{FixtureProvider, RaceDataProvider, RacingApi};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    match config.command.clone() {
        Commands::Run => run(&config).await,
        Commands::Predict {
            horse,
            track,
            race_type,
            distance,
            race_date,
            days_since_last_race,
            winning_streak,
            losing_streak,
            historical_win_rate,
            recent_form_score,
            track_win_rate,
            race_class,
            user,
        } => {
            let input = RaceInput {
                horse_name: horse,
                track,
                race_type,
                distance,
                race_date: race_date.unwrap_or_else(|| Utc::now().date_naive()),
                days_since_last_race,
                winning_streak,
                losing_streak,
                historical_win_rate,
                recent_form_score,
                track_win_rate,
                class_descriptor: race_class,
            };
            predict_once(&db, &config, user, input)
        }
        Commands::History { user, limit } => history(&db, user, limit),
        Commands::SetTier { user, tier } => set_tier(&db, user, &tier),
    }
}

/// Continuous mode: poll the live card and predict every runner, then
/// collect official results and score the ensemble against them.
async fn run(config: &Config) -> Result<()> {
    let provider: Arc<dyn RaceDataProvider> = if config.mock_data {
        info!("🟡 MOCK DATA mode – predictions run against the built-in fixture card");
        Arc::new(FixtureProvider)
    } else {
        info!("🔴 LIVE mode – predictions run against {}", config.racing_api_url);
        // validate() has already required credentials for live mode
        let username = config.racing_api_username.as_deref().unwrap_or_default();
        let password = config.racing_api_password.as_deref().unwrap_or_default();
        Arc::new(RacingApi::new(&config.racing_api_url, username, password)?)
    };

    let model = Arc::new(match config.model_seed {
        Some(seed) => {
            info!("Model noise seeded with {}", seed);
            Ensemble::seeded(seed)
        }
        None => Ensemble::new(),
    });

    let pending = PendingBook::new();
    let scheduler = PredictionScheduler::new(
        Arc::clone(&provider),
        model,
        pending.clone(),
        Duration::from_secs(config.predict_interval_secs),
    );
    let collector = ResultCollector::new(
        provider,
        pending,
        Duration::from_secs(config.result_interval_secs),
    );

    scheduler.start();
    collector.start();

    // Hourly retention sweep over both agents' in-memory books
    {
        let scheduler = scheduler.clone();
        let collector = collector.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            loop {
                interval.tick().await;
                scheduler.clear_old_predictions();
                collector.clear_old_results();
            }
        });
    }

    info!("turfcast running – press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler.stop();
    collector.stop();

    let metrics = scheduler.metrics();
    let status = collector.status();
    let accuracy = collector.accuracy_metrics();
    info!(
        "Final tally: {} predictions over {} races, {} results collected, accuracy {:.1}% across {} settled predictions",
        metrics.total_predictions,
        metrics.races_processed,
        status.total_results,
        accuracy.accuracy * 100.0,
        accuracy.total_predictions,
    );

    Ok(())
}

/// One-shot mode: check the user's quota, score a single horse, persist
/// the prediction, and print it as JSON.
fn predict_once(db: &Database, config: &Config, user: i64, input: RaceInput) -> Result<()> {
    let decision = check_rate_limit(db, user)?.into_result()?;

    let model = match config.model_seed {
        Some(seed) => Ensemble::seeded(seed),
        None => Ensemble::new(),
    };
    let prediction = model.predict(&input)?;

    let id = db.insert_prediction(&StoredPrediction {
        id: None,
        user_id: user,
        horse_name: prediction.horse_name.clone(),
        track: input.track.clone(),
        race_type: input.race_type.clone(),
        distance: input.distance,
        race_date: input.race_date,
        days_since_last_race: input.days_since_last_race,
        winning_streak: input.winning_streak,
        losing_streak: input.losing_streak,
        lightgbm: prediction.scores.lightgbm,
        random_forest: prediction.scores.random_forest,
        gradient_boosting: prediction.scores.gradient_boosting,
        logistic: prediction.scores.logistic,
        ensemble: prediction.probability,
        confidence: prediction.confidence.to_string(),
        explanation: prediction.explanation.clone(),
        created_at: Utc::now(),
    })?;

    println!("{}", serde_json::to_string_pretty(&prediction)?);
    info!(
        "Prediction #{} stored for user {} ({} tier, {} predictions left today)",
        id,
        user,
        decision.tier,
        decision.remaining - 1,
    );
    Ok(())
}

/// Print a user's stored predictions, most recent first.
fn history(db: &Database, user: i64, limit: u32) -> Result<()> {
    let rows = db.predictions_for_user(user, i64::from(limit))?;
    if rows.is_empty() {
        println!("No predictions recorded for user {user}");
        return Ok(());
    }
    info!("{} prediction(s) for user {}", rows.len(), user);
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn set_tier(db: &Database, user: i64, tier: &str) -> Result<()> {
    let tier: Tier = tier.parse().map_err(|e: String| anyhow!(e))?;
    db.set_user_tier(user, tier.as_str())?;
    info!(
        "User {} subscription set to {} ({} predictions/day)",
        user,
        tier,
        tier.daily_limit()
    );
    Ok(())
}
