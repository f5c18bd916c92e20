use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::db::models::{Meet, Race, Runner};
use crate::model::{Confidence, Ensemble, ModelScores, RaceInput};
use crate::racing::RaceDataProvider;

use super::collector::PendingBook;
use super::RaceKey;

/// Fallback distance in metres when a race card carries no parseable distance.
const DEFAULT_DISTANCE_METRES: f64 = 1600.0;

/// Live feeds carry no per-horse history, so runners are scored as
/// unraced-recently until richer data arrives.
const DEFAULT_DAYS_SINCE_LAST_RACE: u32 = 30;

/// How long prediction records are kept before being purged.
const PREDICTION_RETENTION_HOURS: i64 = 24;

/// One issued prediction for a runner in a monitored race.
#[derive(Debug, Clone)]
pub struct PredictionRecord {
    pub race_key: RaceKey,
    pub horse_name: String,
    pub track: String,
    pub probability: f64,
    pub confidence: Confidence,
    pub explanation: String,
    pub scores: ModelScores,
    pub issued_at: DateTime<Utc>,
}

/// Snapshot of scheduler health counters.
#[derive(Debug, Clone, Default)]
pub struct SchedulerMetrics {
    pub total_predictions: u64,
    pub races_processed: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub is_running: bool,
    pub error_count: u64,
}

#[derive(Default)]
struct BookInner {
    predictions: HashMap<RaceKey, Vec<PredictionRecord>>,
    processed: HashSet<RaceKey>,
}

/// In-memory ledger of issued predictions grouped by race. The processed
/// set outlives purged records so a race is never predicted twice.
#[derive(Clone, Default)]
pub struct PredictionBook {
    inner: Arc<Mutex<BookInner>>,
}

impl PredictionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_processed(&self, key: &RaceKey) -> bool {
        self.inner.lock().unwrap().processed.contains(key)
    }

    fn mark_processed(&self, key: RaceKey) {
        self.inner.lock().unwrap().processed.insert(key);
    }

    fn push(&self, record: PredictionRecord) {
        self.inner
            .lock()
            .unwrap()
            .predictions
            .entry(record.race_key.clone())
            .or_default()
            .push(record);
    }

    fn snapshot(&self) -> HashMap<RaceKey, Vec<PredictionRecord>> {
        self.inner.lock().unwrap().predictions.clone()
    }

    /// Drop records older than the retention window. A race bucket goes
    /// away only once every record in it has aged out; the processed set
    /// is left alone. Returns the number of buckets removed.
    fn clear_old(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::hours(PREDICTION_RETENTION_HOURS);
        let mut inner = self.inner.lock().unwrap();
        let before = inner.predictions.len();
        for records in inner.predictions.values_mut() {
            records.retain(|r| r.issued_at > cutoff);
        }
        inner.predictions.retain(|_, records| !records.is_empty());
        before - inner.predictions.len()
    }
}

/// Polls the day's race card on a fixed interval and issues win-probability
/// predictions for every runner in races not yet seen. Each prediction is
/// also registered with the result collector for later scoring.
#[derive(Clone)]
pub struct PredictionScheduler {
    provider: Arc<dyn RaceDataProvider>,
    model: Arc<Ensemble>,
    book: PredictionBook,
    pending: PendingBook,
    metrics: Arc<Mutex<SchedulerMetrics>>,
    interval: Duration,
    shutdown: Arc<Mutex<Option<watch::Sender<bool>>>>,
}

impl PredictionScheduler {
    pub fn new(
        provider: Arc<dyn RaceDataProvider>,
        model: Arc<Ensemble>,
        pending: PendingBook,
        interval: Duration,
    ) -> Self {
        PredictionScheduler {
            provider,
            model,
            book: PredictionBook::new(),
            pending,
            metrics: Arc::new(Mutex::new(SchedulerMetrics::default())),
            interval,
            shutdown: Arc::new(Mutex::new(None)),
        }
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        self.metrics.lock().unwrap().clone()
    }

    /// Copy of every held prediction, grouped by race.
    #[allow(dead_code)]
    pub fn predictions(&self) -> HashMap<RaceKey, Vec<PredictionRecord>> {
        self.book.snapshot()
    }

    /// Spawn the polling loop. The first cycle runs immediately; further
    /// cycles follow at the configured interval until `stop` is called.
    pub fn start(&self) {
        {
            let mut metrics = self.metrics.lock().unwrap();
            if metrics.is_running {
                warn!("Prediction scheduler already running");
                return;
            }
            metrics.is_running = true;
        }

        let (tx, mut rx) = watch::channel(false);
        *self.shutdown.lock().unwrap() = Some(tx);

        let agent = self.clone();
        tokio::spawn(async move {
            info!(
                "Prediction scheduler started (provider={}, interval={:?})",
                agent.provider.name(),
                agent.interval
            );
            let mut ticker = tokio::time::interval(agent.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        agent.run_cycle().await;
                    }
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            info!("Prediction scheduler stopped");
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Signal the polling loop to exit. A cycle already in flight runs to
    /// completion; no new cycles begin.
    pub fn stop(&self) {
        {
            let mut metrics = self.metrics.lock().unwrap();
            if !metrics.is_running {
                warn!("Prediction scheduler not running");
                return;
            }
            metrics.is_running = false;
        }

        if let Some(tx) = self.shutdown.lock().unwrap().take() {
            let _ = tx.send(true);
        }
    }

    /// One full pass over today's card. Public so callers and tests can
    /// drive a cycle without the background loop.
    pub async fn run_cycle(&self) {
        let started = std::time::Instant::now();
        {
            let now = Utc::now();
            let ahead = chrono::Duration::from_std(self.interval)
                .unwrap_or_else(|_| chrono::Duration::zero());
            let mut metrics = self.metrics.lock().unwrap();
            metrics.last_run = Some(now);
            metrics.next_run = Some(now + ahead);
        }

        let meets = match self.provider.meets_today().await {
            Ok(m) => m,
            Err(e) => {
                error!("Failed to fetch today's meets: {}", e);
                self.metrics.lock().unwrap().error_count += 1;
                return;
            }
        };
        if meets.is_empty() {
            info!("No meets available today");
            return;
        }

        let mut cycle_predictions = 0u64;
        let mut cycle_races = 0u64;

        for meet in &meets {
            let races = match self.provider.races(&meet.id).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("Failed to fetch races for meet {}: {}", meet.id, e);
                    self.metrics.lock().unwrap().error_count += 1;
                    continue;
                }
            };

            for race in &races {
                let key = RaceKey::new(meet.id.clone(), race.number);
                if self.book.is_processed(&key) {
                    continue;
                }

                let runners = match self.provider.runners(&meet.id, race.number).await {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Failed to fetch runners for race {}: {}", key, e);
                        self.metrics.lock().unwrap().error_count += 1;
                        continue;
                    }
                };
                // An empty card is left unprocessed so a later cycle
                // retries once the field fills in.
                if runners.is_empty() {
                    continue;
                }

                for runner in &runners {
                    let input = build_input(meet, race, runner);
                    match self.model.predict(&input) {
                        Ok(prediction) => {
                            self.pending
                                .register(&key, &prediction.horse_name, prediction.probability);
                            self.book.push(PredictionRecord {
                                race_key: key.clone(),
                                horse_name: prediction.horse_name,
                                track: meet.venue.clone(),
                                probability: prediction.probability,
                                confidence: prediction.confidence,
                                explanation: prediction.explanation,
                                scores: prediction.scores,
                                issued_at: Utc::now(),
                            });
                            cycle_predictions += 1;
                        }
                        Err(e) => {
                            warn!("Skipping runner {} in race {}: {}", runner.name, key, e);
                        }
                    }
                }

                self.book.mark_processed(key);
                cycle_races += 1;
            }
        }

        {
            let mut metrics = self.metrics.lock().unwrap();
            metrics.total_predictions += cycle_predictions;
            metrics.races_processed += cycle_races;
        }

        info!(
            "Prediction cycle completed in {:?}: {} new races, {} predictions",
            started.elapsed(),
            cycle_races,
            cycle_predictions
        );
    }

    /// Drop prediction records older than 24 hours. Processed markers are
    /// kept so purged races are not predicted again.
    pub fn clear_old_predictions(&self) {
        let cleared = self.book.clear_old();
        if cleared > 0 {
            info!("Cleared {} old race prediction buckets", cleared);
        }
    }
}

/// Model input for one runner, with card-level defaults for the history
/// fields the live feed does not carry.
fn build_input(meet: &Meet, race: &Race, runner: &Runner) -> RaceInput {
    RaceInput {
        horse_name: runner.name.clone(),
        track: meet.venue.clone(),
        race_type: "Standard".to_string(),
        distance: parse_distance_metres(&race.distance),
        race_date: meet.date,
        days_since_last_race: Some(DEFAULT_DAYS_SINCE_LAST_RACE),
        winning_streak: 0,
        losing_streak: 0,
        historical_win_rate: None,
        recent_form_score: None,
        track_win_rate: None,
        class_descriptor: Some(race.name.clone()),
    }
}

/// Parse the leading digits of a card distance like "1200m". Falls back
/// to 1600 when the field is missing or malformed.
fn parse_distance_metres(raw: &str) -> f64 {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(DEFAULT_DISTANCE_METRES)
}
