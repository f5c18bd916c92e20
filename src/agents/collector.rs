use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::racing::RaceDataProvider;

use super::RaceKey;

/// How long settled results are kept before being purged.
const RESULT_RETENTION_DAYS: i64 = 7;

/// Finishing positions 2 through 4 count as a place.
const PLACE_CUTOFF: u32 = 4;

/// A prediction is scored as a win call only above this probability.
const WIN_CALL_THRESHOLD: f64 = 0.5;

/// What actually happened to a horse once the race settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Place,
    Loss,
}

impl Outcome {
    pub fn from_position(position: u32) -> Self {
        if position == 1 {
            Outcome::Win
        } else if position <= PLACE_CUTOFF {
            Outcome::Place
        } else {
            Outcome::Loss
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Place => "place",
            Outcome::Loss => "loss",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
struct PendingPrediction {
    probability: f64,
    registered_at: DateTime<Utc>,
}

/// Predictions awaiting an official result, keyed by race and horse.
/// The scheduler registers entries; the collector removes them as races
/// settle, so nothing is scored twice.
#[derive(Clone, Default)]
pub struct PendingBook {
    inner: Arc<Mutex<HashMap<(RaceKey, String), PendingPrediction>>>,
}

impl PendingBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: &RaceKey, horse_name: &str, probability: f64) {
        self.inner.lock().unwrap().insert(
            (key.clone(), horse_name.to_string()),
            PendingPrediction {
                probability,
                registered_at: Utc::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Races that still have at least one unsettled prediction.
    fn race_keys(&self) -> HashSet<RaceKey> {
        self.inner
            .lock()
            .unwrap()
            .keys()
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn take(&self, key: &RaceKey, horse_name: &str) -> Option<PendingPrediction> {
        self.inner
            .lock()
            .unwrap()
            .remove(&(key.clone(), horse_name.to_string()))
    }

    /// Drop entries that never matched a result, e.g. scratched horses.
    fn clear_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.len();
        inner.retain(|_, pending| pending.registered_at > cutoff);
        before - inner.len()
    }
}

/// One prediction matched against an official finishing position.
#[derive(Debug, Clone)]
pub struct SettledResult {
    pub race_key: RaceKey,
    pub horse_name: String,
    pub track: String,
    pub probability: f64,
    pub outcome: Outcome,
    pub settled_at: DateTime<Utc>,
}

/// Hit-rate summary over settled predictions. A prediction counts as
/// correct only when the horse won and the model called it above the
/// win threshold.
#[derive(Debug, Clone, Default)]
pub struct AccuracyMetrics {
    pub total_predictions: usize,
    pub correct_predictions: usize,
    pub accuracy: f64,
    pub by_track: HashMap<String, TrackAccuracy>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrackAccuracy {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
}

/// Snapshot of collector health counters.
#[derive(Debug, Clone, Default)]
pub struct CollectorStatus {
    pub is_running: bool,
    pub total_results: usize,
    pub pending_predictions: usize,
    pub error_count: u64,
}

#[derive(Default)]
struct CollectorState {
    is_running: bool,
    error_count: u64,
}

/// Polls for settled races on a fixed interval and matches official
/// finishing orders against the pending prediction book.
#[derive(Clone)]
pub struct ResultCollector {
    provider: Arc<dyn RaceDataProvider>,
    pending: PendingBook,
    results: Arc<Mutex<Vec<SettledResult>>>,
    state: Arc<Mutex<CollectorState>>,
    interval: Duration,
    shutdown: Arc<Mutex<Option<watch::Sender<bool>>>>,
}

impl ResultCollector {
    pub fn new(provider: Arc<dyn RaceDataProvider>, pending: PendingBook, interval: Duration) -> Self {
        ResultCollector {
            provider,
            pending,
            results: Arc::new(Mutex::new(Vec::new())),
            state: Arc::new(Mutex::new(CollectorState::default())),
            interval,
            shutdown: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn the polling loop. The first cycle runs immediately; further
    /// cycles follow at the configured interval until `stop` is called.
    pub fn start(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.is_running {
                warn!("Result collector already running");
                return;
            }
            state.is_running = true;
        }

        let (tx, mut rx) = watch::channel(false);
        *self.shutdown.lock().unwrap() = Some(tx);

        let agent = self.clone();
        tokio::spawn(async move {
            info!(
                "Result collector started (provider={}, interval={:?})",
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
                            info!("Result collector stopped");
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
            let mut state = self.state.lock().unwrap();
            if !state.is_running {
                warn!("Result collector not running");
                return;
            }
            state.is_running = false;
        }

        if let Some(tx) = self.shutdown.lock().unwrap().take() {
            let _ = tx.send(true);
        }
    }

    /// One collection pass: fetch results for every race with unsettled
    /// predictions and score the matches. Races without results yet stay
    /// pending for the next cycle.
    pub async fn run_cycle(&self) {
        if self.pending.is_empty() {
            return;
        }
        let outstanding = self.pending.race_keys();

        let meets = match self.provider.meets_today().await {
            Ok(m) => m,
            Err(e) => {
                error!("Failed to fetch today's meets: {}", e);
                self.state.lock().unwrap().error_count += 1;
                return;
            }
        };
        if meets.is_empty() {
            info!("No meets available for result collection");
            return;
        }

        let mut matched = 0usize;

        for meet in &meets {
            let races = match self.provider.races(&meet.id).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("Failed to fetch races for meet {}: {}", meet.id, e);
                    self.state.lock().unwrap().error_count += 1;
                    continue;
                }
            };

            // Only races with unsettled predictions are worth a results call.
            let watched: Vec<RaceKey> = races
                .iter()
                .map(|race| RaceKey::new(meet.id.clone(), race.number))
                .filter(|key| outstanding.contains(key))
                .collect();
            if watched.is_empty() {
                continue;
            }

            let fetches = watched.into_iter().map(|key| {
                let provider = Arc::clone(&self.provider);
                async move {
                    let res = provider.fetch_results(&key.meet_id, key.race_number).await;
                    (key, res)
                }
            });

            for (key, res) in join_all(fetches).await {
                match res {
                    Ok(results) => {
                        for result in results {
                            let Some(pending) = self.pending.take(&key, &result.horse_name) else {
                                continue;
                            };
                            let outcome = Outcome::from_position(result.finishing_position);
                            info!(
                                "Settled {} in race {}: {} (predicted {:.3})",
                                result.horse_name, key, outcome, pending.probability
                            );
                            self.results.lock().unwrap().push(SettledResult {
                                race_key: key.clone(),
                                horse_name: result.horse_name,
                                track: meet.venue.clone(),
                                probability: pending.probability,
                                outcome,
                                settled_at: Utc::now(),
                            });
                            matched += 1;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to fetch results for race {}: {}", key, e);
                        self.state.lock().unwrap().error_count += 1;
                    }
                }
            }
        }

        if matched > 0 {
            info!("Result collection cycle matched {} predictions", matched);
        }
    }

    /// Copy of every settled result.
    #[allow(dead_code)]
    pub fn results(&self) -> Vec<SettledResult> {
        self.results.lock().unwrap().clone()
    }

    pub fn accuracy_metrics(&self) -> AccuracyMetrics {
        let results = self.results.lock().unwrap();
        let mut metrics = AccuracyMetrics {
            total_predictions: results.len(),
            ..Default::default()
        };

        for result in results.iter() {
            let correct =
                result.outcome == Outcome::Win && result.probability > WIN_CALL_THRESHOLD;
            if correct {
                metrics.correct_predictions += 1;
            }
            let track = metrics.by_track.entry(result.track.clone()).or_default();
            track.total += 1;
            if correct {
                track.correct += 1;
            }
        }

        if metrics.total_predictions > 0 {
            metrics.accuracy = metrics.correct_predictions as f64 / metrics.total_predictions as f64;
        }
        for track in metrics.by_track.values_mut() {
            if track.total > 0 {
                track.accuracy = track.correct as f64 / track.total as f64;
            }
        }

        metrics
    }

    pub fn status(&self) -> CollectorStatus {
        let state = self.state.lock().unwrap();
        CollectorStatus {
            is_running: state.is_running,
            total_results: self.results.lock().unwrap().len(),
            pending_predictions: self.pending.len(),
            error_count: state.error_count,
        }
    }

    /// Drop settled results and never-matched pending entries older than
    /// the retention window.
    pub fn clear_old_results(&self) {
        let cutoff = Utc::now() - chrono::Duration::days(RESULT_RETENTION_DAYS);

        let cleared = {
            let mut results = self.results.lock().unwrap();
            let before = results.len();
            results.retain(|r| r.settled_at > cutoff);
            before - results.len()
        };
        let dropped_pending = self.pending.clear_older_than(cutoff);

        if cleared > 0 || dropped_pending > 0 {
            info!(
                "Cleared {} old results and {} stale pending predictions",
                cleared, dropped_pending
            );
        }
    }
}
