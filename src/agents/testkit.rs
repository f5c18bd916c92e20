//! Scripted race-data provider shared by the agent tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::db::models::{Meet, Race, RaceResult, Runner};
use crate::racing::RaceDataProvider;

pub fn meet(id: &str, venue: &str) -> Meet {
    Meet {
        id: id.to_string(),
        name: venue.to_string(),
        venue: venue.to_string(),
        date: Utc::now().date_naive(),
    }
}

pub fn race(number: u32, name: &str, distance: &str) -> Race {
    Race {
        id: format!("race-{}", number),
        number,
        time: "12:00".to_string(),
        name: name.to_string(),
        distance: distance.to_string(),
        conditions: Some("Good".to_string()),
    }
}

pub fn runner(number: u32, name: &str) -> Runner {
    Runner {
        id: format!("runner-{}", number),
        number,
        name: name.to_string(),
        odds: Some(3.0),
        form: Some("1-2-3".to_string()),
        weight: Some(57.0),
        jockey: None,
        trainer: None,
    }
}

/// Provider whose card is scripted per test. Counts fetch calls and can
/// be told to fail, and results can be settled mid-test through the
/// interior mutex.
#[derive(Default)]
pub struct MockProvider {
    meets: Vec<Meet>,
    races: HashMap<String, Vec<Race>>,
    runners: HashMap<(String, u32), Vec<Runner>>,
    results: Mutex<HashMap<(String, u32), Vec<RaceResult>>>,
    fail_races_for: Option<String>,
    fail_results_for: Option<(String, u32)>,
    pub runner_calls: AtomicUsize,
    pub result_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_meet(mut self, id: &str, venue: &str) -> Self {
        self.meets.push(meet(id, venue));
        self
    }

    pub fn with_race(mut self, meet_id: &str, number: u32, name: &str, distance: &str) -> Self {
        self.races
            .entry(meet_id.to_string())
            .or_default()
            .push(race(number, name, distance));
        self
    }

    pub fn with_runners(mut self, meet_id: &str, race_number: u32, names: &[&str]) -> Self {
        let runners = names
            .iter()
            .enumerate()
            .map(|(i, name)| runner(i as u32 + 1, name))
            .collect();
        self.runners
            .insert((meet_id.to_string(), race_number), runners);
        self
    }

    /// Make `races()` fail for one meet so error isolation can be observed.
    pub fn with_failing_races(mut self, meet_id: &str) -> Self {
        self.fail_races_for = Some(meet_id.to_string());
        self
    }

    /// Make `fetch_results()` fail for one race.
    pub fn with_failing_results(mut self, meet_id: &str, race_number: u32) -> Self {
        self.fail_results_for = Some((meet_id.to_string(), race_number));
        self
    }

    /// Settle a race: `placings` is (horse name, finishing position).
    pub fn set_results(&self, meet_id: &str, race_number: u32, placings: &[(&str, u32)]) {
        let results = placings
            .iter()
            .map(|(name, position)| RaceResult {
                horse_name: name.to_string(),
                finishing_position: *position,
            })
            .collect();
        self.results
            .lock()
            .unwrap()
            .insert((meet_id.to_string(), race_number), results);
    }
}

#[async_trait]
impl RaceDataProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn meets_today(&self) -> Result<Vec<Meet>> {
        Ok(self.meets.clone())
    }

    async fn races(&self, meet_id: &str) -> Result<Vec<Race>> {
        if self.fail_races_for.as_deref() == Some(meet_id) {
            anyhow::bail!("scripted failure for meet {}", meet_id);
        }
        Ok(self.races.get(meet_id).cloned().unwrap_or_default())
    }

    async fn runners(&self, meet_id: &str, race_number: u32) -> Result<Vec<Runner>> {
        self.runner_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .runners
            .get(&(meet_id.to_string(), race_number))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_results(&self, meet_id: &str, race_number: u32) -> Result<Vec<RaceResult>> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_results_for == Some((meet_id.to_string(), race_number)) {
            anyhow::bail!("scripted failure for race {}-{}", meet_id, race_number);
        }
        Ok(self
            .results
            .lock()
            .unwrap()
            .get(&(meet_id.to_string(), race_number))
            .cloned()
            .unwrap_or_default())
    }
}
