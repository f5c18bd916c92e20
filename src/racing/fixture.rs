use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::db::models::{Meet, Race, RaceResult, Runner};
use super::provider::RaceDataProvider;

/// Offline provider that serves a fixed race card. Used for demos and
/// local development when no racing API credentials are available.
pub struct FixtureProvider;

impl FixtureProvider {
    fn runner(id: &str, number: u32, name: &str, odds: f64, form: &str, weight: f64, jockey: &str, trainer: &str) -> Runner {
        Runner {
            id: id.to_string(),
            number,
            name: name.to_string(),
            odds: Some(odds),
            form: Some(form.to_string()),
            weight: Some(weight),
            jockey: Some(jockey.to_string()),
            trainer: Some(trainer.to_string()),
        }
    }

    fn race(id: &str, number: u32, time: &str, name: &str, distance: &str) -> Race {
        Race {
            id: id.to_string(),
            number,
            time: time.to_string(),
            name: name.to_string(),
            distance: distance.to_string(),
            conditions: Some("Good".to_string()),
        }
    }

    fn card(&self) -> Vec<Runner> {
        vec![
            Self::runner("runner-1", 1, "Lucky Strike", 2.5, "1-2-3", 58.0, "John Smith", "Jane Doe"),
            Self::runner("runner-2", 2, "Thunder Runner", 3.0, "2-1-4", 59.0, "Mike Johnson", "Bob Wilson"),
            Self::runner("runner-3", 3, "Swift Victory", 4.0, "3-4-2", 57.0, "Sarah Davis", "Tom Brown"),
            Self::runner("runner-4", 4, "Golden Dream", 5.5, "4-3-1", 60.0, "Emma Wilson", "Chris Lee"),
            Self::runner("runner-5", 5, "Midnight Express", 6.0, "5-5-5", 56.0, "David Miller", "Lisa Anderson"),
        ]
    }
}

#[async_trait]
impl RaceDataProvider for FixtureProvider {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn meets_today(&self) -> Result<Vec<Meet>> {
        let today = Utc::now().date_naive();
        Ok(vec![
            Meet {
                id: "meet-1".to_string(),
                name: "Matamata".to_string(),
                venue: "Matamata Racecourse".to_string(),
                date: today,
            },
            Meet {
                id: "meet-2".to_string(),
                name: "Cambridge".to_string(),
                venue: "Cambridge Racecourse".to_string(),
                date: today,
            },
            Meet {
                id: "meet-3".to_string(),
                name: "Hamilton".to_string(),
                venue: "Hamilton Racecourse".to_string(),
                date: today,
            },
        ])
    }

    async fn races(&self, _meet_id: &str) -> Result<Vec<Race>> {
        Ok(vec![
            Self::race("race-1", 1, "12:00 PM", "Maiden 1200m", "1200m"),
            Self::race("race-2", 2, "12:35 PM", "Class 4 1400m", "1400m"),
            Self::race("race-3", 3, "1:10 PM", "Class 3 1600m", "1600m"),
            Self::race("race-4", 4, "1:45 PM", "Class 2 2000m", "2000m"),
            Self::race("race-5", 5, "2:20 PM", "Class 1 2200m", "2200m"),
        ])
    }

    async fn runners(&self, _meet_id: &str, _race_number: u32) -> Result<Vec<Runner>> {
        Ok(self.card())
    }

    /// Every fixture race settles immediately with the card order as the
    /// finishing order, so the collector path can be exercised end to end.
    async fn fetch_results(&self, _meet_id: &str, _race_number: u32) -> Result<Vec<RaceResult>> {
        Ok(self
            .card()
            .into_iter()
            .map(|r| RaceResult {
                horse_name: r.name,
                finishing_position: r.number,
            })
            .collect())
    }
}
