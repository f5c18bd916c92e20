//! Multi-model win-probability ensemble.
//!
//! Four independent scorers emulate the behaviour of familiar model
//! families over the same feature set, and the ensemble is their plain
//! average. Spreading the weight across differently-shaped heuristics keeps
//! any single assumption from dominating a prediction.
//!
//! Models implemented:
//! - **lightgbm** (boosted style): win-rate heavy, rest-window adjustment,
//!   sprint-distance form bonus
//! - **random_forest**: form-decay heavy, with a small bounded random
//!   perturbation from an injectable, optionally seeded source
//! - **gradient_boosting**: balanced weights plus a Gaussian rest bonus
//!   peaking at 14 days between starts
//! - **logistic**: fixed-coefficient linear model through a sigmoid
//!
//! Every per-model probability and the ensemble itself stay within
//! [0.05, 0.95].

use std::fmt;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::features::{self, RaceFeatures};
use super::input::RaceInput;
use crate::error::ValidationError;

/// Probability floor: no runner is ever written off completely.
const PROB_FLOOR: f64 = 0.05;
/// Probability ceiling: no runner is ever a certainty.
const PROB_CEIL: f64 = 0.95;
/// Half-width of the random_forest perturbation.
const NOISE_HALF_WIDTH: f64 = 0.025;
/// Ideal freshening window between starts (days, inclusive).
const REST_MIN_DAYS: f64 = 7.0;
const REST_MAX_DAYS: f64 = 21.0;
/// Beyond this many days off, a horse is considered stale.
const STALE_DAYS: f64 = 30.0;
/// Centre and width of the gradient_boosting rest bonus.
const GAUSS_PEAK_DAYS: f64 = 14.0;
const GAUSS_WIDTH: f64 = 100.0;

// ── Public types ─────────────────────────────────────────────────────────────

/// Per-model probabilities, retained on the prediction for explainability.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelScores {
    pub lightgbm: f64,
    pub random_forest: f64,
    pub gradient_boosting: f64,
    pub logistic: f64,
}

impl ModelScores {
    /// Unweighted arithmetic mean of the four probabilities.
    pub fn mean(&self) -> f64 {
        (self.lightgbm + self.random_forest + self.gradient_boosting + self.logistic) / 4.0
    }
}

/// Qualitative tier derived from the ensemble probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confidence {
    #[serde(rename = "Very High")]
    VeryHigh,
    High,
    #[serde(rename = "Medium-High")]
    MediumHigh,
    Medium,
    #[serde(rename = "Medium-Low")]
    MediumLow,
    Low,
    #[serde(rename = "Very Low")]
    VeryLow,
}

impl Confidence {
    /// Fixed 7-band thresholds on the ensemble probability.
    pub fn from_probability(p: f64) -> Self {
        if p >= 0.75 {
            Confidence::VeryHigh
        } else if p >= 0.65 {
            Confidence::High
        } else if p >= 0.55 {
            Confidence::MediumHigh
        } else if p >= 0.45 {
            Confidence::Medium
        } else if p >= 0.35 {
            Confidence::MediumLow
        } else if p >= 0.25 {
            Confidence::Low
        } else {
            Confidence::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::VeryHigh => "Very High",
            Confidence::High => "High",
            Confidence::MediumHigh => "Medium-High",
            Confidence::Medium => "Medium",
            Confidence::MediumLow => "Medium-Low",
            Confidence::Low => "Low",
            Confidence::VeryLow => "Very Low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One issued prediction for one horse. Write-once.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub horse_name: String,
    pub scores: ModelScores,
    /// Ensemble probability in [0.05, 0.95]
    pub probability: f64,
    pub confidence: Confidence,
    pub explanation: String,
}

// ── Ensemble ─────────────────────────────────────────────────────────────────

/// The four-model scorer. Owns the random source feeding the
/// random_forest perturbation so output is reproducible under a seed and
/// fully deterministic with noise disabled.
pub struct Ensemble {
    noise: Option<Mutex<StdRng>>,
}

impl Ensemble {
    /// Entropy-seeded noise, for production use.
    pub fn new() -> Self {
        Ensemble {
            noise: Some(Mutex::new(StdRng::from_entropy())),
        }
    }

    /// Fixed-seed noise: repeated runs over the same inputs reproduce
    /// identical probabilities.
    pub fn seeded(seed: u64) -> Self {
        Ensemble {
            noise: Some(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// No perturbation at all; every model is a pure function.
    pub fn without_noise() -> Self {
        Ensemble { noise: None }
    }

    /// Validate, extract features, and score one runner.
    pub fn predict(&self, input: &RaceInput) -> Result<Prediction, ValidationError> {
        input.validate()?;
        let feats = features::extract(input);
        let scores = self.score(&feats);
        let probability = scores.mean();
        let confidence = Confidence::from_probability(probability);
        let explanation = explain(confidence, &feats);
        Ok(Prediction {
            horse_name: input.horse_name.clone(),
            scores,
            probability,
            confidence,
            explanation,
        })
    }

    /// Run all four models over an already-extracted feature set.
    pub fn score(&self, f: &RaceFeatures) -> ModelScores {
        ModelScores {
            lightgbm: lightgbm_score(f),
            random_forest: random_forest_score(f, self.noise_sample()),
            gradient_boosting: gradient_boosting_score(f),
            logistic: logistic_score(f),
        }
    }

    /// Uniform sample in ±NOISE_HALF_WIDTH, or 0 when noise is disabled.
    fn noise_sample(&self) -> f64 {
        match &self.noise {
            Some(rng) => {
                let mut rng = rng.lock().unwrap();
                (rng.gen::<f64>() - 0.5) * (2.0 * NOISE_HALF_WIDTH)
            }
            None => 0.0,
        }
    }
}

impl Default for Ensemble {
    fn default() -> Self {
        Ensemble::new()
    }
}

// ── Model A: lightgbm (boosted style) ────────────────────────────────────────
//
// Win-rate heavy: historical and venue rates carry almost half the weight.
// Rest window: 7–21 days between starts is the sweet spot; first-up inside
// a week or stale beyond a month both cost. Sprint trips (< 1600 m) reward
// horses in current form.

fn lightgbm_score(f: &RaceFeatures) -> f64 {
    let mut p = 0.30
        + f.historical_win_rate * 0.25
        + f.track_win_rate * 0.20
        + f.form_decay * 0.15
        + f.rolling_rank_mean * 0.12
        + f.race_class_normalized * 0.08;

    p += (f.winning_streak * 0.08).min(0.15);
    p -= (f.losing_streak * 0.05).min(0.10);

    if (REST_MIN_DAYS..=REST_MAX_DAYS).contains(&f.days_since_last_race) {
        p += 0.08;
    } else if f.days_since_last_race < REST_MIN_DAYS {
        p -= 0.05;
    } else if f.days_since_last_race > STALE_DAYS {
        p -= 0.08;
    }

    if f.distance_normalized < 0.5 {
        p += f.recent_form_ratio * 0.05;
    }

    clamp_probability(p)
}

// ── Model B: random_forest ───────────────────────────────────────────────────
//
// Form-decay heavy with smaller streak terms, plus a bounded symmetric
// perturbation standing in for tree-sample variance.

fn random_forest_score(f: &RaceFeatures, noise: f64) -> f64 {
    let mut p = 0.35
        + f.form_decay * 0.25
        + f.historical_win_rate * 0.20
        + f.track_win_rate * 0.18
        + f.rolling_rank_mean * 0.10
        + f.race_class_normalized * 0.07;

    p += (f.winning_streak * 0.06).min(0.12);
    p -= (f.losing_streak * 0.04).min(0.08);

    clamp_probability(p + noise)
}

// ── Model C: gradient_boosting ───────────────────────────────────────────────
//
// Balanced weights across rates, class, and form, with a Gaussian rest
// bonus peaking at 14 days between starts.

fn gradient_boosting_score(f: &RaceFeatures) -> f64 {
    let rest_bonus =
        (-(f.days_since_last_race - GAUSS_PEAK_DAYS).powi(2) / GAUSS_WIDTH).exp() * 0.05;

    let p = 0.32
        + f.historical_win_rate * 0.22
        + f.form_decay * 0.20
        + f.track_win_rate * 0.18
        + f.race_class_normalized * 0.10
        + f.rolling_rank_mean * 0.10
        + f.recent_form_ratio * 0.08
        + rest_bonus;

    clamp_probability(p)
}

// ── Model D: logistic ────────────────────────────────────────────────────────
//
// Fixed coefficients through a sigmoid. The intercept of −1.5 puts a
// no-information runner well under even money.

fn logistic_score(f: &RaceFeatures) -> f64 {
    let z = -1.5
        + f.historical_win_rate * 3.0
        + f.track_win_rate * 2.5
        + f.form_decay * 2.0
        + f.race_class_normalized * 1.2
        + f.rolling_rank_mean * 1.5
        + f.winning_streak * 0.3
        - f.losing_streak * 0.2;

    clamp_probability(sigmoid(z))
}

// ── Explanation ──────────────────────────────────────────────────────────────

/// Assemble the human-readable rationale from the qualitative rules that
/// fire for this feature set.
fn explain(confidence: Confidence, f: &RaceFeatures) -> String {
    let mut factors: Vec<String> = Vec::new();

    if f.historical_win_rate > 0.35 {
        factors.push("strong historical win rate".into());
    }
    if f.form_decay > 0.5 {
        factors.push("excellent recent form".into());
    }
    if f.winning_streak > 2.0 {
        factors.push(format!("{} consecutive wins", f.winning_streak));
    }
    if f.track_win_rate > 0.4 {
        factors.push("proven track record at this venue".into());
    }
    if (REST_MIN_DAYS..=REST_MAX_DAYS).contains(&f.days_since_last_race) {
        factors.push("optimal rest period".into());
    } else if f.days_since_last_race > STALE_DAYS {
        factors.push("long time since last race (may be rusty)".into());
    }
    if f.race_class > 2 {
        factors.push("competing in high-class race".into());
    }

    let summary = if factors.is_empty() {
        "mixed form indicators".to_string()
    } else {
        factors.join(", ")
    };
    format!("{} confidence based on {}.", confidence, summary)
}

// ── Math utilities ───────────────────────────────────────────────────────────

/// Standard logistic sigmoid function.
fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn clamp_probability(p: f64) -> f64 {
    p.clamp(PROB_FLOOR, PROB_CEIL)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn input() -> RaceInput {
        RaceInput {
            horse_name: "Lucky Strike".into(),
            track: "Ellerslie".into(),
            race_type: "Thoroughbred".into(),
            distance: 1600.0,
            race_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            days_since_last_race: None,
            winning_streak: 0,
            losing_streak: 0,
            historical_win_rate: None,
            recent_form_score: None,
            track_win_rate: None,
            class_descriptor: None,
        }
    }

    fn scores_for(model: &Ensemble, i: &RaceInput) -> ModelScores {
        model.predict(i).expect("valid input").scores
    }

    #[test]
    fn all_models_return_valid_range() {
        let model = Ensemble::seeded(7);
        for wins in 0..6 {
            for losses in 0..6 {
                for days in [0, 3, 7, 14, 21, 28, 45, 90] {
                    for rate in [0.0, 0.25, 0.6, 1.0] {
                        let mut i = input();
                        i.winning_streak = wins;
                        i.losing_streak = losses;
                        i.days_since_last_race = Some(days);
                        i.historical_win_rate = Some(rate);
                        i.class_descriptor = Some("Group 1".into());
                        let p = model.predict(&i).unwrap();
                        for (name, v) in [
                            ("lightgbm", p.scores.lightgbm),
                            ("random_forest", p.scores.random_forest),
                            ("gradient_boosting", p.scores.gradient_boosting),
                            ("logistic", p.scores.logistic),
                            ("ensemble", p.probability),
                        ] {
                            assert!(
                                (0.05..=0.95).contains(&v),
                                "{} out of range for w{} l{} d{} r{}: {:.4}",
                                name,
                                wins,
                                losses,
                                days,
                                rate,
                                v
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn ensemble_is_exact_mean_of_models() {
        let model = Ensemble::without_noise();
        let p = model.predict(&input()).unwrap();
        let mean = (p.scores.lightgbm
            + p.scores.random_forest
            + p.scores.gradient_boosting
            + p.scores.logistic)
            / 4.0;
        assert_relative_eq!(p.probability, mean, epsilon = 1e-12);
    }

    #[test]
    fn seeded_runs_reproduce_identical_output() {
        let mut i = input();
        i.winning_streak = 2;
        i.historical_win_rate = Some(0.3);
        let a = Ensemble::seeded(42).predict(&i).unwrap();
        let b = Ensemble::seeded(42).predict(&i).unwrap();
        assert_eq!(a.scores.random_forest, b.scores.random_forest);
        assert_eq!(a.probability, b.probability);
        assert_eq!(a.explanation, b.explanation);
    }

    #[test]
    fn noise_shifts_random_forest_by_at_most_its_half_width() {
        // Mid-range input so neither clamp bound absorbs the perturbation
        let baseline = scores_for(&Ensemble::without_noise(), &input()).random_forest;
        for seed in 0..50 {
            let noisy = scores_for(&Ensemble::seeded(seed), &input()).random_forest;
            assert!(
                (noisy - baseline).abs() <= 0.025 + 1e-12,
                "seed {} moved random_forest by {:.4}",
                seed,
                noisy - baseline
            );
        }
    }

    #[test]
    fn noise_only_touches_random_forest() {
        let quiet = scores_for(&Ensemble::without_noise(), &input());
        let noisy = scores_for(&Ensemble::seeded(99), &input());
        assert_eq!(quiet.lightgbm, noisy.lightgbm);
        assert_eq!(quiet.gradient_boosting, noisy.gradient_boosting);
        assert_eq!(quiet.logistic, noisy.logistic);
    }

    #[test]
    fn confidence_bands_match_thresholds_exactly() {
        let cases = [
            (0.80, Confidence::VeryHigh),
            (0.75, Confidence::VeryHigh),
            (0.74, Confidence::High),
            (0.65, Confidence::High),
            (0.55, Confidence::MediumHigh),
            (0.50, Confidence::Medium),
            (0.45, Confidence::Medium),
            (0.35, Confidence::MediumLow),
            (0.25, Confidence::Low),
            (0.249, Confidence::VeryLow),
            (0.10, Confidence::VeryLow),
        ];
        for (p, expected) in cases {
            assert_eq!(
                Confidence::from_probability(p),
                expected,
                "probability {p} mapped to the wrong band"
            );
        }
        assert_eq!(Confidence::VeryHigh.as_str(), "Very High");
        assert_eq!(Confidence::Medium.as_str(), "Medium");
        assert_eq!(Confidence::VeryLow.as_str(), "Very Low");
    }

    #[test]
    fn logistic_saturates_at_floor_for_long_losing_streak() {
        let mut i = input();
        i.losing_streak = 20;
        i.historical_win_rate = Some(0.0);
        i.recent_form_score = Some(0.0);
        i.track_win_rate = Some(0.0);
        let s = scores_for(&Ensemble::without_noise(), &i);
        assert_eq!(s.logistic, 0.05);
    }

    #[test]
    fn strong_profile_saturates_logistic_and_forest_at_ceiling() {
        let mut i = input();
        i.historical_win_rate = Some(0.6);
        i.track_win_rate = Some(0.6);
        i.recent_form_score = Some(1.0);
        i.days_since_last_race = Some(0);
        i.winning_streak = 5;
        i.class_descriptor = Some("Group 1".into());
        let s = scores_for(&Ensemble::seeded(3), &i);
        assert_eq!(s.logistic, 0.95);
        // Raw forest score is far enough above the ceiling that no
        // perturbation can pull it back under
        assert_eq!(s.random_forest, 0.95);
    }

    #[test]
    fn lightgbm_rest_window_beats_fresh_and_stale_returns() {
        let model = Ensemble::without_noise();
        let at = |days: u32| {
            let mut i = input();
            i.days_since_last_race = Some(days);
            scores_for(&model, &i).lightgbm
        };
        // Inside the 7–21 day window vs one day fresher
        assert!(at(7) > at(6) + 0.10, "7d {:.4} vs 6d {:.4}", at(7), at(6));
        // Window edge vs the dead zone just past it
        assert!(at(21) > at(22) + 0.07, "21d {:.4} vs 22d {:.4}", at(21), at(22));
        // Dead zone vs stale penalty past 30 days
        assert!(at(30) > at(31) + 0.07, "30d {:.4} vs 31d {:.4}", at(30), at(31));
    }

    #[test]
    fn gradient_boosting_rest_bonus_peaks_at_fourteen_days() {
        let model = Ensemble::without_noise();
        let at = |days: u32| {
            let mut i = input();
            // Zero the form score so days only act through the Gaussian term
            i.recent_form_score = Some(0.0);
            i.days_since_last_race = Some(days);
            scores_for(&model, &i).gradient_boosting
        };
        assert!(at(14) > at(9));
        assert!(at(9) > at(4));
        assert!(at(14) > at(25));
    }

    #[test]
    fn every_model_rises_with_historical_win_rate() {
        let model = Ensemble::without_noise();
        let at = |rate: f64| {
            let mut i = input();
            i.historical_win_rate = Some(rate);
            scores_for(&model, &i)
        };
        let low = at(0.20);
        let high = at(0.50);
        assert!(high.lightgbm > low.lightgbm);
        assert!(high.random_forest > low.random_forest);
        assert!(high.gradient_boosting > low.gradient_boosting);
        assert!(high.logistic > low.logistic);
    }

    #[test]
    fn explanation_lists_fired_factors() {
        let mut i = input();
        i.historical_win_rate = Some(0.45);
        i.recent_form_score = Some(0.9);
        i.days_since_last_race = Some(14);
        i.winning_streak = 4;
        i.track_win_rate = Some(0.5);
        i.class_descriptor = Some("Group 1 Stakes".into());
        let p = Ensemble::without_noise().predict(&i).unwrap();
        for factor in [
            "strong historical win rate",
            "excellent recent form",
            "4 consecutive wins",
            "proven track record at this venue",
            "optimal rest period",
            "competing in high-class race",
        ] {
            assert!(
                p.explanation.contains(factor),
                "missing {:?} in {:?}",
                factor,
                p.explanation
            );
        }
        assert!(p.explanation.starts_with(p.confidence.as_str()));
        assert!(p.explanation.ends_with('.'));
    }

    #[test]
    fn explanation_flags_stale_horses() {
        let mut i = input();
        i.days_since_last_race = Some(45);
        let p = Ensemble::without_noise().predict(&i).unwrap();
        assert!(p.explanation.contains("long time since last race (may be rusty)"));
    }

    #[test]
    fn explanation_falls_back_to_mixed_indicators() {
        let mut i = input();
        // 25 days: outside the rest window but not yet stale, nothing fires
        i.days_since_last_race = Some(25);
        let p = Ensemble::without_noise().predict(&i).unwrap();
        assert!(
            p.explanation.ends_with("confidence based on mixed form indicators."),
            "got {:?}",
            p.explanation
        );
    }

    #[test]
    fn predict_rejects_invalid_input_before_scoring() {
        let mut i = input();
        i.horse_name = "".into();
        let err = Ensemble::without_noise().predict(&i).unwrap_err();
        assert_eq!(err, ValidationError::HorseName);
    }

    #[test]
    fn prediction_confidence_matches_probability_band() {
        let p = Ensemble::seeded(11).predict(&input()).unwrap();
        assert_eq!(p.confidence, Confidence::from_probability(p.probability));
        assert_eq!(p.horse_name, "Lucky Strike");
    }
}
