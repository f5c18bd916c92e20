//! Feature engineering for the prediction models.
//!
//! Turns a [`RaceInput`] into the normalized numeric features every model
//! scores against. Extraction is a pure function of its input: population
//! defaults fill the optional fields, nothing here validates or mutates.

use super::input::RaceInput;

/// Longest distance on the calendar (m); normalizes race distance to ~[0,1].
const DISTANCE_SCALE: f64 = 3200.0;
/// Assumed days since last start when a horse's record is unknown.
const DEFAULT_DAYS_SINCE: f64 = 14.0;
/// Population base win rate used when no history is supplied.
const DEFAULT_WIN_RATE: f64 = 0.25;
/// Neutral recent-form score used when none is supplied.
const DEFAULT_FORM_SCORE: f64 = 0.5;
/// e-folding time (days) for the recent-form decay term.
const FORM_DECAY_DAYS: f64 = 30.0;

/// Normalized feature set for one horse in one race.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceFeatures {
    /// Distance / 3200 m
    pub distance_normalized: f64,
    pub days_since_last_race: f64,
    pub days_since_squared: f64,
    pub winning_streak: f64,
    pub losing_streak: f64,
    /// (wins − losses) / max(1, wins + losses), in [−1, 1]
    pub recent_form_ratio: f64,
    pub historical_win_rate: f64,
    /// Supplied form score decayed by time since last start
    pub form_decay: f64,
    /// Venue-specific win rate, falling back to the historical rate
    pub track_win_rate: f64,
    /// Race class in [0, 5]; 5 = Group 1
    pub race_class: u8,
    pub race_class_normalized: f64,
    /// Simulated rolling finishing-rank mean over the last 10 starts
    pub rolling_rank_mean: f64,
    /// Simulated rolling finishing-rank deviation over the last 10 starts
    pub rolling_rank_std: f64,
}

/// Build the feature set for one runner. Deterministic, no side effects.
pub fn extract(input: &RaceInput) -> RaceFeatures {
    let days = input
        .days_since_last_race
        .map(f64::from)
        .unwrap_or(DEFAULT_DAYS_SINCE);
    let wins = f64::from(input.winning_streak);
    let losses = f64::from(input.losing_streak);

    let recent_form_ratio = (wins - losses) / (wins + losses).max(1.0);
    let historical_win_rate = input.historical_win_rate.unwrap_or(DEFAULT_WIN_RATE);
    let form_score = input.recent_form_score.unwrap_or(DEFAULT_FORM_SCORE);
    let track_win_rate = input.track_win_rate.unwrap_or(historical_win_rate);

    let race_class = input
        .class_descriptor
        .as_deref()
        .map(race_class)
        .unwrap_or(0);

    RaceFeatures {
        distance_normalized: input.distance / DISTANCE_SCALE,
        days_since_last_race: days,
        days_since_squared: days * days,
        winning_streak: wins,
        losing_streak: losses,
        recent_form_ratio,
        historical_win_rate,
        form_decay: form_score * (-days / FORM_DECAY_DAYS).exp(),
        track_win_rate,
        race_class,
        race_class_normalized: f64::from(race_class) / 5.0,
        rolling_rank_mean: 0.5 + wins * 0.05,
        rolling_rank_std: (losses * 0.02).abs(),
    }
}

/// Resolve a race-class integer in [0, 5] from free text, highest class
/// first: Group 1 > Group 2 > Group 3 > Listed > named feature races.
pub fn race_class(text: &str) -> u8 {
    let t = text.to_lowercase();
    if t.contains("group 1") || t.contains("g1") || t.contains("grp 1") {
        5
    } else if t.contains("group 2") || t.contains("g2") || t.contains("grp 2") {
        4
    } else if t.contains("group 3") || t.contains("g3") || t.contains("grp 3") {
        3
    } else if t.contains("listed") {
        2
    } else if ["cup", "classic", "guineas", "stakes", "trophy"]
        .iter()
        .any(|kw| t.contains(kw))
    {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn input() -> RaceInput {
        RaceInput {
            horse_name: "Thunder Runner".into(),
            track: "Trentham".into(),
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

    #[test]
    fn defaults_fill_missing_history() {
        let f = extract(&input());
        assert_relative_eq!(f.days_since_last_race, 14.0);
        assert_relative_eq!(f.days_since_squared, 196.0);
        assert_relative_eq!(f.historical_win_rate, 0.25);
        assert_relative_eq!(f.track_win_rate, 0.25);
        // Neutral form score of 0.5 decayed over 14 days
        assert_relative_eq!(f.form_decay, 0.5 * (-14.0_f64 / 30.0).exp(), epsilon = 1e-12);
        assert_eq!(f.race_class, 0);
    }

    #[test]
    fn track_rate_falls_back_to_supplied_historical_rate() {
        let mut i = input();
        i.historical_win_rate = Some(0.40);
        let f = extract(&i);
        assert_relative_eq!(f.track_win_rate, 0.40);
    }

    #[test]
    fn distance_normalizes_against_3200() {
        let f = extract(&input());
        assert_relative_eq!(f.distance_normalized, 0.5);
    }

    #[test]
    fn form_ratio_from_streaks() {
        let mut i = input();
        i.winning_streak = 2;
        i.losing_streak = 1;
        let f = extract(&i);
        assert_relative_eq!(f.recent_form_ratio, 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(f.rolling_rank_mean, 0.6);
        assert_relative_eq!(f.rolling_rank_std, 0.02);
    }

    #[test]
    fn form_ratio_clamps_denominator_at_one() {
        // No starts on record: ratio must be 0, not NaN
        let f = extract(&input());
        assert_relative_eq!(f.recent_form_ratio, 0.0);
    }

    #[test]
    fn form_decay_uses_supplied_score_and_days() {
        let mut i = input();
        i.recent_form_score = Some(0.8);
        i.days_since_last_race = Some(30);
        let f = extract(&i);
        assert_relative_eq!(f.form_decay, 0.8 * (-1.0_f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn race_class_priority_ladder() {
        assert_eq!(race_class("Group 1 Stakes"), 5);
        assert_eq!(race_class("group 2 classic"), 4);
        assert_eq!(race_class("Grp 3 Sprint"), 3);
        assert_eq!(race_class("Listed Handicap"), 2);
        assert_eq!(race_class("Cup Final"), 1);
        assert_eq!(race_class("Auckland Guineas"), 1);
        assert_eq!(race_class("Maiden 1200m"), 0);
    }

    #[test]
    fn race_class_matches_compact_grade_codes() {
        assert_eq!(race_class("G1 Derby"), 5);
        assert_eq!(race_class("g2 trial"), 4);
        assert_eq!(race_class("G3"), 3);
    }

    #[test]
    fn class_normalization_spans_unit_interval() {
        let mut i = input();
        i.class_descriptor = Some("Group 1".into());
        assert_relative_eq!(extract(&i).race_class_normalized, 1.0);
        i.class_descriptor = Some("Listed".into());
        assert_relative_eq!(extract(&i).race_class_normalized, 0.4);
    }
}
