use anyhow::Result;
use chrono::{DateTime, NaiveTime, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub mod models;
use models::StoredPrediction;

/// Thread-safe SQLite handle (single connection with mutex).
///
/// Persists user-issued predictions for quota counting and history, and
/// the per-user subscription tier the quota table keys off.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Predictions ──────────────────────────────────────────────────────────

    /// Insert an issued prediction
    pub fn insert_prediction(&self, p: &StoredPrediction) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO predictions (
                user_id, horse_name, track, race_type, distance, race_date,
                days_since_last_race, winning_streak, losing_streak,
                lightgbm, random_forest, gradient_boosting, logistic,
                ensemble, confidence, explanation, created_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
            params![
                p.user_id,
                p.horse_name,
                p.track,
                p.race_type,
                p.distance,
                p.race_date,
                p.days_since_last_race,
                p.winning_streak,
                p.losing_streak,
                p.lightgbm,
                p.random_forest,
                p.gradient_boosting,
                p.logistic,
                p.ensemble,
                p.confidence,
                p.explanation,
                p.created_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Count predictions the user has issued since UTC midnight
    pub fn count_predictions_today(&self, user_id: i64) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM predictions WHERE user_id=?1 AND created_at>=?2",
            params![user_id, utc_day_start()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// List a user's predictions, most recent first
    pub fn predictions_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<StoredPrediction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, horse_name, track, race_type, distance, race_date,
                    days_since_last_race, winning_streak, losing_streak,
                    lightgbm, random_forest, gradient_boosting, logistic,
                    ensemble, confidence, explanation, created_at
             FROM predictions WHERE user_id=?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Subscriptions ────────────────────────────────────────────────────────

    /// Assign (or replace) a user's subscription tier
    pub fn set_user_tier(&self, user_id: i64, tier: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO subscriptions (user_id, tier, started_at)
             VALUES (?1,?2,?3)
             ON CONFLICT(user_id) DO UPDATE SET
                tier=excluded.tier,
                started_at=excluded.started_at",
            params![user_id, tier, Utc::now()],
        )?;
        Ok(())
    }

    /// The user's subscription tier, if any was ever assigned
    pub fn user_tier(&self, user_id: i64) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let tier = conn
            .query_row(
                "SELECT tier FROM subscriptions WHERE user_id=?1",
                params![user_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(tier)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

/// Start of the current UTC day, the boundary daily quotas reset on.
fn utc_day_start() -> DateTime<Utc> {
    Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn map_prediction(row: &rusqlite::Row) -> rusqlite::Result<StoredPrediction> {
    Ok(StoredPrediction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        horse_name: row.get(2)?,
        track: row.get(3)?,
        race_type: row.get(4)?,
        distance: row.get(5)?,
        race_date: row.get(6)?,
        days_since_last_race: row.get(7)?,
        winning_streak: row.get(8)?,
        losing_streak: row.get(9)?,
        lightgbm: row.get(10)?,
        random_forest: row.get(11)?,
        gradient_boosting: row.get(12)?,
        logistic: row.get(13)?,
        ensemble: row.get(14)?,
        confidence: row.get(15)?,
        explanation: row.get(16)?,
        created_at: row.get(17)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS predictions (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id              INTEGER NOT NULL,
    horse_name           TEXT    NOT NULL,
    track                TEXT    NOT NULL,
    race_type            TEXT    NOT NULL,
    distance             REAL    NOT NULL,
    race_date            TEXT    NOT NULL,
    days_since_last_race INTEGER,
    winning_streak       INTEGER NOT NULL DEFAULT 0,
    losing_streak        INTEGER NOT NULL DEFAULT 0,
    lightgbm             REAL    NOT NULL,
    random_forest        REAL    NOT NULL,
    gradient_boosting    REAL    NOT NULL,
    logistic             REAL    NOT NULL,
    ensemble             REAL    NOT NULL,
    confidence           TEXT    NOT NULL,
    explanation          TEXT    NOT NULL,
    created_at           TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS subscriptions (
    user_id    INTEGER PRIMARY KEY,
    tier       TEXT    NOT NULL,
    started_at TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_predictions_user_day ON predictions(user_id, created_at);
"#;
