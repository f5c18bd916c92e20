use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::db::models::{Meet, Race, RaceResult, Runner};
use super::provider::RaceDataProvider;

/// Refresh the bearer token this many seconds before it actually expires
/// so in-flight requests never race the cutoff.
const TOKEN_REFRESH_MARGIN_SECS: u64 = 60;

/// Race-data provider backed by the racing authority's REST API.
/// Authenticates with username/password and caches the bearer token
/// until shortly before expiry.
pub struct RacingApi {
    http: Client,
    username: String,
    password: String,
    /// Base URL for overriding in tests
    base_url: String,
    token: Mutex<Option<AuthToken>>,
}

struct AuthToken {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

impl RacingApi {
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(RacingApi {
            http,
            username: username.to_string(),
            password: password.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        })
    }

    /// Return a valid bearer token, logging in again if the cached one
    /// is missing or about to expire.
    async fn authenticate(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(auth) = cached.as_ref() {
            if Instant::now() < auth.expires_at {
                return Ok(auth.token.clone());
            }
        }

        let url = format!("{}/auth/login", self.base_url);
        debug!("Authenticating against {}", url);

        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "username": self.username,
                "password": self.password,
            }))
            .send()
            .await
            .context("Racing API login request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("Racing API authentication failed: {}", resp.status());
        }

        let login: LoginResponse = resp
            .json()
            .await
            .context("Failed to parse racing API login response")?;

        let lifetime = login.expires_in.saturating_sub(TOKEN_REFRESH_MARGIN_SECS);
        let token = login.token.clone();
        *cached = Some(AuthToken {
            token: login.token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });
        Ok(token)
    }

    async fn get_json(&self, path: String) -> Result<serde_json::Value> {
        let token = self.authenticate().await?;
        let url = format!("{}{}", self.base_url, path);
        debug!("Fetching {}", url);

        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Racing API request failed: {}", path))?;

        if !resp.status().is_success() {
            anyhow::bail!("Racing API error for {}: {}", path, resp.status());
        }

        resp.json()
            .await
            .context("Failed to parse racing API response")
    }
}

#[async_trait]
impl RaceDataProvider for RacingApi {
    fn name(&self) -> &str {
        "racing-api"
    }

    async fn meets_today(&self) -> Result<Vec<Meet>> {
        let today = Utc::now().date_naive();
        let raw = self.get_json(format!("/meets?date={}", today)).await?;
        parse_array(&raw, "meets")
    }

    async fn races(&self, meet_id: &str) -> Result<Vec<Race>> {
        let raw = self.get_json(format!("/meets/{}/races", meet_id)).await?;
        parse_array(&raw, "races")
    }

    async fn runners(&self, meet_id: &str, race_number: u32) -> Result<Vec<Runner>> {
        let raw = self
            .get_json(format!("/meets/{}/races/{}/runners", meet_id, race_number))
            .await?;
        parse_array(&raw, "runners")
    }

    async fn fetch_results(&self, meet_id: &str, race_number: u32) -> Result<Vec<RaceResult>> {
        let raw = self
            .get_json(format!("/meets/{}/races/{}/results", meet_id, race_number))
            .await?;
        parse_array(&raw, "results")
    }
}

/// Pull `key` out of a response envelope and deserialize the array under it.
/// A missing or null key is treated as an empty list, not an error.
fn parse_array<T: serde::de::DeserializeOwned>(
    raw: &serde_json::Value,
    key: &str,
) -> Result<Vec<T>> {
    match raw.get(key) {
        Some(v) if !v.is_null() => serde_json::from_value(v.clone())
            .with_context(|| format!("Malformed {} payload from racing API", key)),
        _ => Ok(vec![]),
    }
}
