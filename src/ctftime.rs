use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::Result;

const API_TIMEOUT: Duration = Duration::from_secs(10);
const API_ENDPOINT: &str = "https://ctftime.org/api/v1/events/";
const FETCH_LIMIT: usize = 20;
const LOOKAHEAD_DAYS: i64 = 30;
/// Upstream asks integrations to go easy; one fetch per TTL window is plenty.
const CACHE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Deserialize)]
pub struct CtfEvent {
    pub title: String,
    pub url: String,
    pub start: DateTime<Utc>,
    pub finish: DateTime<Utc>,
    pub format: String,
    pub weight: f64,
}

pub struct CtftimeClient {
    client: reqwest::Client,
    cache: Mutex<Option<(Instant, Vec<CtfEvent>)>>,
}

impl CtftimeClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(API_TIMEOUT)
                .user_agent("securibot")
                .build()
                .expect("Failed to create HTTP client"),
            cache: Mutex::new(None),
        }
    }

    /// Upcoming events over the next month, served from the cache while it
    /// is fresh.
    pub async fn upcoming(&self, limit: usize) -> Result<Vec<CtfEvent>> {
        let mut cache = self.cache.lock().await;

        if let Some((fetched_at, events)) = cache.as_ref() {
            if fetched_at.elapsed() < CACHE_TTL {
                return Ok(events.iter().take(limit).cloned().collect());
            }
        }

        let now = Utc::now();
        let start = now.timestamp().to_string();
        let finish = (now + chrono::Duration::days(LOOKAHEAD_DAYS))
            .timestamp()
            .to_string();
        let limit_param = FETCH_LIMIT.to_string();

        let events: Vec<CtfEvent> = self
            .client
            .get(API_ENDPOINT)
            .query(&[
                ("limit", limit_param.as_str()),
                ("start", start.as_str()),
                ("finish", finish.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        *cache = Some((Instant::now(), events.clone()));
        Ok(events.into_iter().take(limit).collect())
    }
}
