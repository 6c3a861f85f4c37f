use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};

use crate::parsing::parse_stats_payload;
use crate::types::StatsSnapshot;

/// Fetches statistics and falls back to the last good reading on failure.
pub struct StatsCollector {
    client: reqwest::Client,
    url: String,
    cache: StatsSnapshot,
}

impl StatsCollector {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            cache: StatsSnapshot::default(),
        }
    }

    /// Last successfully fetched snapshot (all zero until the first success).
    pub fn cached(&self) -> &StatsSnapshot {
        &self.cache
    }

    /// Never fails: transport errors, bad payloads and readings without a
    /// population all yield the cached snapshot.
    pub async fn fetch(&mut self) -> StatsSnapshot {
        match self.fetch_fresh().await {
            Ok(stats) if stats.is_valid() => {
                self.cache = stats;
                stats
            }
            Ok(stats) => {
                warn!("No data received ({:?}), using cache", stats);
                self.cache
            }
            Err(e) => {
                warn!("Error loading statistics, using cache: {:#}", e);
                self.cache
            }
        }
    }

    async fn fetch_fresh(&self) -> Result<StatsSnapshot> {
        let res = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Failed to request statistics")?;
        if !res.status().is_success() {
            return Err(anyhow!("Statistics endpoint returned {}", res.status()));
        }
        let body = res.text().await.context("Failed to read statistics body")?;
        let stats = parse_stats_payload(&body)?;
        debug!("Fetched {:?}", stats);
        Ok(stats)
    }
}
