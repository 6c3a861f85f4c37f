use anyhow::{Context, Result};
use serde::Deserialize;

use crate::types::StatsSnapshot;

#[derive(Debug, Deserialize)]
pub struct StatsPayload {
    pub metadata: StatsMetadata,
}

#[derive(Debug, Deserialize)]
pub struct StatsMetadata {
    #[serde(default)]
    pub population: i64,
    pub confirmed: ConfirmedCounts,
    pub dead: DeadCounts,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedCounts {
    pub total: i64,
    #[serde(default)]
    pub new_today: i64,
    #[serde(default)]
    pub new_yesterday: i64,
}

#[derive(Debug, Deserialize)]
pub struct DeadCounts {
    pub total: i64,
}

impl From<StatsPayload> for StatsSnapshot {
    fn from(payload: StatsPayload) -> Self {
        let meta = payload.metadata;
        StatsSnapshot {
            population: meta.population,
            infected: meta.confirmed.total,
            new_today: meta.confirmed.new_today,
            new_yesterday: meta.confirmed.new_yesterday,
            dead: meta.dead.total,
        }
    }
}

/// Normalize the statistics document. A missing population comes back as 0,
/// which callers treat as "no data".
pub fn parse_stats_payload(body: &str) -> Result<StatsSnapshot> {
    let payload: StatsPayload = serde_json::from_str(body).context("Malformed statistics payload")?;
    Ok(payload.into())
}

pub fn per_100k(stats: &StatsSnapshot) -> Option<f64> {
    if stats.population > 0 {
        Some(100_000.0 * (stats.infected as f64) / (stats.population as f64))
    } else {
        None
    }
}
