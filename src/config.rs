use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::time::Duration;
use crate::types::{Config, SpamStrategy};

pub const DEFAULT_STATS_URL: &str = "https://redutv-api.vg.no/corona/v1/sheets/norway-region-data";
pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";

/// Source of configuration variables.
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;

    /// Like `get_var`, but blank values count as unset.
    fn get_set(&self, key: &str) -> Option<String> {
        self.get_var(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Reads the process environment.
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// In-memory variables for tests.
#[derive(Debug, Default, Clone)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MockEnvironment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn load_config() -> Result<Config> {
    load_config_with_env(&SystemEnvironment)
}

fn required<E: EnvironmentProvider>(env: &E, key: &str) -> Result<String> {
    env.get_set(key)
        .ok_or_else(|| anyhow!("Missing environment variable {} (CHANNEL, BOT_NAME and SLACK_KEY are required)", key))
}

fn numeric<E, T>(env: &E, key: &str, default: T) -> Result<T>
where
    E: EnvironmentProvider,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env.get_set(key) {
        Some(v) => v.parse().with_context(|| format!("Invalid {}", key)),
        None => Ok(default),
    }
}

pub fn load_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<Config> {
    let channel = required(env, "CHANNEL")?;
    let bot_name = required(env, "BOT_NAME")?;
    let slack_key = required(env, "SLACK_KEY")?;

    let spam_strategy = match env.get_set("SPAM_STRATEGY") {
        Some(v) => v.parse::<SpamStrategy>().map_err(|e| anyhow!(e))?,
        None => SpamStrategy::default(),
    };

    let new_limit: i64 = numeric(env, "NEW_LIMIT", 50)?;
    if new_limit < 0 {
        return Err(anyhow!("NEW_LIMIT must not be negative"));
    }

    let delay_secs: u64 = numeric(env, "DELAY", 60)?;
    if delay_secs == 0 {
        return Err(anyhow!("DELAY must be at least 1 second"));
    }

    // 0 turns the override off
    let max_wait_minutes: u64 = numeric(env, "MAX_WAIT_MINUTES", 240)?;
    let max_wait = (max_wait_minutes > 0).then(|| Duration::from_secs(max_wait_minutes.saturating_mul(60)));

    let stats_url = env.get_set("STATS_URL")
        .unwrap_or_else(|| DEFAULT_STATS_URL.to_string());

    let slack_api_url = env.get_set("SLACK_API_URL")
        .unwrap_or_else(|| DEFAULT_SLACK_API_URL.to_string())
        .trim_end_matches('/')
        .to_string();

    Ok(Config {
        channel,
        bot_name,
        slack_key,
        spam_strategy,
        new_limit,
        delay: Duration::from_secs(delay_secs),
        max_wait,
        stats_url,
        slack_api_url,
    })
}
