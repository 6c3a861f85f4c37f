use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub channel: String,
    pub bot_name: String,
    pub slack_key: String,
    pub spam_strategy: SpamStrategy,
    pub new_limit: i64,
    pub delay: Duration,
    pub max_wait: Option<Duration>,
    pub stats_url: String,
    pub slack_api_url: String,
}

impl Config {
    pub fn notify_rules(&self) -> NotifyRules {
        NotifyRules {
            new_limit: self.new_limit,
            max_wait: self.max_wait,
        }
    }
}

/// How a repeated notification is presented when the channel's latest
/// message is already ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpamStrategy {
    #[default]
    Edit,
    Thread,
}

impl FromStr for SpamStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EDIT" => Ok(SpamStrategy::Edit),
            "THREAD" => Ok(SpamStrategy::Thread),
            other => Err(format!("unknown spam strategy '{}' (expected EDIT or THREAD)", other)),
        }
    }
}

impl fmt::Display for SpamStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpamStrategy::Edit => write!(f, "EDIT"),
            SpamStrategy::Thread => write!(f, "THREAD"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyRules {
    pub new_limit: i64,
    /// `None` means below-threshold changes are suppressed indefinitely.
    pub max_wait: Option<Duration>,
}

impl Default for NotifyRules {
    fn default() -> Self {
        Self {
            new_limit: 50,
            max_wait: Some(Duration::from_secs(4 * 60 * 60)),
        }
    }
}

/// A single point-in-time reading. Population zero marks "no valid data".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub population: i64,
    pub infected: i64,
    pub new_today: i64,
    pub new_yesterday: i64,
    pub dead: i64,
}

impl StatsSnapshot {
    pub fn is_valid(&self) -> bool {
        self.population > 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NotifiedSnapshot {
    pub stats: StatsSnapshot,
    pub at: DateTime<Utc>,
}

// Slack Web API wire types

#[derive(Serialize)]
pub struct PostMessageRequest<'a> {
    pub channel: &'a str,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<&'a str>,
}

#[derive(Serialize)]
pub struct UpdateMessageRequest<'a> {
    pub channel: &'a str,
    pub ts: &'a str,
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct SlackResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    pub ts: String,
    #[serde(default)]
    pub bot_profile: Option<BotProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotProfile {
    #[serde(default)]
    pub name: Option<String>,
}

/// What the publisher does with a formatted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishAction {
    PostNew,
    Edit { ts: String },
    Reply { thread_ts: String },
}
