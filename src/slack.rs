use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::types::{
    Config, HistoryMessage, HistoryResponse, PostMessageRequest, PublishAction, SlackResponse,
    SpamStrategy, UpdateMessageRequest,
};

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("Slack request to {method} failed: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Slack {method} returned HTTP {status}: {body}")]
    Status {
        method: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Slack {method} returned error: {code}")]
    Api { method: &'static str, code: String },
}

/// Pick what to do with a new message given the channel's latest message.
pub fn plan_publish(latest: Option<&HistoryMessage>, bot_name: &str, strategy: SpamStrategy) -> PublishAction {
    let own = latest.filter(|m| {
        m.bot_profile
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .is_some_and(|name| name == bot_name)
    });

    match (own, strategy) {
        (Some(m), SpamStrategy::Thread) => PublishAction::Reply { thread_ts: m.ts.clone() },
        (Some(m), SpamStrategy::Edit) => PublishAction::Edit { ts: m.ts.clone() },
        (None, _) => PublishAction::PostNew,
    }
}

/// Slack Web API client bound to one channel.
#[derive(Clone)]
pub struct SlackPublisher {
    client: reqwest::Client,
    api_url: String,
    token: String,
    channel: String,
    bot_name: String,
    strategy: SpamStrategy,
}

impl SlackPublisher {
    pub fn new(client: reqwest::Client, cfg: &Config) -> Self {
        Self {
            client,
            api_url: cfg.slack_api_url.clone(),
            token: cfg.slack_key.clone(),
            channel: cfg.channel.clone(),
            bot_name: cfg.bot_name.clone(),
            strategy: cfg.spam_strategy,
        }
    }

    /// Post, edit or thread `text` depending on who wrote the latest message.
    pub async fn publish(&self, text: &str) -> Result<PublishAction, SlackError> {
        let latest = self.latest_message().await?;
        let action = plan_publish(latest.as_ref(), &self.bot_name, self.strategy);

        match &action {
            PublishAction::Reply { thread_ts } => {
                info!("Adding thread message");
                self.post_message(text, Some(thread_ts)).await?;
            }
            PublishAction::Edit { ts } => {
                info!("Editing last message");
                self.update_message(ts, text).await?;
            }
            PublishAction::PostNew => {
                info!("Posting new message");
                self.post_message(text, None).await?;
            }
        }
        Ok(action)
    }

    pub async fn latest_message(&self) -> Result<Option<HistoryMessage>, SlackError> {
        const METHOD: &str = "conversations.history";
        let res = self
            .client
            .get(format!("{}/{}", self.api_url, METHOD))
            .bearer_auth(&self.token)
            .query(&[("channel", self.channel.as_str()), ("limit", "1")])
            .send()
            .await
            .map_err(|source| SlackError::Transport { method: METHOD, source })?;

        let history: HistoryResponse = read_json(METHOD, res).await?;
        if !history.ok {
            return Err(api_error(METHOD, history.error));
        }
        Ok(history.messages.into_iter().next())
    }

    pub async fn post_message(&self, text: &str, thread_ts: Option<&str>) -> Result<(), SlackError> {
        let body = PostMessageRequest {
            channel: &self.channel,
            text,
            thread_ts,
        };
        self.call("chat.postMessage", &body).await
    }

    pub async fn update_message(&self, ts: &str, text: &str) -> Result<(), SlackError> {
        let body = UpdateMessageRequest {
            channel: &self.channel,
            ts,
            text,
        };
        self.call("chat.update", &body).await
    }

    async fn call<B: Serialize>(&self, method: &'static str, body: &B) -> Result<(), SlackError> {
        let res = self
            .client
            .post(format!("{}/{}", self.api_url, method))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|source| SlackError::Transport { method, source })?;

        let resp: SlackResponse = read_json(method, res).await?;
        if !resp.ok {
            return Err(api_error(method, resp.error));
        }
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(method: &'static str, res: reqwest::Response) -> Result<T, SlackError> {
    if !res.status().is_success() {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        error!("Slack {} failed: {} - {}", method, status, body);
        return Err(SlackError::Status { method, status, body });
    }
    res.json::<T>()
        .await
        .map_err(|source| SlackError::Transport { method, source })
}

fn api_error(method: &'static str, code: Option<String>) -> SlackError {
    SlackError::Api {
        method,
        code: code.unwrap_or_else(|| "unknown_error".to_string()),
    }
}
