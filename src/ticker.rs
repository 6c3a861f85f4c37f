use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::collector::StatsCollector;
use crate::report::format_message;
use crate::significance::{DecisionState, Verdict};
use crate::slack::SlackPublisher;
use crate::types::{Config, NotifyRules, StatsSnapshot};

/// Counts publishes that have started but not finished.
#[derive(Debug, Default, Clone)]
pub struct InFlight(Arc<AtomicUsize>);

/// Held for the lifetime of one publish.
pub struct InFlightGuard(Arc<AtomicUsize>);

impl InFlight {
    /// Returns the guard and whether another publish was already running.
    pub fn enter(&self) -> (InFlightGuard, bool) {
        let running = self.0.fetch_add(1, Ordering::SeqCst);
        (InFlightGuard(Arc::clone(&self.0)), running > 0)
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owns all per-process state: the fetch cache, the last notification and the
/// publishes in flight.
pub struct Reporter {
    collector: StatsCollector,
    publisher: SlackPublisher,
    rules: NotifyRules,
    decisions: DecisionState,
    in_flight: InFlight,
}

impl Reporter {
    pub fn new(cfg: &Config) -> Self {
        let client = reqwest::Client::new();
        Self {
            collector: StatsCollector::new(client.clone(), cfg.stats_url.clone()),
            publisher: SlackPublisher::new(client, cfg),
            rules: cfg.notify_rules(),
            decisions: DecisionState::new(),
            in_flight: InFlight::default(),
        }
    }

    pub fn decisions(&self) -> &DecisionState {
        &self.decisions
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Returns the message to publish when `stats` is significant.
    pub fn check(&mut self, stats: &StatsSnapshot, now: DateTime<Utc>) -> Option<String> {
        if !stats.is_valid() {
            info!("No statistics received yet, skipping");
            return None;
        }

        match self.decisions.evaluate(stats, now, &self.rules) {
            Verdict::Unchanged => {
                info!("Nothing new ...");
                None
            }
            Verdict::BelowThreshold => {
                info!("Not interesting enough yet ... ({} infected now)", stats.infected);
                None
            }
            Verdict::Notify => {
                info!("New data: {:?}", stats);
                Some(format_message(stats))
            }
        }
    }

    /// One fetch-evaluate-publish round. The publish runs detached; the
    /// handle is returned only so callers may wait on it.
    pub async fn tick(&mut self) -> Option<JoinHandle<()>> {
        let now = Utc::now();
        info!("[{}] Looking for updates", now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true));

        let stats = self.collector.fetch().await;
        let message = self.check(&stats, now)?;
        Some(self.spawn_publish(message))
    }

    fn spawn_publish(&self, message: String) -> JoinHandle<()> {
        let (guard, overlapping) = self.in_flight.enter();
        if overlapping {
            warn!("Previous Slack publish still in flight, publishing anyway");
        }
        let publisher = self.publisher.clone();

        tokio::spawn(async move {
            let _guard = guard;
            match publisher.publish(&message).await {
                Ok(action) => info!("Published to Slack ({:?})", action),
                Err(e) => error!("Failed to publish to Slack: {}", e),
            }
        })
    }

    /// Tick forever on `delay`, stopping on Ctrl-C.
    pub async fn run(self, delay: Duration) {
        self.run_until(delay, tokio::signal::ctrl_c()).await;
    }

    /// Tick on `delay` until `shutdown` resolves, whether mid-tick or mid-sleep.
    pub async fn run_until<F: Future>(mut self, delay: Duration, shutdown: F) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                // dropping the handle detaches the publish
                _ = self.tick() => {}
                _ = &mut shutdown => break,
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => break,
            }
        }
        info!("Shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SpamStrategy;

    fn config(stats_url: String, slack_api_url: String) -> Config {
        Config {
            channel: "C1".to_string(),
            bot_name: "Coronabot".to_string(),
            slack_key: "xoxb-test".to_string(),
            spam_strategy: SpamStrategy::Edit,
            new_limit: 50,
            delay: Duration::from_secs(60),
            max_wait: None,
            stats_url,
            slack_api_url,
        }
    }

    fn snap(infected: i64, dead: i64) -> StatsSnapshot {
        StatsSnapshot {
            population: 1_000_000,
            infected,
            new_today: 5,
            new_yesterday: 3,
            dead,
        }
    }

    #[test]
    fn test_check_sequence() {
        let mut reporter = Reporter::new(&config("http://unused".into(), "http://unused".into()));
        let now = Utc::now();

        assert!(reporter.check(&StatsSnapshot::default(), now).is_none());
        assert!(reporter.decisions().last().is_none());

        let first = reporter.check(&snap(500, 10), now).unwrap();
        assert!(first.starts_with("*500* bekreftet smittet (50.0 per 100k"));

        assert!(reporter.check(&snap(500, 10), now).is_none());
        assert!(reporter.check(&snap(520, 10), now).is_none());
        assert!(reporter.check(&snap(520, 11), now).is_some());
        assert_eq!(reporter.decisions().last().unwrap().stats, snap(520, 11));
    }

    #[tokio::test]
    async fn test_tick_posts_new_message() {
        let mut stats_server = mockito::Server::new_async().await;
        let mut slack = mockito::Server::new_async().await;

        let _stats = stats_server
            .mock("GET", "/stats")
            .with_status(200)
            .with_body(r#"{"metadata":{"population":1000000,"confirmed":{"total":500,"newToday":20,"newYesterday":15},"dead":{"total":10}}}"#)
            .create_async()
            .await;
        let _history = slack
            .mock("GET", "/conversations.history")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"ok":true,"messages":[]}"#)
            .create_async()
            .await;
        let post = slack
            .mock("POST", "/chat.postMessage")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"channel":"C1","text":"*500* bekreftet smittet (50.0 per 100k, 20 nye i dag, 15 i går), og *10* døde"}"#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"ok":true,"ts":"5.0"}"#)
            .expect(1)
            .create_async()
            .await;

        let mut reporter = Reporter::new(&config(format!("{}/stats", stats_server.url()), slack.url()));
        let handle = reporter.tick().await.expect("first tick publishes");
        handle.await.unwrap();
        post.assert_async().await;

        // unchanged numbers: nothing to publish
        assert!(reporter.tick().await.is_none());
    }

    #[tokio::test]
    async fn test_tick_survives_publish_failure() {
        let mut stats_server = mockito::Server::new_async().await;
        let mut slack = mockito::Server::new_async().await;

        let _stats = stats_server
            .mock("GET", "/stats")
            .with_status(200)
            .with_body(r#"{"metadata":{"population":1000000,"confirmed":{"total":500},"dead":{"total":10}}}"#)
            .create_async()
            .await;
        let _history = slack
            .mock("GET", "/conversations.history")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"ok":false,"error":"channel_not_found"}"#)
            .create_async()
            .await;

        let mut reporter = Reporter::new(&config(format!("{}/stats", stats_server.url()), slack.url()));
        let handle = reporter.tick().await.expect("first tick publishes");
        // the task logs the failure instead of panicking
        handle.await.unwrap();
        assert_eq!(reporter.in_flight().count(), 0);
        assert_eq!(reporter.decisions().last().unwrap().stats.infected, 500);
    }

    #[test]
    fn test_in_flight_tracks_overlapping_publishes() {
        let in_flight = InFlight::default();

        let (first, overlapping) = in_flight.enter();
        assert!(!overlapping);
        let (second, overlapping) = in_flight.enter();
        assert!(overlapping);
        assert_eq!(in_flight.count(), 2);

        // the first one finishing must not hide the second
        drop(first);
        assert_eq!(in_flight.count(), 1);
        let (third, overlapping) = in_flight.enter();
        assert!(overlapping);

        drop(second);
        drop(third);
        assert_eq!(in_flight.count(), 0);
        let (_fourth, overlapping) = in_flight.enter();
        assert!(!overlapping);
    }

    #[tokio::test]
    async fn test_spawned_publishes_are_counted_until_done() {
        let reporter = Reporter::new(&config("http://unused".into(), "http://127.0.0.1:1".into()));

        let a = reporter.spawn_publish("a".to_string());
        let b = reporter.spawn_publish("b".to_string());
        assert_eq!(reporter.in_flight().count(), 2);

        a.await.unwrap();
        b.await.unwrap();
        assert_eq!(reporter.in_flight().count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_a_stuck_tick() {
        // accepts connections but never answers, so the fetch hangs
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let stats_url = format!("http://{}/stats", listener.local_addr().unwrap());
        let reporter = Reporter::new(&config(stats_url, "http://unused".into()));

        let shutdown = tokio::time::sleep(Duration::from_millis(100));
        let stopped = tokio::time::timeout(
            Duration::from_secs(10),
            reporter.run_until(Duration::from_secs(3600), shutdown),
        )
        .await;
        assert!(stopped.is_ok(), "run_until kept running after shutdown");
        drop(listener);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_the_sleep() {
        let reporter = Reporter::new(&config("http://127.0.0.1:1/stats".into(), "http://unused".into()));

        let shutdown = tokio::time::sleep(Duration::from_millis(100));
        let stopped = tokio::time::timeout(
            Duration::from_secs(10),
            reporter.run_until(Duration::from_secs(3600), shutdown),
        )
        .await;
        assert!(stopped.is_ok());
    }
}
