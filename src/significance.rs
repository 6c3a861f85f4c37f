use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::types::{NotifiedSnapshot, NotifyRules, StatsSnapshot};

/// Outcome of comparing a reading against the last notified one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Notify,
    /// Same infected and death totals.
    Unchanged,
    /// Too few new cases, no new deaths, and max wait not reached.
    BelowThreshold,
}

pub fn judge(
    previous: Option<&StatsSnapshot>,
    current: &StatsSnapshot,
    elapsed_since_last: Duration,
    rules: &NotifyRules,
) -> Verdict {
    let Some(previous) = previous else {
        return Verdict::Notify;
    };

    if current.infected == previous.infected && current.dead == previous.dead {
        return Verdict::Unchanged;
    }

    let new_cases = current.infected.saturating_sub(previous.infected);
    if current.dead == previous.dead && new_cases < rules.new_limit {
        let waited_enough = rules.max_wait.is_some_and(|max_wait| elapsed_since_last >= max_wait);
        if !waited_enough {
            return Verdict::BelowThreshold;
        }
    }

    Verdict::Notify
}

/// Decide whether `current` is worth a notification compared to the last
/// notified snapshot.
pub fn should_notify(
    previous: Option<&StatsSnapshot>,
    current: &StatsSnapshot,
    elapsed_since_last: Duration,
    rules: &NotifyRules,
) -> bool {
    judge(previous, current, elapsed_since_last, rules) == Verdict::Notify
}

/// Last snapshot that produced a notification, and when.
#[derive(Debug, Default)]
pub struct DecisionState {
    last: Option<NotifiedSnapshot>,
}

impl DecisionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&NotifiedSnapshot> {
        self.last.as_ref()
    }

    /// Evaluate `current` and record it as notified when significant.
    pub fn evaluate(&mut self, current: &StatsSnapshot, now: DateTime<Utc>, rules: &NotifyRules) -> Verdict {
        let elapsed = self
            .last
            .map(|l| (now - l.at).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(Duration::ZERO);

        let verdict = judge(self.last.as_ref().map(|l| &l.stats), current, elapsed, rules);
        if verdict == Verdict::Notify {
            self.last = Some(NotifiedSnapshot { stats: *current, at: now });
        }
        verdict
    }
}
