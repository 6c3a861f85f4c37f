use crate::parsing::per_100k;
use crate::types::StatsSnapshot;

/// Render the channel message for a snapshot.
///
/// Slack mrkdwn: totals are bolded, the per-100k rate is rounded to one decimal.
pub fn format_message(stats: &StatsSnapshot) -> String {
    let rate = per_100k(stats)
        .map(|v| format!("{:.1}", v))
        .unwrap_or_else(|| "-".to_string());

    format!(
        "*{}* bekreftet smittet ({} per 100k, {} nye i dag, {} i går), og *{}* døde",
        stats.infected, rate, stats.new_today, stats.new_yesterday, stats.dead
    )
}
