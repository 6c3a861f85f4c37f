use anyhow::Result;
use tracing::info;

use corona_stats_reporter::{load_config, Reporter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cfg = load_config()?;
    info!(
        "channel = {}, strategy = {}, new limit = {}, delay = {}s, max wait = {:?}",
        cfg.channel,
        cfg.spam_strategy,
        cfg.new_limit,
        cfg.delay.as_secs(),
        cfg.max_wait
    );

    Reporter::new(&cfg).run(cfg.delay).await;
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
