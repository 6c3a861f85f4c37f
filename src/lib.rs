// Public modules
pub mod types;
pub mod config;
pub mod parsing;
pub mod collector;
pub mod significance;
pub mod report;
pub mod slack;
pub mod ticker;

// Re-export commonly used items
pub use types::*;
pub use config::{load_config, load_config_with_env, EnvironmentProvider, SystemEnvironment, MockEnvironment};
pub use parsing::{parse_stats_payload, per_100k};
pub use collector::StatsCollector;
pub use significance::{judge, should_notify, DecisionState, Verdict};
pub use report::format_message;
pub use slack::{plan_publish, SlackError, SlackPublisher};
pub use ticker::{InFlight, Reporter};
