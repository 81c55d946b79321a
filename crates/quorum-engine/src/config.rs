//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Tunables for the invocation engine.
///
/// Durations deserialize from humantime strings ("15s", "2m 30s").
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Idle interval after which the streaming aggregator emits a ping.
    ///
    /// Defaults to 15 seconds, under common reverse-proxy idle timeouts.
    /// Tunable rather than hard-coded: the right value depends on whatever
    /// sits between the engine and the caller.
    #[serde(deserialize_with = "humantime_duration")]
    pub heartbeat_interval: Duration,

    /// Per-request HTTP timeout for provider and judge calls.
    #[serde(deserialize_with = "humantime_duration")]
    pub request_timeout: Duration,

    /// Directory holding the four rate-table JSON files.
    /// `None` prices everything at family fallback rates.
    pub rates_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            request_timeout: Duration::from_secs(60),
            rates_dir: None,
        }
    }
}

fn humantime_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}
