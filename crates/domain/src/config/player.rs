use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const FAKETIME_ENV: &str = "FAKETIME_TIMESTAMP_FILE";
pub const REPLAY_MULTIPLIER_ENV: &str = "REPLAY_MULTIPLIER";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    /// Hard deadline for a single QUERY step.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Scales the number of queries sent by REPLAY steps.
    #[serde(default = "default_replay_multiplier")]
    pub replay_multiplier: u32,

    /// Outstanding REPLAY queries allowed at once.
    #[serde(default = "default_replay_window")]
    pub replay_window: usize,

    /// libfaketime timestamp file advanced by TIME_PASSES.
    #[serde(default)]
    pub faketime_file: Option<PathBuf>,
}

impl PlayerConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Environment takes precedence for the values the SUT launcher also exports.
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var(FAKETIME_ENV) {
            if !path.is_empty() {
                self.faketime_file = Some(PathBuf::from(path));
            }
        }
        if let Some(multiplier) = std::env::var(REPLAY_MULTIPLIER_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.replay_multiplier = multiplier;
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: default_query_timeout_ms(),
            replay_multiplier: default_replay_multiplier(),
            replay_window: default_replay_window(),
            faketime_file: None,
        }
    }
}

fn default_query_timeout_ms() -> u64 {
    2000
}

fn default_replay_multiplier() -> u32 {
    1
}

fn default_replay_window() -> usize {
    8
}
