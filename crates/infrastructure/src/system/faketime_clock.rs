use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeDelta};
use ferrous_replay_application::ports::FakeClock;
use ferrous_replay_domain::ScenarioError;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// libfaketime absolute timestamp, e.g. `@2017-03-20 12:00:00`.
const TIMESTAMP_FORMAT: &str = "@%Y-%m-%d %H:%M:%S";

/// Fake clock backed by a libfaketime timestamp file shared with the SUT.
pub struct FaketimeFileClock {
    path: Option<PathBuf>,
}

impl FaketimeFileClock {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl FakeClock for FaketimeFileClock {
    async fn advance(&self, seconds: f64) -> Result<(), ScenarioError> {
        let path = self.path.as_ref().ok_or_else(|| {
            ScenarioError::InvalidStep(
                "TIME_PASSES needs a faketime file (player.faketime_file or FAKETIME_TIMESTAMP_FILE)"
                    .to_string(),
            )
        })?;

        let content = fs::read_to_string(path).await.map_err(|e| {
            ScenarioError::Io(format!("Failed to read faketime file {}: {}", path.display(), e))
        })?;
        let current = NaiveDateTime::parse_from_str(content.trim(), TIMESTAMP_FORMAT).map_err(|e| {
            ScenarioError::Io(format!(
                "Invalid timestamp '{}' in {}: {}",
                content.trim(),
                path.display(),
                e
            ))
        })?;

        let next = TimeDelta::try_milliseconds((seconds * 1000.0).round() as i64)
            .and_then(|delta| current.checked_add_signed(delta))
            .ok_or_else(|| {
                ScenarioError::InvalidStep(format!("Cannot advance clock by {} seconds", seconds))
            })?;

        let stamp = next.format(TIMESTAMP_FORMAT).to_string();
        fs::write(path, format!("{}\n", stamp)).await.map_err(|e| {
            ScenarioError::Io(format!("Failed to write faketime file {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), timestamp = %stamp, "Fake clock advanced");
        Ok(())
    }
}
