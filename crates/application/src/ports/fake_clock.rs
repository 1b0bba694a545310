use async_trait::async_trait;
use ferrous_replay_domain::ScenarioError;

/// Shared clock of the SUT, moved forward by TIME_PASSES steps.
#[async_trait]
pub trait FakeClock: Send + Sync {
    async fn advance(&self, seconds: f64) -> Result<(), ScenarioError>;
}
