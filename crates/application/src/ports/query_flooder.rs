use async_trait::async_trait;
use ferrous_replay_domain::ScenarioError;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReplayRequest {
    /// Encoded queries, cycled until `count` have been sent.
    pub queries: Vec<Vec<u8>>,
    pub count: usize,
    pub destination: SocketAddr,
    /// Maximum number of unanswered queries in flight.
    pub window: usize,
    /// How long to wait for stragglers once everything is sent.
    pub drain_timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    pub sent: u64,
    pub received: u64,
    pub elapsed: Duration,
}

impl ReplayReport {
    pub fn qps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.received as f64 / secs
        } else {
            0.0
        }
    }
}

#[async_trait]
pub trait QueryFlooder: Send + Sync {
    async fn flood(&self, request: ReplayRequest) -> Result<ReplayReport, ScenarioError>;
}
