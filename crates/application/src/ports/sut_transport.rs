use async_trait::async_trait;
use ferrous_replay_domain::{ScenarioError, Transport};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// One query sent to the system under test.
#[derive(Debug, Clone)]
pub struct SutRequest {
    pub wire: Vec<u8>,
    pub destination: SocketAddr,
    /// Local address the client socket binds to, if the step pins one.
    pub source: Option<IpAddr>,
    pub transport: Transport,
    pub timeout: Duration,
}

#[async_trait]
pub trait SutTransport: Send + Sync {
    /// Sends `request` and waits for the answer.
    /// Returns `Ok(None)` when the deadline passes without one.
    async fn exchange(&self, request: &SutRequest) -> Result<Option<Vec<u8>>, ScenarioError>;
}
