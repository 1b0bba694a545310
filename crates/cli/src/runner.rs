use ferrous_replay_application::use_cases::{PlayReport, PlayScenarioUseCase};
use ferrous_replay_domain::{Config, Scenario, ScenarioError};
use ferrous_replay_infrastructure::dns::{SocketSutTransport, TestServer, UdpQueryFlooder};
use ferrous_replay_infrastructure::scenario::parse_file;
use ferrous_replay_infrastructure::system::FaketimeFileClock;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Plays scenario files one at a time, each against a fresh mock server.
pub struct ScenarioRunner {
    config: Config,
    player: PlayScenarioUseCase,
}

impl ScenarioRunner {
    pub fn new(config: Config) -> Self {
        let player = PlayScenarioUseCase::new(
            Arc::new(SocketSutTransport::new()),
            Arc::new(FaketimeFileClock::new(config.player.faketime_file.clone())),
            Arc::new(UdpQueryFlooder::new()),
            config.player.clone(),
        );
        Self { config, player }
    }

    pub async fn run(&self, path: &Path) -> Result<PlayReport, ScenarioError> {
        let scenario = Arc::new(parse_file(path)?);
        let extra = self.extra_addresses(&scenario);
        let server = TestServer::start(scenario.clone(), self.config.server.port, &extra)?;

        let played = self.player.execute(&scenario, &self.config.sut).await;
        let stopped = server.stop().await;

        let undefined = server.undefined_answers();
        if undefined > 0 {
            warn!(file = %scenario.file, undefined_answers = undefined, "Upstream queries answered with SERVFAIL");
        }
        let unbindable = server.unbindable_addresses();
        if !unbindable.is_empty() {
            warn!(file = %scenario.file, addresses = ?unbindable, "Glue addresses were never served");
        }

        let report = played?;
        stopped?;
        Ok(report)
    }

    /// Configured extra addresses plus the scenario's `stub-addr`.
    fn extra_addresses(&self, scenario: &Scenario) -> Vec<IpAddr> {
        let mut addresses = self.config.server.extra_addresses.clone();
        if let Some(value) = scenario.config_value("stub-addr") {
            match value.parse::<IpAddr>() {
                Ok(addr) => {
                    info!(addr = %addr, "Binding stub address");
                    addresses.push(addr);
                }
                Err(_) => warn!(value, file = %scenario.file, "Ignoring invalid stub-addr"),
            }
        }
        addresses
    }
}
