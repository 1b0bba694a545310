use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Mock upstream server settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port every simulated upstream listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Addresses bound on start in addition to the ones named by ranges.
    #[serde(default)]
    pub extra_addresses: Vec<IpAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            extra_addresses: Vec::new(),
        }
    }
}

fn default_port() -> u16 {
    53
}
