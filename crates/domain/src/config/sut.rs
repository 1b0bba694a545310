use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// A named address of the system under test.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SutEndpoint {
    pub name: String,
    pub address: SocketAddr,
}

impl FromStr for SutEndpoint {
    type Err = String;

    /// Accepts `name=ip:port` or a bare `ip:port` named `default`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, addr) = match s.split_once('=') {
            Some((name, addr)) => (name.trim(), addr.trim()),
            None => ("default", s.trim()),
        };
        if name.is_empty() {
            return Err(format!("Invalid SUT endpoint '{}': empty name", s));
        }
        let address = addr
            .parse::<SocketAddr>()
            .map_err(|e| format!("Invalid SUT address '{}': {}", addr, e))?;
        Ok(Self {
            name: name.to_string(),
            address,
        })
    }
}

impl fmt::Display for SutEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.address)
    }
}
