pub mod tcp;
pub mod udp;

use async_trait::async_trait;
use ferrous_replay_application::ports::{SutRequest, SutTransport};
use ferrous_replay_domain::{ScenarioError, Transport};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

pub use tcp::{read_with_length_prefix, send_with_length_prefix};

/// Talks to the system under test over short-lived sockets, one per query.
#[derive(Debug, Default, Clone)]
pub struct SocketSutTransport;

impl SocketSutTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SutTransport for SocketSutTransport {
    async fn exchange(&self, request: &SutRequest) -> Result<Option<Vec<u8>>, ScenarioError> {
        match request.transport {
            Transport::Udp => udp::exchange(request).await,
            Transport::Tcp => tcp::exchange(request).await,
        }
    }
}

/// Local address for a client socket talking to `destination`.
pub(crate) fn bind_address(source: Option<IpAddr>, destination: &SocketAddr) -> SocketAddr {
    let ip = source.unwrap_or(if destination.is_ipv4() {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    } else {
        IpAddr::V6(Ipv6Addr::UNSPECIFIED)
    });
    SocketAddr::new(ip, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address_follows_destination_family() {
        let v4: SocketAddr = "192.0.2.1:53".parse().unwrap();
        let v6: SocketAddr = "[2001:db8::1]:53".parse().unwrap();
        assert_eq!(bind_address(None, &v4), "0.0.0.0:0".parse().unwrap());
        assert_eq!(bind_address(None, &v6), "[::]:0".parse().unwrap());
        assert_eq!(
            bind_address(Some("127.0.0.9".parse().unwrap()), &v4),
            "127.0.0.9:0".parse().unwrap()
        );
    }
}
