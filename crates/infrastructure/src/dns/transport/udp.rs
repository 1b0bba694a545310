//! UDP exchange with the SUT (RFC 1035 §4.2.1).
//!
//! Datagrams from any address other than the queried endpoint are ignored
//! until the deadline passes.

use super::bind_address;
use ferrous_replay_application::ports::SutRequest;
use ferrous_replay_domain::ScenarioError;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Largest datagram accepted from the SUT.
const MAX_UDP_RESPONSE_SIZE: usize = 65535;

pub(crate) async fn exchange(request: &SutRequest) -> Result<Option<Vec<u8>>, ScenarioError> {
    let server = request.destination;
    let socket = UdpSocket::bind(bind_address(request.source, &server))
        .await
        .map_err(|e| ScenarioError::Connection(format!("Failed to bind UDP socket: {}", e)))?;

    let bytes_sent = socket.send_to(&request.wire, server).await.map_err(|e| {
        ScenarioError::Connection(format!("Failed to send UDP query to {}: {}", server, e))
    })?;
    debug!(server = %server, bytes_sent, "UDP query sent");

    let deadline = Instant::now() + request.timeout;
    let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
    loop {
        let received = tokio::time::timeout_at(deadline, socket.recv_from(&mut recv_buf)).await;
        let (bytes_received, from_addr) = match received {
            Err(_) => {
                debug!(server = %server, "UDP query timed out");
                return Ok(None);
            }
            Ok(Err(e)) => {
                return Err(ScenarioError::Connection(format!(
                    "Failed to receive UDP response from {}: {}",
                    server, e
                )))
            }
            Ok(Ok(result)) => result,
        };

        if from_addr != server {
            warn!(expected = %server, received_from = %from_addr, "UDP response from unexpected source");
            continue;
        }

        recv_buf.truncate(bytes_received);
        debug!(server = %server, bytes_received, "UDP response received");
        return Ok(Some(recv_buf));
    }
}
