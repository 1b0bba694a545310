//! REPLAY flooding over a single connected UDP socket.
//!
//! Answers are only counted, never decoded. Queries that stay unanswered
//! for a whole drain timeout are written off so the window keeps moving.

use super::transport::bind_address;
use async_trait::async_trait;
use ferrous_replay_application::ports::{QueryFlooder, ReplayReport, ReplayRequest};
use ferrous_replay_domain::ScenarioError;
use std::io;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::debug;

const MAX_UDP_RESPONSE_SIZE: usize = 65535;

#[derive(Debug, Default, Clone)]
pub struct UdpQueryFlooder;

impl UdpQueryFlooder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QueryFlooder for UdpQueryFlooder {
    async fn flood(&self, request: ReplayRequest) -> Result<ReplayReport, ScenarioError> {
        if request.queries.is_empty() || request.count == 0 {
            return Ok(ReplayReport::default());
        }

        let server = request.destination;
        let socket = UdpSocket::bind(bind_address(None, &server))
            .await
            .map_err(|e| ScenarioError::Connection(format!("Failed to bind UDP socket: {}", e)))?;
        socket.connect(server).await.map_err(|e| {
            ScenarioError::Connection(format!("Failed to connect UDP socket to {}: {}", server, e))
        })?;

        let window = request.window.max(1);
        let started = Instant::now();
        let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        let mut sent: u64 = 0;
        let mut received: u64 = 0;
        let mut in_flight: usize = 0;

        while (sent as usize) < request.count {
            if in_flight < window {
                let query = &request.queries[sent as usize % request.queries.len()];
                match socket.send(query).await {
                    Ok(_) => {
                        sent += 1;
                        in_flight += 1;
                    }
                    Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                        debug!(server = %server, "REPLAY query refused");
                        sent += 1;
                    }
                    Err(e) => {
                        return Err(ScenarioError::Connection(format!(
                            "Failed to send REPLAY query to {}: {}",
                            server, e
                        )))
                    }
                }
                while in_flight > 0 {
                    match socket.try_recv(&mut recv_buf) {
                        Ok(_) => {
                            received += 1;
                            in_flight -= 1;
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(_) => in_flight -= 1,
                    }
                }
                continue;
            }

            let deadline = Instant::now() + request.drain_timeout;
            match tokio::time::timeout_at(deadline, socket.recv(&mut recv_buf)).await {
                Ok(Ok(_)) => {
                    received += 1;
                    in_flight -= 1;
                }
                Ok(Err(_)) => in_flight -= 1,
                Err(_) => {
                    debug!(server = %server, lost = in_flight, "REPLAY window stalled");
                    in_flight = 0;
                }
            }
        }

        let deadline = Instant::now() + request.drain_timeout;
        while in_flight > 0 {
            match tokio::time::timeout_at(deadline, socket.recv(&mut recv_buf)).await {
                Ok(Ok(_)) => {
                    received += 1;
                    in_flight -= 1;
                }
                Ok(Err(_)) => in_flight -= 1,
                Err(_) => break,
            }
        }

        Ok(ReplayReport {
            sent,
            received,
            elapsed: started.elapsed(),
        })
    }
}
