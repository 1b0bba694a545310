//! Mock upstream servers.
//!
//! Every simulated upstream is a UDP socket plus a TCP listener on the same
//! address and port. Listeners start for the initial addresses and then
//! lazily for each glue address that appears in a reply.

mod handler;
mod listener;

pub use handler::{HandledQuery, UpstreamHandler};

use crate::dns::transport::{read_with_length_prefix, send_with_length_prefix};
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use ferrous_replay_domain::{Scenario, ScenarioError};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MAX_UDP_QUERY_SIZE: usize = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerState {
    Serving,
    /// Bind failed once; not retried for later glue.
    Unbindable,
}

pub struct TestServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    handler: UpstreamHandler,
    port: u16,
    listeners: DashMap<IpAddr, ListenerState>,
    tasks: Mutex<JoinSet<()>>,
    cancel: CancellationToken,
    failure: Mutex<Option<ScenarioError>>,
}

impl TestServer {
    /// Binds every range address plus `extra_addresses` and starts serving.
    pub fn start(
        scenario: Arc<Scenario>,
        port: u16,
        extra_addresses: &[IpAddr],
    ) -> Result<Self, ScenarioError> {
        let addresses: Vec<IpAddr> = scenario
            .range_addresses()
            .iter()
            .chain(extra_addresses)
            .copied()
            .collect();

        let inner = Arc::new(ServerInner {
            handler: UpstreamHandler::new(scenario),
            port,
            listeners: DashMap::new(),
            tasks: Mutex::new(JoinSet::new()),
            cancel: CancellationToken::new(),
            failure: Mutex::new(None),
        });

        for addr in addresses {
            inner.ensure_listener(addr)?;
        }

        info!(port, listeners = inner.listeners.len(), "Mock server started");
        Ok(Self { inner })
    }

    pub fn port(&self) -> u16 {
        self.inner.port
    }

    /// Addresses with a live listener, sorted.
    pub fn bound_addresses(&self) -> Vec<IpAddr> {
        self.inner.addresses_in(ListenerState::Serving)
    }

    /// Glue addresses that could not be bound on this host, sorted.
    pub fn unbindable_addresses(&self) -> Vec<IpAddr> {
        self.inner.addresses_in(ListenerState::Unbindable)
    }

    pub fn undefined_answers(&self) -> u64 {
        self.inner.handler.undefined_answers()
    }

    /// Stops every listener and connection, then reports the first failure
    /// the server ran into, if any.
    pub async fn stop(&self) -> Result<(), ScenarioError> {
        self.inner.cancel.cancel();
        loop {
            let mut tasks = match self.inner.tasks.lock() {
                Ok(mut guard) => std::mem::take(&mut *guard),
                Err(_) => break,
            };
            if tasks.is_empty() {
                break;
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!(error = %e, "Mock server task panicked");
                }
            }
        }

        info!(
            listeners = self.inner.listeners.len(),
            undefined_answers = self.undefined_answers(),
            "Mock server stopped"
        );

        match self.inner.failure.lock() {
            Ok(mut failure) => failure.take().map_or(Ok(()), Err),
            Err(_) => Err(ScenarioError::Server("failure state poisoned".to_string())),
        }
    }
}

impl ServerInner {
    /// Starts UDP and TCP listeners on `addr` unless they already run.
    fn ensure_listener(self: &Arc<Self>, addr: IpAddr) -> Result<(), ScenarioError> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        let MapEntry::Vacant(slot) = self.listeners.entry(addr) else {
            return Ok(());
        };

        let socket_addr = SocketAddr::new(addr, self.port);
        let bound = listener::create_udp_socket(socket_addr)
            .map_err(|e| {
                ScenarioError::Server(format!("Failed to bind UDP {}: {}", socket_addr, e))
            })
            .and_then(|udp| {
                let tcp = listener::create_tcp_listener(socket_addr).map_err(|e| {
                    ScenarioError::Server(format!("Failed to bind TCP {}: {}", socket_addr, e))
                })?;
                Ok((udp, tcp))
            });
        let (udp, tcp) = match bound {
            Ok(sockets) => {
                slot.insert(ListenerState::Serving);
                sockets
            }
            Err(e) => {
                slot.insert(ListenerState::Unbindable);
                return Err(e);
            }
        };

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.spawn(serve_udp(self.clone(), udp, addr));
            tasks.spawn(serve_tcp(self.clone(), tcp, addr));
        }
        debug!(addr = %socket_addr, "Upstream listener started");
        Ok(())
    }

    fn addresses_in(&self, state: ListenerState) -> Vec<IpAddr> {
        let mut addresses: Vec<IpAddr> = self
            .listeners
            .iter()
            .filter(|e| *e.value() == state)
            .map(|e| *e.key())
            .collect();
        addresses.sort();
        addresses
    }

    fn spawn_connection(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr, local: IpAddr) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.spawn(serve_tcp_connection(self.clone(), stream, peer, local));
        }
    }

    /// Resolves one query and starts listeners for any glue it introduces.
    fn answer(self: &Arc<Self>, query_wire: &[u8], local: IpAddr) -> Option<Vec<u8>> {
        let handled = match self.handler.handle(query_wire, local) {
            Ok(handled) => handled,
            Err(e) => {
                self.fail(e);
                return None;
            }
        };
        for addr in handled.glue {
            if let Err(e) = self.ensure_listener(addr) {
                warn!(addr = %addr, error = %e, "Glue address left without listener");
            }
        }
        handled.response
    }

    /// Records the first failure and shuts the server down.
    fn fail(&self, err: ScenarioError) {
        error!(error = %err, "Mock server failure");
        if let Ok(mut failure) = self.failure.lock() {
            failure.get_or_insert(err);
        }
        self.cancel.cancel();
    }

    fn send_failed(&self, peer: SocketAddr, err: io::Error) {
        if err.kind() == io::ErrorKind::ConnectionRefused {
            warn!(peer = %peer, "Reply refused by peer");
        } else {
            self.fail(ScenarioError::Server(format!(
                "Failed to send reply to {}: {}",
                peer, err
            )));
        }
    }
}

async fn serve_udp(inner: Arc<ServerInner>, socket: UdpSocket, local: IpAddr) {
    let mut recv_buf = vec![0u8; MAX_UDP_QUERY_SIZE];
    loop {
        let received = tokio::select! {
            _ = inner.cancel.cancelled() => break,
            received = socket.recv_from(&mut recv_buf) => received,
        };
        let (len, peer) = match received {
            Ok(received) => received,
            // ICMP port unreachable for an earlier reply
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => continue,
            Err(e) => {
                inner.fail(ScenarioError::Server(format!("UDP recv on {} failed: {}", local, e)));
                break;
            }
        };

        debug!(addr = %local, peer = %peer, len, "UDP upstream query");
        if let Some(response) = inner.answer(&recv_buf[..len], local) {
            if let Err(e) = socket.send_to(&response, peer).await {
                inner.send_failed(peer, e);
            }
        }
    }
}

async fn serve_tcp(inner: Arc<ServerInner>, listener: TcpListener, local: IpAddr) {
    loop {
        let accepted = tokio::select! {
            _ = inner.cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!(addr = %local, peer = %peer, "TCP upstream connection");
                inner.spawn_connection(stream, peer, local);
            }
            Err(e) => warn!(addr = %local, error = %e, "TCP accept failed"),
        }
    }
}

async fn serve_tcp_connection(
    inner: Arc<ServerInner>,
    mut stream: TcpStream,
    peer: SocketAddr,
    local: IpAddr,
) {
    loop {
        let message = tokio::select! {
            _ = inner.cancel.cancelled() => break,
            message = read_with_length_prefix(&mut stream) => message,
        };
        let query = match message {
            Ok(Some(query)) => query,
            Ok(None) => break,
            Err(e) => {
                debug!(peer = %peer, error = %e, "Closing TCP upstream connection");
                break;
            }
        };

        if let Some(response) = inner.answer(&query, local) {
            if let Err(e) = send_with_length_prefix(&mut stream, &response).await {
                warn!(peer = %peer, error = %e, "TCP reply not delivered");
                break;
            }
        }
    }
}
