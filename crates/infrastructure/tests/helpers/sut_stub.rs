#![allow(dead_code)]
use ferrous_replay_domain::wire;
use hickory_proto::op::MessageType;
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::oneshot;

/// Resolver stand-in answering every question with `10.0.0.1`.
pub struct StubResolver {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl StubResolver {
    pub async fn start_udp() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = socket.recv_from(&mut buf) => {
                        if let Ok((len, peer)) = result {
                            let response = Self::build_response(&buf[..len]);
                            let _ = socket.send_to(&response, peer).await;
                        }
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub async fn start_tcp() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => match accepted {
                        Ok(accepted) => accepted,
                        Err(_) => continue,
                    },
                };
                tokio::spawn(async move {
                    let mut len_buf = [0u8; 2];
                    while stream.read_exact(&mut len_buf).await.is_ok() {
                        let mut query = vec![0u8; u16::from_be_bytes(len_buf) as usize];
                        if stream.read_exact(&mut query).await.is_err() {
                            break;
                        }
                        let response = Self::build_response(&query);
                        let mut framed = (response.len() as u16).to_be_bytes().to_vec();
                        framed.extend_from_slice(&response);
                        if stream.write_all(&framed).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn build_response(query: &[u8]) -> Vec<u8> {
        let mut message = wire::decode(query).unwrap();
        wire::set_message_type(&mut message, MessageType::Response);
        message.set_recursion_available(true);
        let answers: Vec<Record> = message
            .queries()
            .iter()
            .map(|q| {
                Record::from_rdata(q.name().clone(), 60, RData::A(A(Ipv4Addr::new(10, 0, 0, 1))))
            })
            .collect();
        message.add_answers(answers);
        wire::encode(&message).unwrap()
    }
}

impl Drop for StubResolver {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Resolver stand-in that relays every UDP query to `upstream` unchanged
/// and relays the answer back.
pub struct ForwardingResolver {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ForwardingResolver {
    pub async fn start(upstream: SocketAddr) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 65535];
            loop {
                let (len, peer) = tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = socket.recv_from(&mut buf) => match result {
                        Ok(received) => received,
                        Err(_) => continue,
                    },
                };
                let Ok(upstream_socket) = UdpSocket::bind("127.0.0.1:0").await else {
                    continue;
                };
                if upstream_socket.send_to(&buf[..len], upstream).await.is_err() {
                    continue;
                }
                let mut answer = vec![0u8; 65535];
                let relayed = tokio::time::timeout(
                    Duration::from_secs(1),
                    upstream_socket.recv_from(&mut answer),
                )
                .await;
                if let Ok(Ok((answer_len, _))) = relayed {
                    let _ = socket.send_to(&answer[..answer_len], peer).await;
                }
            }
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for ForwardingResolver {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
