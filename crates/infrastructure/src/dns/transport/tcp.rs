use super::bind_address;
use ferrous_replay_application::ports::SutRequest;
use ferrous_replay_domain::ScenarioError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::Instant;
use tracing::debug;

const MAX_TCP_MESSAGE_SIZE: usize = 65535;

pub(crate) async fn exchange(request: &SutRequest) -> Result<Option<Vec<u8>>, ScenarioError> {
    let server = request.destination;
    let deadline = Instant::now() + request.timeout;

    let mut stream = match tokio::time::timeout_at(deadline, connect(request)).await {
        Err(_) => {
            debug!(server = %server, "TCP connect timed out");
            return Ok(None);
        }
        Ok(stream) => stream?,
    };

    send_with_length_prefix(&mut stream, &request.wire).await?;
    debug!(server = %server, message_len = request.wire.len(), "TCP query sent");

    match tokio::time::timeout_at(deadline, read_with_length_prefix(&mut stream)).await {
        Err(_) => {
            debug!(server = %server, "TCP query timed out");
            Ok(None)
        }
        Ok(Ok(Some(response))) => {
            debug!(server = %server, response_len = response.len(), "TCP response received");
            Ok(Some(response))
        }
        Ok(Ok(None)) => Err(ScenarioError::Connection(format!(
            "TCP connection closed by {} before answering",
            server
        ))),
        Ok(Err(e)) => Err(e),
    }
}

async fn connect(request: &SutRequest) -> Result<TcpStream, ScenarioError> {
    let server = request.destination;
    let socket = if server.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| ScenarioError::Connection(format!("Failed to create TCP socket: {}", e)))?;

    if request.source.is_some() {
        socket
            .bind(bind_address(request.source, &server))
            .map_err(|e| ScenarioError::Connection(format!("Failed to bind TCP socket: {}", e)))?;
    }

    let stream = socket.connect(server).await.map_err(|e| {
        ScenarioError::Connection(format!("Connection refused by TCP server {}: {}", server, e))
    })?;
    stream.set_nodelay(true).map_err(|e| {
        ScenarioError::Connection(format!("Failed to set TCP_NODELAY on {}: {}", server, e))
    })?;
    Ok(stream)
}

pub async fn send_with_length_prefix<S>(
    stream: &mut S,
    message_bytes: &[u8],
) -> Result<(), ScenarioError>
where
    S: AsyncWriteExt + Unpin,
{
    let length = u16::try_from(message_bytes.len()).map_err(|_| {
        ScenarioError::Connection(format!(
            "DNS message too large for TCP: {} bytes",
            message_bytes.len()
        ))
    })?;

    let mut framed = Vec::with_capacity(message_bytes.len() + 2);
    framed.extend_from_slice(&length.to_be_bytes());
    framed.extend_from_slice(message_bytes);
    stream
        .write_all(&framed)
        .await
        .map_err(|e| ScenarioError::Connection(format!("Failed to write DNS message: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| ScenarioError::Connection(format!("Failed to flush stream: {}", e)))?;

    Ok(())
}

/// One framed message, or `None` when the peer closed the stream cleanly
/// before sending a length prefix.
pub async fn read_with_length_prefix<S>(stream: &mut S) -> Result<Option<Vec<u8>>, ScenarioError>
where
    S: AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; 2];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => {
            return Err(ScenarioError::Connection(format!(
                "Failed to read message length: {}",
                e
            )))
        }
    }

    let message_len = u16::from_be_bytes(len_buf) as usize;
    if message_len == 0 || message_len > MAX_TCP_MESSAGE_SIZE {
        return Err(ScenarioError::Connection(format!(
            "Invalid TCP message length: {}",
            message_len
        )));
    }

    let mut message = vec![0u8; message_len];
    stream
        .read_exact(&mut message)
        .await
        .map_err(|e| ScenarioError::Connection(format!("Failed to read message body: {}", e)))?;

    Ok(Some(message))
}
