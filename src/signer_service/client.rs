// Signer Client - facade-side transport for the signer service.
// One request, one length-prefixed JSON round trip, one response or fault.
// Retry policy belongs to the caller; the client never retries and never
// interprets faults.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::trace;

use crate::error::ClientError;

use super::protocol::{SignerRequest, SignerResponse, MAX_MESSAGE_SIZE};

/// Connection to the signer service over a Unix domain socket.
#[derive(Clone)]
pub struct SignerClient {
    /// Socket path, kept for diagnostics
    socket_path: String,

    /// Stream shared between clones; the mutex serializes round trips
    stream: Arc<Mutex<UnixStream>>,
}

impl SignerClient {
    /// Connect to the signer service.
    pub async fn connect(socket_path: &str) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket_path).await?;

        Ok(Self {
            socket_path: socket_path.to_string(),
            stream: Arc::new(Mutex::new(stream)),
        })
    }

    /// Connect, giving up after `timeout`. Timeouts surface as transport
    /// errors; the signer may be down or the socket path wrong.
    pub async fn connect_with_timeout(
        socket_path: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        match tokio::time::timeout(timeout, Self::connect(socket_path)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect to {} timed out", socket_path),
            ))),
        }
    }

    /// Send one request and receive its response.
    ///
    /// A `SignerResponse::Error` answer is surfaced as
    /// `ClientError::Fault` with the fault untouched; translation into
    /// the domain taxonomy happens at the calling layer.
    pub async fn execute(&self, request: SignerRequest) -> Result<SignerResponse, ClientError> {
        let mut stream = self.stream.lock().await;

        trace!(request = request.request_type(), "signer round trip");

        let request_json = serde_json::to_vec(&request)?;
        if request_json.len() > MAX_MESSAGE_SIZE {
            return Err(ClientError::OversizeMessage(request_json.len()));
        }

        let request_len = (request_json.len() as u32).to_be_bytes();

        // Send length-prefixed message
        stream.write_all(&request_len).await?;
        stream.write_all(&request_json).await?;
        stream.flush().await?;

        // Read response length
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let msg_len = u32::from_be_bytes(len_buf) as usize;

        if msg_len > MAX_MESSAGE_SIZE {
            return Err(ClientError::OversizeMessage(msg_len));
        }

        // Read response payload
        let mut msg_buf = vec![0u8; msg_len];
        stream.read_exact(&mut msg_buf).await?;

        let response: SignerResponse = serde_json::from_slice(&msg_buf)?;

        match response {
            SignerResponse::Error { fault } => Err(ClientError::Fault(fault)),
            response => Ok(response),
        }
    }

    /// Get socket path
    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }
}
