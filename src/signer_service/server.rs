// Signer Service Server - accepts facade connections on a Unix domain
// socket and dispatches requests to a backend. The backend is a trait so
// tests can substitute scripted behavior for the real software signer.

use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::Fault;

use super::protocol::{SignerRequest, SignerResponse, MAX_MESSAGE_SIZE};

/// A signer implementation the server can dispatch requests to.
///
/// The server serializes calls through a mutex, so a backend sees one
/// request at a time; conflicting mutations on a single token are ordered
/// here, as the facade expects.
pub trait SignerBackend: Send + 'static {
    fn handle(&mut self, request: SignerRequest) -> SignerResponse;
}

/// Signer service listening on a Unix domain socket.
pub struct SignerServiceServer<B: SignerBackend> {
    backend: Arc<Mutex<B>>,
    socket_path: String,
}

impl<B: SignerBackend> SignerServiceServer<B> {
    pub fn new(socket_path: String, backend: B) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            socket_path,
        }
    }

    /// Bind the socket and serve connections until the task is dropped.
    pub async fn run(&self) -> std::io::Result<()> {
        // Remove a stale socket from a previous run
        let socket_path_obj = Path::new(&self.socket_path);
        if socket_path_obj.exists() {
            std::fs::remove_file(socket_path_obj)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!(socket = %self.socket_path, "signer service listening");

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let backend = Arc::clone(&self.backend);

                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, backend).await {
                            warn!(error = %e, "signer connection error");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "signer accept error");
                }
            }
        }
    }

    /// Handle a single facade connection
    async fn handle_connection(
        mut stream: UnixStream,
        backend: Arc<Mutex<B>>,
    ) -> std::io::Result<()> {
        loop {
            // Read length prefix (4 bytes, big-endian)
            let mut len_buf = [0u8; 4];
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    // Connection closed gracefully
                    break;
                }
                Err(e) => return Err(e),
            }

            let msg_len = u32::from_be_bytes(len_buf) as usize;
            if msg_len > MAX_MESSAGE_SIZE {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("message too large: {} bytes", msg_len),
                ));
            }

            // Read JSON payload
            let mut msg_buf = vec![0u8; msg_len];
            stream.read_exact(&mut msg_buf).await?;

            // Deserialize request; a malformed frame earns a fault, not a
            // dropped connection
            let response = match serde_json::from_slice::<SignerRequest>(&msg_buf) {
                Ok(request) => {
                    let mut backend = backend.lock().await;
                    backend.handle(request)
                }
                Err(e) => SignerResponse::Error {
                    fault: Fault::new(
                        "Signer.InvalidRequest",
                        &format!("failed to parse request: {}", e),
                    ),
                },
            };

            Self::send_response(&mut stream, &response).await?;
        }

        Ok(())
    }

    /// Send response to the facade (length-prefixed JSON)
    async fn send_response(
        stream: &mut UnixStream,
        response: &SignerResponse,
    ) -> std::io::Result<()> {
        let response_json = serde_json::to_vec(response)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let response_len = (response_json.len() as u32).to_be_bytes();

        stream.write_all(&response_len).await?;
        stream.write_all(&response_json).await?;
        stream.flush().await?;

        Ok(())
    }
}
