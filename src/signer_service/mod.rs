// Signer Service Module - IPC layer between the facade and the signer.
//
// Components:
// - `protocol`: Request/Response message definitions
// - `client`: SignerClient used by the lifecycle managers
// - `server`: socket server dispatching to a SignerBackend

pub mod client;
pub mod protocol;
pub mod server;

// Re-export main types for convenience
pub use client::SignerClient;
pub use protocol::{SignerRequest, SignerResponse, MAX_MESSAGE_SIZE};
pub use server::{SignerBackend, SignerServiceServer};
