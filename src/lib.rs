pub mod cert_manager;
pub mod error;
pub mod key_manager;
pub mod password_store;
pub mod signer_service;
pub mod softtoken;
pub mod token_manager;
pub mod types;

pub use cert_manager::CertManager;
pub use error::{ClientError, Fault, SignerError};
pub use key_manager::KeyManager;
pub use password_store::PasswordStore;
pub use signer_service::{SignerBackend, SignerClient, SignerServiceServer};
pub use softtoken::SoftwareSigner;
pub use token_manager::TokenManager;
pub use types::{
    CertRequestInfo, CertificateInfo, ClientId, CsrFormat, KeyInfo, KeyUsage, Password, TokenInfo,
    SOFTWARE_TOKEN_ID,
};
