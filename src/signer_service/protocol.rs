// Signer Service Protocol - Request/Response message definitions.
// Defines the IPC protocol between the facade and the signer service.
// Each request kind maps to exactly one response kind or a fault.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Fault;
use crate::types::{
    CertificateInfo, ClientId, CsrFormat, KeyInfo, KeyUsage, Password, TokenInfo,
};

/// Maximum message size for DoS prevention (1 MB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Request message from the facade to the signer service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SignerRequest {
    /// List all tokens known to the signer, in its reported order
    /// Returns: TokenList
    ListTokens,

    /// Get information about a single token
    /// Returns: Token
    GetTokenInfo { token_id: String },

    /// Log a token in or out. The activation secret travels with the
    /// request; deactivation sends none.
    /// Returns: Ack
    ActivateToken {
        token_id: String,
        activate: bool,
        password: Option<Password>,
    },

    /// Rename a token
    /// Returns: Ack
    SetTokenFriendlyName { token_id: String, name: String },

    /// Initialize the built-in software token with a password
    /// Returns: Ack
    InitSoftwareToken { password: Password },

    /// Generate a new key pair on a token
    /// Returns: KeyGenerated
    GenerateKey { token_id: String, label: String },

    /// Rename a key
    /// Returns: Ack
    SetKeyFriendlyName { key_id: String, name: String },

    /// Delete a key; `delete_from_token` also wipes the key material from
    /// the token's key store
    /// Returns: Ack
    DeleteKey {
        key_id: String,
        delete_from_token: bool,
    },

    /// Generate a self-signed certificate for a key
    /// Returns: SelfSignedCertGenerated
    GenerateSelfSignedCert {
        key_id: String,
        common_name: String,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        key_usage: KeyUsage,
        member_id: ClientId,
    },

    /// Generate a certificate signing request for a key
    /// Returns: CertRequestGenerated
    GenerateCertRequest {
        key_id: String,
        member_id: ClientId,
        key_usage: KeyUsage,
        subject_name: String,
        format: CsrFormat,
    },

    /// Import an externally issued certificate. The signer resolves the
    /// owning key from the certificate's public key.
    /// Returns: CertImported
    ImportCert {
        cert_bytes: Vec<u8>,
        initial_status: String,
        member_id: Option<ClientId>,
    },

    /// Toggle a certificate's active flag
    /// Returns: Ack
    ActivateCert { cert_id: String, activate: bool },

    /// Set a certificate's status string, passed through verbatim
    /// Returns: Ack
    SetCertStatus { cert_id: String, status: String },

    /// Delete a certificate
    /// Returns: Ack
    DeleteCert { cert_id: String },

    /// Delete a pending certificate signing request
    /// Returns: Ack
    DeleteCertRequest { cert_request_id: String },

    /// Look up a certificate by the lower-case hex hash of its bytes
    /// Returns: Certificate
    GetCertificateInfoForHash { hash: String },

    /// Look up the owning key of a certificate by hash
    /// Returns: KeyIdForHash
    GetKeyIdForCertHash { hash: String },

    /// Look up the owning token and key of a certificate by hash
    /// Returns: TokenAndKeyId
    GetTokenInfoAndKeyIdForCertHash { hash: String },
}

/// Response message from the signer service to the facade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SignerResponse {
    /// Snapshot of all tokens
    TokenList { tokens: Vec<TokenInfo> },

    /// Snapshot of a single token
    Token { token: TokenInfo },

    /// Key generated, including its public key material
    KeyGenerated { key_info: KeyInfo },

    /// Raw bytes of a generated self-signed certificate
    SelfSignedCertGenerated { cert_bytes: Vec<u8> },

    /// Raw bytes of a generated certificate signing request
    CertRequestGenerated { request_bytes: Vec<u8> },

    /// Certificate imported; ID of the key it was bound to
    CertImported { key_id: String },

    /// Certificate looked up by hash
    Certificate { cert: CertificateInfo },

    /// Owning key of a certificate
    KeyIdForHash { key_id: String },

    /// Owning token and key of a certificate
    TokenAndKeyId { token: TokenInfo, key_id: String },

    /// Structured fault
    Error { fault: Fault },

    /// Generic acknowledgment
    Ack,
}

impl SignerRequest {
    /// Get a human-readable request type name
    pub fn request_type(&self) -> &'static str {
        match self {
            SignerRequest::ListTokens => "ListTokens",
            SignerRequest::GetTokenInfo { .. } => "GetTokenInfo",
            SignerRequest::ActivateToken { .. } => "ActivateToken",
            SignerRequest::SetTokenFriendlyName { .. } => "SetTokenFriendlyName",
            SignerRequest::InitSoftwareToken { .. } => "InitSoftwareToken",
            SignerRequest::GenerateKey { .. } => "GenerateKey",
            SignerRequest::SetKeyFriendlyName { .. } => "SetKeyFriendlyName",
            SignerRequest::DeleteKey { .. } => "DeleteKey",
            SignerRequest::GenerateSelfSignedCert { .. } => "GenerateSelfSignedCert",
            SignerRequest::GenerateCertRequest { .. } => "GenerateCertRequest",
            SignerRequest::ImportCert { .. } => "ImportCert",
            SignerRequest::ActivateCert { .. } => "ActivateCert",
            SignerRequest::SetCertStatus { .. } => "SetCertStatus",
            SignerRequest::DeleteCert { .. } => "DeleteCert",
            SignerRequest::DeleteCertRequest { .. } => "DeleteCertRequest",
            SignerRequest::GetCertificateInfoForHash { .. } => "GetCertificateInfoForHash",
            SignerRequest::GetKeyIdForCertHash { .. } => "GetKeyIdForCertHash",
            SignerRequest::GetTokenInfoAndKeyIdForCertHash { .. } => {
                "GetTokenInfoAndKeyIdForCertHash"
            }
        }
    }
}

impl SignerResponse {
    /// Check if this is a fault response
    pub fn is_error(&self) -> bool {
        matches!(self, SignerResponse::Error { .. })
    }

    /// Get a human-readable response type name
    pub fn response_type(&self) -> &'static str {
        match self {
            SignerResponse::TokenList { .. } => "TokenList",
            SignerResponse::Token { .. } => "Token",
            SignerResponse::KeyGenerated { .. } => "KeyGenerated",
            SignerResponse::SelfSignedCertGenerated { .. } => "SelfSignedCertGenerated",
            SignerResponse::CertRequestGenerated { .. } => "CertRequestGenerated",
            SignerResponse::CertImported { .. } => "CertImported",
            SignerResponse::Certificate { .. } => "Certificate",
            SignerResponse::KeyIdForHash { .. } => "KeyIdForHash",
            SignerResponse::TokenAndKeyId { .. } => "TokenAndKeyId",
            SignerResponse::Error { .. } => "Error",
            SignerResponse::Ack => "Ack",
        }
    }
}
