// Domain value objects exchanged with the signer service.
// Everything here is a snapshot of signer-side state - the signer is the
// single source of truth, local copies are never authoritative.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token ID of the built-in software token, used when no HSM is configured.
pub const SOFTWARE_TOKEN_ID: &str = "0";

/// Well-known certificate status values reported by the signer.
/// The facade passes status strings through verbatim and never validates
/// them against this list - the signer owns the valid-status set.
pub const STATUS_SAVED: &str = "saved";
pub const STATUS_REGISTERED: &str = "registered";
pub const STATUS_DISABLED: &str = "disabled";

/// What a key may be used for. Mutually exclusive, pinned by the first
/// certificate operation on the key and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyUsage {
    Signing,
    Authentication,
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyUsage::Signing => write!(f, "SIGNING"),
            KeyUsage::Authentication => write!(f, "AUTHENTICATION"),
        }
    }
}

/// Encoding of a generated certificate signing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CsrFormat {
    Pem,
    Der,
}

/// Identity of the organization a certificate is issued for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId {
    pub instance: String,
    pub member_class: String,
    pub member_code: String,
}

impl ClientId {
    pub fn new(instance: &str, member_class: &str, member_code: &str) -> Self {
        Self {
            instance: instance.to_string(),
            member_class: member_class.to_string(),
            member_code: member_code.to_string(),
        }
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.instance, self.member_class, self.member_code
        )
    }
}

/// Activation secret for a token. Serialized on the wire, but never
/// printed - Debug output is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Password(Vec<u8>);

impl Password {
    pub fn new(secret: Vec<u8>) -> Self {
        Self(secret)
    }

    pub fn from_str(secret: &str) -> Self {
        Self(secret.as_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password([REDACTED])")
    }
}

/// Snapshot of one cryptographic token (software token, smartcard or HSM
/// slot) together with the keys it holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Stable identifier assigned by the signer.
    pub id: String,
    /// Operator-assigned label, mutable, no uniqueness guarantee.
    pub friendly_name: String,
    /// Best-effort mirror of the signer-side activation state.
    pub active: bool,
    pub keys: Vec<KeyInfo>,
}

impl TokenInfo {
    /// Find a key on this token by its ID.
    pub fn key(&self, key_id: &str) -> Option<&KeyInfo> {
        self.keys.iter().find(|k| k.id == key_id)
    }
}

/// Snapshot of an asymmetric key pair held on a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub id: String,
    /// Owning token. A key belongs to exactly one token for its lifetime.
    pub token_id: String,
    /// Label given at generation time.
    pub label: String,
    pub friendly_name: String,
    /// None until the first certificate operation pins the usage.
    pub usage: Option<KeyUsage>,
    /// Hex-encoded public key material.
    pub public_key: String,
    pub certs: Vec<CertificateInfo>,
    pub cert_requests: Vec<CertRequestInfo>,
}

/// Snapshot of a certificate bound to a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub id: String,
    /// Owner identity; imported certificates may omit it.
    pub member_id: Option<ClientId>,
    pub active: bool,
    /// Opaque status string owned by the signer.
    pub status: String,
    pub certificate_bytes: Vec<u8>,
}

/// Snapshot of a pending certificate signing request on a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertRequestInfo {
    pub id: String,
    pub key_id: String,
    pub member_id: Option<ClientId>,
    pub subject_name: String,
    pub format: CsrFormat,
    pub key_usage: KeyUsage,
}
