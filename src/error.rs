// Error taxonomy and fault translation.
//
// The signer reports failures as structured faults (code + message +
// optional metadata). Only a small, fixed set of codes is translated into
// dedicated error variants; everything else passes through with its
// original code and message so callers can still branch on it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fault code the signer uses when a software token PIN is rejected.
pub const PIN_INCORRECT_FAULT_CODE: &str = "Signer.PinIncorrect";

/// Fault code the signer uses for generic token login failures. HSM
/// drivers report a wrong PIN through this code with a device message.
pub const LOGIN_FAILED_FAULT_CODE: &str = "Signer.LoginFailed";

/// Fault code the signer uses when the addressed token does not exist.
pub const TOKEN_NOT_FOUND_FAULT_CODE: &str = "Signer.TokenNotFound";

/// PKCS#11 return code embedded in driver messages for a wrong PIN.
/// Matched case-sensitively as a literal substring; the signer has no
/// dedicated fault code for this driver-level condition.
// TODO: replace the substring match with a structured code once the signer
// reports driver-level PIN failures distinctly.
pub const CKR_PIN_INCORRECT_MESSAGE: &str = "CKR_PIN_INCORRECT";

/// Structured fault raised by the signer service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Machine-readable dotted code, e.g. `Signer.TokenNotFound`.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Optional structured detail strings.
    #[serde(default)]
    pub metadata: Vec<String>,
}

impl Fault {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            metadata: Vec::new(),
        }
    }
}

/// Transport-layer failure: either the round trip itself failed, or the
/// signer answered with a fault. The transport never interprets faults.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("signer connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("signer message encoding error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("message of {0} bytes exceeds the maximum frame size")]
    OversizeMessage(usize),

    #[error("signer fault {}: {}", .0.code, .0.message)]
    Fault(Fault),
}

impl ClientError {
    /// Translate into the domain error taxonomy. `token_id` is the token
    /// the failed operation addressed, if any; it is attached to
    /// `TokenNotFound` so callers can report which token was missing.
    /// Without a token context `Signer.TokenNotFound` passes through as a
    /// remote fault like any unrecognized code.
    pub fn into_signer_error(self, token_id: Option<&str>) -> SignerError {
        match self {
            ClientError::Fault(fault) => translate_fault(fault, token_id),
            other => SignerError::Transport(other.to_string()),
        }
    }
}

/// Domain errors surfaced by the token, key and certificate managers.
#[derive(Error, Debug)]
pub enum SignerError {
    /// The addressed token is unknown to the signer.
    #[error("token '{token_id}' not found")]
    TokenNotFound { token_id: String },

    /// The activation secret was rejected, either directly or disguised
    /// behind a login failure carrying a driver message.
    #[error("token PIN incorrect")]
    PinIncorrect,

    /// A local precondition was violated; no request was sent.
    #[error("{0}")]
    Validation(String),

    /// Unrecognized signer fault, passed through verbatim.
    #[error("signer fault {code}: {message}")]
    Remote {
        code: String,
        message: String,
        metadata: Vec<String>,
    },

    /// The round trip could not be completed at all.
    #[error("signer transport error: {0}")]
    Transport(String),
}

impl SignerError {
    /// Fault code of a pass-through remote fault, if this is one.
    pub fn fault_code(&self) -> Option<&str> {
        match self {
            SignerError::Remote { code, .. } => Some(code),
            _ => None,
        }
    }

    pub(crate) fn unexpected_response(response_type: &str) -> SignerError {
        SignerError::Transport(format!("unexpected response type: {}", response_type))
    }
}

/// Guard for hash arguments. Signer-side lookups are case-sensitive and
/// expect lower-case hex; a mixed-case hash fails here, before any request
/// is sent.
pub(crate) fn ensure_lower_case(hash: &str) -> Result<(), SignerError> {
    if hash.to_lowercase() != hash {
        return Err(SignerError::Validation(format!(
            "'{}' should be a lowercase string",
            hash
        )));
    }
    Ok(())
}

/// Apply the known fault-code translations.
///
/// Exact string matching is the policy; these are the only places fault
/// codes are hard-coded. `Signer.LoginFailed` is additionally sniffed for
/// the literal `CKR_PIN_INCORRECT` driver message, since a wrong HSM PIN
/// has no dedicated fault code of its own.
pub fn translate_fault(fault: Fault, token_id: Option<&str>) -> SignerError {
    if fault.code == PIN_INCORRECT_FAULT_CODE {
        return SignerError::PinIncorrect;
    }

    if fault.code == LOGIN_FAILED_FAULT_CODE && fault.message.contains(CKR_PIN_INCORRECT_MESSAGE) {
        return SignerError::PinIncorrect;
    }

    if fault.code == TOKEN_NOT_FOUND_FAULT_CODE {
        if let Some(token_id) = token_id {
            return SignerError::TokenNotFound {
                token_id: token_id.to_string(),
            };
        }
    }

    SignerError::Remote {
        code: fault.code,
        message: fault.message,
        metadata: fault.metadata,
    }
}
