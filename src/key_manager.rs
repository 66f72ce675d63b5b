// Key Manager - key generation, renaming, deletion and resolution of a
// key by the hash of a certificate bound to it.

use tracing::trace;

use crate::error::{SignerError, ensure_lower_case};
use crate::signer_service::{SignerClient, SignerRequest, SignerResponse};
use crate::types::{KeyInfo, TokenInfo};

pub struct KeyManager {
    client: SignerClient,
}

impl KeyManager {
    pub fn new(client: SignerClient) -> Self {
        Self { client }
    }

    /// Generate a new key on the given token. The signer enforces the
    /// activation precondition and raises a fault if it is violated.
    pub async fn generate_key(&self, token_id: &str, label: &str) -> Result<KeyInfo, SignerError> {
        trace!(token = token_id, label, "generating key");

        let request = SignerRequest::GenerateKey {
            token_id: token_id.to_string(),
            label: label.to_string(),
        };
        let key_info = match self.client.execute(request).await {
            Ok(SignerResponse::KeyGenerated { key_info }) => key_info,
            Ok(other) => return Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => return Err(e.into_signer_error(Some(token_id))),
        };

        trace!(
            key = %key_info.id,
            public_key = %key_info.public_key,
            "received generated key"
        );

        Ok(key_info)
    }

    /// Set the friendly name of the key.
    pub async fn set_key_friendly_name(
        &self,
        key_id: &str,
        friendly_name: &str,
    ) -> Result<(), SignerError> {
        trace!(key = key_id, name = friendly_name, "setting key friendly name");

        let request = SignerRequest::SetKeyFriendlyName {
            key_id: key_id.to_string(),
            name: friendly_name.to_string(),
        };
        match self.client.execute(request).await {
            Ok(SignerResponse::Ack) => Ok(()),
            Ok(other) => Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => Err(e.into_signer_error(None)),
        }
    }

    /// Delete the key from the signer's bookkeeping. With
    /// `delete_from_token` the key material is wiped from the token as
    /// well; without it the material stays on the device.
    pub async fn delete_key(&self, key_id: &str, delete_from_token: bool) -> Result<(), SignerError> {
        trace!(key = key_id, delete_from_token, "deleting key");

        let request = SignerRequest::DeleteKey {
            key_id: key_id.to_string(),
            delete_from_token,
        };
        match self.client.execute(request).await {
            Ok(SignerResponse::Ack) => Ok(()),
            Ok(other) => Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => Err(e.into_signer_error(None)),
        }
    }

    /// Resolve the key owning the certificate with the given hash.
    /// `hash` must already be lower-case.
    pub async fn get_key_id_for_cert_hash(&self, hash: &str) -> Result<String, SignerError> {
        ensure_lower_case(hash)?;

        trace!(hash, "getting key id by cert hash");

        let request = SignerRequest::GetKeyIdForCertHash {
            hash: hash.to_string(),
        };
        match self.client.execute(request).await {
            Ok(SignerResponse::KeyIdForHash { key_id }) => Ok(key_id),
            Ok(other) => Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => Err(e.into_signer_error(None)),
        }
    }

    /// Resolve both the owning token and key of the certificate with the
    /// given hash. `hash` must already be lower-case.
    pub async fn get_token_and_key_id_for_cert_hash(
        &self,
        hash: &str,
    ) -> Result<(TokenInfo, String), SignerError> {
        ensure_lower_case(hash)?;

        trace!(hash, "getting token and key id by cert hash");

        let request = SignerRequest::GetTokenInfoAndKeyIdForCertHash {
            hash: hash.to_string(),
        };
        match self.client.execute(request).await {
            Ok(SignerResponse::TokenAndKeyId { token, key_id }) => Ok((token, key_id)),
            Ok(other) => Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => Err(e.into_signer_error(None)),
        }
    }
}
