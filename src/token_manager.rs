// Token Lifecycle Manager - activation, deactivation, renaming and
// listing of tokens. The only component that touches the password store.

use std::sync::Arc;
use tracing::trace;

use crate::error::{SignerError, ensure_lower_case};
use crate::password_store::PasswordStore;
use crate::signer_service::{SignerClient, SignerRequest, SignerResponse};
use crate::types::{Password, TokenInfo, SOFTWARE_TOKEN_ID};

pub struct TokenManager {
    client: SignerClient,
    password_store: Arc<PasswordStore>,
}

impl TokenManager {
    pub fn new(client: SignerClient, password_store: Arc<PasswordStore>) -> Self {
        Self {
            client,
            password_store,
        }
    }

    /// Initialize the built-in software token with the given password.
    pub async fn init_software_token(&self, password: Password) -> Result<(), SignerError> {
        trace!("initializing software token");

        let request = SignerRequest::InitSoftwareToken { password };
        match self.client.execute(request).await {
            Ok(SignerResponse::Ack) => Ok(()),
            Ok(other) => Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => Err(e.into_signer_error(Some(SOFTWARE_TOKEN_ID))),
        }
    }

    /// Snapshot of all tokens known to the signer, in its reported order.
    pub async fn list_tokens(&self) -> Result<Vec<TokenInfo>, SignerError> {
        match self.client.execute(SignerRequest::ListTokens).await {
            Ok(SignerResponse::TokenList { tokens }) => Ok(tokens),
            Ok(other) => Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => Err(e.into_signer_error(None)),
        }
    }

    /// Information about the token with the given ID.
    pub async fn get_token(&self, token_id: &str) -> Result<TokenInfo, SignerError> {
        let request = SignerRequest::GetTokenInfo {
            token_id: token_id.to_string(),
        };
        match self.client.execute(request).await {
            Ok(SignerResponse::Token { token }) => Ok(token),
            Ok(other) => Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => Err(e.into_signer_error(Some(token_id))),
        }
    }

    /// Activate the token using the provided password.
    ///
    /// The secret is cached before the request goes out, and a rejected
    /// PIN does not roll the entry back - the operator is expected to
    /// retry with a corrected secret for the same token.
    pub async fn activate_token(
        &self,
        token_id: &str,
        password: Password,
    ) -> Result<(), SignerError> {
        self.password_store.put(token_id, password);

        trace!(token = token_id, "activating token");

        let request = SignerRequest::ActivateToken {
            token_id: token_id.to_string(),
            activate: true,
            password: self.password_store.get(token_id),
        };
        match self.client.execute(request).await {
            Ok(SignerResponse::Ack) => Ok(()),
            Ok(other) => Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => Err(e.into_signer_error(Some(token_id))),
        }
    }

    /// Deactivate the token. The cached secret is cleared before the
    /// request is dispatched, so it is gone even if the request fails.
    pub async fn deactivate_token(&self, token_id: &str) -> Result<(), SignerError> {
        self.password_store.clear(token_id);

        trace!(token = token_id, "deactivating token");

        let request = SignerRequest::ActivateToken {
            token_id: token_id.to_string(),
            activate: false,
            password: None,
        };
        match self.client.execute(request).await {
            Ok(SignerResponse::Ack) => Ok(()),
            Ok(other) => Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => Err(e.into_signer_error(Some(token_id))),
        }
    }

    /// Set the friendly name of the token. No local uniqueness check;
    /// the signer is authoritative.
    pub async fn set_token_friendly_name(
        &self,
        token_id: &str,
        friendly_name: &str,
    ) -> Result<(), SignerError> {
        trace!(
            token = token_id,
            name = friendly_name,
            "setting token friendly name"
        );

        let request = SignerRequest::SetTokenFriendlyName {
            token_id: token_id.to_string(),
            name: friendly_name.to_string(),
        };
        match self.client.execute(request).await {
            Ok(SignerResponse::Ack) => Ok(()),
            Ok(other) => Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => Err(e.into_signer_error(Some(token_id))),
        }
    }

    /// Rename the token and return its refreshed snapshot.
    pub async fn update_token_friendly_name(
        &self,
        token_id: &str,
        friendly_name: &str,
    ) -> Result<TokenInfo, SignerError> {
        self.set_token_friendly_name(token_id, friendly_name).await?;
        self.get_token(token_id).await
    }

    /// Resolve the token owning the certificate with the given hash.
    /// `hash` must already be lower-case.
    pub async fn get_token_for_cert_hash(&self, hash: &str) -> Result<TokenInfo, SignerError> {
        ensure_lower_case(hash)?;

        trace!(hash, "getting token by cert hash");

        let request = SignerRequest::GetTokenInfoAndKeyIdForCertHash {
            hash: hash.to_string(),
        };
        match self.client.execute(request).await {
            Ok(SignerResponse::TokenAndKeyId { token, .. }) => Ok(token),
            Ok(other) => Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => Err(e.into_signer_error(None)),
        }
    }
}
