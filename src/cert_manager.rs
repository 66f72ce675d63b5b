// Certificate Manager - self-signed certificates, signing requests,
// imports, status and activation changes, deletion, and hash lookups.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::error::{SignerError, ensure_lower_case};
use crate::signer_service::{SignerClient, SignerRequest, SignerResponse};
use crate::types::{CertificateInfo, ClientId, CsrFormat, KeyUsage};

pub struct CertManager {
    client: SignerClient,
}

impl CertManager {
    pub fn new(client: SignerClient) -> Self {
        Self { client }
    }

    /// Generate a self-signed certificate for the key. The requested
    /// usage must match the key's usage; the signer enforces this.
    /// Returns the raw certificate bytes, opaque to this subsystem.
    pub async fn generate_self_signed_cert(
        &self,
        key_id: &str,
        member_id: ClientId,
        key_usage: KeyUsage,
        common_name: &str,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Result<Vec<u8>, SignerError> {
        trace!(key = key_id, "generating self-signed cert");

        let request = SignerRequest::GenerateSelfSignedCert {
            key_id: key_id.to_string(),
            common_name: common_name.to_string(),
            not_before,
            not_after,
            key_usage,
            member_id,
        };
        let cert_bytes = match self.client.execute(request).await {
            Ok(SignerResponse::SelfSignedCertGenerated { cert_bytes }) => cert_bytes,
            Ok(other) => return Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => return Err(e.into_signer_error(None)),
        };

        trace!(length = cert_bytes.len(), "certificate generated");

        Ok(cert_bytes)
    }

    /// Generate a certificate signing request for the key. Returns the
    /// raw request bytes in the requested encoding.
    pub async fn generate_cert_request(
        &self,
        key_id: &str,
        member_id: ClientId,
        key_usage: KeyUsage,
        subject_name: &str,
        format: CsrFormat,
    ) -> Result<Vec<u8>, SignerError> {
        trace!(key = key_id, subject = subject_name, "generating cert request");

        let request = SignerRequest::GenerateCertRequest {
            key_id: key_id.to_string(),
            member_id,
            key_usage,
            subject_name: subject_name.to_string(),
            format,
        };
        let request_bytes = match self.client.execute(request).await {
            Ok(SignerResponse::CertRequestGenerated { request_bytes }) => request_bytes,
            Ok(other) => return Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => return Err(e.into_signer_error(None)),
        };

        trace!(length = request_bytes.len(), "cert request generated");

        Ok(request_bytes)
    }

    /// Import an externally issued certificate with the given initial
    /// status. The signer resolves the owning key from the certificate's
    /// public key; the returned key ID lets the caller re-associate
    /// locally.
    pub async fn import_cert(
        &self,
        cert_bytes: &[u8],
        initial_status: &str,
        member_id: Option<ClientId>,
    ) -> Result<String, SignerError> {
        trace!(length = cert_bytes.len(), "importing cert");

        let request = SignerRequest::ImportCert {
            cert_bytes: cert_bytes.to_vec(),
            initial_status: initial_status.to_string(),
            member_id,
        };
        let key_id = match self.client.execute(request).await {
            Ok(SignerResponse::CertImported { key_id }) => key_id,
            Ok(other) => return Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => return Err(e.into_signer_error(None)),
        };

        trace!(key = %key_id, "cert imported");

        Ok(key_id)
    }

    /// Activate the certificate.
    pub async fn activate_cert(&self, cert_id: &str) -> Result<(), SignerError> {
        trace!(cert = cert_id, "activating cert");
        self.set_cert_activation(cert_id, true).await
    }

    /// Deactivate the certificate.
    pub async fn deactivate_cert(&self, cert_id: &str) -> Result<(), SignerError> {
        trace!(cert = cert_id, "deactivating cert");
        self.set_cert_activation(cert_id, false).await
    }

    async fn set_cert_activation(&self, cert_id: &str, activate: bool) -> Result<(), SignerError> {
        let request = SignerRequest::ActivateCert {
            cert_id: cert_id.to_string(),
            activate,
        };
        match self.client.execute(request).await {
            Ok(SignerResponse::Ack) => Ok(()),
            Ok(other) => Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => Err(e.into_signer_error(None)),
        }
    }

    /// Set the certificate's status. The string is passed through
    /// verbatim; the signer owns the valid-status set.
    pub async fn set_cert_status(&self, cert_id: &str, status: &str) -> Result<(), SignerError> {
        trace!(cert = cert_id, status, "setting cert status");

        let request = SignerRequest::SetCertStatus {
            cert_id: cert_id.to_string(),
            status: status.to_string(),
        };
        match self.client.execute(request).await {
            Ok(SignerResponse::Ack) => Ok(()),
            Ok(other) => Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => Err(e.into_signer_error(None)),
        }
    }

    /// Delete the certificate.
    pub async fn delete_cert(&self, cert_id: &str) -> Result<(), SignerError> {
        trace!(cert = cert_id, "deleting cert");

        let request = SignerRequest::DeleteCert {
            cert_id: cert_id.to_string(),
        };
        match self.client.execute(request).await {
            Ok(SignerResponse::Ack) => Ok(()),
            Ok(other) => Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => Err(e.into_signer_error(None)),
        }
    }

    /// Delete the pending certificate signing request.
    pub async fn delete_cert_request(&self, cert_request_id: &str) -> Result<(), SignerError> {
        trace!(cert_request = cert_request_id, "deleting cert request");

        let request = SignerRequest::DeleteCertRequest {
            cert_request_id: cert_request_id.to_string(),
        };
        match self.client.execute(request).await {
            Ok(SignerResponse::Ack) => Ok(()),
            Ok(other) => Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => Err(e.into_signer_error(None)),
        }
    }

    /// Look up a certificate by its hash. `hash` must already be
    /// lower-case.
    pub async fn get_cert_for_hash(&self, hash: &str) -> Result<CertificateInfo, SignerError> {
        ensure_lower_case(hash)?;

        trace!(hash, "getting cert by hash");

        let request = SignerRequest::GetCertificateInfoForHash {
            hash: hash.to_string(),
        };
        match self.client.execute(request).await {
            Ok(SignerResponse::Certificate { cert }) => Ok(cert),
            Ok(other) => Err(SignerError::unexpected_response(other.response_type())),
            Err(e) => Err(e.into_signer_error(None)),
        }
    }
}
