// Software token signer - reference in-memory backend for the signer
// service, holding the distinguished software token (ID "0").
//
// Key material is sealed with an AES-256-GCM key derived from the token
// password via PBKDF2-SHA256, so a wrong activation PIN fails the unseal
// check and surfaces as the same fault a hardware driver would raise.
// Certificate bytes are opaque to the facade; this backend fabricates a
// deterministic JSON payload and resolves imports by the public key
// embedded in it.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use chrono::{DateTime, Utc};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{Fault, PIN_INCORRECT_FAULT_CODE, TOKEN_NOT_FOUND_FAULT_CODE};
use crate::signer_service::{SignerBackend, SignerRequest, SignerResponse};
use crate::types::{
    CertRequestInfo, CertificateInfo, ClientId, CsrFormat, KeyInfo, KeyUsage, Password, TokenInfo,
    SOFTWARE_TOKEN_ID, STATUS_SAVED,
};

const TOKEN_NOT_ACTIVE_FAULT_CODE: &str = "Signer.TokenNotActive";
const KEY_NOT_FOUND_FAULT_CODE: &str = "Signer.KeyNotFound";
const CERT_NOT_FOUND_FAULT_CODE: &str = "Signer.CertNotFound";
const CSR_NOT_FOUND_FAULT_CODE: &str = "Signer.CsrNotFound";
const WRONG_CERT_USAGE_FAULT_CODE: &str = "Signer.WrongCertUsage";
const INTERNAL_ERROR_FAULT_CODE: &str = "Signer.InternalError";

const KDF_ROUNDS: u32 = 4096;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEYSTORE_CHECK: &[u8] = b"soft-token-keystore-check";

/// Ciphertext plus the nonce it was sealed under.
#[derive(Debug, Clone)]
struct SealedBlob {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

/// Password-derived keystore of one software token.
#[derive(Debug, Clone)]
struct Keystore {
    salt: [u8; SALT_LEN],
    /// Sealed well-known value; failing to open it means a wrong PIN.
    check: SealedBlob,
}

#[derive(Debug, Clone)]
struct CertState {
    id: String,
    member_id: Option<ClientId>,
    active: bool,
    status: String,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
struct CsrState {
    id: String,
    member_id: Option<ClientId>,
    subject_name: String,
    format: CsrFormat,
    key_usage: KeyUsage,
}

#[derive(Debug, Clone)]
struct KeyState {
    id: String,
    label: String,
    friendly_name: String,
    usage: Option<KeyUsage>,
    public_key: String,
    sealed_material: SealedBlob,
    certs: Vec<CertState>,
    cert_requests: Vec<CsrState>,
}

#[derive(Debug, Clone)]
struct TokenState {
    id: String,
    friendly_name: String,
    active: bool,
    /// None until InitSoftwareToken has run.
    keystore: Option<Keystore>,
    /// Key-encryption key, present only while the token is active.
    unlocked: Option<[u8; 32]>,
    keys: Vec<KeyState>,
    /// Key material left on the device after a bookkeeping-only delete.
    orphaned_material: HashMap<String, SealedBlob>,
}

/// Where a certificate lives, for hash lookups. Non-owning index over the
/// token/key/cert tree; rebuilt entries are maintained on insert/delete.
#[derive(Debug, Clone)]
struct CertLocation {
    token_id: String,
    key_id: String,
    cert_id: String,
}

/// Content of fabricated certificate bytes. Opaque to the facade; the
/// backend itself parses it back on import.
#[derive(Debug, Serialize, Deserialize)]
struct CertPayload {
    subject: String,
    issuer: String,
    serial: String,
    public_key: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    key_usage: KeyUsage,
    member_id: Option<ClientId>,
}

/// Content of fabricated certificate request bytes.
#[derive(Debug, Serialize, Deserialize)]
struct CsrPayload {
    subject_name: String,
    public_key: String,
    key_usage: KeyUsage,
    member_id: ClientId,
}

/// In-memory signer backend managing the software token.
pub struct SoftwareSigner {
    tokens: Vec<TokenState>,
    cert_index: HashMap<String, CertLocation>,
}

impl Default for SoftwareSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareSigner {
    /// Create a signer holding one uninitialized software token.
    pub fn new() -> Self {
        Self {
            tokens: vec![TokenState {
                id: SOFTWARE_TOKEN_ID.to_string(),
                friendly_name: "softToken".to_string(),
                active: false,
                keystore: None,
                unlocked: None,
                keys: Vec::new(),
                orphaned_material: HashMap::new(),
            }],
            cert_index: HashMap::new(),
        }
    }

    /// Number of sealed blobs still on the device for a token, including
    /// material orphaned by bookkeeping-only key deletes.
    pub fn device_material_count(&self, token_id: &str) -> usize {
        self.tokens
            .iter()
            .find(|t| t.id == token_id)
            .map(|t| t.keys.len() + t.orphaned_material.len())
            .unwrap_or(0)
    }

    fn dispatch(&mut self, request: SignerRequest) -> Result<SignerResponse, Fault> {
        use SignerRequest::*;
        use SignerResponse as Resp;

        match request {
            ListTokens => Ok(Resp::TokenList {
                tokens: self.tokens.iter().map(token_info).collect(),
            }),

            GetTokenInfo { token_id } => {
                let token = self.find_token(&token_id)?;
                Ok(Resp::Token {
                    token: token_info(token),
                })
            }

            ActivateToken {
                token_id,
                activate,
                password,
            } => {
                if activate {
                    self.login(&token_id, password)?;
                } else {
                    self.logout(&token_id)?;
                }
                Ok(Resp::Ack)
            }

            SetTokenFriendlyName { token_id, name } => {
                let token = self.find_token_mut(&token_id)?;
                token.friendly_name = name;
                Ok(Resp::Ack)
            }

            InitSoftwareToken { password } => {
                self.init_software_token(&password)?;
                Ok(Resp::Ack)
            }

            GenerateKey { token_id, label } => {
                let key_info = self.generate_key(&token_id, &label)?;
                Ok(Resp::KeyGenerated { key_info })
            }

            SetKeyFriendlyName { key_id, name } => {
                let (token_idx, key_idx) = self.locate_key(&key_id)?;
                self.tokens[token_idx].keys[key_idx].friendly_name = name;
                Ok(Resp::Ack)
            }

            DeleteKey {
                key_id,
                delete_from_token,
            } => {
                self.delete_key(&key_id, delete_from_token)?;
                Ok(Resp::Ack)
            }

            GenerateSelfSignedCert {
                key_id,
                common_name,
                not_before,
                not_after,
                key_usage,
                member_id,
            } => {
                let cert_bytes = self.generate_self_signed_cert(
                    &key_id,
                    &common_name,
                    not_before,
                    not_after,
                    key_usage,
                    member_id,
                )?;
                Ok(Resp::SelfSignedCertGenerated { cert_bytes })
            }

            GenerateCertRequest {
                key_id,
                member_id,
                key_usage,
                subject_name,
                format,
            } => {
                let request_bytes = self.generate_cert_request(
                    &key_id,
                    member_id,
                    key_usage,
                    &subject_name,
                    format,
                )?;
                Ok(Resp::CertRequestGenerated { request_bytes })
            }

            ImportCert {
                cert_bytes,
                initial_status,
                member_id,
            } => {
                let key_id = self.import_cert(&cert_bytes, &initial_status, member_id)?;
                Ok(Resp::CertImported { key_id })
            }

            ActivateCert { cert_id, activate } => {
                let cert = self.find_cert_mut(&cert_id)?;
                cert.active = activate;
                Ok(Resp::Ack)
            }

            SetCertStatus { cert_id, status } => {
                let cert = self.find_cert_mut(&cert_id)?;
                cert.status = status;
                Ok(Resp::Ack)
            }

            DeleteCert { cert_id } => {
                self.delete_cert(&cert_id)?;
                Ok(Resp::Ack)
            }

            DeleteCertRequest { cert_request_id } => {
                self.delete_cert_request(&cert_request_id)?;
                Ok(Resp::Ack)
            }

            GetCertificateInfoForHash { hash } => {
                let location = self.find_by_hash(&hash)?.clone();
                let cert = self.cert_at(&location)?;
                Ok(Resp::Certificate {
                    cert: cert_info(cert),
                })
            }

            GetKeyIdForCertHash { hash } => {
                let location = self.find_by_hash(&hash)?;
                Ok(Resp::KeyIdForHash {
                    key_id: location.key_id.clone(),
                })
            }

            GetTokenInfoAndKeyIdForCertHash { hash } => {
                let location = self.find_by_hash(&hash)?.clone();
                let token = self.find_token(&location.token_id)?;
                Ok(Resp::TokenAndKeyId {
                    token: token_info(token),
                    key_id: location.key_id,
                })
            }
        }
    }

    // ========================================================================
    // Token operations
    // ========================================================================

    fn find_token(&self, token_id: &str) -> Result<&TokenState, Fault> {
        self.tokens
            .iter()
            .find(|t| t.id == token_id)
            .ok_or_else(|| token_not_found(token_id))
    }

    fn find_token_mut(&mut self, token_id: &str) -> Result<&mut TokenState, Fault> {
        self.tokens
            .iter_mut()
            .find(|t| t.id == token_id)
            .ok_or_else(|| token_not_found(token_id))
    }

    fn init_software_token(&mut self, password: &Password) -> Result<(), Fault> {
        let token = self.find_token_mut(SOFTWARE_TOKEN_ID)?;
        if token.keystore.is_some() {
            return Err(Fault::new(
                INTERNAL_ERROR_FAULT_CODE,
                "software token is already initialized",
            ));
        }

        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let kek = derive_kek(password, &salt);
        let check = seal(&kek, KEYSTORE_CHECK)?;

        token.keystore = Some(Keystore { salt, check });
        debug!(token = %token.id, "software token initialized");
        Ok(())
    }

    fn login(&mut self, token_id: &str, password: Option<Password>) -> Result<(), Fault> {
        let token = self.find_token_mut(token_id)?;
        let keystore = token.keystore.as_ref().ok_or_else(|| {
            Fault::new(
                INTERNAL_ERROR_FAULT_CODE,
                "software token is not initialized",
            )
        })?;

        let password = password
            .ok_or_else(|| Fault::new(PIN_INCORRECT_FAULT_CODE, "no activation secret supplied"))?;

        let kek = derive_kek(&password, &keystore.salt);
        if open(&kek, &keystore.check).is_none() {
            return Err(Fault::new(
                PIN_INCORRECT_FAULT_CODE,
                "token activation secret was rejected",
            ));
        }

        token.unlocked = Some(kek);
        token.active = true;
        debug!(token = %token.id, "token activated");
        Ok(())
    }

    /// Logging out an already-inactive token is not an error.
    fn logout(&mut self, token_id: &str) -> Result<(), Fault> {
        let token = self.find_token_mut(token_id)?;
        token.unlocked = None;
        token.active = false;
        debug!(token = %token.id, "token deactivated");
        Ok(())
    }

    // ========================================================================
    // Key operations
    // ========================================================================

    fn locate_key(&self, key_id: &str) -> Result<(usize, usize), Fault> {
        for (token_idx, token) in self.tokens.iter().enumerate() {
            if let Some(key_idx) = token.keys.iter().position(|k| k.id == key_id) {
                return Ok((token_idx, key_idx));
            }
        }
        Err(Fault::new(
            KEY_NOT_FOUND_FAULT_CODE,
            &format!("key '{}' not found", key_id),
        ))
    }

    fn generate_key(&mut self, token_id: &str, label: &str) -> Result<KeyInfo, Fault> {
        let token = self.find_token_mut(token_id)?;
        let kek = token.unlocked.ok_or_else(|| {
            Fault::new(
                TOKEN_NOT_ACTIVE_FAULT_CODE,
                &format!("token '{}' is not active", token_id),
            )
        })?;

        let mut material = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut material);
        let public_key = hex::encode(Sha256::digest(material));
        let sealed_material = seal(&kek, &material)?;

        let key = KeyState {
            id: random_id(),
            label: label.to_string(),
            friendly_name: label.to_string(),
            usage: None,
            public_key,
            sealed_material,
            certs: Vec::new(),
            cert_requests: Vec::new(),
        };
        debug!(token = %token.id, key = %key.id, "key generated");

        let info = key_info(&key, &token.id);
        token.keys.push(key);
        Ok(info)
    }

    fn delete_key(&mut self, key_id: &str, delete_from_token: bool) -> Result<(), Fault> {
        let (token_idx, key_idx) = self.locate_key(key_id)?;
        let token = &mut self.tokens[token_idx];
        let key = token.keys.remove(key_idx);

        for cert in &key.certs {
            self.cert_index.remove(&cert_hash(&cert.bytes));
        }

        if !delete_from_token {
            // Forget the key but leave its material on the device.
            token.orphaned_material.insert(key.id, key.sealed_material);
        }
        Ok(())
    }

    // ========================================================================
    // Certificate operations
    // ========================================================================

    fn check_or_pin_usage(key: &mut KeyState, usage: KeyUsage) -> Result<(), Fault> {
        match key.usage {
            None => {
                key.usage = Some(usage);
                Ok(())
            }
            Some(current) if current == usage => Ok(()),
            Some(current) => Err(Fault::new(
                WRONG_CERT_USAGE_FAULT_CODE,
                &format!("key usage is {}, requested {}", current, usage),
            )),
        }
    }

    fn require_active(token: &TokenState) -> Result<(), Fault> {
        if token.unlocked.is_none() {
            return Err(Fault::new(
                TOKEN_NOT_ACTIVE_FAULT_CODE,
                &format!("token '{}' is not active", token.id),
            ));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn generate_self_signed_cert(
        &mut self,
        key_id: &str,
        common_name: &str,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        key_usage: KeyUsage,
        member_id: ClientId,
    ) -> Result<Vec<u8>, Fault> {
        let (token_idx, key_idx) = self.locate_key(key_id)?;
        let token = &mut self.tokens[token_idx];
        Self::require_active(token)?;
        let token_id = token.id.clone();
        let key = &mut token.keys[key_idx];
        Self::check_or_pin_usage(key, key_usage)?;

        let payload = CertPayload {
            subject: common_name.to_string(),
            issuer: common_name.to_string(),
            serial: random_id(),
            public_key: key.public_key.clone(),
            not_before,
            not_after,
            key_usage,
            member_id: Some(member_id.clone()),
        };
        let bytes = serde_json::to_vec(&payload)
            .map_err(|e| Fault::new(INTERNAL_ERROR_FAULT_CODE, &e.to_string()))?;

        let cert = CertState {
            id: random_id(),
            member_id: Some(member_id),
            active: false,
            status: STATUS_SAVED.to_string(),
            bytes: bytes.clone(),
        };
        self.cert_index.insert(
            cert_hash(&bytes),
            CertLocation {
                token_id,
                key_id: key.id.clone(),
                cert_id: cert.id.clone(),
            },
        );
        key.certs.push(cert);

        Ok(bytes)
    }

    fn generate_cert_request(
        &mut self,
        key_id: &str,
        member_id: ClientId,
        key_usage: KeyUsage,
        subject_name: &str,
        format: CsrFormat,
    ) -> Result<Vec<u8>, Fault> {
        let (token_idx, key_idx) = self.locate_key(key_id)?;
        let token = &mut self.tokens[token_idx];
        Self::require_active(token)?;
        let key = &mut token.keys[key_idx];
        Self::check_or_pin_usage(key, key_usage)?;

        let payload = CsrPayload {
            subject_name: subject_name.to_string(),
            public_key: key.public_key.clone(),
            key_usage,
            member_id: member_id.clone(),
        };
        let payload_bytes = serde_json::to_vec(&payload)
            .map_err(|e| Fault::new(INTERNAL_ERROR_FAULT_CODE, &e.to_string()))?;
        let bytes = match format {
            CsrFormat::Der => payload_bytes,
            CsrFormat::Pem => {
                let mut pem = String::new();
                pem.push_str("-----BEGIN CERTIFICATE REQUEST-----\n");
                pem.push_str(&hex::encode(&payload_bytes));
                pem.push_str("\n-----END CERTIFICATE REQUEST-----\n");
                pem.into_bytes()
            }
        };

        key.cert_requests.push(CsrState {
            id: random_id(),
            member_id: Some(member_id),
            subject_name: subject_name.to_string(),
            format,
            key_usage,
        });

        Ok(bytes)
    }

    fn import_cert(
        &mut self,
        cert_bytes: &[u8],
        initial_status: &str,
        member_id: Option<ClientId>,
    ) -> Result<String, Fault> {
        let payload: CertPayload = serde_json::from_slice(cert_bytes).map_err(|_| {
            Fault::new(
                INTERNAL_ERROR_FAULT_CODE,
                "certificate bytes could not be decoded",
            )
        })?;

        // The owning key is resolved from the certificate's public key,
        // never from caller input.
        let located = self.tokens.iter().enumerate().find_map(|(token_idx, t)| {
            t.keys
                .iter()
                .position(|k| k.public_key == payload.public_key)
                .map(|key_idx| (token_idx, key_idx))
        });
        let (token_idx, key_idx) = located.ok_or_else(|| {
            Fault::new(
                KEY_NOT_FOUND_FAULT_CODE,
                "no key matches the certificate public key",
            )
        })?;

        let token_id = self.tokens[token_idx].id.clone();
        let key = &mut self.tokens[token_idx].keys[key_idx];
        Self::check_or_pin_usage(key, payload.key_usage)?;

        let owner = member_id.or(payload.member_id);
        let cert = CertState {
            id: random_id(),
            member_id: owner.clone(),
            active: false,
            status: initial_status.to_string(),
            bytes: cert_bytes.to_vec(),
        };
        let key_id = key.id.clone();
        self.cert_index.insert(
            cert_hash(cert_bytes),
            CertLocation {
                token_id,
                key_id: key_id.clone(),
                cert_id: cert.id.clone(),
            },
        );
        key.certs.push(cert);

        // A fulfilled certificate request is complete once its signed
        // certificate arrives.
        key.cert_requests
            .retain(|csr| !(csr.key_usage == payload.key_usage && csr.member_id == owner));

        Ok(key_id)
    }

    fn find_cert_mut(&mut self, cert_id: &str) -> Result<&mut CertState, Fault> {
        for token in &mut self.tokens {
            for key in &mut token.keys {
                if let Some(cert) = key.certs.iter_mut().find(|c| c.id == cert_id) {
                    return Ok(cert);
                }
            }
        }
        Err(Fault::new(
            CERT_NOT_FOUND_FAULT_CODE,
            &format!("certificate '{}' not found", cert_id),
        ))
    }

    fn delete_cert(&mut self, cert_id: &str) -> Result<(), Fault> {
        for token in &mut self.tokens {
            for key in &mut token.keys {
                if let Some(idx) = key.certs.iter().position(|c| c.id == cert_id) {
                    let cert = key.certs.remove(idx);
                    self.cert_index.remove(&cert_hash(&cert.bytes));
                    return Ok(());
                }
            }
        }
        Err(Fault::new(
            CERT_NOT_FOUND_FAULT_CODE,
            &format!("certificate '{}' not found", cert_id),
        ))
    }

    fn delete_cert_request(&mut self, cert_request_id: &str) -> Result<(), Fault> {
        for token in &mut self.tokens {
            for key in &mut token.keys {
                if let Some(idx) = key
                    .cert_requests
                    .iter()
                    .position(|r| r.id == cert_request_id)
                {
                    key.cert_requests.remove(idx);
                    return Ok(());
                }
            }
        }
        Err(Fault::new(
            CSR_NOT_FOUND_FAULT_CODE,
            &format!("certificate request '{}' not found", cert_request_id),
        ))
    }

    fn find_by_hash(&self, hash: &str) -> Result<&CertLocation, Fault> {
        self.cert_index.get(hash).ok_or_else(|| {
            Fault::new(
                CERT_NOT_FOUND_FAULT_CODE,
                &format!("no certificate with hash '{}'", hash),
            )
        })
    }

    fn cert_at(&self, location: &CertLocation) -> Result<&CertState, Fault> {
        self.tokens
            .iter()
            .find(|t| t.id == location.token_id)
            .and_then(|t| t.keys.iter().find(|k| k.id == location.key_id))
            .and_then(|k| k.certs.iter().find(|c| c.id == location.cert_id))
            .ok_or_else(|| {
                Fault::new(
                    CERT_NOT_FOUND_FAULT_CODE,
                    "certificate index entry is stale",
                )
            })
    }
}

impl SignerBackend for SoftwareSigner {
    fn handle(&mut self, request: SignerRequest) -> SignerResponse {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(fault) => SignerResponse::Error { fault },
        }
    }
}

// ============================================================================
// Snapshot and crypto helpers
// ============================================================================

fn token_info(token: &TokenState) -> TokenInfo {
    TokenInfo {
        id: token.id.clone(),
        friendly_name: token.friendly_name.clone(),
        active: token.active,
        keys: token.keys.iter().map(|k| key_info(k, &token.id)).collect(),
    }
}

fn key_info(key: &KeyState, token_id: &str) -> KeyInfo {
    KeyInfo {
        id: key.id.clone(),
        token_id: token_id.to_string(),
        label: key.label.clone(),
        friendly_name: key.friendly_name.clone(),
        usage: key.usage,
        public_key: key.public_key.clone(),
        certs: key.certs.iter().map(cert_info).collect(),
        cert_requests: key
            .cert_requests
            .iter()
            .map(|r| cert_request_info(r, &key.id))
            .collect(),
    }
}

fn cert_info(cert: &CertState) -> CertificateInfo {
    CertificateInfo {
        id: cert.id.clone(),
        member_id: cert.member_id.clone(),
        active: cert.active,
        status: cert.status.clone(),
        certificate_bytes: cert.bytes.clone(),
    }
}

fn cert_request_info(csr: &CsrState, key_id: &str) -> CertRequestInfo {
    CertRequestInfo {
        id: csr.id.clone(),
        key_id: key_id.to_string(),
        member_id: csr.member_id.clone(),
        subject_name: csr.subject_name.clone(),
        format: csr.format,
        key_usage: csr.key_usage,
    }
}

fn token_not_found(token_id: &str) -> Fault {
    Fault::new(
        TOKEN_NOT_FOUND_FAULT_CODE,
        &format!("token '{}' not found", token_id),
    )
}

/// Lower-case hex SHA-256 of certificate bytes; the key of the cert index.
pub fn cert_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn random_id() -> String {
    let mut id = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut id);
    hex::encode(id)
}

fn derive_kek(password: &Password, salt: &[u8; SALT_LEN]) -> [u8; 32] {
    let mut kek = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, KDF_ROUNDS, &mut kek);
    kek
}

fn seal(kek: &[u8; 32], plaintext: &[u8]) -> Result<SealedBlob, Fault> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(kek));
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| Fault::new(INTERNAL_ERROR_FAULT_CODE, "keystore sealing failed"))?;
    Ok(SealedBlob { nonce, ciphertext })
}

fn open(kek: &[u8; 32], blob: &SealedBlob) -> Option<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(kek));
    cipher
        .decrypt(Nonce::from_slice(&blob.nonce), blob.ciphertext.as_slice())
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn init_and_activate(signer: &mut SoftwareSigner, password: &str) {
        let response = signer.handle(SignerRequest::InitSoftwareToken {
            password: Password::from_str(password),
        });
        assert!(!response.is_error(), "init failed: {:?}", response);

        let response = signer.handle(SignerRequest::ActivateToken {
            token_id: SOFTWARE_TOKEN_ID.to_string(),
            activate: true,
            password: Some(Password::from_str(password)),
        });
        assert!(!response.is_error(), "activate failed: {:?}", response);
    }

    fn generate_key(signer: &mut SoftwareSigner, label: &str) -> KeyInfo {
        match signer.handle(SignerRequest::GenerateKey {
            token_id: SOFTWARE_TOKEN_ID.to_string(),
            label: label.to_string(),
        }) {
            SignerResponse::KeyGenerated { key_info } => key_info,
            other => panic!("expected KeyGenerated, got {:?}", other),
        }
    }

    fn self_signed(signer: &mut SoftwareSigner, key_id: &str, usage: KeyUsage) -> Vec<u8> {
        let now = Utc::now();
        match signer.handle(SignerRequest::GenerateSelfSignedCert {
            key_id: key_id.to_string(),
            common_name: "example.org".to_string(),
            not_before: now,
            not_after: now + Duration::days(365),
            key_usage: usage,
            member_id: ClientId::new("FI", "GOV", "M1"),
        }) {
            SignerResponse::SelfSignedCertGenerated { cert_bytes } => cert_bytes,
            other => panic!("expected SelfSignedCertGenerated, got {:?}", other),
        }
    }

    fn expect_fault(response: SignerResponse) -> Fault {
        match response {
            SignerResponse::Error { fault } => fault,
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_activate_with_wrong_pin_raises_pin_incorrect() {
        let mut signer = SoftwareSigner::new();
        signer.handle(SignerRequest::InitSoftwareToken {
            password: Password::from_str("right"),
        });

        let fault = expect_fault(signer.handle(SignerRequest::ActivateToken {
            token_id: SOFTWARE_TOKEN_ID.to_string(),
            activate: true,
            password: Some(Password::from_str("wrong")),
        }));
        assert_eq!(fault.code, PIN_INCORRECT_FAULT_CODE);
    }

    #[test]
    fn test_activate_unknown_token_raises_token_not_found() {
        let mut signer = SoftwareSigner::new();
        let fault = expect_fault(signer.handle(SignerRequest::ActivateToken {
            token_id: "token-404".to_string(),
            activate: true,
            password: Some(Password::from_str("pw")),
        }));
        assert_eq!(fault.code, TOKEN_NOT_FOUND_FAULT_CODE);
    }

    #[test]
    fn test_deactivate_is_idempotent() {
        let mut signer = SoftwareSigner::new();
        init_and_activate(&mut signer, "pw");

        for _ in 0..2 {
            let response = signer.handle(SignerRequest::ActivateToken {
                token_id: SOFTWARE_TOKEN_ID.to_string(),
                activate: false,
                password: None,
            });
            assert!(!response.is_error());
        }
    }

    #[test]
    fn test_generate_key_requires_active_token() {
        let mut signer = SoftwareSigner::new();
        signer.handle(SignerRequest::InitSoftwareToken {
            password: Password::from_str("pw"),
        });

        let fault = expect_fault(signer.handle(SignerRequest::GenerateKey {
            token_id: SOFTWARE_TOKEN_ID.to_string(),
            label: "k".to_string(),
        }));
        assert_eq!(fault.code, TOKEN_NOT_ACTIVE_FAULT_CODE);
    }

    #[test]
    fn test_generated_key_is_listed_with_public_key() {
        let mut signer = SoftwareSigner::new();
        init_and_activate(&mut signer, "pw");
        let key = generate_key(&mut signer, "sign-key");
        assert!(!key.public_key.is_empty());
        assert_eq!(key.usage, None);

        match signer.handle(SignerRequest::GetTokenInfo {
            token_id: SOFTWARE_TOKEN_ID.to_string(),
        }) {
            SignerResponse::Token { token } => {
                assert!(token.active);
                assert_eq!(token.keys.len(), 1);
                assert_eq!(token.keys[0].id, key.id);
                assert_eq!(token.keys[0].token_id, SOFTWARE_TOKEN_ID);
            }
            other => panic!("expected Token, got {:?}", other),
        }
    }

    #[test]
    fn test_usage_is_pinned_by_first_cert_operation() {
        let mut signer = SoftwareSigner::new();
        init_and_activate(&mut signer, "pw");
        let key = generate_key(&mut signer, "sign-key");

        self_signed(&mut signer, &key.id, KeyUsage::Signing);

        // A later operation with the other usage is refused.
        let now = Utc::now();
        let fault = expect_fault(signer.handle(SignerRequest::GenerateSelfSignedCert {
            key_id: key.id.clone(),
            common_name: "example.org".to_string(),
            not_before: now,
            not_after: now + Duration::days(1),
            key_usage: KeyUsage::Authentication,
            member_id: ClientId::new("FI", "GOV", "M1"),
        }));
        assert_eq!(fault.code, WRONG_CERT_USAGE_FAULT_CODE);

        // And the reported usage stays pinned.
        match signer.handle(SignerRequest::GetTokenInfo {
            token_id: SOFTWARE_TOKEN_ID.to_string(),
        }) {
            SignerResponse::Token { token } => {
                assert_eq!(token.keys[0].usage, Some(KeyUsage::Signing));
            }
            other => panic!("expected Token, got {:?}", other),
        }
    }

    #[test]
    fn test_cert_hash_lookups() {
        let mut signer = SoftwareSigner::new();
        init_and_activate(&mut signer, "pw");
        let key = generate_key(&mut signer, "sign-key");
        let cert_bytes = self_signed(&mut signer, &key.id, KeyUsage::Signing);
        let hash = cert_hash(&cert_bytes);

        match signer.handle(SignerRequest::GetKeyIdForCertHash { hash: hash.clone() }) {
            SignerResponse::KeyIdForHash { key_id } => assert_eq!(key_id, key.id),
            other => panic!("expected KeyIdForHash, got {:?}", other),
        }

        match signer.handle(SignerRequest::GetTokenInfoAndKeyIdForCertHash { hash: hash.clone() }) {
            SignerResponse::TokenAndKeyId { token, key_id } => {
                assert_eq!(token.id, SOFTWARE_TOKEN_ID);
                assert_eq!(key_id, key.id);
            }
            other => panic!("expected TokenAndKeyId, got {:?}", other),
        }

        match signer.handle(SignerRequest::GetCertificateInfoForHash { hash }) {
            SignerResponse::Certificate { cert } => {
                assert_eq!(cert.certificate_bytes, cert_bytes);
            }
            other => panic!("expected Certificate, got {:?}", other),
        }
    }

    #[test]
    fn test_import_resolves_key_from_public_key_and_clears_csr() {
        let mut signer = SoftwareSigner::new();
        init_and_activate(&mut signer, "pw");
        let key = generate_key(&mut signer, "sign-key");
        let member = ClientId::new("FI", "GOV", "M1");

        let response = signer.handle(SignerRequest::GenerateCertRequest {
            key_id: key.id.clone(),
            member_id: member.clone(),
            key_usage: KeyUsage::Signing,
            subject_name: "C=FI, CN=M1".to_string(),
            format: CsrFormat::Pem,
        });
        assert!(!response.is_error());

        // Fabricate the CA-signed certificate the same way the signer
        // builds self-signed ones, for the same public key.
        let cert_bytes = self_signed(&mut signer, &key.id, KeyUsage::Signing);

        match signer.handle(SignerRequest::ImportCert {
            cert_bytes: cert_bytes.clone(),
            initial_status: "registered".to_string(),
            member_id: Some(member),
        }) {
            SignerResponse::CertImported { key_id } => assert_eq!(key_id, key.id),
            other => panic!("expected CertImported, got {:?}", other),
        }

        match signer.handle(SignerRequest::GetTokenInfo {
            token_id: SOFTWARE_TOKEN_ID.to_string(),
        }) {
            SignerResponse::Token { token } => {
                let key = &token.keys[0];
                assert!(key.cert_requests.is_empty(), "fulfilled CSR should be gone");
                assert_eq!(key.certs.len(), 2);
            }
            other => panic!("expected Token, got {:?}", other),
        }
    }

    #[test]
    fn test_import_without_matching_key_fails() {
        let mut signer = SoftwareSigner::new();
        init_and_activate(&mut signer, "pw");

        let payload = CertPayload {
            subject: "cn".to_string(),
            issuer: "cn".to_string(),
            serial: "01".to_string(),
            public_key: "feed".to_string(),
            not_before: Utc::now(),
            not_after: Utc::now(),
            key_usage: KeyUsage::Signing,
            member_id: None,
        };
        let fault = expect_fault(signer.handle(SignerRequest::ImportCert {
            cert_bytes: serde_json::to_vec(&payload).unwrap(),
            initial_status: "registered".to_string(),
            member_id: None,
        }));
        assert_eq!(fault.code, KEY_NOT_FOUND_FAULT_CODE);
    }

    #[test]
    fn test_delete_cert_removes_hash_index_entry() {
        let mut signer = SoftwareSigner::new();
        init_and_activate(&mut signer, "pw");
        let key = generate_key(&mut signer, "sign-key");
        let cert_bytes = self_signed(&mut signer, &key.id, KeyUsage::Signing);
        let hash = cert_hash(&cert_bytes);

        let cert_id = match signer.handle(SignerRequest::GetCertificateInfoForHash {
            hash: hash.clone(),
        }) {
            SignerResponse::Certificate { cert } => cert.id,
            other => panic!("expected Certificate, got {:?}", other),
        };

        let response = signer.handle(SignerRequest::DeleteCert { cert_id });
        assert!(!response.is_error());

        let fault = expect_fault(signer.handle(SignerRequest::GetKeyIdForCertHash { hash }));
        assert_eq!(fault.code, CERT_NOT_FOUND_FAULT_CODE);
    }

    #[test]
    fn test_delete_key_bookkeeping_only_leaves_material_on_device() {
        let mut signer = SoftwareSigner::new();
        init_and_activate(&mut signer, "pw");
        let kept = generate_key(&mut signer, "kept");
        let wiped = generate_key(&mut signer, "wiped");
        assert_eq!(signer.device_material_count(SOFTWARE_TOKEN_ID), 2);

        signer.handle(SignerRequest::DeleteKey {
            key_id: kept.id.clone(),
            delete_from_token: false,
        });
        assert_eq!(signer.device_material_count(SOFTWARE_TOKEN_ID), 2);

        signer.handle(SignerRequest::DeleteKey {
            key_id: wiped.id,
            delete_from_token: true,
        });
        assert_eq!(signer.device_material_count(SOFTWARE_TOKEN_ID), 1);

        // Both keys are gone from the bookkeeping either way.
        match signer.handle(SignerRequest::GetTokenInfo {
            token_id: SOFTWARE_TOKEN_ID.to_string(),
        }) {
            SignerResponse::Token { token } => assert!(token.keys.is_empty()),
            other => panic!("expected Token, got {:?}", other),
        }
    }

    #[test]
    fn test_set_cert_status_passes_through_verbatim() {
        let mut signer = SoftwareSigner::new();
        init_and_activate(&mut signer, "pw");
        let key = generate_key(&mut signer, "sign-key");
        let cert_bytes = self_signed(&mut signer, &key.id, KeyUsage::Signing);
        let hash = cert_hash(&cert_bytes);

        let cert_id = match signer.handle(SignerRequest::GetCertificateInfoForHash {
            hash: hash.clone(),
        }) {
            SignerResponse::Certificate { cert } => cert.id,
            other => panic!("expected Certificate, got {:?}", other),
        };

        signer.handle(SignerRequest::SetCertStatus {
            cert_id: cert_id.clone(),
            status: "some-future-status".to_string(),
        });
        signer.handle(SignerRequest::ActivateCert {
            cert_id,
            activate: true,
        });

        match signer.handle(SignerRequest::GetCertificateInfoForHash { hash }) {
            SignerResponse::Certificate { cert } => {
                assert_eq!(cert.status, "some-future-status");
                assert!(cert.active);
            }
            other => panic!("expected Certificate, got {:?}", other),
        }
    }
}
