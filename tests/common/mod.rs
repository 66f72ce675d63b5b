#![allow(dead_code)]

// Shared harness for the integration suites: spawns a signer service on a
// per-test Unix socket and provides a scripted backend whose behavior is
// keyed on well-known token IDs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use signer_proxy::error::{
    Fault, LOGIN_FAILED_FAULT_CODE, PIN_INCORRECT_FAULT_CODE, TOKEN_NOT_FOUND_FAULT_CODE,
};
use signer_proxy::signer_service::{
    SignerBackend, SignerClient, SignerRequest, SignerResponse, SignerServiceServer,
};
use signer_proxy::{KeyInfo, KeyUsage, TokenInfo};

pub const GOOD_TOKEN_ID: &str = "token-which-exists";
pub const GOOD_TOKEN_NAME: &str = "good-token";
pub const GOOD_KEY_ID: &str = "key-which-exists";
pub const WRONG_SOFT_PIN_TOKEN_ID: &str = "wrong-soft-pin";
pub const WRONG_HSM_PIN_TOKEN_ID: &str = "wrong-hsm-pin";
pub const UNKNOWN_LOGIN_FAIL_TOKEN_ID: &str = "unknown-login-fail";
pub const TOKEN_NOT_FOUND_TOKEN_ID: &str = "token-404";
pub const UNRECOGNIZED_FAULT_TOKEN_ID: &str = "unknown-faultcode";

static SOCKET_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Socket path no other running test is using.
pub fn unique_socket_path() -> String {
    let n = SOCKET_COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir()
        .join(format!("signer-test-{}-{}.sock", std::process::id(), n))
        .to_string_lossy()
        .into_owned()
}

/// Run a signer service task over the given backend and connect a client
/// to it.
pub async fn start_signer<B: SignerBackend>(backend: B) -> SignerClient {
    let socket_path = unique_socket_path();
    let server = SignerServiceServer::new(socket_path.clone(), backend);
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    for _ in 0..100 {
        if let Ok(client) = SignerClient::connect(&socket_path).await {
            return client;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("could not connect to test signer at {}", socket_path);
}

fn good_token(friendly_name: &str) -> TokenInfo {
    TokenInfo {
        id: GOOD_TOKEN_ID.to_string(),
        friendly_name: friendly_name.to_string(),
        active: true,
        keys: vec![KeyInfo {
            id: GOOD_KEY_ID.to_string(),
            token_id: GOOD_TOKEN_ID.to_string(),
            label: "good-key".to_string(),
            friendly_name: "good-key".to_string(),
            usage: Some(KeyUsage::Signing),
            public_key: "ab01cd".to_string(),
            certs: vec![],
            cert_requests: vec![],
        }],
    }
}

/// Backend with canned answers keyed on token IDs, standing in for a
/// signer fronting misbehaving hardware. Counts the requests it sees so
/// tests can prove an operation never reached the wire.
pub struct ScriptedSigner {
    requests_seen: Arc<AtomicUsize>,
    token: TokenInfo,
}

impl ScriptedSigner {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let requests_seen = Arc::new(AtomicUsize::new(0));
        (
            Self {
                requests_seen: Arc::clone(&requests_seen),
                token: good_token(GOOD_TOKEN_NAME),
            },
            requests_seen,
        )
    }

    fn activate(&self, token_id: &str) -> SignerResponse {
        match token_id {
            WRONG_SOFT_PIN_TOKEN_ID => fault(PIN_INCORRECT_FAULT_CODE, "PIN incorrect"),
            WRONG_HSM_PIN_TOKEN_ID => fault(
                LOGIN_FAILED_FAULT_CODE,
                "Login failed: CKR_PIN_INCORRECT (0xa0)",
            ),
            UNKNOWN_LOGIN_FAIL_TOKEN_ID => {
                fault(LOGIN_FAILED_FAULT_CODE, "dont know what happened")
            }
            TOKEN_NOT_FOUND_TOKEN_ID => fault(TOKEN_NOT_FOUND_FAULT_CODE, "did not find it"),
            UNRECOGNIZED_FAULT_TOKEN_ID => fault("foo", "bar"),
            _ => SignerResponse::Ack,
        }
    }

    fn deactivate(&self, token_id: &str) -> SignerResponse {
        match token_id {
            TOKEN_NOT_FOUND_TOKEN_ID => fault(TOKEN_NOT_FOUND_FAULT_CODE, "did not find it"),
            UNRECOGNIZED_FAULT_TOKEN_ID => fault("foo", "bar"),
            _ => SignerResponse::Ack,
        }
    }
}

impl SignerBackend for ScriptedSigner {
    fn handle(&mut self, request: SignerRequest) -> SignerResponse {
        self.requests_seen.fetch_add(1, Ordering::SeqCst);

        match request {
            SignerRequest::ListTokens => SignerResponse::TokenList {
                tokens: vec![self.token.clone()],
            },

            SignerRequest::GetTokenInfo { token_id } => {
                if token_id == TOKEN_NOT_FOUND_TOKEN_ID {
                    fault(TOKEN_NOT_FOUND_FAULT_CODE, "did not find it")
                } else {
                    SignerResponse::Token {
                        token: self.token.clone(),
                    }
                }
            }

            SignerRequest::ActivateToken {
                token_id, activate, ..
            } => {
                if activate {
                    self.activate(&token_id)
                } else {
                    self.deactivate(&token_id)
                }
            }

            SignerRequest::SetTokenFriendlyName { token_id, name } => {
                if token_id == TOKEN_NOT_FOUND_TOKEN_ID {
                    fault(TOKEN_NOT_FOUND_FAULT_CODE, "did not find it")
                } else {
                    self.token.friendly_name = name;
                    SignerResponse::Ack
                }
            }

            SignerRequest::GetCertificateInfoForHash { hash }
            | SignerRequest::GetKeyIdForCertHash { hash }
            | SignerRequest::GetTokenInfoAndKeyIdForCertHash { hash } => {
                fault("Signer.CertNotFound", &format!("no cert with hash {}", hash))
            }

            _ => SignerResponse::Ack,
        }
    }
}

fn fault(code: &str, message: &str) -> SignerResponse {
    SignerResponse::Error {
        fault: Fault::new(code, message),
    }
}
