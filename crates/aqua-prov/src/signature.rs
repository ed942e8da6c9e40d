//! Signature revision verification.

use crate::crypto::{DidKeyBackend, Ed25519Backend, Eip191Backend};
use crate::engine::Verifier;
use crate::error::{Failure, FailureReason, NodeStatus};
use crate::provider::{CollaboratorError, SignatureBackend};
use aqua_model::{Revision, SignatureItem, SignatureRevision, SignatureScheme};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Signature backends keyed by scheme.
#[derive(Clone, Default)]
pub struct SignatureBackends {
    backends: HashMap<SignatureScheme, Arc<dyn SignatureBackend>>,
}

impl SignatureBackends {
    /// No backends; every signature reports `CollaboratorUnavailable`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ed25519, `did:key` and EIP-191. Certificates need a caller-supplied backend.
    pub fn with_builtin() -> Self {
        let mut backends = Self::new();
        backends.register(SignatureScheme::LocalKey, Ed25519Backend);
        backends.register(SignatureScheme::DidKey, DidKeyBackend);
        backends.register(SignatureScheme::WalletAccount, Eip191Backend);
        backends
    }

    pub fn register(
        &mut self,
        scheme: SignatureScheme,
        backend: impl SignatureBackend + 'static,
    ) -> &mut Self {
        self.backends.insert(scheme, Arc::new(backend));
        self
    }

    pub fn get(&self, scheme: SignatureScheme) -> Option<&Arc<dyn SignatureBackend>> {
        self.backends.get(&scheme)
    }
}

impl fmt::Debug for SignatureBackends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<_> = self.backends.keys().map(|s| s.as_str()).collect();
        schemes.sort_unstable();
        f.debug_struct("SignatureBackends")
            .field("schemes", &schemes)
            .finish()
    }
}

/// Decoded `protected` header of a signature item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Signer key, address or DID for this item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl ProtectedHeader {
    /// Parse a base64url JSON header; an empty string is an empty header.
    pub fn decode(protected: &str) -> Result<Self, String> {
        let trimmed = protected.trim().trim_end_matches('=');
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(trimmed)
            .map_err(|e| format!("protected header is not base64url: {e}"))?;
        serde_json::from_slice(&bytes).map_err(|e| format!("protected header is not JSON: {e}"))
    }

    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }
}

/// Outcome of one signature item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureItemResult {
    pub index: usize,
    pub signer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    pub status: NodeStatus,
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureVerificationGraphData {
    pub signature_type: String,
    pub wallet_address: String,
    /// The envelope payload names this revision's predecessor.
    pub chain_hash_is_valid: bool,
    #[serde(rename = "isValidationSucessful")]
    pub is_validation_successful: bool,
    pub items: Vec<SignatureItemResult>,
}

impl Verifier {
    /// Verify every item of a signature revision; all of them must pass.
    ///
    /// The signed bytes are the predecessor's verification hash as UTF-8.
    pub(crate) async fn verify_signature(
        &self,
        revision: &Revision,
        sig: &SignatureRevision,
    ) -> (SignatureVerificationGraphData, Vec<Failure>) {
        let payload = revision.previous_verification_hash.as_bytes();
        let mut failures = Vec::new();

        let chain_hash_is_valid = sig.signature.payload == revision.previous_verification_hash;
        if !chain_hash_is_valid {
            failures.push(Failure::new(
                FailureReason::SignatureRejected,
                format!(
                    "envelope payload {} does not match predecessor {}",
                    sig.signature.payload, revision.previous_verification_hash
                ),
            ));
        }

        let checks = sig
            .signature
            .signatures
            .iter()
            .enumerate()
            .map(|(index, item)| self.verify_item(index, item, sig, payload));
        let items = join_all(checks).await;

        for item in &items {
            if item.is_valid {
                continue;
            }
            let (reason, status) = match item.status {
                NodeStatus::Error => (FailureReason::CollaboratorUnavailable, NodeStatus::Error),
                _ => (FailureReason::SignatureRejected, NodeStatus::Invalid),
            };
            failures.push(
                Failure::new(
                    reason,
                    format!(
                        "signature item {} by {}: {}",
                        item.index,
                        item.signer,
                        item.detail.as_deref().unwrap_or("rejected")
                    ),
                )
                .with_status(status),
            );
        }

        let data = SignatureVerificationGraphData {
            signature_type: sig.signature_type.as_str().to_string(),
            wallet_address: sig
                .signature_wallet_address
                .clone()
                .unwrap_or_else(|| sig.signature_public_key.clone()),
            chain_hash_is_valid,
            is_validation_successful: failures.is_empty(),
            items,
        };
        (data, failures)
    }

    async fn verify_item(
        &self,
        index: usize,
        item: &SignatureItem,
        sig: &SignatureRevision,
        payload: &[u8],
    ) -> SignatureItemResult {
        let header = match ProtectedHeader::decode(&item.protected) {
            Ok(header) => header,
            Err(detail) => {
                return SignatureItemResult {
                    index,
                    signer: sig.signature_public_key.clone(),
                    alg: None,
                    status: NodeStatus::Invalid,
                    is_valid: false,
                    detail: Some(detail),
                }
            }
        };
        let signer = default_signer(&header, sig);
        let outcome = match self.signature_backends().get(sig.signature_type) {
            None => Err(CollaboratorError::Unsupported(format!(
                "no backend registered for {}",
                sig.signature_type
            ))),
            Some(backend) => {
                self.call(backend.verify(payload, &item.signature, &signer))
                    .await
            }
        };

        let (status, detail) = match outcome {
            Ok(true) => (NodeStatus::Valid, None),
            Ok(false) => (NodeStatus::Invalid, Some("signature does not verify".to_string())),
            Err(CollaboratorError::Rejected(reason)) => (NodeStatus::Invalid, Some(reason)),
            Err(e) => (NodeStatus::Error, Some(e.to_string())),
        };
        SignatureItemResult {
            index,
            signer,
            alg: header.alg,
            is_valid: status == NodeStatus::Valid,
            status,
            detail,
        }
    }
}

fn default_signer(header: &ProtectedHeader, sig: &SignatureRevision) -> String {
    if let Some(kid) = &header.kid {
        return kid.clone();
    }
    match (sig.signature_type, &sig.signature_wallet_address) {
        (SignatureScheme::WalletAccount, Some(address)) => address.clone(),
        _ => sig.signature_public_key.clone(),
    }
}
