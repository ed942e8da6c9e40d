//! Built-in signature backends.
//!
//! Each backend verifies a signature over the exact payload bytes handed to
//! it; the caller decides what those bytes are.

use crate::provider::{CollaboratorError, SignatureBackend};
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey as EcdsaVerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};

const ED25519_PREFIX: &str = "ed25519:";
const DID_KEY_PREFIX: &str = "did:key:z";
/// Multicodec varint for an Ed25519 public key.
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// Ed25519 over hex-encoded keys and signatures.
///
/// Signatures may carry an `ed25519:` prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Backend;

#[async_trait]
impl SignatureBackend for Ed25519Backend {
    async fn verify(
        &self,
        payload: &[u8],
        signature: &str,
        signer: &str,
    ) -> Result<bool, CollaboratorError> {
        let Some(key) = decode_fixed::<32>(signer.strip_prefix(ED25519_PREFIX).unwrap_or(signer))
        else {
            return Ok(false);
        };
        Ok(verify_ed25519(&key, payload, signature))
    }
}

/// `did:key` identifiers wrapping an Ed25519 key.
#[derive(Debug, Clone, Copy, Default)]
pub struct DidKeyBackend;

#[async_trait]
impl SignatureBackend for DidKeyBackend {
    async fn verify(
        &self,
        payload: &[u8],
        signature: &str,
        signer: &str,
    ) -> Result<bool, CollaboratorError> {
        match ed25519_from_did_key(signer) {
            Some(key) => Ok(verify_ed25519(&key, payload, signature)),
            None => Ok(false),
        }
    }
}

/// EIP-191 `personal_sign` recovery against an account address.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eip191Backend;

#[async_trait]
impl SignatureBackend for Eip191Backend {
    async fn verify(
        &self,
        payload: &[u8],
        signature: &str,
        signer: &str,
    ) -> Result<bool, CollaboratorError> {
        Ok(recover_eip191_address(payload, signature)
            .map(|address| normalize_address(&address) == normalize_address(signer))
            .unwrap_or(false))
    }
}

fn verify_ed25519(key: &[u8; 32], payload: &[u8], signature: &str) -> bool {
    let sig_hex = signature.strip_prefix(ED25519_PREFIX).unwrap_or(signature);
    let Some(sig_bytes) = decode_fixed::<64>(sig_hex) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(key) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    verifying_key.verify(payload, &sig).is_ok()
}

fn decode_fixed<const N: usize>(hex_str: &str) -> Option<[u8; N]> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x")).ok()?;
    bytes.try_into().ok()
}

/// Sign `payload` with an Ed25519 secret key, producing `ed25519:<hex>`.
pub fn sign_ed25519(secret: &[u8; 32], payload: &[u8]) -> String {
    let signing_key = SigningKey::from_bytes(secret);
    format!(
        "{ED25519_PREFIX}{}",
        hex::encode(signing_key.sign(payload).to_bytes())
    )
}

/// Hex public key for an Ed25519 secret key.
pub fn ed25519_public_hex(secret: &[u8; 32]) -> String {
    hex::encode(SigningKey::from_bytes(secret).verifying_key().to_bytes())
}

pub fn did_key_from_ed25519(public_key: &[u8; 32]) -> String {
    let mut bytes = ED25519_MULTICODEC.to_vec();
    bytes.extend_from_slice(public_key);
    format!("{DID_KEY_PREFIX}{}", bs58::encode(bytes).into_string())
}

pub fn ed25519_from_did_key(did: &str) -> Option<[u8; 32]> {
    let encoded = did.strip_prefix(DID_KEY_PREFIX)?;
    let bytes = bs58::decode(encoded).into_vec().ok()?;
    let key = bytes.strip_prefix(&ED25519_MULTICODEC[..])?;
    key.try_into().ok()
}

/// Keccak-256 of the EIP-191 prefixed message.
pub fn eip191_hash(payload: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", payload.len()).as_bytes());
    hasher.update(payload);
    hasher.finalize().into()
}

/// `0x`-prefixed lowercase account address of a secp256k1 key.
pub fn ethereum_address(key: &EcdsaVerifyingKey) -> String {
    let point = key.as_affine().to_encoded_point(false);
    let digest = Keccak256::digest(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&digest[12..]))
}

/// Sign `payload` the way a wallet's `personal_sign` does: 65 bytes `r || s || v`, `v` in {27, 28}.
pub fn sign_eip191(key: &k256::ecdsa::SigningKey, payload: &[u8]) -> Option<String> {
    let (sig, recid) = key.sign_prehash_recoverable(&eip191_hash(payload)).ok()?;
    let mut bytes = sig.to_bytes().to_vec();
    bytes.push(27 + recid.to_byte());
    Some(format!("0x{}", hex::encode(bytes)))
}

fn recover_eip191_address(payload: &[u8], signature: &str) -> Option<String> {
    let bytes = decode_fixed::<65>(signature)?;
    let v = match bytes[64] {
        v @ 27..=28 => v - 27,
        v @ 0..=1 => v,
        _ => return None,
    };
    let mut recid = RecoveryId::from_byte(v)?;
    let mut sig = EcdsaSignature::from_slice(&bytes[..64]).ok()?;
    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        recid = RecoveryId::new(!recid.is_y_odd(), recid.is_x_reduced());
    }
    let key = EcdsaVerifyingKey::recover_from_prehash(&eip191_hash(payload), &sig, recid).ok()?;
    Some(ethereum_address(&key))
}

fn normalize_address(address: &str) -> String {
    address.trim_start_matches("0x").to_ascii_lowercase()
}
