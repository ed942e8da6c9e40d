//! Revision data structures.
//!
//! A revision is stored on the wire as one flat JSON object. Parsing goes
//! through [`Revision::from_fields`] so that each `revision_type` only accepts
//! the fields it owns, and serialization goes back through
//! [`Revision::to_fields`] so the canonical field set is the one that gets
//! hashed.

use crate::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Content address of a revision (lowercase hex digest).
pub type Hash = String;

/// Prefix that marks a form field inside a form revision.
pub const FORM_KEY_PREFIX: &str = "forms_";

/// The closed set of revision kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionType {
    File,
    Witness,
    Signature,
    Form,
    Link,
}

impl RevisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionType::File => "file",
            RevisionType::Witness => "witness",
            RevisionType::Signature => "signature",
            RevisionType::Form => "form",
            RevisionType::Link => "link",
        }
    }
}

impl fmt::Display for RevisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevisionType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(RevisionType::File),
            "witness" => Ok(RevisionType::Witness),
            "signature" => Ok(RevisionType::Signature),
            "form" => Ok(RevisionType::Form),
            "link" => Ok(RevisionType::Link),
            other => Err(ModelError::UnknownRevisionType(other.to_string())),
        }
    }
}

/// Signature schemes a signature revision may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignatureScheme {
    /// Browser wallet account, EIP-191 personal-sign over secp256k1.
    WalletAccount,
    /// Raw Ed25519 key held by the signer.
    LocalKey,
    /// X.509 / PKCS#12 certificate-rooted signature.
    Certificate,
    /// Key resolved from a `did:key` identifier.
    DidKey,
}

impl SignatureScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureScheme::WalletAccount => "ethereum:eip-191",
            SignatureScheme::LocalKey => "ed25519",
            SignatureScheme::Certificate => "x509",
            SignatureScheme::DidKey => "did:key",
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureScheme {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ethereum:eip-191" | "eip-191" | "metamask" => Ok(SignatureScheme::WalletAccount),
            "ed25519" | "cli" | "local" => Ok(SignatureScheme::LocalKey),
            "x509" | "p12" | "pkcs12" => Ok(SignatureScheme::Certificate),
            "did:key" | "did_key" => Ok(SignatureScheme::DidKey),
            other => Err(ModelError::UnknownSignatureType(other.to_string())),
        }
    }
}

/// One step of a Merkle inclusion proof.
///
/// A missing `right_leaf` means the running node had no sibling at this depth
/// and was promoted unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessMerkleProof {
    pub depth: u32,
    pub left_leaf: Hash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_leaf: Option<Hash>,
    pub successor: Hash,
}

/// One independent signature over the envelope payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureItem {
    /// Base64url JSON header (`alg`, `kid`); may be empty.
    #[serde(default)]
    pub protected: String,
    pub signature: String,
}

/// Multi-signer envelope carried by a signature revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureData {
    pub payload: String,
    pub signatures: Vec<SignatureItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRevision {
    pub file_hash: Hash,
    pub file_nonce: String,
    /// Embedded file content, used instead of the file content provider.
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessRevision {
    pub witness_merkle_root: Hash,
    /// Unix seconds claimed for the anchor.
    pub witness_timestamp: u64,
    pub witness_network: String,
    pub witness_transaction_hash: String,
    pub witness_smart_contract_address: Option<String>,
    pub witness_sender_account_address: Option<String>,
    pub witness_merkle_proof: Vec<WitnessMerkleProof>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRevision {
    pub signature: SignatureData,
    pub signature_public_key: String,
    pub signature_wallet_address: Option<String>,
    pub signature_type: SignatureScheme,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormRevision {
    /// Every non-core field of the revision, form keys included.
    pub fields: BTreeMap<String, Value>,
    pub leaves: Vec<Hash>,
}

impl FormRevision {
    /// Fields carrying the `forms_` prefix.
    pub fn form_keys(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields
            .iter()
            .filter(|(key, _)| key.starts_with(FORM_KEY_PREFIX))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRevision {
    pub link_type: Option<String>,
    pub link_verification_hashes: Vec<Hash>,
    /// Parallel to `link_verification_hashes` when present.
    pub link_file_hashes: Vec<Hash>,
}

/// Type-specific payload of a revision.
#[derive(Debug, Clone, PartialEq)]
pub enum RevisionKind {
    File(FileRevision),
    Witness(WitnessRevision),
    Signature(SignatureRevision),
    Form(FormRevision),
    Link(LinkRevision),
}

impl RevisionKind {
    pub fn revision_type(&self) -> RevisionType {
        match self {
            RevisionKind::File(_) => RevisionType::File,
            RevisionKind::Witness(_) => RevisionType::Witness,
            RevisionKind::Signature(_) => RevisionType::Signature,
            RevisionKind::Form(_) => RevisionType::Form,
            RevisionKind::Link(_) => RevisionType::Link,
        }
    }
}

/// One provenance event.
///
/// Two revisions are equal when they emit the same wire fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Revision {
    /// Hash of the prior revision; empty for a genesis revision.
    pub previous_verification_hash: Hash,
    pub local_timestamp: String,
    pub version: String,
    pub kind: RevisionKind,
    /// Unrecognised fields of non-form revisions, kept so they still hash.
    pub extra: BTreeMap<String, Value>,
    /// Wire object this revision was parsed from; `None` for revisions built in code.
    wire: Option<WireOrigin>,
}

/// The parsed wire object next to what the typed fields emitted at parse time.
///
/// A field the typed model has not changed since parsing is re-emitted in its
/// original encoding (alias tokens, string timestamps, omitted optionals).
#[derive(Debug, Clone)]
struct WireOrigin {
    raw: Map<String, Value>,
    normalized: Map<String, Value>,
}

impl WireOrigin {
    fn reconcile(&self, current: Map<String, Value>) -> Map<String, Value> {
        let keys: BTreeSet<&String> = current
            .keys()
            .chain(self.normalized.keys())
            .chain(self.raw.keys())
            .collect();
        let mut out = Map::new();
        for key in keys {
            let now = current.get(key);
            let value = if now == self.normalized.get(key) {
                self.raw.get(key)
            } else {
                now
            };
            if let Some(value) = value {
                out.insert(key.clone(), value.clone());
            }
        }
        out
    }
}

impl PartialEq for Revision {
    fn eq(&self, other: &Self) -> bool {
        self.to_fields() == other.to_fields()
    }
}

impl Revision {
    pub fn new(
        previous_verification_hash: impl Into<Hash>,
        local_timestamp: impl Into<String>,
        kind: RevisionKind,
    ) -> Self {
        Self {
            previous_verification_hash: previous_verification_hash.into(),
            local_timestamp: local_timestamp.into(),
            version: crate::DEFAULT_VERSION.to_string(),
            kind,
            extra: BTreeMap::new(),
            wire: None,
        }
    }

    pub fn revision_type(&self) -> RevisionType {
        self.kind.revision_type()
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_verification_hash.is_empty()
    }

    /// Check that every field required by the declared kind is present and non-empty.
    pub fn validate(&self) -> Result<(), ModelError> {
        match &self.kind {
            RevisionKind::File(file) => {
                require_non_empty("file_hash", &file.file_hash)?;
                require_non_empty("file_nonce", &file.file_nonce)?;
            }
            RevisionKind::Witness(witness) => {
                require_non_empty("witness_merkle_root", &witness.witness_merkle_root)?;
                require_non_empty("witness_network", &witness.witness_network)?;
                require_non_empty("witness_transaction_hash", &witness.witness_transaction_hash)?;
                if self.is_genesis() {
                    return Err(ModelError::invalid(
                        "previous_verification_hash",
                        "a witness revision must witness a predecessor",
                    ));
                }
            }
            RevisionKind::Signature(sig) => {
                require_non_empty("signature_public_key", &sig.signature_public_key)?;
                if sig.signature.signatures.is_empty() {
                    return Err(ModelError::invalid("signature", "signature set is empty"));
                }
                if self.is_genesis() {
                    return Err(ModelError::invalid(
                        "previous_verification_hash",
                        "a signature revision must sign a predecessor",
                    ));
                }
            }
            RevisionKind::Form(form) => {
                if form.leaves.is_empty() {
                    return Err(ModelError::MissingField("leaves".to_string()));
                }
            }
            RevisionKind::Link(link) => {
                if link.link_verification_hashes.is_empty() {
                    return Err(ModelError::MissingField(
                        "link_verification_hashes".to_string(),
                    ));
                }
                if !link.link_file_hashes.is_empty()
                    && link.link_file_hashes.len() != link.link_verification_hashes.len()
                {
                    return Err(ModelError::invalid(
                        "link_file_hashes",
                        "must be parallel to link_verification_hashes",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Parse a revision from its flat wire object.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, ModelError> {
        let raw = fields.clone();
        let mut reader = FieldReader::new(fields);
        let previous_verification_hash = reader.string("previous_verification_hash")?;
        let local_timestamp = reader.string("local_timestamp")?;
        let version = reader.string("version")?;
        let revision_type: RevisionType = reader.string("revision_type")?.parse()?;

        let kind = match revision_type {
            RevisionType::File => RevisionKind::File(FileRevision {
                file_hash: reader.string("file_hash")?,
                file_nonce: reader.string("file_nonce")?,
                content: reader.opt_string("content")?,
            }),
            RevisionType::Witness => RevisionKind::Witness(WitnessRevision {
                witness_merkle_root: reader.string("witness_merkle_root")?,
                witness_timestamp: reader.unsigned("witness_timestamp")?,
                witness_network: reader.string("witness_network")?,
                witness_transaction_hash: reader.string("witness_transaction_hash")?,
                witness_smart_contract_address: reader
                    .opt_string("witness_smart_contract_address")?,
                witness_sender_account_address: reader
                    .opt_string("witness_sender_account_address")?,
                witness_merkle_proof: reader
                    .opt_typed("witness_merkle_proof")?
                    .unwrap_or_default(),
            }),
            RevisionType::Signature => RevisionKind::Signature(SignatureRevision {
                signature: reader.typed("signature")?,
                signature_public_key: reader.string("signature_public_key")?,
                signature_wallet_address: reader.opt_string("signature_wallet_address")?,
                signature_type: reader.string("signature_type")?.parse()?,
            }),
            RevisionType::Form => {
                let leaves = reader.typed("leaves")?;
                RevisionKind::Form(FormRevision {
                    fields: reader.take_rest(),
                    leaves,
                })
            }
            RevisionType::Link => RevisionKind::Link(LinkRevision {
                link_type: reader.opt_string("link_type")?,
                link_verification_hashes: reader.typed("link_verification_hashes")?,
                link_file_hashes: reader.opt_typed("link_file_hashes")?.unwrap_or_default(),
            }),
        };

        let mut revision = Revision {
            previous_verification_hash,
            local_timestamp,
            version,
            kind,
            extra: reader.take_rest(),
            wire: None,
        };
        revision.validate()?;
        let normalized = revision.typed_fields();
        revision.wire = Some(WireOrigin { raw, normalized });
        Ok(revision)
    }

    /// The flat wire object of this revision, the exact field set that is hashed.
    ///
    /// Fields left untouched since parsing keep the encoding they were parsed from.
    pub fn to_fields(&self) -> Map<String, Value> {
        let current = self.typed_fields();
        match &self.wire {
            Some(origin) => origin.reconcile(current),
            None => current,
        }
    }

    fn typed_fields(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, value) in &self.extra {
            out.insert(key.clone(), value.clone());
        }
        out.insert(
            "previous_verification_hash".into(),
            json!(self.previous_verification_hash),
        );
        out.insert("local_timestamp".into(), json!(self.local_timestamp));
        out.insert("version".into(), json!(self.version));
        out.insert("revision_type".into(), json!(self.revision_type().as_str()));

        match &self.kind {
            RevisionKind::File(file) => {
                out.insert("file_hash".into(), json!(file.file_hash));
                out.insert("file_nonce".into(), json!(file.file_nonce));
                if let Some(content) = &file.content {
                    out.insert("content".into(), json!(content));
                }
            }
            RevisionKind::Witness(w) => {
                out.insert("witness_merkle_root".into(), json!(w.witness_merkle_root));
                out.insert("witness_timestamp".into(), json!(w.witness_timestamp));
                out.insert("witness_network".into(), json!(w.witness_network));
                out.insert(
                    "witness_transaction_hash".into(),
                    json!(w.witness_transaction_hash),
                );
                if let Some(addr) = &w.witness_smart_contract_address {
                    out.insert("witness_smart_contract_address".into(), json!(addr));
                }
                if let Some(addr) = &w.witness_sender_account_address {
                    out.insert("witness_sender_account_address".into(), json!(addr));
                }
                let proof: Vec<Value> =
                    w.witness_merkle_proof.iter().map(proof_step_value).collect();
                out.insert("witness_merkle_proof".into(), Value::Array(proof));
            }
            RevisionKind::Signature(sig) => {
                let items: Vec<Value> = sig
                    .signature
                    .signatures
                    .iter()
                    .map(|item| {
                        json!({ "protected": item.protected, "signature": item.signature })
                    })
                    .collect();
                out.insert(
                    "signature".into(),
                    json!({ "payload": sig.signature.payload, "signatures": items }),
                );
                out.insert("signature_public_key".into(), json!(sig.signature_public_key));
                if let Some(addr) = &sig.signature_wallet_address {
                    out.insert("signature_wallet_address".into(), json!(addr));
                }
                out.insert("signature_type".into(), json!(sig.signature_type.as_str()));
            }
            RevisionKind::Form(form) => {
                for (key, value) in &form.fields {
                    out.insert(key.clone(), value.clone());
                }
                out.insert("leaves".into(), json!(form.leaves));
            }
            RevisionKind::Link(link) => {
                if let Some(link_type) = &link.link_type {
                    out.insert("link_type".into(), json!(link_type));
                }
                out.insert(
                    "link_verification_hashes".into(),
                    json!(link.link_verification_hashes),
                );
                out.insert("link_file_hashes".into(), json!(link.link_file_hashes));
            }
        }
        out
    }
}

impl TryFrom<Map<String, Value>> for Revision {
    type Error = ModelError;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        Revision::from_fields(fields)
    }
}

impl From<Revision> for Map<String, Value> {
    fn from(revision: Revision) -> Self {
        revision.to_fields()
    }
}

fn proof_step_value(step: &WitnessMerkleProof) -> Value {
    let mut obj = Map::new();
    obj.insert("depth".into(), json!(step.depth));
    obj.insert("left_leaf".into(), json!(step.left_leaf));
    if let Some(right) = &step.right_leaf {
        obj.insert("right_leaf".into(), json!(right));
    }
    obj.insert("successor".into(), json!(step.successor));
    Value::Object(obj)
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ModelError> {
    if value.is_empty() {
        return Err(ModelError::MissingField(field.to_string()));
    }
    Ok(())
}

/// Consumes fields out of a wire object, leaving unknown ones behind.
struct FieldReader {
    fields: Map<String, Value>,
}

impl FieldReader {
    fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    fn string(&mut self, key: &str) -> Result<String, ModelError> {
        self.opt_string(key)?
            .ok_or_else(|| ModelError::MissingField(key.to_string()))
    }

    fn opt_string(&mut self, key: &str) -> Result<Option<String>, ModelError> {
        match self.fields.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(ModelError::invalid(
                key,
                format!("expected a string, found {other}"),
            )),
        }
    }

    /// Accepts a JSON number or a decimal string.
    fn unsigned(&mut self, key: &str) -> Result<u64, ModelError> {
        match self.fields.remove(key) {
            None | Some(Value::Null) => Err(ModelError::MissingField(key.to_string())),
            Some(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| ModelError::invalid(key, "expected an unsigned integer")),
            Some(Value::String(s)) => s
                .parse()
                .map_err(|_| ModelError::invalid(key, format!("`{s}` is not an unsigned integer"))),
            Some(other) => Err(ModelError::invalid(
                key,
                format!("expected an unsigned integer, found {other}"),
            )),
        }
    }

    fn typed<T: serde::de::DeserializeOwned>(&mut self, key: &str) -> Result<T, ModelError> {
        self.opt_typed(key)?
            .ok_or_else(|| ModelError::MissingField(key.to_string()))
    }

    fn opt_typed<T: serde::de::DeserializeOwned>(
        &mut self,
        key: &str,
    ) -> Result<Option<T>, ModelError> {
        match self.fields.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| ModelError::invalid(key, e.to_string())),
        }
    }

    fn take_rest(&mut self) -> BTreeMap<String, Value> {
        std::mem::take(&mut self.fields).into_iter().collect()
    }
}
