//! Witness revision verification: local proof replay plus external anchor confirmation.

use crate::engine::Verifier;
use crate::error::{Failure, FailureReason, NodeStatus};
use crate::provider::{
    AnchoredRecord, CollaboratorError, LedgerReader, RelayReader, TimestampAuthority,
};
use aqua_hash::{replay, MerkleError};
use aqua_model::WitnessRevision;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Network id of relay-anchored witnesses.
pub const NOSTR_NETWORK: &str = "nostr";
/// Network id of RFC 3161 timestamp-authority witnesses.
pub const TSA_NETWORK: &str = "TSA_RFC3161";

/// Anchor readers, one per network.
#[derive(Clone, Default)]
pub struct WitnessBackends {
    ledgers: HashMap<String, Arc<dyn LedgerReader>>,
    relay: Option<Arc<dyn RelayReader>>,
    timestamp_authority: Option<Arc<dyn TimestampAuthority>>,
}

impl WitnessBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_ledger(
        &mut self,
        network: impl Into<String>,
        reader: impl LedgerReader + 'static,
    ) -> &mut Self {
        self.ledgers.insert(network.into(), Arc::new(reader));
        self
    }

    pub fn set_relay(&mut self, relay: impl RelayReader + 'static) -> &mut Self {
        self.relay = Some(Arc::new(relay));
        self
    }

    pub fn set_timestamp_authority(&mut self, tsa: impl TimestampAuthority + 'static) -> &mut Self {
        self.timestamp_authority = Some(Arc::new(tsa));
        self
    }
}

impl fmt::Debug for WitnessBackends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ledgers: Vec<_> = self.ledgers.keys().collect();
        ledgers.sort();
        f.debug_struct("WitnessBackends")
            .field("ledgers", &ledgers)
            .field("relay", &self.relay.is_some())
            .field("timestamp_authority", &self.timestamp_authority.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessVerificationGraphData {
    pub witness_network: String,
    pub transaction_hash: String,
    pub merkle_root: String,
    /// Witnessed leaf: the predecessor's verification hash.
    pub witnessed_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_root: Option<String>,
    pub merkle_proof_is_valid: bool,
    /// False when the anchor was not checked or did not confirm.
    pub anchor_confirmed: bool,
    #[serde(rename = "isValidationSucessful")]
    pub is_validation_successful: bool,
}

enum Anchor {
    Confirmed,
    Skipped,
    Failed(Failure),
}

impl Verifier {
    pub(crate) async fn verify_witness(
        &self,
        witness: &WitnessRevision,
        prior_hash: &str,
    ) -> (WitnessVerificationGraphData, Vec<Failure>) {
        let mut failures = Vec::new();

        let computed_root = match replay(
            prior_hash,
            &witness.witness_merkle_proof,
            self.config().hash_algorithm,
        ) {
            Ok(root) => Some(root),
            Err(e) => {
                let detail = match &e {
                    MerkleError::ProofChainBroken { .. } => e.to_string(),
                    _ => format!("proof cannot be replayed: {e}"),
                };
                failures.push(Failure::new(FailureReason::ProofChainBroken, detail));
                None
            }
        };
        let merkle_proof_is_valid = match &computed_root {
            Some(root) if same_value(root, &witness.witness_merkle_root) => true,
            Some(root) => {
                failures.push(Failure::new(
                    FailureReason::MerkleRootMismatch,
                    format!(
                        "proof yields {root}, revision claims {}",
                        witness.witness_merkle_root
                    ),
                ));
                false
            }
            None => false,
        };

        let anchor = if self.config().require_anchor_confirmation {
            self.confirm_anchor(witness).await
        } else {
            Anchor::Skipped
        };
        let anchor_confirmed = match anchor {
            Anchor::Confirmed => true,
            Anchor::Skipped => false,
            Anchor::Failed(failure) => {
                failures.push(failure);
                false
            }
        };

        let data = WitnessVerificationGraphData {
            witness_network: witness.witness_network.clone(),
            transaction_hash: witness.witness_transaction_hash.clone(),
            merkle_root: witness.witness_merkle_root.clone(),
            witnessed_hash: prior_hash.to_string(),
            computed_root,
            merkle_proof_is_valid,
            anchor_confirmed,
            is_validation_successful: failures.is_empty(),
        };
        (data, failures)
    }

    async fn confirm_anchor(&self, witness: &WitnessRevision) -> Anchor {
        let backends = self.witness_backends();
        let network = witness.witness_network.as_str();
        let tx = witness.witness_transaction_hash.as_str();
        let tolerance = self.config().anchor_timestamp_tolerance_secs;

        match network {
            NOSTR_NETWORK => {
                let Some(relay) = &backends.relay else {
                    return unavailable(format!("no relay reader for {network}"));
                };
                match self.call(relay.get_event_by_id(tx)).await {
                    Err(e) => unavailable(format!("relay lookup of {tx}: {e}")),
                    Ok(None) => self.anchor_failure(
                        FailureReason::AnchorNotFound,
                        format!("relay event {tx} not found"),
                    ),
                    Ok(Some(event)) => {
                        if let Some(sender) = &witness.witness_sender_account_address {
                            if !same_value(sender, &event.author) {
                                return Anchor::Failed(Failure::new(
                                    FailureReason::AnchorValueMismatch,
                                    format!(
                                        "relay event authored by {}, expected {sender}",
                                        event.author
                                    ),
                                ));
                            }
                        }
                        let record = AnchoredRecord {
                            anchored_value: event.content,
                            timestamp: event.timestamp,
                        };
                        self.check_record(witness, &record, |claimed, actual| {
                            claimed.abs_diff(actual) <= tolerance
                        })
                    }
                }
            }
            TSA_NETWORK => {
                let Some(tsa) = &backends.timestamp_authority else {
                    return unavailable(format!("no timestamp authority for {network}"));
                };
                match self.call(tsa.decode(tx)).await {
                    Err(CollaboratorError::Rejected(reason)) => self.anchor_failure(
                        FailureReason::AnchorNotFound,
                        format!("timestamp token rejected: {reason}"),
                    ),
                    Err(e) => unavailable(format!("timestamp token decode: {e}")),
                    Ok(record) => self.check_record(witness, &record, |claimed, actual| {
                        claimed.abs_diff(actual) <= tolerance
                    }),
                }
            }
            ledger_id => {
                let Some(ledger) = backends.ledgers.get(ledger_id) else {
                    return unavailable(format!("no ledger reader for network {ledger_id}"));
                };
                match self.call(ledger.get_transaction(tx)).await {
                    Err(e) => unavailable(format!("{ledger_id} lookup of {tx}: {e}")),
                    Ok(None) => self.anchor_failure(
                        FailureReason::AnchorNotFound,
                        format!("transaction {tx} not found on {ledger_id}"),
                    ),
                    // Anchored no later than the claimed time.
                    Ok(Some(record)) => self.check_record(witness, &record, |claimed, actual| {
                        actual <= claimed.saturating_add(tolerance)
                    }),
                }
            }
        }
    }

    fn check_record(
        &self,
        witness: &WitnessRevision,
        record: &AnchoredRecord,
        timestamp_ok: impl Fn(u64, u64) -> bool,
    ) -> Anchor {
        if !same_value(&record.anchored_value, &witness.witness_merkle_root) {
            return Anchor::Failed(Failure::new(
                FailureReason::AnchorValueMismatch,
                format!(
                    "anchor holds {}, revision claims {}",
                    record.anchored_value, witness.witness_merkle_root
                ),
            ));
        }
        if !timestamp_ok(witness.witness_timestamp, record.timestamp) {
            return self.anchor_failure(
                FailureReason::AnchorTimestampMismatch,
                format!(
                    "anchored at {}, revision claims {}",
                    record.timestamp, witness.witness_timestamp
                ),
            );
        }
        Anchor::Confirmed
    }

    fn anchor_failure(&self, reason: FailureReason, detail: String) -> Anchor {
        let failure = Failure::new(reason, detail);
        if self.config().anchor_failures_are_definitive {
            Anchor::Failed(failure.with_status(NodeStatus::Invalid))
        } else {
            Anchor::Failed(failure)
        }
    }
}

fn unavailable(detail: String) -> Anchor {
    Anchor::Failed(Failure::new(FailureReason::CollaboratorUnavailable, detail))
}

/// Compare hex-ish values ignoring a `0x` prefix and case.
fn same_value(a: &str, b: &str) -> bool {
    a.trim_start_matches("0x")
        .eq_ignore_ascii_case(b.trim_start_matches("0x"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_value() {
        assert!(same_value("0xABcd", "abcd"));
        assert!(!same_value("abce", "abcd"));
    }

    #[test]
    fn test_backends_debug_lists_networks() {
        let mut backends = WitnessBackends::new();
        backends.register_ledger("sepolia", crate::memory::MemoryLedger::new());
        let debug = format!("{backends:?}");
        assert!(debug.contains("sepolia"));
        assert!(debug.contains("relay: false"));
    }
}
