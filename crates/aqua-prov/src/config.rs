//! Verifier configuration.

use aqua_hash::HashAlgorithm;
use aqua_model::LatestPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid verifier configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Verification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Digest used for every hash in the run (default: sha3-256)
    pub hash_algorithm: HashAlgorithm,
    /// How `build` picks a start revision when none is given
    pub latest_policy: LatestPolicy,
    /// Maximum collaborator calls in flight at once (default: 8)
    pub max_concurrent_calls: usize,
    /// Per-call collaborator timeout in milliseconds (default: 10000)
    pub collaborator_timeout_ms: u64,
    /// Report missing or late anchors as `Invalid` instead of `Error`
    pub anchor_failures_are_definitive: bool,
    /// When false, witnesses are checked on proof replay alone
    pub require_anchor_confirmation: bool,
    /// Slack allowed between claimed and anchored timestamps, in seconds
    pub anchor_timestamp_tolerance_secs: u64,
    /// Maximum nesting of linked trees (default: 16)
    pub max_link_depth: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        VerifierConfig {
            hash_algorithm: HashAlgorithm::default(),
            latest_policy: LatestPolicy::default(),
            max_concurrent_calls: 8,
            collaborator_timeout_ms: 10_000,
            anchor_failures_are_definitive: false,
            require_anchor_confirmation: true,
            anchor_timestamp_tolerance_secs: 0,
            max_link_depth: 16,
        }
    }
}

impl VerifierConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Load configuration from a TOML file; missing keys take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    /// Configuration for verifying without any network access.
    pub fn offline() -> Self {
        VerifierConfig {
            require_anchor_confirmation: false,
            ..Self::default()
        }
    }
}
