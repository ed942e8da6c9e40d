//! The verifier and its collaborator wiring.

use crate::config::VerifierConfig;
use crate::provider::{
    CollaboratorError, FileContentProvider, LedgerReader, LinkedTreeResolver, RelayReader,
    SignatureBackend, TimestampAuthority,
};
use crate::signature::SignatureBackends;
use crate::witness::WitnessBackends;
use aqua_model::SignatureScheme;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Verification engine over injected collaborators.
///
/// A `Verifier` holds no per-run state; one instance may serve any number of
/// concurrent `build` calls, which then share its concurrency cap.
pub struct Verifier {
    config: VerifierConfig,
    files: Option<Arc<dyn FileContentProvider>>,
    signatures: SignatureBackends,
    witnesses: WitnessBackends,
    linked_trees: Option<Arc<dyn LinkedTreeResolver>>,
    permits: Arc<Semaphore>,
}

impl Verifier {
    pub fn builder() -> VerifierBuilder {
        VerifierBuilder::default()
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub(crate) fn files(&self) -> Option<&Arc<dyn FileContentProvider>> {
        self.files.as_ref()
    }

    pub(crate) fn signature_backends(&self) -> &SignatureBackends {
        &self.signatures
    }

    pub(crate) fn witness_backends(&self) -> &WitnessBackends {
        &self.witnesses
    }

    pub(crate) fn linked_trees(&self) -> Option<&Arc<dyn LinkedTreeResolver>> {
        self.linked_trees.as_ref()
    }

    /// Run one collaborator call under the concurrency cap and timeout.
    ///
    /// The permit is released as soon as the call settles.
    pub(crate) async fn call<T, F>(&self, call: F) -> Result<T, CollaboratorError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| CollaboratorError::Unavailable("verifier is shut down".to_string()))?;
        match tokio::time::timeout(self.config.collaborator_timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout {
                millis: self.config.collaborator_timeout_ms,
            }),
        }
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Verifier::builder().build()
    }
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier")
            .field("config", &self.config)
            .field("files", &self.files.is_some())
            .field("signatures", &self.signatures)
            .field("witnesses", &self.witnesses)
            .field("linked_trees", &self.linked_trees.is_some())
            .finish()
    }
}

/// Builder for [`Verifier`]. Starts with the built-in signature backends.
pub struct VerifierBuilder {
    config: VerifierConfig,
    files: Option<Arc<dyn FileContentProvider>>,
    signatures: SignatureBackends,
    witnesses: WitnessBackends,
    linked_trees: Option<Arc<dyn LinkedTreeResolver>>,
}

impl Default for VerifierBuilder {
    fn default() -> Self {
        Self {
            config: VerifierConfig::default(),
            files: None,
            signatures: SignatureBackends::with_builtin(),
            witnesses: WitnessBackends::new(),
            linked_trees: None,
        }
    }
}

impl VerifierBuilder {
    pub fn config(mut self, config: VerifierConfig) -> Self {
        self.config = config;
        self
    }

    pub fn files(mut self, files: impl FileContentProvider + 'static) -> Self {
        self.files = Some(Arc::new(files));
        self
    }

    pub fn signature_backend(
        mut self,
        scheme: SignatureScheme,
        backend: impl SignatureBackend + 'static,
    ) -> Self {
        self.signatures.register(scheme, backend);
        self
    }

    /// Replace the whole signature backend set.
    pub fn signature_backends(mut self, backends: SignatureBackends) -> Self {
        self.signatures = backends;
        self
    }

    pub fn ledger(
        mut self,
        network: impl Into<String>,
        reader: impl LedgerReader + 'static,
    ) -> Self {
        self.witnesses.register_ledger(network, reader);
        self
    }

    pub fn relay(mut self, relay: impl RelayReader + 'static) -> Self {
        self.witnesses.set_relay(relay);
        self
    }

    pub fn timestamp_authority(mut self, tsa: impl TimestampAuthority + 'static) -> Self {
        self.witnesses.set_timestamp_authority(tsa);
        self
    }

    pub fn linked_trees(mut self, resolver: impl LinkedTreeResolver + 'static) -> Self {
        self.linked_trees = Some(Arc::new(resolver));
        self
    }

    pub fn build(self) -> Verifier {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_calls.max(1)));
        Verifier {
            config: self.config,
            files: self.files,
            signatures: self.signatures,
            witnesses: self.witnesses,
            linked_trees: self.linked_trees,
            permits,
        }
    }
}
