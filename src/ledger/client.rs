use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use crate::artifact::{Artifact, ArtifactId};
use crate::digest::{ArtifactDigests, Digest};
use crate::error::{LedgerError, Result};
use super::cache::{AnchorCache, AnchorRecord};
use super::retry::RetryPolicy;
use super::{AnchorReceipt, LedgerBackend, LedgerResult, LedgerStatus, TxReceipt};

/// How long to wait for a submitted transaction to be mined.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Writes digest anchors to the ledger and reads them back.
///
/// Anchors are write-once per id: anchoring an id that already carries
/// different digests fails with [`LedgerError::Rejected`], anchoring the same
/// digests again succeeds without submitting anything. Anchors for the same
/// id are serialized through a per-id lock; reads never take it.
pub struct AnchorClient {
    backend: Arc<dyn LedgerBackend>,
    retry: RetryPolicy,
    confirmation: ConfirmationPolicy,
    cache: Option<AnchorCache>,
    locks: AnchorLocks,
}

impl AnchorClient {
    pub fn new(backend: Arc<dyn LedgerBackend>) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
            confirmation: ConfirmationPolicy::default(),
            cache: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_confirmation(mut self, confirmation: ConfirmationPolicy) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn with_cache(mut self, cache: AnchorCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn endpoint(&self) -> String {
        self.backend.endpoint()
    }

    pub fn cache(&self) -> Option<&AnchorCache> {
        self.cache.as_ref()
    }

    pub async fn ping(&self) -> LedgerResult<LedgerStatus> {
        let block_number = self
            .retry
            .run("eth_blockNumber", || self.backend.block_number())
            .await?;
        Ok(LedgerStatus {
            endpoint: self.backend.endpoint(),
            block_number,
        })
    }

    /// Digests anchored for `id` in confirmed ledger state.
    pub async fn query(&self, id: ArtifactId) -> LedgerResult<ArtifactDigests> {
        let stored = self
            .retry
            .run("fetch", || self.backend.fetch(id))
            .await?;

        let (parameters_hash, metadata_hash) = stored.ok_or(LedgerError::NotFound { artifact_id: id })?;
        if parameters_hash.is_empty() && metadata_hash.is_empty() {
            return Err(LedgerError::NotFound { artifact_id: id });
        }

        let parse = |hash: &str| {
            Digest::from_hex(hash).map_err(|e| {
                LedgerError::invalid_response("fetch", format!("anchor for artifact {id}: {e}"))
            })
        };

        Ok(ArtifactDigests {
            parameters: parse(&parameters_hash)?,
            metadata: parse(&metadata_hash)?,
        })
    }

    pub async fn anchor(&self, id: ArtifactId, digests: ArtifactDigests) -> LedgerResult<AnchorReceipt> {
        let entry = self.lock_for(id);
        let _guard = entry.lock.lock().await;

        if self.check_existing(id, &digests).await? {
            return Ok(self.already_anchored(id, digests));
        }

        let transaction_id = match self.submit_store(id, &digests).await? {
            Some(transaction_id) => transaction_id,
            None => return Ok(self.already_anchored(id, digests)),
        };

        let tx = self.wait_for_confirmation(&transaction_id).await?;
        if !tx.success {
            return Err(LedgerError::Rejected {
                reason: format!("store transaction for artifact {id} reverted"),
                transaction_id: Some(transaction_id),
            });
        }

        info!(artifact_id = id, block = tx.block_number, "Anchor confirmed in transaction {}", tx.transaction_id);

        let receipt = AnchorReceipt {
            artifact_id: id,
            digests,
            transaction_id: Some(tx.transaction_id),
            block_number: Some(tx.block_number),
            already_anchored: false,
        };
        self.record(&receipt);
        Ok(receipt)
    }

    /// `anchor` bounded by an overall deadline.
    pub async fn anchor_with_timeout(
        &self,
        id: ArtifactId,
        digests: ArtifactDigests,
        timeout: Duration,
    ) -> LedgerResult<AnchorReceipt> {
        tokio::time::timeout(timeout, self.anchor(id, digests))
            .await
            .unwrap_or_else(|_| {
                Err(LedgerError::Timeout {
                    operation: format!("anchor artifact {id}"),
                    duration_ms: Some(timeout.as_millis() as u64),
                })
            })
    }

    pub async fn anchor_artifact(&self, artifact: &Artifact) -> Result<AnchorReceipt> {
        let digests = ArtifactDigests::compute(artifact)?;
        Ok(self.anchor(artifact.id, digests).await?)
    }

    async fn wait_for_confirmation(&self, transaction_id: &str) -> LedgerResult<TxReceipt> {
        let started = Instant::now();
        let deadline = started + self.confirmation.timeout;

        loop {
            let receipt = self
                .retry
                .run("receipt", || self.backend.receipt(transaction_id))
                .await?;

            if let Some(receipt) = receipt {
                return Ok(receipt);
            }

            if Instant::now() >= deadline {
                return Err(LedgerError::Timeout {
                    operation: format!("confirmation of {transaction_id}"),
                    duration_ms: Some(started.elapsed().as_millis() as u64),
                });
            }

            debug!(transaction_id, "Transaction pending, polling again");
            tokio::time::sleep(self.confirmation.poll_interval).await;
        }
    }

    /// `Ok(true)` when `id` already carries `digests`, `Ok(false)` when it
    /// carries nothing, `Rejected` when it carries something else.
    async fn check_existing(&self, id: ArtifactId, digests: &ArtifactDigests) -> LedgerResult<bool> {
        match self.query(id).await {
            Ok(existing) if existing == *digests => Ok(true),
            Ok(existing) => {
                warn!(
                    artifact_id = id,
                    anchored_parameters = %existing.parameters.short(),
                    requested_parameters = %digests.parameters.short(),
                    "Refusing to re-anchor artifact with different digests"
                );
                Err(LedgerError::rejected(format!(
                    "artifact {id} is already anchored with different digests; anchor a new version under a new id"
                )))
            }
            Err(LedgerError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn already_anchored(&self, id: ArtifactId, digests: ArtifactDigests) -> AnchorReceipt {
        info!(artifact_id = id, "Artifact already anchored with identical digests");
        let receipt = AnchorReceipt {
            artifact_id: id,
            digests,
            transaction_id: None,
            block_number: None,
            already_anchored: true,
        };
        self.record(&receipt);
        receipt
    }

    /// Send the store transaction. Only failures that cannot have reached the
    /// node are resent, and the anchor is read again before every resend.
    /// `None` means an earlier attempt landed with these digests.
    async fn submit_store(&self, id: ArtifactId, digests: &ArtifactDigests) -> LedgerResult<Option<String>> {
        let parameters_hash = digests.parameters.to_hex();
        let metadata_hash = digests.metadata.to_hex();
        info!(
            artifact_id = id,
            parameters_hash = %parameters_hash,
            metadata_hash = %metadata_hash,
            "Submitting anchor to {}",
            self.backend.endpoint()
        );

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match self.backend.submit_store(id, &parameters_hash, &metadata_hash).await {
                Ok(transaction_id) => return Ok(Some(transaction_id)),
                Err(err) => err,
            };
            if !err.is_resendable() || attempt >= max_attempts {
                return Err(err.with_attempts(attempt));
            }

            let delay = self.retry.delay_after(attempt);
            warn!(
                artifact_id = id,
                attempt,
                max_attempts,
                "Store submission failed, retrying in {:?}: {}",
                delay,
                err
            );
            tokio::time::sleep(delay).await;
            attempt += 1;

            if self.check_existing(id, digests).await? {
                return Ok(None);
            }
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn lock_for(&self, id: ArtifactId) -> LockEntry<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        LockEntry {
            locks: &self.locks,
            id,
            lock: Arc::clone(locks.entry(id).or_default()),
        }
    }

    fn record(&self, receipt: &AnchorReceipt) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.record(AnchorRecord::from_receipt(receipt)) {
                warn!(artifact_id = receipt.artifact_id, "Could not update anchor cache: {}", e);
            }
        }
    }
}

type AnchorLocks = Mutex<HashMap<ArtifactId, Arc<tokio::sync::Mutex<()>>>>;

/// A handle on one id's anchor lock. The map entry goes away with the last
/// handle, so ids anchored once do not accumulate.
struct LockEntry<'a> {
    locks: &'a AnchorLocks,
    id: ArtifactId,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for LockEntry<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Handles are only cloned under the map lock: the map's copy plus ours.
        if Arc::strong_count(&self.lock) <= 2 {
            locks.remove(&self.id);
        }
    }
}
