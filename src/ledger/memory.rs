use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use async_trait::async_trait;
use crate::artifact::ArtifactId;
use crate::error::LedgerError;
use super::{LedgerBackend, LedgerResult, TxReceipt};

const ENDPOINT: &str = "memory://ledger";

#[derive(Debug)]
struct PendingTx {
    artifact_id: ArtifactId,
    parameters_hash: String,
    metadata_hash: String,
    polls: u32,
}

#[derive(Debug, Default)]
struct LedgerState {
    block_number: u64,
    tx_counter: u64,
    confirmed: HashMap<ArtifactId, (String, String)>,
    pending: HashMap<String, PendingTx>,
    receipts: HashMap<String, TxReceipt>,
    unreachable: bool,
    fail_next: u32,
    lost_submit_response: Option<LedgerError>,
    store_calls: u32,
    fetch_calls: u32,
}

/// In-process ledger with the same pending/confirmed split as a real chain:
/// a stored pair becomes visible to `fetch` only once its transaction is
/// mined, which happens on the `confirm_after_polls`-th receipt poll.
#[derive(Debug)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    confirm_after_polls: u32,
    reject_duplicates: bool,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            confirm_after_polls: 1,
            reject_duplicates: false,
        }
    }

    pub fn with_confirmation_polls(mut self, polls: u32) -> Self {
        self.confirm_after_polls = polls.max(1);
        self
    }

    /// Make the contract itself revert a second store for the same id.
    pub fn rejecting_duplicates(mut self) -> Self {
        self.reject_duplicates = true;
        self
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Fail the next `n` calls with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.lock().fail_next = n;
    }

    /// Accept and mine the next store, then answer the caller with `error`
    /// as if the response had been lost on the way back.
    pub fn lose_next_submit_response(&self, error: LedgerError) {
        self.lock().lost_submit_response = Some(error);
    }

    pub fn store_calls(&self) -> u32 {
        self.lock().store_calls
    }

    pub fn fetch_calls(&self) -> u32 {
        self.lock().fetch_calls
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Write directly into confirmed state, bypassing the anchor protocol.
    pub fn insert_confirmed(&self, id: ArtifactId, parameters_hash: &str, metadata_hash: &str) {
        let mut state = self.lock();
        state.block_number += 1;
        state
            .confirmed
            .insert(id, (parameters_hash.to_string(), metadata_hash.to_string()));
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_reachable(state: &mut LedgerState) -> LedgerResult<()> {
        if state.unreachable {
            return Err(LedgerError::unavailable(ENDPOINT, "connection refused"));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(LedgerError::unavailable(ENDPOINT, "transient failure"));
        }
        Ok(())
    }

    fn mine(&self, state: &mut LedgerState, transaction_id: &str) -> Option<TxReceipt> {
        let tx = state.pending.remove(transaction_id)?;
        state.block_number += 1;

        let duplicate = state.confirmed.contains_key(&tx.artifact_id);
        let success = !(self.reject_duplicates && duplicate);
        if success {
            state
                .confirmed
                .insert(tx.artifact_id, (tx.parameters_hash, tx.metadata_hash));
        }

        let receipt = TxReceipt {
            transaction_id: transaction_id.to_string(),
            block_number: state.block_number,
            success,
        };
        state.receipts.insert(transaction_id.to_string(), receipt.clone());
        Some(receipt)
    }
}

#[async_trait]
impl LedgerBackend for MemoryLedger {
    fn endpoint(&self) -> String {
        ENDPOINT.to_string()
    }

    async fn block_number(&self) -> LedgerResult<u64> {
        let mut state = self.lock();
        Self::check_reachable(&mut state)?;
        Ok(state.block_number)
    }

    async fn submit_store(
        &self,
        id: ArtifactId,
        parameters_hash: &str,
        metadata_hash: &str,
    ) -> LedgerResult<String> {
        let mut state = self.lock();
        Self::check_reachable(&mut state)?;

        state.store_calls += 1;
        state.tx_counter += 1;
        let transaction_id = format!("0x{:064x}", state.tx_counter);
        state.pending.insert(
            transaction_id.clone(),
            PendingTx {
                artifact_id: id,
                parameters_hash: parameters_hash.to_string(),
                metadata_hash: metadata_hash.to_string(),
                polls: 0,
            },
        );

        if let Some(error) = state.lost_submit_response.take() {
            self.mine(&mut state, &transaction_id);
            return Err(error);
        }
        Ok(transaction_id)
    }

    async fn receipt(&self, transaction_id: &str) -> LedgerResult<Option<TxReceipt>> {
        let mut state = self.lock();
        Self::check_reachable(&mut state)?;

        if let Some(receipt) = state.receipts.get(transaction_id) {
            return Ok(Some(receipt.clone()));
        }

        let ready = match state.pending.get_mut(transaction_id) {
            Some(tx) => {
                tx.polls += 1;
                tx.polls >= self.confirm_after_polls
            }
            None => return Ok(None),
        };

        if ready {
            Ok(self.mine(&mut state, transaction_id))
        } else {
            Ok(None)
        }
    }

    async fn fetch(&self, id: ArtifactId) -> LedgerResult<Option<(String, String)>> {
        let mut state = self.lock();
        Self::check_reachable(&mut state)?;
        state.fetch_calls += 1;
        Ok(state.confirmed.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pending_write_is_invisible() {
        let ledger = MemoryLedger::new().with_confirmation_polls(2);
        let tx = ledger.submit_store(1, "aa", "bb").await.unwrap();

        assert_eq!(ledger.fetch(1).await.unwrap(), None);
        assert_eq!(ledger.receipt(&tx).await.unwrap(), None);
        assert_eq!(ledger.fetch(1).await.unwrap(), None);

        let receipt = ledger.receipt(&tx).await.unwrap().unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.block_number, 1);
        assert_eq!(ledger.fetch(1).await.unwrap(), Some(("aa".into(), "bb".into())));
        assert_eq!(ledger.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_contract_rejects_duplicate() {
        let ledger = MemoryLedger::new().rejecting_duplicates();
        let first = ledger.submit_store(1, "aa", "bb").await.unwrap();
        assert!(ledger.receipt(&first).await.unwrap().unwrap().success);

        let second = ledger.submit_store(1, "cc", "dd").await.unwrap();
        assert!(!ledger.receipt(&second).await.unwrap().unwrap().success);
        assert_eq!(ledger.fetch(1).await.unwrap(), Some(("aa".into(), "bb".into())));
    }

    #[tokio::test]
    async fn test_lost_submit_response_still_lands() {
        let ledger = MemoryLedger::new().with_confirmation_polls(5);
        ledger.lose_next_submit_response(LedgerError::Timeout {
            operation: "eth_sendTransaction".into(),
            duration_ms: Some(30_000),
        });

        assert!(ledger.submit_store(1, "aa", "bb").await.is_err());
        assert_eq!(ledger.store_calls(), 1);
        assert_eq!(ledger.pending_count(), 0);
        assert_eq!(ledger.fetch(1).await.unwrap(), Some(("aa".into(), "bb".into())));
    }

    #[tokio::test]
    async fn test_unreachable() {
        let ledger = MemoryLedger::new();
        ledger.set_unreachable(true);
        let err = ledger.fetch(1).await.unwrap_err();
        assert!(err.is_unreachable());
        assert_eq!(ledger.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_fail_next_is_transient() {
        let ledger = MemoryLedger::new();
        ledger.fail_next(1);
        assert!(ledger.block_number().await.is_err());
        assert_eq!(ledger.block_number().await.unwrap(), 0);
    }
}
