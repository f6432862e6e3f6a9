pub mod abi;
mod cache;
mod client;
mod memory;
pub mod rpc;
mod retry;
mod rpc_ledger;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::artifact::ArtifactId;
use crate::digest::ArtifactDigests;
use crate::error::LedgerError;

pub use cache::{AnchorCache, AnchorRecord};
pub use client::{AnchorClient, ConfirmationPolicy};
pub use memory::MemoryLedger;
pub use retry::RetryPolicy;
pub use rpc_ledger::RpcLedger;

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Mined transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub transaction_id: String,
    pub block_number: u64,
    pub success: bool,
}

/// Outcome of a successful `anchor` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorReceipt {
    pub artifact_id: ArtifactId,
    pub digests: ArtifactDigests,
    pub transaction_id: Option<String>,
    pub block_number: Option<u64>,
    /// The id already carried these exact digests; nothing was submitted.
    pub already_anchored: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStatus {
    pub endpoint: String,
    pub block_number: u64,
}

/// The contract surface the anchor protocol relies on: `store` a pair of
/// digests under an id, `fetch` them back from confirmed state.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    fn endpoint(&self) -> String;

    async fn block_number(&self) -> LedgerResult<u64>;

    /// Submit a store transaction. Returns the transaction id once the node
    /// accepted it; inclusion is observed through `receipt`.
    async fn submit_store(
        &self,
        id: ArtifactId,
        parameters_hash: &str,
        metadata_hash: &str,
    ) -> LedgerResult<String>;

    /// `None` while the transaction is still pending.
    async fn receipt(&self, transaction_id: &str) -> LedgerResult<Option<TxReceipt>>;

    /// Read confirmed state only. `None` when nothing is stored for `id`.
    async fn fetch(&self, id: ArtifactId) -> LedgerResult<Option<(String, String)>>;
}
