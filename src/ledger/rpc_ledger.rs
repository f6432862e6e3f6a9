use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use crate::artifact::ArtifactId;
use crate::config::LedgerConfig;
use crate::error::{
    classify_rpc_error, classify_transport_error, ErrorContext, LedgerError, ModelSealError, Result,
};
use super::abi;
use super::rpc::{JsonRpcRequest, JsonRpcResponse};
use super::{LedgerBackend, LedgerResult, TxReceipt};

/// Ethereum JSON-RPC backend for the `ModelStorage` contract.
pub struct RpcLedger {
    http: reqwest::Client,
    url: String,
    contract: Option<String>,
    from_account: Option<String>,
    gas: u64,
    request_timeout: Duration,
    next_id: AtomicU64,
    sender: OnceCell<String>,
}

impl RpcLedger {
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        let contract = config.contract_address.as_deref().ok_or_else(|| {
            ModelSealError::Config(
                "ledger.contract_address is not set (or pass --contract / MODELSEAL_CONTRACT)".into(),
            )
        })?;
        validate_address(contract)?;
        if let Some(from) = config.from_account.as_deref() {
            validate_address(from)?;
        }

        let mut ledger = Self::for_node(config)?;
        ledger.contract = Some(contract.to_lowercase());
        Ok(ledger)
    }

    /// A client without a contract, good for node-level calls such as
    /// `block_number`.
    pub fn for_node(config: &LedgerConfig) -> Result<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ModelSealError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: config.endpoint(),
            contract: None,
            from_account: config.from_account.clone(),
            gas: config.gas,
            request_timeout,
            next_id: AtomicU64::new(1),
            sender: OnceCell::new(),
        })
    }

    pub fn contract(&self) -> Option<&str> {
        self.contract.as_deref()
    }

    async fn call(&self, method: &str, params: Value) -> LedgerResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let context = || {
            ErrorContext::new()
                .with_operation(method)
                .with_endpoint(&self.url)
                .with_timeout_ms(self.request_timeout.as_millis() as u64)
        };

        debug!(method, id, "JSON-RPC request to {}", self.url);

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| classify_transport_error(&e, context()))?;

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| classify_transport_error(&e, context()))?;

        if !body.matches_id(id) {
            warn!(method, id, "JSON-RPC response id does not match request");
        }

        body.into_result()
            .map_err(|e| classify_rpc_error(e.code, &e.full_message(), context()))
    }

    fn contract_address(&self, operation: &str) -> LedgerResult<&str> {
        self.contract
            .as_deref()
            .ok_or_else(|| LedgerError::invalid_response(operation, "no contract address configured"))
    }

    async fn sender(&self) -> LedgerResult<&str> {
        let account = self
            .sender
            .get_or_try_init(|| async {
                if let Some(from) = &self.from_account {
                    return Ok(from.to_lowercase());
                }
                let accounts = self.call("eth_accounts", json!([])).await?;
                accounts
                    .as_array()
                    .and_then(|a| a.first())
                    .and_then(|v| v.as_str())
                    .map(str::to_lowercase)
                    .ok_or_else(|| {
                        LedgerError::invalid_response("eth_accounts", "no accounts found on the node")
                    })
            })
            .await?;
        Ok(account.as_str())
    }
}

#[async_trait]
impl LedgerBackend for RpcLedger {
    fn endpoint(&self) -> String {
        self.url.clone()
    }

    async fn block_number(&self) -> LedgerResult<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let quantity = result
            .as_str()
            .ok_or_else(|| LedgerError::invalid_response("eth_blockNumber", "result is not a string"))?;
        abi::parse_quantity(quantity)
    }

    async fn submit_store(
        &self,
        id: ArtifactId,
        parameters_hash: &str,
        metadata_hash: &str,
    ) -> LedgerResult<String> {
        let contract = self.contract_address("eth_sendTransaction")?;
        let from = self.sender().await?;
        let data = abi::encode_store(id, parameters_hash, metadata_hash);

        let result = self
            .call(
                "eth_sendTransaction",
                json!([{
                    "from": from,
                    "to": contract,
                    "data": data,
                    "gas": format!("0x{:x}", self.gas),
                }]),
            )
            .await?;

        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LedgerError::invalid_response("eth_sendTransaction", "missing transaction hash"))
    }

    async fn receipt(&self, transaction_id: &str) -> LedgerResult<Option<TxReceipt>> {
        let result = self
            .call("eth_getTransactionReceipt", json!([transaction_id]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }

        let block_number = match result.get("blockNumber").and_then(|v| v.as_str()) {
            Some(n) => abi::parse_quantity(n)?,
            None => return Ok(None),
        };

        // Pre-Byzantium receipts have no status field.
        let success = match result.get("status").and_then(|v| v.as_str()) {
            Some(status) => abi::parse_quantity(status)? == 1,
            None => true,
        };

        Ok(Some(TxReceipt {
            transaction_id: transaction_id.to_string(),
            block_number,
            success,
        }))
    }

    async fn fetch(&self, id: ArtifactId) -> LedgerResult<Option<(String, String)>> {
        let contract = self.contract_address("eth_call")?;
        let result = self
            .call(
                "eth_call",
                json!([{ "to": contract, "data": abi::encode_fetch(id) }, "latest"]),
            )
            .await?;

        let data = result
            .as_str()
            .ok_or_else(|| LedgerError::invalid_response("eth_call", "result is not a string"))?;
        let (parameters_hash, metadata_hash) = abi::decode_string_pair(data)?;

        // The contract answers unknown ids with empty strings.
        if parameters_hash.is_empty() && metadata_hash.is_empty() {
            return Ok(None);
        }
        Ok(Some((parameters_hash, metadata_hash)))
    }
}

fn validate_address(address: &str) -> Result<()> {
    let digits = address.strip_prefix("0x").unwrap_or("");
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ModelSealError::Config(format!(
            "'{address}' is not a 20-byte hex address"
        )));
    }
    Ok(())
}
