use regex::Regex;
use super::ledger_error::LedgerError;

pub fn classify_rpc_error(code: i64, message: &str, context: ErrorContext) -> LedgerError {
    let msg_lower = message.to_lowercase();

    if msg_lower.contains("revert") {
        return LedgerError::Rejected {
            reason: extract_revert_reason(message).unwrap_or_else(|| message.to_string()),
            transaction_id: context.transaction_id,
        };
    }

    match code {
        // Node-side rate limiting or overload
        -32005 | -32603 if msg_lower.contains("limit") || msg_lower.contains("busy") => {
            LedgerError::Unavailable {
                endpoint: context.endpoint.unwrap_or_default(),
                attempts: 1,
                reason: message.to_string(),
            }
        }

        -32000 if msg_lower.contains("insufficient funds") || msg_lower.contains("nonce") => {
            LedgerError::Rejected {
                reason: message.to_string(),
                transaction_id: context.transaction_id,
            }
        }

        _ => LedgerError::InvalidResponse {
            operation: context.operation.unwrap_or_else(|| "rpc".to_string()),
            message: format!("[{code}] {message}"),
        },
    }
}

pub fn classify_transport_error(error: &reqwest::Error, context: ErrorContext) -> LedgerError {
    let operation = context.operation.clone().unwrap_or_else(|| "rpc".to_string());

    if error.is_timeout() {
        return LedgerError::Timeout {
            operation,
            duration_ms: context.timeout_ms,
        };
    }

    if error.is_decode() {
        return LedgerError::InvalidResponse {
            operation,
            message: error.to_string(),
        };
    }

    if let Some(status) = error.status() {
        if status.is_client_error() {
            return LedgerError::InvalidResponse {
                operation,
                message: format!("HTTP {status}"),
            };
        }
    }

    LedgerError::Unavailable {
        endpoint: context.endpoint.unwrap_or_default(),
        attempts: 1,
        reason: error.to_string(),
    }
}

fn extract_revert_reason(message: &str) -> Option<String> {
    // Ganache: "VM Exception while processing transaction: revert <reason>"
    // geth:    "execution reverted: <reason>"
    let revert_re = Regex::new(r"(?i)(?:revert(?:ed)?:?)\s+(.+)$").ok()?;
    revert_re
        .captures(message.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Default, Clone)]
pub struct ErrorContext {
    pub operation: Option<String>,
    pub endpoint: Option<String>,
    pub transaction_id: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, op: impl Into<String>) -> Self {
        self.operation = Some(op.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_transaction(mut self, tx: impl Into<String>) -> Self {
        self.transaction_id = Some(tx.into());
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }
}
