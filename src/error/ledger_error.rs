use std::fmt;

#[derive(Debug, Clone)]
pub enum LedgerError {
    Unavailable {
        endpoint: String,
        attempts: u32,
        reason: String,
    },

    Timeout {
        operation: String,
        duration_ms: Option<u64>,
    },

    Rejected {
        reason: String,
        transaction_id: Option<String>,
    },

    NotFound {
        artifact_id: u64,
    },

    InvalidResponse {
        operation: String,
        message: String,
    },
}

impl LedgerError {
    pub fn unavailable(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        LedgerError::Unavailable {
            endpoint: endpoint.into(),
            attempts: 1,
            reason: reason.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        LedgerError::Rejected {
            reason: reason.into(),
            transaction_id: None,
        }
    }

    pub fn invalid_response(operation: impl Into<String>, message: impl Into<String>) -> Self {
        LedgerError::InvalidResponse {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Transient failures worth another attempt. Contract-level refusals and
    /// malformed responses are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Unavailable { .. } | LedgerError::Timeout { .. })
    }

    /// True when a write may be sent again. A timed-out submit may already
    /// sit in the node's pool, so only `Unavailable` qualifies.
    pub fn is_resendable(&self) -> bool {
        matches!(self, LedgerError::Unavailable { .. })
    }

    /// True when the ledger could not be consulted at all, as opposed to
    /// answering with a definite result.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            LedgerError::Unavailable { .. }
                | LedgerError::Timeout { .. }
                | LedgerError::InvalidResponse { .. }
        )
    }

    pub(crate) fn with_attempts(self, attempts: u32) -> Self {
        match self {
            LedgerError::Unavailable { endpoint, reason, .. } => LedgerError::Unavailable {
                endpoint,
                attempts,
                reason,
            },
            other => other,
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            LedgerError::Unavailable { endpoint, .. } => {
                format!(
                    "Ledger node at {endpoint} is not reachable:\n  \
                     • Check that the node (e.g. Ganache) is running\n  \
                     • Verify host and port in modelseal.yaml or MODELSEAL_LEDGER_URL\n  \
                     • Run: modelseal ping"
                )
            }

            LedgerError::Timeout { operation, .. } => {
                format!(
                    "Operation '{operation}' timed out:\n  \
                     • The transaction may still be mined; run: modelseal verify\n  \
                     • Increase ledger.confirmation_timeout_secs\n  \
                     • Check node load and mining mode"
                )
            }

            LedgerError::Rejected { .. } => {
                "The contract refused the write:\n  \
                 • An anchor for this id may already exist with different digests\n  \
                 • Anchor a new version under a new id instead of overwriting\n  \
                 • Check the contract address in configuration".to_string()
            }

            LedgerError::NotFound { artifact_id } => {
                format!(
                    "No anchor recorded for artifact {artifact_id}:\n  \
                     • Run: modelseal anchor --id {artifact_id}\n  \
                     • Check that the contract address points at the right deployment"
                )
            }

            LedgerError::InvalidResponse { .. } => {
                "The ledger returned an unexpected response:\n  \
                 • Check that the contract address hosts the ModelStorage contract\n  \
                 • Verify the endpoint speaks Ethereum JSON-RPC".to_string()
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::Unavailable { .. } => "LEDGER_UNAVAILABLE",
            LedgerError::Timeout { .. } => "TIMEOUT",
            LedgerError::Rejected { .. } => "LEDGER_REJECTED",
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::InvalidResponse { .. } => "INVALID_RESPONSE",
        }
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Unavailable { endpoint, attempts, reason } => {
                write!(f, "Ledger unavailable at {endpoint}")?;
                if *attempts > 1 {
                    write!(f, " after {attempts} attempts")?;
                }
                write!(f, ": {reason}")
            }

            LedgerError::Timeout { operation, duration_ms } => {
                write!(f, "Timeout during {operation}")?;
                if let Some(ms) = duration_ms {
                    write!(f, " (after {}ms)", ms)?;
                }
                Ok(())
            }

            LedgerError::Rejected { reason, transaction_id } => {
                write!(f, "Ledger rejected write: {reason}")?;
                if let Some(tx) = transaction_id {
                    write!(f, " (tx {tx})")?;
                }
                Ok(())
            }

            LedgerError::NotFound { artifact_id } => {
                write!(f, "No anchor found for artifact {artifact_id}")
            }

            LedgerError::InvalidResponse { operation, message } => {
                write!(f, "Invalid ledger response to {operation}: {message}")
            }
        }
    }
}

impl std::error::Error for LedgerError {}
