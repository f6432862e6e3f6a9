mod ledger_error;
mod parser;

use thiserror::Error;

pub use ledger_error::LedgerError;
pub use parser::{classify_rpc_error, classify_transport_error, ErrorContext};

#[derive(Error, Debug)]
pub enum ModelSealError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(u64),

    #[error("No backup available for artifact {0}")]
    NoBackupAvailable(u64),

    #[error("Invalid mutation: {0}")]
    InvalidMutation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelSealError {
    pub fn ledger(&self) -> Option<&LedgerError> {
        match self {
            ModelSealError::Ledger(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelSealError>;
