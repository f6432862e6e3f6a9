use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::{ModelSealError, Result};
use crate::ledger::{ConfirmationPolicy, RetryPolicy};

pub const CONFIG_FILE: &str = "modelseal.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ModelSealError::Config(format!("{}: {}", path.display(), e)))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Load `path` if given, else `modelseal.yaml` in the working directory
    /// if present, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).is_file() => Self::load(CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Full endpoint URL; takes precedence over scheme/host/port.
    pub url: Option<String>,
    pub contract_address: Option<String>,
    /// Sending account. The node's first account when unset.
    pub from_account: Option<String>,
    pub gas: u64,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub confirmation_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8545,
            url: None,
            contract_address: None,
            from_account: None,
            gas: 3_000_000,
            request_timeout_secs: 30,
            poll_interval_ms: 500,
            confirmation_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EipInfo {
    eip_address: String,
}

#[derive(Debug, Deserialize)]
struct ContractInfo {
    contract_address: String,
}

impl LedgerConfig {
    pub fn endpoint(&self) -> String {
        match &self.url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("{}://{}:{}", self.scheme, self.host, self.port),
        }
    }

    /// Build from the files written when the node was provisioned
    /// (`{"eip_address": ...}`) and the contract deployed
    /// (`{"contract_address": ...}`).
    pub fn from_deployment_files(eip_info: impl AsRef<Path>, contract_info: impl AsRef<Path>) -> Result<Self> {
        let eip: EipInfo = read_json(eip_info.as_ref())?;
        let contract: ContractInfo = read_json(contract_info.as_ref())?;
        Ok(Self {
            host: eip.eip_address,
            contract_address: Some(contract.contract_address),
            ..Self::default()
        })
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_secs(self.confirmation_timeout_secs),
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| ModelSealError::Config(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| ModelSealError::Config(format!("{}: {}", path.display(), e)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
    pub backoff: f64,
    pub max_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            interval_ms: policy.interval.as_millis() as u64,
            backoff: policy.backoff,
            max_interval_ms: policy.max_interval.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.interval_ms))
            .with_backoff(self.backoff, Duration::from_millis(self.max_interval_ms))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dir: Option<PathBuf>,
}

impl StoreConfig {
    pub fn resolve_dir(&self) -> PathBuf {
        match &self.dir {
            Some(dir) => dir.clone(),
            None => dirs::data_local_dir()
                .map(|d| d.join("modelseal"))
                .unwrap_or_else(|| PathBuf::from(".modelseal")),
        }
    }
}
