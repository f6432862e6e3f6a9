use std::fs;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::artifact::ArtifactId;
use crate::error::Result;
use super::AnchorReceipt;

pub const CACHE_FILE: &str = "anchors.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub artifact_id: ArtifactId,
    pub parameters_hash: String,
    pub metadata_hash: String,
    pub transaction_id: Option<String>,
    pub block_number: Option<u64>,
    pub anchored_at: DateTime<Utc>,
}

impl AnchorRecord {
    pub fn from_receipt(receipt: &AnchorReceipt) -> Self {
        Self {
            artifact_id: receipt.artifact_id,
            parameters_hash: receipt.digests.parameters.to_hex(),
            metadata_hash: receipt.digests.metadata.to_hex(),
            transaction_id: receipt.transaction_id.clone(),
            block_number: receipt.block_number,
            anchored_at: Utc::now(),
        }
    }
}

/// Local record of anchors written from this machine. Informational only:
/// verification always consults the ledger.
#[derive(Debug, Clone)]
pub struct AnchorCache {
    path: PathBuf,
}

impl AnchorCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(CACHE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<AnchorRecord>> {
        if !self.path.is_file() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn get(&self, id: ArtifactId) -> Result<Option<AnchorRecord>> {
        Ok(self.load()?.into_iter().find(|r| r.artifact_id == id))
    }

    /// Insert or replace the record for `record.artifact_id`. A record that
    /// only confirms an existing anchor keeps the earlier transaction details.
    pub fn record(&self, record: AnchorRecord) -> Result<()> {
        let mut records = self.load()?;
        match records.iter_mut().find(|r| r.artifact_id == record.artifact_id) {
            Some(existing) => {
                let transaction_id = record.transaction_id.clone().or(existing.transaction_id.take());
                let block_number = record.block_number.or(existing.block_number);
                *existing = AnchorRecord {
                    transaction_id,
                    block_number,
                    ..record
                };
            }
            None => records.push(record),
        }
        records.sort_by_key(|r| r.artifact_id);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&records)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
