mod record;

use std::fs;
use std::path::{Path, PathBuf};
use glob::glob;
use tracing::{debug, info, warn};
use crate::artifact::{Artifact, ArtifactId, Facet, Mutation};
use crate::error::{ModelSealError, Result};

pub use record::{ModelDataFile, StoredArtifact};

/// File-backed artifact store: one record per id plus a single backup slot.
///
/// Layout under `root`:
/// - `model_<id>.json`: the current artifact
/// - `model_<id>.backup.json`: the backup slot
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, id: ArtifactId) -> PathBuf {
        self.root.join(format!("model_{id}.json"))
    }

    pub fn backup_path(&self, id: ArtifactId) -> PathBuf {
        self.root.join(format!("model_{id}.backup.json"))
    }

    pub fn exists(&self, id: ArtifactId) -> bool {
        self.artifact_path(id).is_file()
    }

    pub fn has_backup(&self, id: ArtifactId) -> bool {
        self.backup_path(id).is_file()
    }

    /// Both facets are canonicalized before anything touches disk, so a facet
    /// that cannot be canonicalized leaves the previous record intact.
    pub fn save(&self, artifact: &Artifact) -> Result<()> {
        let record = StoredArtifact::from_artifact(artifact)?;
        self.write_record(&self.artifact_path(artifact.id), &record)?;
        debug!(artifact_id = artifact.id, "Saved artifact");
        Ok(())
    }

    pub fn load(&self, id: ArtifactId) -> Result<Artifact> {
        let path = self.artifact_path(id);
        if !path.is_file() {
            return Err(ModelSealError::ArtifactNotFound(id));
        }
        self.read_record(&path, id)?.into_artifact()
    }

    pub fn load_backup(&self, id: ArtifactId) -> Result<Artifact> {
        let path = self.backup_path(id);
        if !path.is_file() {
            return Err(ModelSealError::NoBackupAvailable(id));
        }
        self.read_record(&path, id)?.into_artifact()
    }

    /// Copy the current artifact into the backup slot, replacing any earlier backup.
    pub fn backup(&self, id: ArtifactId) -> Result<()> {
        let current = self.load(id)?;
        let record = StoredArtifact::from_artifact(&current)?;
        self.write_record(&self.backup_path(id), &record)?;
        info!(artifact_id = id, "Backup created at {}", self.backup_path(id).display());
        Ok(())
    }

    /// Copy the backup slot over the current artifact. The backup is kept.
    pub fn restore(&self, id: ArtifactId) -> Result<Artifact> {
        let artifact = self.load_backup(id)?;
        self.save(&artifact)?;
        info!(artifact_id = id, "Artifact restored from backup");
        Ok(artifact)
    }

    /// Deliberately modify a stored artifact. Unlike `save`, this is meant to
    /// break the anchor, and is logged as such.
    pub fn tamper(&self, id: ArtifactId, mutation: &Mutation) -> Result<Artifact> {
        let mut artifact = self.load(id)?;
        let facet = artifact.apply(mutation)?;
        self.save(&artifact)?;
        warn!(artifact_id = id, facet = %facet, "Artifact tampered: {:?}", mutation);
        Ok(artifact)
    }

    pub fn list(&self) -> Result<Vec<ArtifactId>> {
        let pattern = self.root.join("model_*.json");
        let pattern_str = pattern.to_string_lossy();

        let mut ids: Vec<ArtifactId> = glob(&pattern_str)
            .map_err(|e| ModelSealError::Config(e.to_string()))?
            .filter_map(|r| r.ok())
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?;
                let id = name.strip_prefix("model_")?.strip_suffix(".json")?;
                id.parse::<ArtifactId>().ok()
            })
            .collect();

        ids.sort_unstable();
        Ok(ids)
    }

    /// Ingest a trainer's `model_data.json` (`parameters` and `metadata` as
    /// JSON text) under `id`.
    pub fn import_model_data(&self, id: ArtifactId, path: impl AsRef<Path>) -> Result<Artifact> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let data: ModelDataFile = serde_json::from_str(&content).map_err(|e| {
            ModelSealError::Serialization(format!(
                "{} is missing required fields 'parameters' or 'metadata': {e}",
                path.display()
            ))
        })?;

        let artifact = Artifact::from_json_text(id, &data.parameters, &data.metadata)?;
        self.save(&artifact)?;
        info!(artifact_id = id, "Imported model data from {}", path.display());
        Ok(artifact)
    }

    pub fn canonical_facets(&self, id: ArtifactId) -> Result<Vec<(Facet, String)>> {
        let artifact = self.load(id)?;
        Facet::ALL
            .iter()
            .map(|f| Ok((*f, artifact.canonical_text(*f)?)))
            .collect()
    }

    fn read_record(&self, path: &Path, id: ArtifactId) -> Result<StoredArtifact> {
        let content = fs::read_to_string(path)?;
        let record: StoredArtifact = serde_json::from_str(&content)?;
        if record.id != id {
            return Err(ModelSealError::Serialization(format!(
                "{} holds artifact {}, expected {}",
                path.display(),
                record.id,
                id
            )));
        }
        Ok(record)
    }

    fn write_record(&self, path: &Path, record: &StoredArtifact) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
