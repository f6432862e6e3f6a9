use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::artifact::{Artifact, ArtifactId, Facet};
use crate::error::Result;

/// On-disk form of an artifact. Facets are kept as canonical JSON text, the
/// exact bytes that get digested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub id: ArtifactId,
    pub parameters: String,
    pub metadata: String,
    pub saved_at: DateTime<Utc>,
}

impl StoredArtifact {
    pub fn from_artifact(artifact: &Artifact) -> Result<Self> {
        Ok(Self {
            id: artifact.id,
            parameters: artifact.canonical_text(Facet::Parameters)?,
            metadata: artifact.canonical_text(Facet::Metadata)?,
            saved_at: Utc::now(),
        })
    }

    pub fn into_artifact(self) -> Result<Artifact> {
        Artifact::from_json_text(self.id, &self.parameters, &self.metadata)
    }
}

/// The trainer's export format: both facets serialized as JSON strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDataFile {
    pub parameters: String,
    pub metadata: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_holds_canonical_text() {
        let artifact = Artifact::from_values(
            7,
            json!([[1.5, 2.0]]),
            json!({"loss": 0.01, "epochs": 250}),
        );
        let record = StoredArtifact::from_artifact(&artifact).unwrap();
        assert_eq!(record.parameters, "[[1.5,2]]");
        assert_eq!(record.metadata, r#"{"epochs":250,"loss":0.01}"#);
        assert_eq!(record.into_artifact().unwrap(), artifact);
    }
}
