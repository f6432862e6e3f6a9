mod tensor;

use std::fmt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::canon::{canonical_json_string, CanonError};
use crate::error::{ModelSealError, Result};

pub use tensor::{ParameterSet, Tensor, TrainingMetadata};

pub type ArtifactId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facet {
    Parameters,
    Metadata,
}

impl Facet {
    pub const ALL: [Facet; 2] = [Facet::Parameters, Facet::Metadata];

    pub fn as_str(&self) -> &'static str {
        match self {
            Facet::Parameters => "parameters",
            Facet::Metadata => "metadata",
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trained model's parameters and metadata, addressed by a numeric id.
///
/// Facets are held as JSON values, which cannot contain NaN or infinities;
/// the typed constructors reject those before an `Artifact` exists.
/// Equality is over canonical form, so `1.0` and `1` compare equal.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: ArtifactId,
    parameters: Value,
    metadata: Value,
}

impl Artifact {
    pub fn new(id: ArtifactId, parameters: &ParameterSet, metadata: &TrainingMetadata) -> Result<Self> {
        Ok(Self {
            id,
            parameters: parameters.to_value()?,
            metadata: metadata.to_value()?,
        })
    }

    pub fn from_values(id: ArtifactId, parameters: Value, metadata: Value) -> Self {
        Self { id, parameters, metadata }
    }

    pub fn from_json_text(id: ArtifactId, parameters: &str, metadata: &str) -> Result<Self> {
        let parse = |facet: Facet, text: &str| -> Result<Value> {
            serde_json::from_str(text).map_err(|e| {
                ModelSealError::Serialization(format!("{facet} facet of artifact {id}: {e}"))
            })
        };
        Ok(Self {
            id,
            parameters: parse(Facet::Parameters, parameters)?,
            metadata: parse(Facet::Metadata, metadata)?,
        })
    }

    pub fn facet(&self, facet: Facet) -> &Value {
        match facet {
            Facet::Parameters => &self.parameters,
            Facet::Metadata => &self.metadata,
        }
    }

    pub fn canonical_text(&self, facet: Facet) -> std::result::Result<String, CanonError> {
        canonical_json_string(self.facet(facet))
    }

    pub fn parameters(&self) -> Result<ParameterSet> {
        serde_json::from_value(self.parameters.clone()).map_err(|e| {
            ModelSealError::Serialization(format!("parameters of artifact {} are not tensors: {e}", self.id))
        })
    }

    pub fn metadata(&self) -> Result<TrainingMetadata> {
        serde_json::from_value(self.metadata.clone()).map_err(|e| {
            ModelSealError::Serialization(format!("metadata of artifact {} is not a record: {e}", self.id))
        })
    }

    /// Apply a mutation in place. The artifact is left untouched on error.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<Facet> {
        match mutation {
            Mutation::ShiftFirstTensor { delta } => {
                let mut params = self.parameters()?;
                let first = params.tensors.first_mut().ok_or_else(|| {
                    ModelSealError::InvalidMutation(format!("artifact {} has no parameter tensors", self.id))
                })?;
                first.shift(*delta);
                self.parameters = params.to_value()?;
                Ok(Facet::Parameters)
            }

            Mutation::ShiftParameter { tensor, index, delta } => {
                let mut params = self.parameters()?;
                let count = params.tensors.len();
                let target = params.tensors.get_mut(*tensor).ok_or_else(|| {
                    ModelSealError::InvalidMutation(format!(
                        "tensor {tensor} out of range (artifact {} has {count})",
                        self.id
                    ))
                })?;
                if !target.shift_at(*index, *delta) {
                    return Err(ModelSealError::InvalidMutation(format!(
                        "scalar {index} out of range in tensor {tensor}"
                    )));
                }
                self.parameters = params.to_value()?;
                Ok(Facet::Parameters)
            }

            Mutation::SetMetadata { key, value } => {
                let map = self.metadata.as_object_mut().ok_or_else(|| {
                    ModelSealError::InvalidMutation(format!("metadata of artifact {} is not an object", self.id))
                })?;
                map.insert(key.clone(), value.clone());
                Ok(Facet::Metadata)
            }
        }
    }
}

impl PartialEq for Artifact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && Facet::ALL.iter().all(|f| {
                match (self.canonical_text(*f), other.canonical_text(*f)) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => self.facet(*f) == other.facet(*f),
                }
            })
    }
}

/// Deliberate modifications used to exercise tamper detection.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Add `delta` to every scalar of the first parameter tensor.
    ShiftFirstTensor { delta: f64 },
    /// Add `delta` to one scalar, addressed by tensor and flattened index.
    ShiftParameter { tensor: usize, index: usize, delta: f64 },
    SetMetadata { key: String, value: Value },
}

impl Mutation {
    pub fn facet(&self) -> Facet {
        match self {
            Mutation::ShiftFirstTensor { .. } | Mutation::ShiftParameter { .. } => Facet::Parameters,
            Mutation::SetMetadata { .. } => Facet::Metadata,
        }
    }
}
