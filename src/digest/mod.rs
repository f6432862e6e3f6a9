use std::fmt;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use crate::artifact::{Artifact, Facet};
use crate::canon::canonical_json_bytes;
use crate::error::{ModelSealError, Result};

pub const DIGEST_LEN: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }

    pub fn of_value(value: &serde_json::Value) -> Result<Self> {
        let canonical = canonical_json_bytes(value)?;
        Ok(Self::of(&canonical))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if trimmed.len() != DIGEST_LEN * 2 {
            return Err(ModelSealError::Serialization(format!(
                "digest must be {} hex characters, got {}",
                DIGEST_LEN * 2,
                trimmed.len()
            )));
        }
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(trimmed, &mut bytes)
            .map_err(|e| ModelSealError::Serialization(format!("invalid digest hex: {e}")))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short())
    }
}

impl Serialize for Digest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDigests {
    pub parameters: Digest,
    pub metadata: Digest,
}

impl ArtifactDigests {
    pub fn compute(artifact: &Artifact) -> Result<Self> {
        Ok(Self {
            parameters: Digest::of_value(artifact.facet(Facet::Parameters))?,
            metadata: Digest::of_value(artifact.facet(Facet::Metadata))?,
        })
    }

    pub fn get(&self, facet: Facet) -> Digest {
        match facet {
            Facet::Parameters => self.parameters,
            Facet::Metadata => self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sha256_deterministic() {
        assert_eq!(Digest::of(b"hello world"), Digest::of(b"hello world"));
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            Digest::of(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_single_bit_flip_changes_digest() {
        let original = b"[[1,2],[3]]".to_vec();
        let base = Digest::of(&original);
        for byte in 0..original.len() {
            for bit in 0..8 {
                let mut flipped = original.clone();
                flipped[byte] ^= 1 << bit;
                assert_ne!(Digest::of(&flipped), base);
            }
        }
    }

    #[test]
    fn test_hex_roundtrip_lowercase() {
        let d = Digest::of(b"model");
        let upper = d.to_hex().to_uppercase();
        let parsed = Digest::from_hex(&upper).unwrap();
        assert_eq!(parsed, d);
        assert_eq!(parsed.to_hex(), parsed.to_hex().to_lowercase());
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(Digest::from_hex("abcd").is_err());
        assert!(Digest::from_hex("").is_err());
    }

    #[test]
    fn test_of_value_ignores_key_order() {
        let a = Digest::of_value(&json!({"epochs": 250, "loss": 0.01})).unwrap();
        let b = Digest::of_value(&json!({"loss": 0.01, "epochs": 250})).unwrap();
        assert_eq!(a, b);
    }
}
